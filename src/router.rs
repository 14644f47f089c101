use crate::extractors::read_only_unless_authenticated;
use crate::handlers::{
    admin::{create_account, delete_account, get_account, list_accounts, site_index, update_account},
    docs::docs_index,
    health::health_check,
    jwt::{create_token, refresh_token, verify_token},
    users::{
        create_user, delete_me, delete_user, get_me, get_user, list_users, partial_update_me,
        partial_update_user, reset_password, reset_password_confirm, set_password, set_username,
        update_me, update_user,
    },
};
use crate::schemas::{ApiDoc, AppState};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Create application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Account routes
        .route("/api/v1/users/", get(list_users).post(create_user))
        .route(
            "/api/v1/users/me/",
            get(get_me).put(update_me).patch(partial_update_me).delete(delete_me),
        )
        .route("/api/v1/users/set_password/", post(set_password))
        .route("/api/v1/users/set_username/", post(set_username))
        .route("/api/v1/users/reset_password/", post(reset_password))
        .route("/api/v1/users/reset_password_confirm/", post(reset_password_confirm))
        .route(
            "/api/v1/users/:user_id/",
            get(get_user)
                .put(update_user)
                .patch(partial_update_user)
                .delete(delete_user),
        )
        // Token routes
        .route("/api/v1/jwt/create/", post(create_token))
        .route("/api/v1/jwt/refresh/", post(refresh_token))
        .route("/api/v1/jwt/verify/", post(verify_token))
        // Administrative console
        .route("/admin/", get(site_index))
        .route("/admin/users/", get(list_accounts).post(create_account))
        .route(
            "/admin/users/:user_id/",
            get(get_account).patch(update_account).delete(delete_account),
        )
        // Documentation
        .merge(docs_router(&state))
        // Add middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Landing page, Swagger UI and the OpenAPI document.
///
/// Readable by anyone; other methods need a signed-in caller.
fn docs_router(state: &AppState) -> Router<AppState> {
    let mut openapi = ApiDoc::openapi();
    openapi.info.title = state.settings.docs_title.clone();

    Router::new()
        .route("/", get(docs_index))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            read_only_unless_authenticated,
        ))
}
