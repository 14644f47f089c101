use auth::{PasswordHasher, PasswordPolicy, PasswordResetTokens, TokenService};
use common::{AccessToken, AdminUserDto, ErrorDetail, FieldErrors, TokenPair, UserDto};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};

use crate::config::Settings;
use crate::mail::{EmailTemplates, Mailer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection
    pub db: DatabaseConnection,
    pub settings: Arc<Settings>,
    /// JWT issuing and validation
    pub tokens: Arc<TokenService>,
    pub reset_tokens: Arc<PasswordResetTokens>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub password_policy: Arc<PasswordPolicy>,
    pub emails: Arc<EmailTemplates>,
    pub mailer: Arc<dyn Mailer>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("db", &self.db)
            .field("tokens", &self.tokens)
            .field("password_policy", &self.password_policy)
            .finish_non_exhaustive()
    }
}

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Database connection status
    pub database: String,
}

/// Registers the `Authorization: JWT <token>` scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "jwt",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                "Authorization",
                "Access token prefixed with `JWT ` or `Bearer `",
            ))),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::health_check,
        crate::handlers::users::create_user,
        crate::handlers::users::list_users,
        crate::handlers::users::get_user,
        crate::handlers::users::update_user,
        crate::handlers::users::partial_update_user,
        crate::handlers::users::delete_user,
        crate::handlers::users::get_me,
        crate::handlers::users::update_me,
        crate::handlers::users::partial_update_me,
        crate::handlers::users::delete_me,
        crate::handlers::users::set_password,
        crate::handlers::users::set_username,
        crate::handlers::users::reset_password,
        crate::handlers::users::reset_password_confirm,
        crate::handlers::jwt::create_token,
        crate::handlers::jwt::refresh_token,
        crate::handlers::jwt::verify_token,
        crate::handlers::admin::site_index,
        crate::handlers::admin::list_accounts,
        crate::handlers::admin::create_account,
        crate::handlers::admin::get_account,
        crate::handlers::admin::update_account,
        crate::handlers::admin::delete_account,
    ),
    components(
        schemas(
            ErrorDetail,
            FieldErrors,
            HealthResponse,
            UserDto,
            AdminUserDto,
            TokenPair,
            AccessToken,
            crate::handlers::users::CreateUserRequest,
            crate::handlers::users::PartialUpdateUserRequest,
            crate::handlers::users::CurrentPasswordRequest,
            crate::handlers::users::SetPasswordRequest,
            crate::handlers::users::SetUsernameRequest,
            crate::handlers::users::ResetPasswordRequest,
            crate::handlers::users::ResetPasswordConfirmRequest,
            crate::handlers::jwt::TokenObtainRequest,
            crate::handlers::jwt::TokenRefreshRequest,
            crate::handlers::jwt::TokenVerifyRequest,
            crate::handlers::admin::SiteIndex,
            crate::handlers::admin::AdminCreateUserRequest,
            crate::handlers::admin::AdminUpdateUserRequest,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "users", description = "Registration and account management"),
        (name = "jwt", description = "Token lifecycle"),
        (name = "admin", description = "Administrative console (staff only)"),
    ),
    info(
        title = "API TEMPLATE",
        description = "Account registration and JWT authentication service",
        version = "0.1.0",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
pub struct ApiDoc;
