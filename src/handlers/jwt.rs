use crate::errors::{ApiError, ApiResult};
use crate::extractors::ValidatedJson;
use crate::schemas::AppState;
use axum::{extract::State, response::Json};
use common::{AccessToken, ErrorDetail, FieldErrors, TokenPair};
use model::entities::user;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, trace};
use utoipa::ToSchema;
use validator::Validate;

const NO_ACTIVE_ACCOUNT: &str = "No active account found with the given credentials";

/// Login credentials
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct TokenObtainRequest {
    #[validate(required(message = "This field is required."))]
    pub username: Option<String>,
    #[validate(required(message = "This field is required."))]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct TokenRefreshRequest {
    #[validate(required(message = "This field is required."))]
    pub refresh: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct TokenVerifyRequest {
    #[validate(required(message = "This field is required."))]
    pub token: Option<String>,
}

/// Obtain an access/refresh token pair
#[utoipa::path(
    post,
    path = "/api/v1/jwt/create/",
    tag = "jwt",
    request_body = TokenObtainRequest,
    responses(
        (status = 200, description = "Credentials accepted", body = TokenPair),
        (status = 400, description = "Missing credentials", body = FieldErrors),
        (status = 401, description = "Credentials rejected", body = ErrorDetail),
    )
)]
#[instrument(skip_all)]
pub async fn create_token(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<TokenObtainRequest>,
) -> ApiResult<Json<TokenPair>> {
    trace!("Entering create_token function");
    let username = request.username.unwrap_or_default();
    let password = request.password.unwrap_or_default();
    let accounts = state.accounts();

    let account = user::Entity::find_by_username(&username).one(&state.db).await?;
    let account = match account {
        Some(account) if accounts.verify(&account, &password) && account.is_active => account,
        Some(account) => {
            debug!(user_id = account.id, "Login refused");
            return Err(no_active_account());
        }
        None => {
            // Spend the same hashing time as for a known username.
            let _ = accounts.hash(&password);
            debug!("Login attempt for unknown username");
            return Err(no_active_account());
        }
    };

    // Saved through the active model so the account hooks run.
    let mut active: user::ActiveModel = account.into();
    active.last_login = Set(Some(Utc::now()));
    let account = active.update(&state.db).await?;

    let pair = state.tokens.issue_pair(account.id)?;
    info!("Token pair issued for account {}", account.id);
    Ok(Json(pair))
}

fn no_active_account() -> ApiError {
    ApiError::AuthenticationFailed {
        detail: NO_ACTIVE_ACCOUNT.to_string(),
        code: Some("no_active_account"),
    }
}

/// Exchange a refresh token for a new access token
#[utoipa::path(
    post,
    path = "/api/v1/jwt/refresh/",
    tag = "jwt",
    request_body = TokenRefreshRequest,
    responses(
        (status = 200, description = "New access token", body = AccessToken),
        (status = 400, description = "Missing token", body = FieldErrors),
        (status = 401, description = "Token invalid or expired", body = ErrorDetail),
    )
)]
#[instrument(skip_all)]
pub async fn refresh_token(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<TokenRefreshRequest>,
) -> ApiResult<Json<AccessToken>> {
    let access = state.tokens.refresh(request.refresh.as_deref().unwrap_or_default())?;
    debug!("Access token refreshed");
    Ok(Json(access))
}

/// Check that a token is valid
#[utoipa::path(
    post,
    path = "/api/v1/jwt/verify/",
    tag = "jwt",
    request_body = TokenVerifyRequest,
    responses(
        (status = 200, description = "Token is valid"),
        (status = 400, description = "Missing token", body = FieldErrors),
        (status = 401, description = "Token invalid or expired", body = ErrorDetail),
    )
)]
#[instrument(skip_all)]
pub async fn verify_token(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<TokenVerifyRequest>,
) -> ApiResult<Json<Map<String, Value>>> {
    let claims = state.tokens.verify(request.token.as_deref().unwrap_or_default())?;
    debug!(user_id = claims.user_id, token_type = ?claims.token_type, "Token verified");
    Ok(Json(Map::new()))
}
