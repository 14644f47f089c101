use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use common::{ErrorDetail, FieldErrors};
use sea_orm::DbErr;
use thiserror::Error;
use tracing::error;

pub const NOT_AUTHENTICATED: &str = "Authentication credentials were not provided.";

/// Value of the `WWW-Authenticate` header on 401 responses.
const WWW_AUTHENTICATE: &str = "JWT realm=\"api\"";

/// Errors returned by request handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body failed validation
    #[error("Invalid input")]
    Validation(FieldErrors),

    /// Request body is not valid JSON
    #[error("JSON parse error - {0}")]
    Parse(String),

    /// No credentials were sent
    #[error("Authentication credentials were not provided.")]
    NotAuthenticated,

    /// Credentials were sent but rejected
    #[error("{detail}")]
    AuthenticationFailed {
        detail: String,
        code: Option<&'static str>,
    },

    #[error("You do not have permission to perform this action.")]
    PermissionDenied,

    #[error("Not found.")]
    NotFound,

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        ApiError::Validation(FieldErrors::single(field, message))
    }

    pub fn authentication_failed(detail: impl Into<String>) -> Self {
        ApiError::AuthenticationFailed {
            detail: detail.into(),
            code: None,
        }
    }

    /// Rejected or expired token.
    pub fn token_not_valid(detail: impl Into<String>) -> Self {
        ApiError::AuthenticationFailed {
            detail: detail.into(),
            code: Some("token_not_valid"),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Parse(_) => StatusCode::BAD_REQUEST,
            ApiError::NotAuthenticated | ApiError::AuthenticationFailed { .. } => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::PermissionDenied => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<auth::AuthError> for ApiError {
    fn from(error: auth::AuthError) -> Self {
        match error {
            auth::AuthError::InvalidToken | auth::AuthError::WrongTokenType => {
                ApiError::token_not_valid("Token is invalid or expired")
            }
            other => ApiError::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation(errors) => (status, Json(errors)).into_response(),
            ApiError::AuthenticationFailed { detail, code } => {
                let body = match code {
                    Some(code) => ErrorDetail::with_code(detail, code),
                    None => ErrorDetail::new(detail),
                };
                unauthorized(body)
            }
            ApiError::NotAuthenticated => unauthorized(ErrorDetail::new(NOT_AUTHENTICATED)),
            ApiError::Database(ref db_error) => {
                error!("Database error while handling request: {}", db_error);
                server_error()
            }
            ApiError::Internal(ref internal) => {
                error!("Internal error while handling request: {:#}", internal);
                server_error()
            }
            other => (status, Json(ErrorDetail::new(other.to_string()))).into_response(),
        }
    }
}

fn unauthorized(body: ErrorDetail) -> Response {
    let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static(WWW_AUTHENTICATE),
    );
    response
}

fn server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorDetail::new("A server error occurred.")),
    )
        .into_response()
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::field("x", "y").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotAuthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::PermissionDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Database(DbErr::Custom("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unauthorized_carries_challenge() {
        let response = ApiError::NotAuthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "JWT realm=\"api\""
        );
    }

    #[test]
    fn test_token_errors_map_to_401() {
        let error: ApiError = auth::AuthError::WrongTokenType.into();
        assert_eq!(error.status(), StatusCode::UNAUTHORIZED);

        let error: ApiError = auth::AuthError::Hash("bad".into()).into();
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
