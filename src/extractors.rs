//! Request extractors and the authentication middleware.

use axum::{
    Json, async_trait,
    extract::{FromRequest, FromRequestParts, Request, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, Method, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use common::{FieldErrors, REQUIRED_FIELD};
use model::entities::user;
use sea_orm::EntityTrait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::convert::Infallible;
use tracing::{debug, trace, warn};
use validator::{Validate, ValidationErrors};

use crate::errors::{ApiError, ApiResult};
use crate::schemas::AppState;

/// JSON body that has passed its `validator` rules.
///
/// Malformed JSON becomes a 400 `{"detail": ...}`; rule violations become a
/// 400 field-error map.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(json_rejection)?;

        value.validate().map_err(|errors| ApiError::Validation(field_errors(&errors)))?;
        Ok(Self(value))
    }
}

/// JSON body that is only read once the handler's permission checks passed.
///
/// Extraction never fails; a malformed body surfaces when it is read. A
/// request without a JSON content type reads as `{}`.
#[derive(Debug)]
pub struct JsonBody(Result<Value, JsonRejection>);

#[async_trait]
impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = match Json::<Value>::from_request(req, state).await {
            Ok(Json(value)) => Ok(value),
            Err(JsonRejection::MissingJsonContentType(_)) => Ok(Value::Object(Map::new())),
            Err(rejection) => Err(rejection),
        };
        Ok(Self(body))
    }
}

impl JsonBody {
    /// Deserializes the body without running its `validator` rules.
    pub fn deserialize<T: DeserializeOwned>(self) -> ApiResult<T> {
        let value = self.0.map_err(json_rejection)?;
        serde_json::from_value(value).map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// Deserializes and validates the body.
    pub fn parse<T: DeserializeOwned + Validate>(self) -> ApiResult<T> {
        let request: T = self.deserialize()?;
        request
            .validate()
            .map_err(|errors| ApiError::Validation(field_errors(&errors)))?;
        Ok(request)
    }
}

/// Account ids in paths that are not integers simply match nothing.
pub fn parse_id(raw: &str) -> ApiResult<i32> {
    raw.parse().map_err(|_| ApiError::NotFound)
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    debug!("Rejected request body: {}", rejection.body_text());
    ApiError::Parse(rejection.body_text())
}

/// Converts `validator` output into the field-error map sent to clients.
pub fn field_errors(errors: &ValidationErrors) -> FieldErrors {
    let mut out = FieldErrors::new();
    for (field, failures) in errors.field_errors() {
        for failure in failures.iter() {
            let message = match &failure.message {
                Some(message) => message.to_string(),
                None if failure.code == "required" => REQUIRED_FIELD.to_string(),
                None => "Invalid value.".to_string(),
            };
            out.add(field.to_string(), message);
        }
    }
    out
}

/// The account that sent a valid access token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub user::Model);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match authenticate(state, &parts.headers).await? {
            Some(user) => Ok(CurrentUser(user)),
            None => Err(ApiError::NotAuthenticated),
        }
    }
}

/// Resolves the account behind the `Authorization` header.
///
/// `Ok(None)` when no credentials of an accepted type were sent, an error
/// when credentials were sent but are not acceptable.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<Option<user::Model>> {
    let Some(header) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let Some(token) = raw_token(header, &state.settings.jwt.auth_header_types)? else {
        trace!("Authorization header with unknown type ignored");
        return Ok(None);
    };

    let claims = state.tokens.decode_access(token).map_err(|e| {
        debug!("Access token rejected: {}", e);
        ApiError::token_not_valid("Given token not valid for any token type")
    })?;

    let account = user::Entity::find_by_id(claims.user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| {
            warn!("Token for unknown user {}", claims.user_id);
            ApiError::AuthenticationFailed {
                detail: "User not found".to_string(),
                code: Some("user_not_found"),
            }
        })?;

    if !account.is_active {
        return Err(ApiError::AuthenticationFailed {
            detail: "User is inactive".to_string(),
            code: Some("user_inactive"),
        });
    }

    trace!(user_id = account.id, "Request authenticated");
    Ok(Some(account))
}

fn raw_token<'a>(header: &'a HeaderValue, accepted: &[String]) -> ApiResult<Option<&'a str>> {
    let value = header.to_str().map_err(|_| bad_header())?;
    let mut parts = value.split_whitespace();

    let Some(kind) = parts.next() else {
        return Ok(None);
    };
    if !accepted.iter().any(|accepted| accepted == kind) {
        return Ok(None);
    }

    match (parts.next(), parts.next()) {
        (Some(token), None) => Ok(Some(token)),
        _ => Err(bad_header()),
    }
}

fn bad_header() -> ApiError {
    ApiError::AuthenticationFailed {
        detail: "Authorization header must contain two space-delimited values".to_string(),
        code: Some("bad_authorization_header"),
    }
}

/// Lets anonymous callers use safe methods only.
///
/// Other methods need a valid access token; invalid credentials are refused
/// for every method.
pub async fn read_only_unless_authenticated(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let account = authenticate(&state, request.headers()).await?;
    let safe = matches!(*request.method(), Method::GET | Method::HEAD | Method::OPTIONS);

    if !safe && account.is_none() {
        debug!(method = %request.method(), uri = %request.uri(), "Anonymous write refused");
        return Err(ApiError::NotAuthenticated);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Signup {
        #[validate(required)]
        name: Option<String>,
        #[validate(email(message = "Enter a valid email address."))]
        email: Option<String>,
    }

    #[test]
    fn test_validation_errors_become_field_errors() {
        let signup = Signup { name: None, email: Some("nope".to_string()) };
        let errors = field_errors(&signup.validate().unwrap_err());

        assert_eq!(errors.get("name"), Some(&[REQUIRED_FIELD.to_string()][..]));
        assert_eq!(
            errors.get("email"),
            Some(&["Enter a valid email address.".to_string()][..])
        );
    }

    #[test]
    fn test_raw_token_parsing() {
        let accepted = vec!["JWT".to_string(), "Bearer".to_string()];

        let header = HeaderValue::from_static("JWT abc.def");
        assert_eq!(raw_token(&header, &accepted).unwrap(), Some("abc.def"));

        let header = HeaderValue::from_static("Bearer abc.def");
        assert_eq!(raw_token(&header, &accepted).unwrap(), Some("abc.def"));

        let header = HeaderValue::from_static("Basic dXNlcjpwYXNz");
        assert_eq!(raw_token(&header, &accepted).unwrap(), None);

        let header = HeaderValue::from_static("JWT");
        assert!(raw_token(&header, &accepted).is_err());

        let header = HeaderValue::from_static("JWT a b");
        assert!(raw_token(&header, &accepted).is_err());
    }

    async fn json_body(content_type: Option<&str>, body: &'static str) -> JsonBody {
        let mut request = axum::http::Request::builder().method(Method::DELETE).uri("/");
        if let Some(content_type) = content_type {
            request = request.header(axum::http::header::CONTENT_TYPE, content_type);
        }
        let request = request.body(axum::body::Body::from(body)).unwrap();
        JsonBody::from_request(request, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_json_body_reports_malformed_json_when_read() {
        let body = json_body(Some("application/json"), "{bad json").await;

        match body.parse::<Signup>() {
            Err(ApiError::Parse(message)) => assert!(!message.is_empty()),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_json_body_without_content_type_reads_as_empty_object() {
        let body = json_body(None, "").await;

        match body.parse::<Signup>() {
            Err(ApiError::Validation(errors)) => {
                assert_eq!(errors.get("name"), Some(&[REQUIRED_FIELD.to_string()][..]));
            }
            other => panic!("expected field errors, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert!(matches!(parse_id("abc"), Err(ApiError::NotFound)));
    }
}
