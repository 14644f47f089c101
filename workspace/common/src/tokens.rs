use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Access/refresh token pair returned on login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    /// Long-lived token used to obtain new access tokens
    pub refresh: String,
    /// Short-lived token sent in the `Authorization` header
    pub access: String,
}

/// Fresh access token returned by the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccessToken {
    pub access: String,
}
