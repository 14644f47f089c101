use thiserror::Error;
use tracing::debug;

/// Error types for the auth crate
#[derive(Error, Debug)]
pub enum AuthError {
    /// Password hashing or hash parsing failed
    #[error("Password hash error: {0}")]
    Hash(String),

    /// Token could not be encoded
    #[error("Token encoding error: {0}")]
    TokenEncoding(String),

    /// Token is malformed, badly signed or expired
    #[error("Token is invalid or expired")]
    InvalidToken,

    /// Token is valid but of the wrong kind for this use
    #[error("Token has wrong type")]
    WrongTokenType,

    /// Signing key rejected by the MAC
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    /// Password-reset uid could not be decoded
    #[error("Invalid user id")]
    InvalidUid,
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        debug!(%error, "Rejected token");
        AuthError::InvalidToken
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(error: argon2::password_hash::Error) -> Self {
        AuthError::Hash(error.to_string())
    }
}

impl From<argon2::Error> for AuthError {
    fn from(error: argon2::Error) -> Self {
        AuthError::Hash(error.to_string())
    }
}

/// Type alias for Result with AuthError
pub type Result<T> = std::result::Result<T, AuthError>;
