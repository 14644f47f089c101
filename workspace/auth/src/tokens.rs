//! JWT access/refresh token handling.

use crate::error::{AuthError, Result};
use chrono::{Duration, Utc};
use common::{AccessToken, TokenPair};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Kind of a token, carried in the `token_type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub token_type: TokenType,
    /// Expiration timestamp (seconds since epoch)
    pub exp: i64,
    /// Issued-at timestamp (seconds since epoch)
    pub iat: i64,
    /// Unique token identifier
    pub jti: String,
    pub user_id: i32,
}

/// Issues and validates signed tokens with a shared HS256 secret.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
}

impl TokenService {
    pub fn new(secret: &str, access_lifetime: Duration, refresh_lifetime: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_lifetime,
            refresh_lifetime,
        }
    }

    /// Issues a fresh access/refresh pair for a user.
    pub fn issue_pair(&self, user_id: i32) -> Result<TokenPair> {
        debug!(user_id, "Issuing token pair");
        Ok(TokenPair {
            refresh: self.issue(user_id, TokenType::Refresh)?,
            access: self.issue(user_id, TokenType::Access)?,
        })
    }

    /// Exchanges a refresh token for a new access token.
    pub fn refresh(&self, refresh_token: &str) -> Result<AccessToken> {
        let claims = self.decode_typed(refresh_token, TokenType::Refresh)?;
        Ok(AccessToken {
            access: self.issue(claims.user_id, TokenType::Access)?,
        })
    }

    /// Checks signature and expiry of a token of either type.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        self.decode(token)
    }

    /// Decodes a token that must be an access token.
    pub fn decode_access(&self, token: &str) -> Result<Claims> {
        self.decode_typed(token, TokenType::Access)
    }

    fn issue(&self, user_id: i32, token_type: TokenType) -> Result<String> {
        let now = Utc::now();
        let lifetime = match token_type {
            TokenType::Access => self.access_lifetime,
            TokenType::Refresh => self.refresh_lifetime,
        };
        let claims = Claims {
            token_type,
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().simple().to_string(),
            user_id,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenEncoding(e.to_string()))
    }

    fn decode(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }

    fn decode_typed(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let claims = self.decode(token)?;
        if claims.token_type != expected {
            debug!(?expected, actual = ?claims.token_type, "Rejected token of wrong type");
            return Err(AuthError::WrongTokenType);
        }
        Ok(claims)
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_lifetime", &self.access_lifetime)
            .field("refresh_lifetime", &self.refresh_lifetime)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str) -> TokenService {
        TokenService::new(secret, Duration::minutes(5), Duration::days(1))
    }

    #[test]
    fn test_pair_round_trip() {
        let tokens = service("test-secret-key-12345");
        let pair = tokens.issue_pair(7).unwrap();

        let access = tokens.decode_access(&pair.access).unwrap();
        assert_eq!(access.user_id, 7);
        assert_eq!(access.token_type, TokenType::Access);
        assert!(access.exp > Utc::now().timestamp());

        let refresh = tokens.verify(&pair.refresh).unwrap();
        assert_eq!(refresh.token_type, TokenType::Refresh);
        assert!(refresh.exp > access.exp);
        assert_ne!(refresh.jti, access.jti);
    }

    #[test]
    fn test_refresh_issues_access_for_same_user() {
        let tokens = service("test-secret-key-12345");
        let pair = tokens.issue_pair(3).unwrap();

        let fresh = tokens.refresh(&pair.refresh).unwrap();
        assert_eq!(tokens.decode_access(&fresh.access).unwrap().user_id, 3);
    }

    #[test]
    fn test_token_types_are_not_interchangeable() {
        let tokens = service("test-secret-key-12345");
        let pair = tokens.issue_pair(1).unwrap();

        assert!(matches!(tokens.refresh(&pair.access), Err(AuthError::WrongTokenType)));
        assert!(matches!(
            tokens.decode_access(&pair.refresh),
            Err(AuthError::WrongTokenType)
        ));
    }

    #[test]
    fn test_different_secrets_reject() {
        let pair = service("secret1").issue_pair(1).unwrap();
        assert!(matches!(
            service("secret2").verify(&pair.access),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = TokenService::new("secret", Duration::seconds(-10), Duration::days(1));
        let pair = tokens.issue_pair(1).unwrap();
        assert!(matches!(tokens.verify(&pair.access), Err(AuthError::InvalidToken)));
        assert!(tokens.verify(&pair.refresh).is_ok());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(service("secret").verify("invalid.token.here").is_err());
    }
}
