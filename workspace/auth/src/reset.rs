//! One-time tokens for the password-reset flow.
//!
//! A token is `<timestamp in base 36>-<hmac>` where the HMAC covers the
//! account's id, password hash, last login and e-mail. Changing any of those
//! (most importantly the password itself) invalidates every token issued
//! before, so no server-side storage is needed.

use crate::error::{AuthError, Result};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const KEY_SALT: &str = "apitemplate.auth.reset.PasswordResetTokens";

/// 2001-01-01T00:00:00Z as a Unix timestamp.
const TOKEN_EPOCH: i64 = 978_307_200;

/// Encodes a user id for use in reset links.
pub fn encode_uid(user_id: i32) -> String {
    URL_SAFE_NO_PAD.encode(user_id.to_string())
}

/// Decodes a uid produced by [`encode_uid`].
pub fn decode_uid(uid: &str) -> Result<i32> {
    let bytes = URL_SAFE_NO_PAD.decode(uid).map_err(|_| AuthError::InvalidUid)?;
    let text = String::from_utf8(bytes).map_err(|_| AuthError::InvalidUid)?;
    text.parse().map_err(|_| AuthError::InvalidUid)
}

/// The account state a reset token is bound to.
#[derive(Debug, Clone, Copy)]
pub struct ResetSubject<'a> {
    pub user_id: i32,
    pub password_hash: &'a str,
    pub last_login: Option<DateTime<Utc>>,
    pub email: &'a str,
}

#[derive(Clone)]
pub struct PasswordResetTokens {
    mac: HmacSha256,
    timeout: Duration,
}

impl PasswordResetTokens {
    pub fn new(secret: &str, timeout: Duration) -> Result<Self> {
        let mut digest = Sha256::new();
        digest.update(KEY_SALT.as_bytes());
        digest.update(secret.as_bytes());
        let mac = HmacSha256::new_from_slice(&digest.finalize())
            .map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        Ok(Self { mac, timeout })
    }

    pub fn make_token(&self, subject: &ResetSubject<'_>) -> String {
        self.make_token_at(subject, seconds_since_epoch(Utc::now()))
    }

    pub fn check_token(&self, subject: &ResetSubject<'_>, token: &str) -> bool {
        self.check_token_at(subject, token, Utc::now())
    }

    fn make_token_at(&self, subject: &ResetSubject<'_>, timestamp: i64) -> String {
        format!("{}-{}", to_base36(timestamp), self.signature(subject, timestamp))
    }

    fn check_token_at(&self, subject: &ResetSubject<'_>, token: &str, now: DateTime<Utc>) -> bool {
        let Some((ts_b36, _)) = token.split_once('-') else {
            return false;
        };
        let Some(timestamp) = from_base36(ts_b36) else {
            return false;
        };

        let expected = self.make_token_at(subject, timestamp);
        if !bool::from(expected.as_bytes().ct_eq(token.as_bytes())) {
            return false;
        }

        seconds_since_epoch(now) - timestamp <= self.timeout.num_seconds()
    }

    fn signature(&self, subject: &ResetSubject<'_>, timestamp: i64) -> String {
        let login = subject
            .last_login
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let value = format!(
            "{}{}{}{}{}",
            subject.user_id, subject.password_hash, login, timestamp, subject.email
        );

        let mut mac = self.mac.clone();
        mac.update(value.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for PasswordResetTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordResetTokens")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Token timestamps count seconds from 2001-01-01 to keep them short.
fn seconds_since_epoch(at: DateTime<Utc>) -> i64 {
    at.timestamp() - TOKEN_EPOCH
}

fn to_base36(mut value: i64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value <= 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn from_base36(text: &str) -> Option<i64> {
    if text.is_empty() || text.len() > 13 {
        return None;
    }
    i64::from_str_radix(text, 36).ok().filter(|value| *value >= 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(password_hash: &str) -> ResetSubject<'_> {
        ResetSubject {
            user_id: 1,
            password_hash,
            last_login: None,
            email: "teste@email.com",
        }
    }

    fn tokens() -> PasswordResetTokens {
        PasswordResetTokens::new("secret", Duration::days(3)).unwrap()
    }

    #[test]
    fn test_uid_round_trip() {
        assert_eq!(encode_uid(1), "MQ");
        assert_eq!(decode_uid(&encode_uid(4242)).unwrap(), 4242);
        assert!(matches!(decode_uid("!!"), Err(AuthError::InvalidUid)));
        assert!(matches!(decode_uid(&URL_SAFE_NO_PAD.encode("abc")), Err(AuthError::InvalidUid)));
    }

    #[test]
    fn test_token_valid_for_unchanged_account() {
        let tokens = tokens();
        let token = tokens.make_token(&subject("hash-1"));
        assert!(tokens.check_token(&subject("hash-1"), &token));
    }

    #[test]
    fn test_token_signature_is_lowercase_hex() {
        let token = tokens().make_token_at(&subject("hash-1"), 36);
        let (timestamp, signature) = token.split_once('-').unwrap();
        assert_eq!(timestamp, "10");
        assert_eq!(signature.len(), 64);
        assert!(hex::decode(signature).is_ok());
        assert_eq!(signature, signature.to_lowercase());
    }

    #[test]
    fn test_password_change_invalidates_token() {
        let tokens = tokens();
        let token = tokens.make_token(&subject("hash-1"));
        assert!(!tokens.check_token(&subject("hash-2"), &token));
    }

    #[test]
    fn test_login_invalidates_token() {
        let tokens = tokens();
        let token = tokens.make_token(&subject("hash-1"));
        let logged_in = ResetSubject {
            last_login: Some(Utc::now()),
            ..subject("hash-1")
        };
        assert!(!tokens.check_token(&logged_in, &token));
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = tokens();
        let issued = Utc::now() - Duration::days(4);
        let token = tokens.make_token_at(&subject("hash-1"), seconds_since_epoch(issued));
        assert!(!tokens.check_token(&subject("hash-1"), &token));
        assert!(tokens.check_token_at(&subject("hash-1"), &token, issued + Duration::days(2)));
    }

    #[test]
    fn test_other_secret_rejects() {
        let token = tokens().make_token(&subject("hash-1"));
        let other = PasswordResetTokens::new("other", Duration::days(3)).unwrap();
        assert!(!other.check_token(&subject("hash-1"), &token));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let tokens = tokens();
        for token in ["", "nodash", "-abc", "zzzzzzzzzzzzzzzz-abc", "abc-"] {
            assert!(!tokens.check_token(&subject("hash-1"), token));
        }
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(from_base36("10"), Some(36));
        assert_eq!(from_base36(""), None);
    }
}
