//! Credential handling for the API: password hashing and validation,
//! JWT access/refresh tokens and password-reset tokens.
//!
//! The cryptographic primitives all come from established crates
//! (`argon2`, `jsonwebtoken`, `hmac`); this crate only wires them together
//! with the account rules of the service.

pub mod error;
pub mod hasher;
pub mod password_validation;
pub mod reset;
pub mod tokens;

pub use error::{AuthError, Result};
pub use hasher::{Argon2Hasher, PasswordHasher};
pub use password_validation::{PasswordPolicy, UserAttributes};
pub use reset::{PasswordResetTokens, ResetSubject, decode_uid, encode_uid};
pub use tokens::{Claims, TokenService, TokenType};
