use crate::error::{AuthError, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};

/// Password hasher trait
///
/// Hashes are self-describing strings (PHC format) so verification needs no
/// extra state besides the hash itself.
pub trait PasswordHasher: Send + Sync {
    /// Hashes a plaintext password with a fresh random salt.
    fn hash(&self, password: &str) -> Result<String>;

    /// Verifies a password against a hash.
    ///
    /// Returns `Ok(false)` on mismatch and an error only when `hash` cannot be
    /// parsed.
    fn verify(&self, password: &str, hash: &str) -> Result<bool>;
}

/// Argon2id password hasher.
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self { params: Params::default() }
    }

    /// Hasher with explicit cost parameters (memory in KiB, iterations,
    /// parallelism).
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self> {
        let params = Params::new(m_cost, t_cost, p_cost, None)?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self.argon2().hash_password(password.as_bytes(), &salt)?;
        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Hash(e.to_string()))?;
        // Parameters are read from the hash, so hashes made with other costs still verify.
        Ok(self
            .argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Argon2Hasher {
        Argon2Hasher::with_params(8, 1, 1).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = fast();
        let hash = hasher.hash("a2d4g6rr").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("a2d4g6rr", &hash).unwrap());
        assert!(!hasher.verify("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let hasher = fast();
        let first = hasher.hash("same").unwrap();
        let second = hasher.hash("same").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_accepts_hash_with_other_params() {
        let hash = Argon2Hasher::with_params(16, 2, 1).unwrap().hash("secret").unwrap();
        assert!(fast().verify("secret", &hash).unwrap());
    }

    #[test]
    fn test_garbage_hash_is_error() {
        assert!(fast().verify("secret", "not-a-hash").is_err());
    }
}
