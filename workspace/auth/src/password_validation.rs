//! Password strength rules applied whenever a password is set.
//!
//! A [`PasswordPolicy`] runs every configured [`PasswordValidator`] and
//! reports all failures at once, so a client can show the complete list of
//! problems in one round trip.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

static COMMON_PASSWORDS: Lazy<HashSet<String>> = Lazy::new(|| {
    include_str!("../data/common-passwords.txt")
        .lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty())
        .collect()
});

/// Account attributes a password is compared against.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserAttributes<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

/// A single password rule. Returns the user-facing message on failure.
pub trait PasswordValidator: Send + Sync {
    fn validate(&self, password: &str, user: &UserAttributes<'_>) -> Result<(), String>;
}

/// Rejects passwords that closely resemble an account attribute.
#[derive(Debug, Clone)]
pub struct UserAttributeSimilarity {
    pub max_similarity: f64,
}

impl Default for UserAttributeSimilarity {
    fn default() -> Self {
        Self { max_similarity: 0.7 }
    }
}

impl PasswordValidator for UserAttributeSimilarity {
    fn validate(&self, password: &str, user: &UserAttributes<'_>) -> Result<(), String> {
        let password = password.to_lowercase();
        let attributes = [
            ("username", user.username),
            ("email address", user.email),
            ("first name", user.first_name),
            ("last name", user.last_name),
        ];

        for (verbose_name, value) in attributes {
            if value.is_empty() {
                continue;
            }
            let value = value.to_lowercase();
            let parts = value
                .split(|c: char| !c.is_alphanumeric() && c != '_')
                .filter(|part| !part.is_empty())
                .chain(std::iter::once(value.as_str()));

            for part in parts {
                if exceeds_length_ratio(&password, self.max_similarity, part) {
                    continue;
                }
                if quick_ratio(&password, part) >= self.max_similarity {
                    return Err(format!("The password is too similar to the {verbose_name}."));
                }
            }
        }
        Ok(())
    }
}

/// Short attribute parts cannot make a much longer password similar.
fn exceeds_length_ratio(password: &str, max_similarity: f64, value: &str) -> bool {
    let password_len = password.chars().count();
    let value_len = value.chars().count();
    let length_bound = max_similarity / 2.0 * password_len as f64;
    password_len >= 10 * value_len && (value_len as f64) < length_bound
}

/// Upper bound on the matching ratio of two strings: twice the size of the
/// character multiset intersection over the combined length.
fn quick_ratio(a: &str, b: &str) -> f64 {
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 1.0;
    }

    let mut available: HashMap<char, usize> = HashMap::new();
    for c in b.chars() {
        *available.entry(c).or_default() += 1;
    }
    let mut matches = 0usize;
    for c in a.chars() {
        if let Some(count) = available.get_mut(&c) {
            if *count > 0 {
                *count -= 1;
                matches += 1;
            }
        }
    }
    2.0 * matches as f64 / total as f64
}

#[derive(Debug, Clone)]
pub struct MinimumLength {
    pub min_length: usize,
}

impl Default for MinimumLength {
    fn default() -> Self {
        Self { min_length: 8 }
    }
}

impl PasswordValidator for MinimumLength {
    fn validate(&self, password: &str, _user: &UserAttributes<'_>) -> Result<(), String> {
        if password.chars().count() < self.min_length {
            let unit = if self.min_length == 1 { "character" } else { "characters" };
            return Err(format!(
                "This password is too short. It must contain at least {} {unit}.",
                self.min_length
            ));
        }
        Ok(())
    }
}

/// Rejects passwords found in the embedded list of frequently used passwords.
#[derive(Debug, Clone, Default)]
pub struct CommonPassword;

impl PasswordValidator for CommonPassword {
    fn validate(&self, password: &str, _user: &UserAttributes<'_>) -> Result<(), String> {
        if COMMON_PASSWORDS.contains(&password.trim().to_lowercase()) {
            return Err("This password is too common.".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NumericPassword;

impl PasswordValidator for NumericPassword {
    fn validate(&self, password: &str, _user: &UserAttributes<'_>) -> Result<(), String> {
        if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
            return Err("This password is entirely numeric.".to_string());
        }
        Ok(())
    }
}

/// Ordered set of password validators.
pub struct PasswordPolicy {
    validators: Vec<Box<dyn PasswordValidator>>,
}

impl PasswordPolicy {
    pub fn new(validators: Vec<Box<dyn PasswordValidator>>) -> Self {
        Self { validators }
    }

    /// Runs every validator and returns all failure messages.
    pub fn validate(&self, password: &str, user: &UserAttributes<'_>) -> Result<(), Vec<String>> {
        let errors: Vec<String> = self
            .validators
            .iter()
            .filter_map(|validator| validator.validate(password, user).err())
            .collect();

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl Default for PasswordPolicy {
    /// Similarity, minimum length 8, common list and numeric checks.
    fn default() -> Self {
        Self::new(vec![
            Box::new(UserAttributeSimilarity::default()),
            Box::new(MinimumLength::default()),
            Box::new(CommonPassword),
            Box::new(NumericPassword),
        ])
    }
}

impl std::fmt::Debug for PasswordPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordPolicy")
            .field("validators", &self.validators.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserAttributes<'static> {
        UserAttributes {
            username: "testuser",
            email: "teste@email.com",
            first_name: "",
            last_name: "",
        }
    }

    #[test]
    fn test_accepts_reasonable_password() {
        assert!(PasswordPolicy::default().validate("a2d4g6rr", &user()).is_ok());
    }

    #[test]
    fn test_common_short_numeric_password_reports_every_failure() {
        let errors = PasswordPolicy::default().validate("123456", &user()).unwrap_err();
        assert_eq!(
            errors,
            vec![
                "This password is too short. It must contain at least 8 characters.".to_string(),
                "This password is too common.".to_string(),
                "This password is entirely numeric.".to_string(),
            ]
        );
    }

    #[test]
    fn test_common_password_is_case_insensitive() {
        let err = CommonPassword.validate("PassWord1", &user()).unwrap_err();
        assert_eq!(err, "This password is too common.");
    }

    #[test]
    fn test_similar_to_username() {
        let err = UserAttributeSimilarity::default()
            .validate("testuser1", &user())
            .unwrap_err();
        assert_eq!(err, "The password is too similar to the username.");
    }

    #[test]
    fn test_similar_to_email_part() {
        let attrs = UserAttributes {
            username: "someone",
            email: "marguerite@example.com",
            ..Default::default()
        };
        let err = UserAttributeSimilarity::default()
            .validate("Marguerite!", &attrs)
            .unwrap_err();
        assert_eq!(err, "The password is too similar to the email address.");
    }

    #[test]
    fn test_short_attribute_does_not_match_long_password() {
        let attrs = UserAttributes { username: "ab", ..Default::default() };
        assert!(
            UserAttributeSimilarity::default()
                .validate("abcdefghijklmnopqrstuvwxyz", &attrs)
                .is_ok()
        );
    }

    #[test]
    fn test_minimum_length_counts_characters() {
        let validator = MinimumLength { min_length: 4 };
        assert!(validator.validate("ññññ", &user()).is_ok());
        assert!(validator.validate("ñññ", &user()).is_err());
    }

    #[test]
    fn test_quick_ratio() {
        assert_eq!(quick_ratio("abc", "abc"), 1.0);
        assert_eq!(quick_ratio("abc", "xyz"), 0.0);
        assert!((quick_ratio("aab", "ab") - 0.8).abs() < f64::EPSILON);
    }
}
