//! Account rules shared by the public API, the admin console and the CLI.

use auth::{PasswordHasher, PasswordPolicy, UserAttributes};
use common::{BLANK_FIELD, FieldErrors};
use model::entities::user;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, Set, SqlErr};
use tracing::{debug, info, warn};

use crate::errors::{ApiError, ApiResult};
use crate::schemas::AppState;

pub const INVALID_USERNAME: &str = "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.";
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const EMAIL_TAKEN: &str = "user with this email already exists.";
pub const INVALID_PASSWORD: &str = "Invalid password.";

/// Fields of an account about to be created.
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub name: Option<String>,
    pub password: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Account operations over a database connection.
pub struct Accounts<'a> {
    pub db: &'a DatabaseConnection,
    pub hasher: &'a dyn PasswordHasher,
    pub policy: &'a PasswordPolicy,
}

impl AppState {
    pub fn accounts(&self) -> Accounts<'_> {
        Accounts {
            db: &self.db,
            hasher: self.hasher.as_ref(),
            policy: self.password_policy.as_ref(),
        }
    }
}

/// Letters, digits and `@ . + - _`.
pub fn username_error(username: &str) -> Option<&'static str> {
    if username.trim().is_empty() {
        return Some(BLANK_FIELD);
    }
    let valid = username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
    if valid { None } else { Some(INVALID_USERNAME) }
}

impl Accounts<'_> {
    /// Checks username syntax and that neither value belongs to another account.
    ///
    /// `exclude` is the account being edited, which may keep its own values.
    pub async fn check_identity(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        exclude: Option<i32>,
        errors: &mut FieldErrors,
    ) -> ApiResult<()> {
        if let Some(username) = username {
            if let Some(message) = username_error(username) {
                errors.add("username", message);
            } else if let Some(existing) = user::Entity::find_by_username(username).one(self.db).await? {
                if Some(existing.id) != exclude {
                    errors.add("username", USERNAME_TAKEN);
                }
            }
        }

        if let Some(email) = email {
            if let Some(existing) = user::Entity::find_by_email(email).one(self.db).await? {
                if Some(existing.id) != exclude {
                    errors.add("email", EMAIL_TAKEN);
                }
            }
        }
        Ok(())
    }

    /// Runs the password policy and files any failure under `field`.
    pub fn check_password(
        &self,
        field: &str,
        password: &str,
        attributes: &UserAttributes<'_>,
        errors: &mut FieldErrors,
    ) {
        if password.is_empty() {
            errors.add(field, BLANK_FIELD);
            return;
        }
        if let Err(messages) = self.policy.validate(password, attributes) {
            debug!(field, failures = messages.len(), "Password rejected by policy");
            errors.extend_field(field, messages);
        }
    }

    pub fn hash(&self, password: &str) -> ApiResult<String> {
        Ok(self.hasher.hash(password)?)
    }

    /// Whether `password` matches the stored hash. Unreadable hashes never match.
    pub fn verify(&self, account: &user::Model, password: &str) -> bool {
        match self.hasher.verify(password, &account.password) {
            Ok(matches) => matches,
            Err(e) => {
                warn!(user_id = account.id, "Stored password hash unreadable: {}", e);
                false
            }
        }
    }

    /// Validates and inserts a new account.
    pub async fn create(&self, new: NewAccount) -> ApiResult<user::Model> {
        self.validate_new(&new, None).await?;
        self.insert(new).await
    }

    /// Identity checks first, then the password policy.
    ///
    /// `exclude` is set when the fields replace those of an existing account.
    pub async fn validate_new(&self, new: &NewAccount, exclude: Option<i32>) -> ApiResult<()> {
        let mut errors = FieldErrors::new();
        self.check_identity(Some(&new.username), Some(&new.email), exclude, &mut errors)
            .await?;
        errors.into_result()?;

        let attributes = UserAttributes {
            username: &new.username,
            email: &new.email,
            ..Default::default()
        };
        let mut errors = FieldErrors::new();
        self.check_password("password", &new.password, &attributes, &mut errors);
        Ok(errors.into_result()?)
    }

    /// Inserts an account whose fields were already validated.
    pub async fn insert(&self, new: NewAccount) -> ApiResult<user::Model> {
        let account = user::ActiveModel {
            username: Set(new.username),
            email: Set(new.email),
            name: Set(new.name),
            password: Set(self.hash(&new.password)?),
            is_staff: Set(new.is_staff),
            is_superuser: Set(new.is_superuser),
            ..Default::default()
        };

        let account = account.insert(self.db).await.map_err(unique_violation)?;
        info!(user_id = account.id, username = %account.username, "Account created");
        Ok(account)
    }

    /// Stores a new password hash for the account.
    pub async fn set_password(&self, account: user::Model, password: &str) -> ApiResult<user::Model> {
        let mut active: user::ActiveModel = account.into();
        active.password = Set(self.hash(password)?);
        let account = active.update(self.db).await?;
        info!(user_id = account.id, "Password changed");
        Ok(account)
    }
}

/// Turns a unique-constraint failure that slipped past the pre-checks into
/// the matching field error.
pub fn unique_violation(error: DbErr) -> ApiError {
    match error.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(message)) => {
            debug!("Unique constraint violated: {}", message);
            if message.contains("email") {
                ApiError::field("email", EMAIL_TAKEN)
            } else {
                ApiError::field("username", USERNAME_TAKEN)
            }
        }
        _ => ApiError::Database(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert_eq!(username_error("john.doe+tag@example-site_1"), None);
        assert_eq!(username_error("joão"), None);
        assert_eq!(username_error("john doe"), Some(INVALID_USERNAME));
        assert_eq!(username_error("john/doe"), Some(INVALID_USERNAME));
        assert_eq!(username_error("  "), Some(BLANK_FIELD));
    }
}
