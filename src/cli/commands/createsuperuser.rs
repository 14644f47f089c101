use anyhow::{Result, bail};
use tracing::{error, info};
use validator::ValidateEmail;

use crate::accounts::NewAccount;
use crate::config::{Settings, initialize_app_state};
use crate::errors::ApiError;

pub async fn create_superuser(settings: Settings, username: &str, email: &str, password: &str) -> Result<()> {
    info!("Creating superuser {}", username);
    if !email.validate_email() {
        bail!("'{}' is not a valid e-mail address", email);
    }
    let state = initialize_app_state(settings).await?;

    let new = NewAccount {
        username: username.to_string(),
        email: email.to_string(),
        name: None,
        password: password.to_string(),
        is_staff: true,
        is_superuser: true,
    };

    match state.accounts().create(new).await {
        Ok(account) => {
            info!("Superuser {} created with ID {}", account.username, account.id);
            Ok(())
        }
        Err(ApiError::Validation(errors)) => {
            error!("Superuser rejected: {}", serde_json::to_string(&errors)?);
            bail!("invalid superuser fields: {}", serde_json::to_string(&errors)?)
        }
        Err(e) => Err(e.into()),
    }
}
