use anyhow::{Context, Result};
use auth::{Argon2Hasher, PasswordHasher, PasswordPolicy, PasswordResetTokens, TokenService};
use chrono::Duration;
use sea_orm::{Database, DatabaseConnection};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::mail::{EmailTemplates, LogMailer, Mailer};
use crate::schemas::AppState;

const DEVELOPMENT_SECRET_KEY: &str = "development-only-secret-key-change-me";

/// Application settings.
///
/// Loaded from built-in defaults, an optional `apitemplate.toml` and
/// `APP__`-prefixed environment variables (`__` separates nested keys,
/// e.g. `APP__JWT__ACCESS_TOKEN_LIFETIME_SECS=600`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Key for token signatures. Empty means "not configured".
    #[serde(default)]
    pub secret_key: String,
    /// Non-staff users only see their own account in user listings.
    #[serde(default = "default_true")]
    pub hide_users: bool,
    #[serde(default)]
    pub jwt: JwtSettings,
    #[serde(default)]
    pub password_reset: PasswordResetSettings,
    /// Directory with templates overriding the built-in e-mail templates.
    #[serde(default)]
    pub template_dir: Option<String>,
    #[serde(default = "default_docs_title")]
    pub docs_title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    #[serde(default = "default_access_lifetime")]
    pub access_token_lifetime_secs: i64,
    #[serde(default = "default_refresh_lifetime")]
    pub refresh_token_lifetime_secs: i64,
    /// Accepted prefixes of the `Authorization` header.
    #[serde(default = "default_auth_header_types")]
    pub auth_header_types: Vec<String>,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            access_token_lifetime_secs: default_access_lifetime(),
            refresh_token_lifetime_secs: default_refresh_lifetime(),
            auth_header_types: default_auth_header_types(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordResetSettings {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default = "default_site_name")]
    pub site_name: String,
    /// Frontend path of the confirmation page; `{uid}` and `{token}` are substituted.
    #[serde(default = "default_confirm_url")]
    pub confirm_url: String,
    #[serde(default = "default_reset_timeout")]
    pub timeout_secs: i64,
    /// Template used for the reset e-mail body.
    #[serde(default = "default_reset_template")]
    pub template: String,
    #[serde(default = "default_from_email")]
    pub from_email: String,
}

impl Default for PasswordResetSettings {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            domain: default_domain(),
            site_name: default_site_name(),
            confirm_url: default_confirm_url(),
            timeout_secs: default_reset_timeout(),
            template: default_reset_template(),
            from_email: default_from_email(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            bind_address: default_bind_address(),
            secret_key: String::new(),
            hide_users: true,
            jwt: JwtSettings::default(),
            password_reset: PasswordResetSettings::default(),
            template_dir: None,
            docs_title: default_docs_title(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://apitemplate.db?mode=rwc".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_true() -> bool {
    true
}

fn default_docs_title() -> String {
    "API TEMPLATE".to_string()
}

fn default_access_lifetime() -> i64 {
    5 * 60
}

fn default_refresh_lifetime() -> i64 {
    24 * 60 * 60
}

fn default_auth_header_types() -> Vec<String> {
    vec!["JWT".to_string(), "Bearer".to_string()]
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_domain() -> String {
    "localhost:3000".to_string()
}

fn default_site_name() -> String {
    "API TEMPLATE".to_string()
}

fn default_confirm_url() -> String {
    "#/password/reset/confirm/{uid}/{token}".to_string()
}

fn default_reset_timeout() -> i64 {
    3 * 24 * 60 * 60
}

fn default_reset_template() -> String {
    crate::mail::PASSWORD_RESET_TEMPLATE.to_string()
}

fn default_from_email() -> String {
    "webmaster@localhost".to_string()
}

impl Settings {
    /// Load settings from `apitemplate.toml` (optional) and the environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let source = config::Config::builder()
            .add_source(config::File::with_name("apitemplate").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("jwt.auth_header_types")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?;

        let mut settings: Settings = source
            .try_deserialize()
            .context("Failed to parse configuration")?;

        if settings.secret_key.is_empty() {
            warn!("APP__SECRET_KEY is not set, falling back to an insecure development key");
            settings.secret_key = DEVELOPMENT_SECRET_KEY.to_string();
        }

        debug!(?settings.jwt, hide_users = settings.hide_users, "Configuration loaded");
        Ok(settings)
    }

    /// Applies connection parameters given on the command line.
    pub fn with_overrides(mut self, database_url: Option<&str>, bind_address: Option<&str>) -> Self {
        if let Some(database_url) = database_url {
            self.database_url = database_url.to_string();
        }
        if let Some(bind_address) = bind_address {
            self.bind_address = bind_address.to_string();
        }
        self
    }

    /// Confirmation link embedded in password-reset e-mails.
    pub fn password_reset_url(&self, uid: &str, token: &str) -> String {
        self.password_reset
            .confirm_url
            .replace("{uid}", uid)
            .replace("{token}", token)
    }
}

/// Build application state around an open database connection.
pub fn build_app_state(
    db: DatabaseConnection,
    settings: Settings,
    hasher: Arc<dyn PasswordHasher>,
    mailer: Arc<dyn Mailer>,
) -> Result<AppState> {
    let tokens = TokenService::new(
        &settings.secret_key,
        Duration::seconds(settings.jwt.access_token_lifetime_secs),
        Duration::seconds(settings.jwt.refresh_token_lifetime_secs),
    );
    let reset_tokens = PasswordResetTokens::new(
        &settings.secret_key,
        Duration::seconds(settings.password_reset.timeout_secs),
    )?;
    let emails = EmailTemplates::load(settings.template_dir.as_deref())?;

    Ok(AppState {
        db,
        settings: Arc::new(settings),
        tokens: Arc::new(tokens),
        reset_tokens: Arc::new(reset_tokens),
        hasher,
        password_policy: Arc::new(PasswordPolicy::default()),
        emails: Arc::new(emails),
        mailer,
    })
}

/// Connect to the configured database and build the production state.
pub async fn initialize_app_state(settings: Settings) -> Result<AppState> {
    info!("Connecting to database: {}", settings.database_url);
    let db = Database::connect(&settings.database_url).await?;

    build_app_state(db, settings, Arc::new(Argon2Hasher::new()), Arc::new(LogMailer))
}
