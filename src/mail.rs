//! Outgoing e-mail: message type, delivery backends and templates.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use common::UserDto;
use tera::{Context, Tera};
use tracing::{debug, info};

use crate::config::Settings;

/// Template the project uses for password-reset e-mails.
pub const PASSWORD_RESET_TEMPLATE: &str = "users/email/password_reset.html";

/// Generic password-reset template, kept for deployments that opt out of the project one.
pub const STOCK_PASSWORD_RESET_TEMPLATE: &str = "email/password_reset.html";

const BUILTIN_TEMPLATES: [(&str, &str); 2] = [
    (
        STOCK_PASSWORD_RESET_TEMPLATE,
        include_str!("../templates/email/password_reset.html"),
    ),
    (
        PASSWORD_RESET_TEMPLATE,
        include_str!("../templates/users/email/password_reset.html"),
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub html_body: String,
}

/// Delivery backend for outgoing e-mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<()>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        info!(
            to = %message.to,
            from = %message.from,
            subject = %message.subject,
            "Outgoing e-mail"
        );
        debug!("E-mail body:\n{}", message.html_body);
        Ok(())
    }
}

/// Keeps every sent message in memory.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryMailer {
    outbox: std::sync::Arc<std::sync::Mutex<Vec<EmailMessage>>>,
}

#[cfg(test)]
impl MemoryMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.outbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        self.outbox
            .lock()
            .map_err(|_| anyhow::anyhow!("outbox lock poisoned"))?
            .push(message);
        Ok(())
    }
}

/// Template set used to render e-mail bodies.
#[derive(Debug)]
pub struct EmailTemplates {
    tera: Tera,
}

impl EmailTemplates {
    /// Loads the built-in templates. Files under `dir` (matched as
    /// `**/*.html`) replace built-ins of the same name.
    pub fn load(dir: Option<&str>) -> Result<Self> {
        let mut builtins = Tera::default();
        builtins
            .add_raw_templates(BUILTIN_TEMPLATES)
            .context("Failed to parse built-in e-mail templates")?;

        let tera = match dir {
            Some(dir) => {
                info!("Loading e-mail templates from {}", dir);
                let mut overlay = Tera::new(&format!("{}/**/*.html", dir.trim_end_matches('/')))
                    .with_context(|| format!("Failed to load templates from {dir}"))?;
                overlay.extend(&builtins)?;
                overlay
            }
            None => builtins,
        };

        debug!(templates = ?tera.get_template_names().collect::<Vec<_>>(), "E-mail templates ready");
        Ok(Self { tera })
    }

    pub fn render(&self, name: &str, context: &Context) -> Result<String> {
        self.tera
            .render(name, context)
            .with_context(|| format!("Failed to render template {name}"))
    }
}

/// Password-reset message for one account.
#[derive(Debug)]
pub struct PasswordResetEmail<'a> {
    pub user: &'a UserDto,
    pub uid: &'a str,
    pub token: &'a str,
}

impl PasswordResetEmail<'_> {
    pub fn render(&self, settings: &Settings, templates: &EmailTemplates) -> Result<EmailMessage> {
        let reset = &settings.password_reset;

        let mut context = Context::new();
        context.insert("protocol", &reset.protocol);
        context.insert("domain", &reset.domain);
        context.insert("site_name", &reset.site_name);
        context.insert("uid", self.uid);
        context.insert("token", self.token);
        context.insert("url", &settings.password_reset_url(self.uid, self.token));
        context.insert("user", self.user);

        Ok(EmailMessage {
            to: self.user.email.clone(),
            from: reset.from_email.clone(),
            subject: format!("Password reset on {}", reset.site_name),
            html_body: templates.render(&reset.template, &context)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserDto {
        UserDto {
            id: 1,
            username: "testuser".to_string(),
            email: "teste@email.com".to_string(),
            name: None,
        }
    }

    #[test]
    fn test_project_template_is_default() {
        let settings = Settings::default();
        let templates = EmailTemplates::load(None).unwrap();
        let user = user();

        let message = PasswordResetEmail { user: &user, uid: "MQ", token: "abc-123" }
            .render(&settings, &templates)
            .unwrap();

        assert_eq!(message.to, "teste@email.com");
        assert_eq!(message.subject, "Password reset on API TEMPLATE");
        assert!(message.html_body.contains("Hello testuser,"));
        assert!(
            message
                .html_body
                .contains("http://localhost:3000/#/password/reset/confirm/MQ/abc-123")
        );
    }

    #[test]
    fn test_stock_template_can_be_selected() {
        let mut settings = Settings::default();
        settings.password_reset.template = STOCK_PASSWORD_RESET_TEMPLATE.to_string();
        let templates = EmailTemplates::load(None).unwrap();
        let user = user();

        let message = PasswordResetEmail { user: &user, uid: "MQ", token: "t" }
            .render(&settings, &templates)
            .unwrap();

        assert!(message.html_body.contains("Your username, in case you've forgotten: testuser"));
    }

    #[tokio::test]
    async fn test_memory_mailer_keeps_messages() {
        let mailer = MemoryMailer::default();
        let message = EmailMessage {
            to: "a@b.c".to_string(),
            from: "webmaster@localhost".to_string(),
            subject: "s".to_string(),
            html_body: "b".to_string(),
        };
        mailer.send(message.clone()).await.unwrap();
        assert_eq!(mailer.sent(), vec![message]);
    }
}
