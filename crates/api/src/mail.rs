//! Transactional email: verification and password reset links.
//!
//! [`Mailer`] wraps the `lettre` async SMTP transport. When `SMTP_HOST` is not
//! configured the message is logged instead, which keeps local development
//! usable without a mail server. Delivery always happens on a spawned task so
//! SMTP latency or failure never reaches the HTTP caller.

use vitrine_core::tokens::{EMAIL_VERIFICATION_TTL_HOURS, PASSWORD_RESET_TTL_MINS};

use crate::config::{env_or, ConfigError};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for email delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "Vitrine <noreply@vitrine.local>";

/// Configuration for the SMTP transport.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    /// SMTP server port (defaults to 587).
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `Ok(None)` if `SMTP_HOST` is not set, signalling that emails
    /// should be logged rather than sent.
    ///
    /// | Variable        | Required | Default                           |
    /// |-----------------|----------|-----------------------------------|
    /// | `SMTP_HOST`     | yes      | --                                |
    /// | `SMTP_PORT`     | no       | `587`                             |
    /// | `SMTP_FROM`     | no       | `Vitrine <noreply@vitrine.local>` |
    /// | `SMTP_USER`     | no       | --                                |
    /// | `SMTP_PASSWORD` | no       | --                                |
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = std::env::var("SMTP_HOST").ok().filter(|h| !h.is_empty()) else {
            return Ok(None);
        };
        Ok(Some(Self {
            smtp_host,
            smtp_port: env_or("SMTP_PORT", DEFAULT_SMTP_PORT)?,
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A rendered plain-text email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// The action link embedded in `body`; logged when SMTP is disabled.
    pub link: String,
}

/// Build the "confirm your e-mail" message.
pub fn verification_email(base_url: &str, to: &str, name: &str, token: &str) -> OutgoingEmail {
    let link = format!("{base_url}/verify-email?token={token}");
    let body = format!(
        "Olá, {name}!\n\n\
         Confirme seu e-mail acessando o link abaixo:\n\n{link}\n\n\
         O link expira em {EMAIL_VERIFICATION_TTL_HOURS} horas.\n"
    );
    OutgoingEmail {
        to: to.to_string(),
        subject: "Confirme seu e-mail".to_string(),
        body,
        link,
    }
}

/// Build the "reset your password" message.
pub fn password_reset_email(base_url: &str, to: &str, name: &str, token: &str) -> OutgoingEmail {
    let link = format!("{base_url}/reset-password?token={token}");
    let body = format!(
        "Olá, {name}!\n\n\
         Recebemos um pedido para redefinir sua senha. Use o link abaixo:\n\n{link}\n\n\
         O link expira em {PASSWORD_RESET_TTL_MINS} minutos. \
         Se você não fez este pedido, ignore esta mensagem.\n"
    );
    OutgoingEmail {
        to: to.to_string(),
        subject: "Redefinição de senha".to_string(),
        body,
        link,
    }
}

// ---------------------------------------------------------------------------
// Mailer
// ---------------------------------------------------------------------------

/// Sends transactional emails, or logs them when SMTP is not configured.
#[derive(Debug, Clone)]
pub struct Mailer {
    config: Option<EmailConfig>,
}

impl Mailer {
    pub fn new(config: Option<EmailConfig>) -> Self {
        Self { config }
    }

    /// A mailer that only logs. Used in tests and local development.
    pub fn log_only() -> Self {
        Self { config: None }
    }

    pub fn is_smtp_enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Queue `email` for delivery on a background task.
    pub fn send(&self, email: OutgoingEmail) {
        let Some(config) = self.config.clone() else {
            tracing::info!(
                to = %email.to,
                subject = %email.subject,
                link = %email.link,
                "SMTP disabled; email not sent"
            );
            return;
        };

        tokio::spawn(async move {
            if let Err(e) = deliver(&config, &email).await {
                tracing::error!(error = %e, to = %email.to, subject = %email.subject, "Email delivery failed");
            }
        });
    }
}

async fn deliver(config: &EmailConfig, email: &OutgoingEmail) -> Result<(), MailError> {
    use lettre::{
        message::header::ContentType, transport::smtp::authentication::Credentials,
        AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    };

    let message = Message::builder()
        .from(config.from_address.parse()?)
        .to(email.to.parse()?)
        .subject(email.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(email.body.clone())
        .map_err(|e| MailError::Build(e.to_string()))?;

    let mut transport_builder =
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port);

    if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
        transport_builder =
            transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
    }

    transport_builder.build().send(message).await?;

    tracing::info!(to = %email.to, subject = %email.subject, "Email sent");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_email_links_to_app() {
        let email = verification_email("https://app.example", "ana@example.com", "Ana", "abc123");
        assert_eq!(email.link, "https://app.example/verify-email?token=abc123");
        assert!(email.body.contains("Olá, Ana!"));
        assert!(email.body.contains(&email.link));
        assert!(email.body.contains("24 horas"));
        assert_eq!(email.to, "ana@example.com");
    }

    #[test]
    fn reset_email_mentions_expiry() {
        let email = password_reset_email("http://localhost:5173", "bo@example.com", "Bo", "tok");
        assert_eq!(email.link, "http://localhost:5173/reset-password?token=tok");
        assert_eq!(email.subject, "Redefinição de senha");
        assert!(email.body.contains("60 minutos"));
    }

    #[test]
    fn log_only_mailer_has_no_smtp() {
        assert!(!Mailer::log_only().is_smtp_enabled());
    }

    #[test]
    fn mail_error_display_build() {
        let err = MailError::Build("missing body".to_string());
        assert_eq!(err.to_string(), "Email build error: missing body");
    }

    #[test]
    fn mail_error_display_address() {
        let addr_err: Result<lettre::Address, _> = "not-an-email".parse();
        let err = MailError::Address(addr_err.unwrap_err());
        assert!(err.to_string().contains("Email address parse error"));
    }
}
