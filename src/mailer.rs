use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::config::SmtpConfig;
use crate::jobs::EmailKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    /// Permanent: retrying cannot help.
    #[error("invalid address {0}")]
    Address(String),
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("smtp transport error: {0}")]
    Transport(String),
}

impl MailError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, MailError::Transport(_))
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    pub fn from_config(config: &SmtpConfig) -> anyhow::Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| MailError::Address(self.from_address.clone()))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|_| MailError::Address(email.to.clone()))?)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .map_err(|err| MailError::Build(err.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|err| MailError::Transport(err.to_string()))?;
        Ok(())
    }
}

/// Used when SMTP is not configured: emails are logged and dropped.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, "smtp not configured, email not sent");
        Ok(())
    }
}

pub fn verification_email(
    kind: EmailKind,
    to: &str,
    first_name: &str,
    reason: Option<&str>,
    site_url: &str,
) -> OutgoingEmail {
    let site_url = site_url.trim_end_matches('/');
    let (subject, title, paragraphs, link, link_label) = match kind {
        EmailKind::Verified => (
            "Your identity has been verified - Aurora Society",
            format!("Congratulations, {first_name}!"),
            vec![
                "Your identity verification has been approved.".to_string(),
                "You now have access to every privilege reserved for Aurora Society members."
                    .to_string(),
            ],
            format!("{site_url}/login"),
            "Go to my space",
        ),
        EmailKind::Rejected => {
            let mut paragraphs =
                vec!["Unfortunately your identity verification could not be approved.".to_string()];
            if let Some(reason) = reason {
                paragraphs.push(format!("<strong>Reason:</strong> {}", escape_html(reason)));
            }
            paragraphs.push("You can start a new verification from your account.".to_string());
            (
                "Identity verification not approved - Aurora Society",
                format!("Dear {first_name},"),
                paragraphs,
                format!("{site_url}/register?step=verification"),
                "Restart verification",
            )
        }
        EmailKind::Pending => (
            "Verification in progress - Aurora Society",
            format!("Dear {first_name},"),
            vec![
                "We have received your identity verification.".to_string(),
                "Our team is reviewing your file. This can take a few hours.".to_string(),
            ],
            format!("{site_url}/login"),
            "Check my status",
        ),
    };

    let body: String = paragraphs
        .iter()
        .map(|paragraph| format!("<p>{paragraph}</p>"))
        .collect();
    let html = format!(
        "<!DOCTYPE html><html><body><h1>AURORA SOCIETY</h1><h2>{}</h2>{body}<p><a href=\"{link}\">{link_label}</a></p></body></html>",
        escape_html(&title)
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: subject.to_string(),
        html,
    }
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
