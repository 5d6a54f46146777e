//! Outbound email for the Gatehouse backend.
//!
//! Account flows build [`OutboundEmail`] values (via [`templates`]) and hand
//! them to a [`Mailer`]. Production wires up [`SmtpMailer`] over lettre;
//! tests swap in [`MemoryMailer`] to capture what would have been sent.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use gatehouse_config::SmtpConfig;
use lettre::{
    message::Mailbox,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("invalid email address: {0}")]
    InvalidAddress(String),
    #[error("failed to build email message: {0}")]
    Message(String),
    #[error("smtp transport error: {0}")]
    Transport(String),
}

/// A fully rendered message, ready for any [`Mailer`] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailerError>;
}

/// SMTP-backed mailer built from [`SmtpConfig`].
#[derive(Clone, Debug)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &SmtpConfig) -> Result<Self, MailerError> {
        let mut builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|err| MailerError::Transport(err.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = format!("{} <{}>", config.from_name, config.from_address)
            .parse::<Mailbox>()
            .map_err(|err| MailerError::InvalidAddress(err.to_string()))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailerError> {
        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|err| MailerError::InvalidAddress(err.to_string()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .body(email.body.clone())
            .map_err(|err| MailerError::Message(err.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|err| MailerError::Transport(err.to_string()))?;

        debug!(to = %email.to, subject = %email.subject, "email dispatched");
        Ok(())
    }
}

/// In-memory mailer for tests. Records every send; can be flipped into a
/// failing mode to exercise transport-error paths.
#[derive(Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<OutboundEmail>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().await.clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailerError::Transport(
                "memory mailer forced into failing mode".to_string(),
            ));
        }
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}

pub mod templates {
    //! Plain-text bodies for the account flows. Links point at the web
    //! frontend, which exchanges the embedded token against the API.

    use super::OutboundEmail;

    pub fn verification(to: &str, username: &str, link_base_url: &str, token: &str) -> OutboundEmail {
        let link = action_link(link_base_url, "verify-email", token);
        OutboundEmail {
            to: to.to_string(),
            subject: "Verify your email address".to_string(),
            body: format!(
                "Hi {username},\n\n\
                 Please confirm your email address by opening the link below:\n\n\
                 {link}\n\n\
                 The link expires in 24 hours. If you did not create this account, you can ignore this message.\n"
            ),
        }
    }

    pub fn password_reset(to: &str, username: &str, link_base_url: &str, token: &str) -> OutboundEmail {
        let link = action_link(link_base_url, "reset-password", token);
        OutboundEmail {
            to: to.to_string(),
            subject: "Reset your password".to_string(),
            body: format!(
                "Hi {username},\n\n\
                 A password reset was requested for your account. Open the link below to choose a new password:\n\n\
                 {link}\n\n\
                 The link expires in 1 hour and works once. If you did not request a reset, you can ignore this message.\n"
            ),
        }
    }

    pub fn smtp_probe(to: &str) -> OutboundEmail {
        OutboundEmail {
            to: to.to_string(),
            subject: "Gatehouse SMTP test".to_string(),
            body: "This is a test message confirming the SMTP configuration works.\n".to_string(),
        }
    }

    fn action_link(base_url: &str, path: &str, token: &str) -> String {
        format!("{}/{}?token={}", base_url.trim_end_matches('/'), path, token)
    }
}
