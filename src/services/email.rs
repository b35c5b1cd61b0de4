//! Outgoing email
//!
//! Password reset links are the only mail Moodify sends. Delivery goes
//! through the `Mailer` trait so the reset flow can be tested without SMTP.

use crate::config::MailConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

/// A plain-text message ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

/// SMTP delivery with STARTTLS relay
pub struct SmtpMailer {
    config: MailConfig,
}

impl SmtpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    pub fn boxed(config: MailConfig) -> Arc<dyn Mailer> {
        Arc::new(Self::new(config))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| anyhow!("SMTP host not configured"))?;

        let from = format!("{} <{}>", self.config.from_name, self.config.from_address);
        let message = Message::builder()
            .from(from.parse().map_err(|e| anyhow!("Invalid from address: {}", e))?)
            .to(email
                .to
                .parse()
                .map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(self.config.smtp_port);
        if let (Some(user), Some(pass)) = (
            self.config.smtp_username.clone(),
            self.config.smtp_password.clone(),
        ) {
            builder = builder.credentials(Credentials::new(user, pass));
        }
        let transport: AsyncSmtpTransport<Tokio1Executor> = builder.build();

        transport
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }
}

/// Compose the password reset message for `link`
pub fn reset_email(to: &str, name: &str, link: &str) -> OutgoingEmail {
    let body = format!(
        "Hello {name},\n\n\
         We received a request to reset your Moodify password.\n\
         Open the link below within one hour to choose a new one:\n\n\
         {link}\n\n\
         If you did not ask for this, you can ignore this email.\n\n\
         The Moodify team"
    );
    OutgoingEmail {
        to: to.to_string(),
        subject: "Reset your Moodify password".to_string(),
        body,
    }
}

/// Records messages instead of sending them
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingMailer {
    pub sent: std::sync::Mutex<Vec<OutgoingEmail>>,
    pub fail: bool,
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        if self.fail {
            return Err(anyhow!("SMTP unreachable"));
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}
