//! SMTP Email Channel

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::channel::{ChannelError, Delivery, NotificationChannel};
use crate::message::AlertMessage;

/// SMTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub recipients: Vec<String>,
    /// SMTP timeout (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_timeout_ms() -> u64 {
    5000
}

/// Sends one email per alert to every recipient
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    recipients: Vec<Mailbox>,
}

impl EmailChannel {
    /// Build the SMTP transport. Addresses are parsed up front.
    pub fn new(config: &EmailConfig) -> Result<Self, ChannelError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| ChannelError::Configuration(format!("Invalid from address: {e}")))?;
        let recipients = config
            .recipients
            .iter()
            .map(|r| {
                r.parse::<Mailbox>()
                    .map_err(|e| ChannelError::Configuration(format!("Invalid to address {r}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if recipients.is_empty() {
            return Err(ChannelError::Configuration("no email recipients".to_string()));
        }

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| ChannelError::Configuration(e.to_string()))?
            .port(config.smtp_port)
            .timeout(Some(Duration::from_millis(config.timeout_ms)));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            recipients,
        })
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, message: &AlertMessage) -> Result<Delivery, ChannelError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(format!("[{}] {}", message.severity.as_str(), message.title))
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }
        let email = builder
            .body(message.body.clone())
            .map_err(|e| ChannelError::Configuration(format!("Failed to build email: {e}")))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| ChannelError::Transport(format!("Failed to send email: {e}")))?;

        debug!("Alert email sent to {} recipient(s)", self.recipients.len());
        Ok(Delivery::single())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            username: Some("monitor".to_string()),
            password: Some("hunter2".to_string()),
            from: "Cold Room <alerts@example.com>".to_string(),
            recipients: vec!["ops@example.com".to_string(), "qa@example.com".to_string()],
            timeout_ms: 5000,
        }
    }

    #[tokio::test]
    async fn test_valid_config_builds() {
        let channel = EmailChannel::new(&config()).unwrap();
        assert_eq!(channel.recipients.len(), 2);
        assert_eq!(channel.from.email.to_string(), "alerts@example.com");
    }

    #[test]
    fn test_invalid_from_address() {
        let mut config = config();
        config.from = "not an address".to_string();
        match EmailChannel::new(&config) {
            Err(ChannelError::Configuration(msg)) => assert!(msg.contains("from address")),
            other => panic!("expected configuration error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_invalid_recipient_is_named() {
        let mut config = config();
        config.recipients.push("ops.example.com".to_string());
        match EmailChannel::new(&config) {
            Err(ChannelError::Configuration(msg)) => assert!(msg.contains("ops.example.com")),
            other => panic!("expected configuration error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_no_recipients() {
        let mut config = config();
        config.recipients.clear();
        assert!(matches!(
            EmailChannel::new(&config),
            Err(ChannelError::Configuration(_))
        ));
    }
}
