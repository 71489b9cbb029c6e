//! Notification Channel Contract

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::message::AlertMessage;

/// Errors raised by a single notification channel
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// Network or protocol failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote service answered with a non-success status
    #[error("Rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Channel did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Channel is misconfigured (bad address, no recipients)
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Successful send summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Individual remote calls made
    pub attempts: u32,
    /// Remote calls that succeeded
    pub delivered: u32,
}

impl Delivery {
    /// One call, one success
    pub fn single() -> Self {
        Self {
            attempts: 1,
            delivered: 1,
        }
    }
}

/// A destination for alert messages
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Short channel name used in logs, metrics and outcomes
    fn name(&self) -> &str;

    /// Longest a send can take when every remote call runs into its own
    /// timeout. The fan-out never cuts the channel off before this.
    fn time_budget(&self) -> Option<Duration> {
        None
    }

    /// Deliver one alert
    async fn send(&self, message: &AlertMessage) -> Result<Delivery, ChannelError>;
}
