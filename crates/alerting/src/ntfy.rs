//! Push Notifications via ntfy
//!
//! Mobile push delivery is unreliable, so every alert is sent in several
//! bursts, each burst reaching every subscribed topic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::channel::{ChannelError, Delivery, NotificationChannel};
use crate::message::{AlertMessage, AlertSeverity};

/// Push channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// ntfy server (default: https://ntfy.sh)
    pub base_url: String,
    /// One topic per subscribed user
    pub topics: Vec<String>,
    /// Number of bursts per alert
    pub bursts: u32,
    /// Pause between bursts (milliseconds)
    pub burst_delay_ms: u64,
    /// Per-request timeout (milliseconds)
    pub timeout_ms: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ntfy.sh".to_string(),
            topics: Vec::new(),
            bursts: 3,
            burst_delay_ms: 500,
            timeout_ms: 5000,
        }
    }
}

/// Publishes a single push message to one topic
#[async_trait]
pub trait PushPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        title: &str,
        body: &str,
        severity: AlertSeverity,
    ) -> Result<(), ChannelError>;
}

/// HTTP publisher for an ntfy server
pub struct NtfyPublisher {
    client: reqwest::Client,
    base_url: String,
}

impl NtfyPublisher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChannelError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PushPublisher for NtfyPublisher {
    async fn publish(
        &self,
        topic: &str,
        title: &str,
        body: &str,
        severity: AlertSeverity,
    ) -> Result<(), ChannelError> {
        let priority = match severity {
            AlertSeverity::Warning => "high",
            AlertSeverity::Critical => "urgent",
        };

        let response = self
            .client
            .post(format!("{}/{}", self.base_url, topic))
            .header("Title", title)
            .header("Priority", priority)
            .header("Tags", "warning,thermometer")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| ChannelError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ChannelError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

/// Push channel repeating each alert in bursts across all topics.
///
/// Within a burst every topic is published concurrently, so a slow topic only
/// delays the burst by its own request timeout.
pub struct PushChannel<P> {
    publisher: Arc<P>,
    topics: Vec<String>,
    bursts: u32,
    burst_delay: Duration,
    request_timeout: Duration,
}

impl PushChannel<NtfyPublisher> {
    /// Channel publishing to an ntfy server
    pub fn ntfy(config: &PushConfig) -> Result<Self, ChannelError> {
        let publisher =
            NtfyPublisher::new(&config.base_url, Duration::from_millis(config.timeout_ms))?;
        Ok(Self::new(publisher, config))
    }
}

impl<P: PushPublisher + 'static> PushChannel<P> {
    pub fn new(publisher: P, config: &PushConfig) -> Self {
        Self {
            publisher: Arc::new(publisher),
            topics: config.topics.clone(),
            bursts: config.bursts.max(1),
            burst_delay: Duration::from_millis(config.burst_delay_ms),
            request_timeout: Duration::from_millis(config.timeout_ms.max(1)),
        }
    }

    /// Publish one burst to every topic, returning (attempts, delivered, last error)
    async fn burst(&self, title: &str, message: &AlertMessage) -> (u32, u32, Option<ChannelError>) {
        let title: Arc<str> = Arc::from(title);
        let body: Arc<str> = Arc::from(message.body.as_str());
        let mut calls = JoinSet::new();

        for topic in &self.topics {
            let publisher = Arc::clone(&self.publisher);
            let topic = topic.clone();
            let title = Arc::clone(&title);
            let body = Arc::clone(&body);
            let severity = message.severity;
            let timeout = self.request_timeout;
            calls.spawn(async move {
                let publish = publisher.publish(&topic, &title, &body, severity);
                let result = match tokio::time::timeout(timeout, publish).await {
                    Ok(result) => result,
                    Err(_) => Err(ChannelError::Timeout(timeout)),
                };
                (topic, result)
            });
        }

        let (mut attempts, mut delivered, mut last_error) = (0, 0, None);
        while let Some(joined) = calls.join_next().await {
            attempts += 1;
            match joined {
                Ok((topic, Ok(()))) => {
                    delivered += 1;
                    debug!("Push alarm {} sent to {}", title, topic);
                }
                Ok((topic, Err(e))) => {
                    warn!("Push alarm {} to {} failed: {}", title, topic, e);
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!("Push alarm {} aborted: {}", title, e);
                    last_error = Some(ChannelError::Transport(e.to_string()));
                }
            }
        }
        (attempts, delivered, last_error)
    }
}

#[async_trait]
impl<P: PushPublisher + 'static> NotificationChannel for PushChannel<P> {
    fn name(&self) -> &str {
        "push"
    }

    fn time_budget(&self) -> Option<Duration> {
        Some((self.request_timeout + self.burst_delay) * self.bursts)
    }

    async fn send(&self, message: &AlertMessage) -> Result<Delivery, ChannelError> {
        if self.topics.is_empty() {
            return Err(ChannelError::Configuration("no push topics configured".to_string()));
        }

        let mut delivery = Delivery {
            attempts: 0,
            delivered: 0,
        };
        let mut last_error = None;

        for burst in 1..=self.bursts {
            let title = format!("ALARM {}/{}", burst, self.bursts);
            let (attempts, delivered, error) = self.burst(&title, message).await;
            delivery.attempts += attempts;
            delivery.delivered += delivered;
            if error.is_some() {
                last_error = error;
            }

            if burst < self.bursts {
                tokio::time::sleep(self.burst_delay).await;
            }
        }

        if delivery.delivered == 0 {
            return Err(last_error
                .unwrap_or_else(|| ChannelError::Transport("no push delivered".to_string())));
        }
        Ok(delivery)
    }
}
