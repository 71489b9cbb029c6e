//! Notification Fan-out

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::channel::{ChannelError, NotificationChannel};
use crate::message::AlertMessage;

/// Fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Upper bound for a single channel (milliseconds). Channels reporting a
    /// larger time budget get that budget instead.
    pub channel_timeout_ms: u64,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            channel_timeout_ms: 10_000,
        }
    }
}

/// Result of one channel for one alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelOutcome {
    pub channel: String,
    pub delivered: bool,
    pub attempts: u32,
    pub successes: u32,
    pub error: Option<String>,
}

/// Per-channel outcomes of a dispatch, in channel registration order
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub outcomes: Vec<ChannelOutcome>,
}

impl DispatchReport {
    pub fn delivered_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.delivered).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.delivered_count()
    }

    pub fn outcome(&self, channel: &str) -> Option<&ChannelOutcome> {
        self.outcomes.iter().find(|o| o.channel == channel)
    }
}

/// Invokes every channel for an alert; one channel's failure never affects another
#[derive(Clone)]
pub struct NotificationFanout {
    config: FanoutConfig,
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl NotificationFanout {
    /// Create a fan-out with no channels
    pub fn new(config: FanoutConfig) -> Self {
        info!("Creating notification fan-out with config: {:?}", config);
        Self {
            config,
            channels: Vec::new(),
        }
    }

    /// Register a channel
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        info!("Registered notification channel: {}", channel.name());
        self.channels.push(channel);
        self
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    /// Send `message` on every channel concurrently and report each outcome.
    ///
    /// Never fails: channel errors, timeouts and panics become failed outcomes.
    pub async fn dispatch(&self, message: &AlertMessage) -> DispatchReport {
        let default_timeout = Duration::from_millis(self.config.channel_timeout_ms);
        let message = Arc::new(message.clone());

        let handles: Vec<_> = self
            .channels
            .iter()
            .map(|channel| {
                let channel = Arc::clone(channel);
                let message = Arc::clone(&message);
                let name = channel.name().to_string();
                let timeout = channel
                    .time_budget()
                    .map_or(default_timeout, |budget| budget.max(default_timeout));
                let handle = tokio::spawn(async move {
                    match tokio::time::timeout(timeout, channel.send(&message)).await {
                        Ok(result) => result,
                        Err(_) => Err(ChannelError::Timeout(timeout)),
                    }
                });
                (name, handle)
            })
            .collect();

        let mut report = DispatchReport::default();
        for (name, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(delivery)) => {
                    metrics::counter!("notifications_sent_total", "channel" => name.clone())
                        .increment(1);
                    info!(
                        "Alert delivered on {} ({}/{} calls succeeded)",
                        name, delivery.delivered, delivery.attempts
                    );
                    ChannelOutcome {
                        channel: name,
                        delivered: true,
                        attempts: delivery.attempts,
                        successes: delivery.delivered,
                        error: None,
                    }
                }
                Ok(Err(e)) => {
                    metrics::counter!("notification_failures_total", "channel" => name.clone())
                        .increment(1);
                    warn!("Alert delivery failed on {}: {}", name, e);
                    ChannelOutcome {
                        channel: name,
                        delivered: false,
                        attempts: 0,
                        successes: 0,
                        error: Some(e.to_string()),
                    }
                }
                Err(join_error) => {
                    metrics::counter!("notification_failures_total", "channel" => name.clone())
                        .increment(1);
                    error!("Notification channel {} aborted: {}", name, join_error);
                    ChannelOutcome {
                        channel: name,
                        delivered: false,
                        attempts: 0,
                        successes: 0,
                        error: Some(join_error.to_string()),
                    }
                }
            };
            report.outcomes.push(outcome);
        }

        report
    }
}

impl Default for NotificationFanout {
    fn default() -> Self {
        Self::new(FanoutConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Delivery;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Succeed,
        Fail,
        Hang,
        Panic,
    }

    struct FakeChannel {
        name: &'static str,
        behavior: Behavior,
        sends: AtomicUsize,
    }

    impl FakeChannel {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                sends: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl NotificationChannel for FakeChannel {
        fn name(&self) -> &str {
            self.name
        }

        async fn send(&self, _message: &AlertMessage) -> Result<Delivery, ChannelError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => Ok(Delivery::single()),
                Behavior::Fail => Err(ChannelError::Transport("connection refused".to_string())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Delivery::single())
                }
                Behavior::Panic => panic!("channel bug"),
            }
        }
    }

    fn alarm() -> AlertMessage {
        AlertMessage::temperature_alarm(9.5, Some(40.0), 1, 9)
    }

    #[tokio::test]
    async fn test_failure_does_not_block_other_channels() {
        let email = FakeChannel::new("email", Behavior::Fail);
        let telegram = FakeChannel::new("telegram", Behavior::Succeed);
        let push = FakeChannel::new("push", Behavior::Succeed);

        let fanout = NotificationFanout::default()
            .with_channel(email.clone())
            .with_channel(telegram.clone())
            .with_channel(push.clone());

        let report = fanout.dispatch(&alarm()).await;

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.delivered_count(), 2);
        assert_eq!(report.failed_count(), 1);
        assert!(!report.outcome("email").unwrap().delivered);
        assert!(report.outcome("telegram").unwrap().delivered);
        assert_eq!(telegram.sends.load(Ordering::SeqCst), 1);
        assert_eq!(push.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_channel_times_out() {
        let fanout = NotificationFanout::new(FanoutConfig {
            channel_timeout_ms: 2000,
        })
        .with_channel(FakeChannel::new("email", Behavior::Hang))
        .with_channel(FakeChannel::new("push", Behavior::Succeed));

        let report = fanout.dispatch(&alarm()).await;

        let email = report.outcome("email").unwrap();
        assert!(!email.delivered);
        assert!(email.error.as_deref().unwrap().contains("Timed out"));
        assert!(report.outcome("push").unwrap().delivered);
    }

    #[tokio::test]
    async fn test_panicking_channel_is_reported() {
        let fanout = NotificationFanout::default()
            .with_channel(FakeChannel::new("telegram", Behavior::Panic))
            .with_channel(FakeChannel::new("email", Behavior::Succeed));

        let report = fanout.dispatch(&alarm()).await;
        assert!(!report.outcome("telegram").unwrap().delivered);
        assert!(report.outcome("email").unwrap().delivered);
    }

    #[tokio::test]
    async fn test_no_channels_is_empty_report() {
        let report = NotificationFanout::default().dispatch(&alarm()).await;
        assert!(report.outcomes.is_empty());
    }
}
