//! Settings
//!
//! Layered configuration: built-in defaults, then an optional TOML file, then
//! `MONITOR__SECTION__KEY` environment variables.

use alerting::{EmailConfig, FanoutConfig, PushConfig, TelegramConfig};
use config::{Config, ConfigError, Environment, File};
use data_validator::ValidationConfig;
use incident_core::IncidentPolicy;
use sensor_bridge::BridgeConfig;
use serde::{Deserialize, Serialize};
use storage::ThresholdConfig;

use crate::rate_limit::RateLimitConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub thresholds: ThresholdSettings,
    pub incident: IncidentPolicy,
    pub validation: ValidationConfig,
    pub notifications: NotificationSettings,
    pub mqtt: BridgeConfig,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Limit on the reading ingress route
    pub rate_limit: RateLimitConfig,
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite URL, or `memory` for the in-process repository
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn is_memory(&self) -> bool {
        self.url == "memory"
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://coldchain.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

/// Range seeded when no thresholds are stored yet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdSettings {
    pub min_temp: f64,
    pub max_temp: f64,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        let defaults = ThresholdConfig::default();
        Self {
            min_temp: defaults.min_temp,
            max_temp: defaults.max_temp,
        }
    }
}

impl ThresholdSettings {
    pub fn to_config(&self) -> ThresholdConfig {
        ThresholdConfig {
            min_temp: self.min_temp,
            max_temp: self.max_temp,
            ..Default::default()
        }
    }
}

/// Channels left unset are not registered
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub fanout: FanoutConfig,
    pub email: Option<EmailConfig>,
    pub telegram: Option<TelegramConfig>,
    pub push: Option<PushConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    /// Load settings, reading `path` if it exists
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("MONITOR")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("notifications.email.recipients")
                    .with_list_parse_key("notifications.push.topics")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::load("does-not-exist").unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.incident.max_counter, 9);
        assert_eq!(settings.incident.debounce_seconds, 10);
        assert_eq!(settings.thresholds.min_temp, 2.0);
        assert_eq!(settings.mqtt.topic, "dht11/sensors");
        assert_eq!(settings.notifications.fanout.channel_timeout_ms, 10_000);
        assert!(settings.notifications.email.is_none());
        assert!(!settings.database.is_memory());
    }

    #[test]
    fn test_server_address() {
        let server = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 9000,
            rate_limit: RateLimitConfig::default(),
        };
        assert_eq!(server.address(), "127.0.0.1:9000");
    }
}
