//! Alert Messages

use serde::{Deserialize, Serialize};

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertSeverity {
    /// Critical once the incident counter reached its ceiling
    pub fn from_counter(counter: u8, ceiling: u8) -> Self {
        if counter >= ceiling {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

/// Message handed to every channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub severity: AlertSeverity,
    pub title: String,
    pub body: String,
}

impl AlertMessage {
    /// Temperature alarm for an open incident.
    ///
    /// Plain ASCII only, some push gateways mangle anything else.
    pub fn temperature_alarm(temperature: f64, humidity: Option<f64>, counter: u8, ceiling: u8) -> Self {
        let severity = AlertSeverity::from_counter(counter, ceiling);
        let humidity = humidity
            .map(|h| format!("{:.1}%", h))
            .unwrap_or_else(|| "n/a".to_string());
        let body = format!(
            "TEMPERATURE ALERT!\n\nTemp: {:.1}C\nHumidity: {}\nIncident count: {}/{}",
            temperature, humidity, counter, ceiling
        );

        Self {
            severity,
            title: match severity {
                AlertSeverity::Warning => "Temperature alarm".to_string(),
                AlertSeverity::Critical => "Temperature alarm (critical)".to_string(),
            },
            body,
        }
    }
}
