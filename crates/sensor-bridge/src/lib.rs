//! Sensor Bridge
//!
//! Subscribes to the sensor topic on an MQTT broker and feeds every reading
//! into the [`IngestionGateway`], the same path HTTP readings take.
//! Malformed payloads are logged and dropped; broker errors pause the loop
//! before the client reconnects.

use incident_core::{IngestReceipt, IngestionGateway};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Bridge error types
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Malformed payload: {0}")]
    Payload(String),

    #[error("Ingestion failed: {0}")]
    Ingest(#[from] incident_core::IncidentError),
}

/// MQTT bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub enabled: bool,
    /// Broker host name
    pub broker_host: String,
    pub broker_port: u16,
    /// Topic the sensors publish to
    pub topic: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Pause after a broker error (milliseconds)
    pub reconnect_delay_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker_host: "broker.hivemq.com".to_string(),
            broker_port: 1883,
            topic: "dht11/sensors".to_string(),
            client_id: format!("coldchain-monitor-{}", Uuid::new_v4().simple()),
            keep_alive_secs: 30,
            reconnect_delay_ms: 5000,
        }
    }
}

/// Sensor message body. Firmware variants use short keys and sometimes
/// send numbers as strings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SensorPayload {
    #[serde(default, alias = "temp", deserialize_with = "lenient_number")]
    pub temperature: Option<f64>,
    #[serde(default, alias = "hum", deserialize_with = "lenient_number")]
    pub humidity: Option<f64>,
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(value)) => Ok(Some(value)),
        Some(Raw::Text(text)) => text
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Decode a raw MQTT payload
pub fn parse_payload(payload: &[u8]) -> Result<SensorPayload, BridgeError> {
    serde_json::from_slice(payload).map_err(|e| BridgeError::Payload(e.to_string()))
}

/// Forwards broker messages to the gateway
pub struct SensorBridge {
    config: BridgeConfig,
    gateway: Arc<IngestionGateway>,
}

impl SensorBridge {
    pub fn new(config: BridgeConfig, gateway: Arc<IngestionGateway>) -> Self {
        Self { config, gateway }
    }

    /// Parse and ingest one payload
    pub async fn handle_payload(&self, payload: &[u8]) -> Result<IngestReceipt, BridgeError> {
        let reading = parse_payload(payload)?;
        let receipt = self
            .gateway
            .ingest(reading.temperature, reading.humidity)
            .await?;
        debug!(
            "MQTT reading {} ingested: {:?}",
            receipt.reading.id,
            receipt.transition.kind()
        );
        Ok(receipt)
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            &self.config.client_id,
            &self.config.broker_host,
            self.config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs));
        options
    }

    /// Run the subscribe loop forever.
    ///
    /// The subscription is renewed on every ConnAck, since a clean session
    /// drops it on reconnect.
    pub async fn run(self) {
        let (client, mut eventloop) = AsyncClient::new(self.options(), 10);
        let delay = Duration::from_millis(self.config.reconnect_delay_ms);
        info!(
            "MQTT bridge connecting to {}:{} (topic {})",
            self.config.broker_host, self.config.broker_port, self.config.topic
        );

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to MQTT broker: {}", self.config.broker_host);
                    if let Err(e) = self.subscribe(&client) {
                        error!("{}", e);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic != self.config.topic {
                        continue;
                    }
                    if let Err(e) = self.handle_payload(&publish.payload).await {
                        warn!("Dropped MQTT message on {}: {}", publish.topic, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT error: {}", BridgeError::Connection(e.to_string()));
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn subscribe(&self, client: &AsyncClient) -> Result<(), BridgeError> {
        client
            .try_subscribe(self.config.topic.as_str(), QoS::AtLeastOnce)
            .map_err(|e| BridgeError::Subscribe(e.to_string()))?;
        info!("Subscribed to {}", self.config.topic);
        Ok(())
    }
}
