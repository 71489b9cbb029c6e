//! Ingestion Gateway
//!
//! Boundary operation run once per sensor reading: validate, persist, evaluate
//! against the current thresholds, then hand any alert to the notification
//! fan-out on a separate task.

use alerting::{AlertMessage, DispatchReport, NotificationFanout};
use chrono::{DateTime, Utc};
use data_validator::Validator;
use std::sync::Arc;
use storage::{NewReading, Reading, Store, ThresholdConfig};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::{IncidentEngine, IncidentTransition};
use crate::error::IncidentError;
use crate::ledger::CorrectiveActionLedger;
use crate::policy::IncidentPolicy;
use crate::thresholds::ThresholdStore;

/// Result of one ingestion
#[derive(Debug)]
pub struct IngestReceipt {
    pub reading: Reading,
    pub transition: IncidentTransition,
    /// Fan-out task, present when the transition raised an alert
    pub dispatch: Option<JoinHandle<DispatchReport>>,
}

/// Entry point for readings from every source
pub struct IngestionGateway {
    validator: Validator,
    store: Arc<dyn Store>,
    thresholds: ThresholdStore,
    engine: IncidentEngine,
    fanout: NotificationFanout,
}

impl IngestionGateway {
    pub fn new(store: Arc<dyn Store>, policy: IncidentPolicy, fanout: NotificationFanout) -> Self {
        Self {
            validator: Validator::default(),
            thresholds: ThresholdStore::new(Arc::clone(&store)),
            engine: IncidentEngine::new(Arc::clone(&store), policy),
            store,
            fanout,
        }
    }

    /// Replace the ingress validator
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Thresholds seeded when none are stored
    pub fn with_threshold_defaults(mut self, defaults: ThresholdConfig) -> Self {
        self.thresholds = ThresholdStore::with_defaults(Arc::clone(&self.store), defaults);
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn thresholds(&self) -> &ThresholdStore {
        &self.thresholds
    }

    pub fn engine(&self) -> &IncidentEngine {
        &self.engine
    }

    pub fn ledger(&self) -> CorrectiveActionLedger {
        self.engine.ledger()
    }

    pub fn fanout(&self) -> &NotificationFanout {
        &self.fanout
    }

    /// Ingest a reading taken now
    pub async fn ingest(
        &self,
        temperature: Option<f64>,
        humidity: Option<f64>,
    ) -> Result<IngestReceipt, IncidentError> {
        self.ingest_at(temperature, humidity, Utc::now()).await
    }

    /// Ingest a reading taken at `timestamp`.
    ///
    /// Validation failures are returned before anything is stored. The
    /// reading is committed before evaluation, so a failed evaluation still
    /// leaves it in the history.
    pub async fn ingest_at(
        &self,
        temperature: Option<f64>,
        humidity: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Result<IngestReceipt, IncidentError> {
        let valid = self.validator.validate_reading(temperature, humidity)?;

        let reading = self
            .store
            .insert_reading(NewReading {
                temperature: Some(valid.temperature),
                humidity: Some(valid.humidity),
                timestamp,
            })
            .await?;
        metrics::counter!("readings_ingested_total").increment(1);
        debug!(
            "Stored reading {}: {:.1}°C {:.1}%",
            reading.id, valid.temperature, valid.humidity
        );

        let thresholds = self.thresholds.get().await?;
        let transition = self.engine.evaluate(&reading, &thresholds).await?;

        let dispatch = if transition.should_notify() {
            transition.incident().map(|incident| {
                let message = AlertMessage::temperature_alarm(
                    incident.last_temperature.unwrap_or(valid.temperature),
                    incident.last_humidity,
                    incident.counter,
                    self.engine.policy().max_counter,
                );
                info!(
                    "Dispatching {} alert for incident {} to {} channel(s)",
                    message.severity.as_str(),
                    incident.id,
                    self.fanout.channel_count()
                );
                let fanout = self.fanout.clone();
                tokio::spawn(async move { fanout.dispatch(&message).await })
            })
        } else {
            None
        };

        Ok(IngestReceipt {
            reading,
            transition,
            dispatch,
        })
    }
}
