//! Threshold Store

use chrono::Utc;
use std::sync::Arc;
use storage::{Store, ThresholdConfig};
use tracing::info;

use crate::error::IncidentError;
use crate::roles::{Actor, Capability};

/// Access to the singleton acceptable temperature range
#[derive(Clone)]
pub struct ThresholdStore {
    store: Arc<dyn Store>,
    defaults: ThresholdConfig,
}

impl ThresholdStore {
    /// Store seeding `{2.0, 8.0}` on first access
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_defaults(store, ThresholdConfig::default())
    }

    /// Store seeding `defaults` on first access
    pub fn with_defaults(store: Arc<dyn Store>, defaults: ThresholdConfig) -> Self {
        Self { store, defaults }
    }

    /// Current thresholds, creating the default row if none exists
    pub async fn get(&self) -> Result<ThresholdConfig, IncidentError> {
        if let Some(config) = self.store.thresholds().await? {
            return Ok(config);
        }

        // Conditional insert: a range saved in the meantime is kept
        let config = self.store.seed_thresholds(&self.defaults).await?;
        info!(
            "No thresholds were stored, now using [{}, {}]",
            config.min_temp, config.max_temp
        );
        Ok(config)
    }

    /// Replace the thresholds. Admin only; `min` must be strictly below `max`.
    pub async fn set(
        &self,
        min: f64,
        max: f64,
        actor: &Actor,
    ) -> Result<ThresholdConfig, IncidentError> {
        if !actor.role.allows(Capability::SetThresholds) {
            return Err(IncidentError::PermissionDenied {
                role: actor.role.to_string(),
                field: Capability::SetThresholds.as_str().to_string(),
            });
        }
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(IncidentError::InvalidRange { min, max });
        }

        let config = ThresholdConfig {
            min_temp: min,
            max_temp: max,
            updated_by: Some(actor.identity.clone()),
            updated_at: Some(Utc::now()),
        };
        self.store.save_thresholds(&config).await?;
        info!("Thresholds set to [{}, {}] by {}", min, max, actor.identity);
        Ok(config)
    }
}
