//! Incident Policy

use chrono::Duration;
use serde::{Deserialize, Serialize};
use storage::{CorrectiveAction, ACTION_SLOTS};

/// Tunables of the incident state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentPolicy {
    /// Counter ceiling (default: 9)
    pub max_counter: u8,
    /// Minimum spacing between counter increments (seconds, default: 10)
    pub debounce_seconds: u64,
    /// Labels given to the corrective action slots of new incidents
    pub action_labels: [String; ACTION_SLOTS],
}

impl Default for IncidentPolicy {
    fn default() -> Self {
        Self {
            max_counter: 9,
            debounce_seconds: 10,
            action_labels: [
                "Corrective action 1".to_string(),
                "Corrective action 2".to_string(),
                "Corrective action 3".to_string(),
            ],
        }
    }
}

impl IncidentPolicy {
    pub fn debounce(&self) -> Duration {
        Duration::seconds(self.debounce_seconds as i64)
    }

    pub(crate) fn fresh_actions(&self) -> [CorrectiveAction; ACTION_SLOTS] {
        self.action_labels.clone().map(CorrectiveAction::new)
    }
}
