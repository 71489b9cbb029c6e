//! Incident State Machine
//!
//! Every reading is judged against the thresholds in force when it is
//! evaluated. An abnormal reading opens the single active incident or bumps
//! its counter (at most once per debounce window, saturating at the ceiling);
//! the first normal reading afterwards archives and closes it.
//!
//! The read-decide-write cycle runs inside one critical section shared with
//! [`CorrectiveActionLedger`], so two concurrent abnormal readings can never
//! both open an incident.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use storage::{ArchivedIncident, Incident, IncidentStatus, Reading, Store, ThresholdConfig};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::IncidentError;
use crate::ledger::CorrectiveActionLedger;
use crate::policy::IncidentPolicy;

/// What `decide` wants written
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Insert this new incident
    Create(Incident),
    /// Persist the incremented incident
    Increment(Incident),
    /// Abnormal reading absorbed by the debounce window or the ceiling
    Absorb,
    /// Persist the closed incident and archive it
    Close(Incident),
    /// Normal reading, nothing open
    Idle,
}

/// Pure transition function of the state machine
pub fn decide(
    active: Option<&Incident>,
    reading: &Reading,
    thresholds: &ThresholdConfig,
    policy: &IncidentPolicy,
) -> Decision {
    let now = reading.timestamp;
    let abnormal = match reading.temperature {
        Some(temperature) => thresholds.is_abnormal(temperature),
        None => return Decision::Idle,
    };

    match (abnormal, active) {
        (true, None) => Decision::Create(Incident {
            id: 0,
            started_at: now,
            ended_at: None,
            counter: 1,
            active: true,
            status: IncidentStatus::InProgress,
            last_temperature: reading.temperature,
            last_humidity: reading.humidity,
            last_increment_at: Some(now),
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
            corrective_actions: policy.fresh_actions(),
        }),
        (true, Some(incident)) => {
            if incident.counter < policy.max_counter && debounce_elapsed(incident, now, policy) {
                let mut next = incident.clone();
                next.counter += 1;
                next.last_increment_at = Some(now);
                next.last_temperature = reading.temperature;
                next.last_humidity = reading.humidity;
                Decision::Increment(next)
            } else {
                Decision::Absorb
            }
        }
        (false, Some(incident)) => {
            let mut closed = incident.clone();
            closed.active = false;
            closed.status = IncidentStatus::Closed;
            closed.ended_at = Some(now);
            closed.last_increment_at = None;
            Decision::Close(closed)
        }
        (false, None) => Decision::Idle,
    }
}

/// A missing increment timestamp counts as elapsed
fn debounce_elapsed(incident: &Incident, now: DateTime<Utc>, policy: &IncidentPolicy) -> bool {
    match incident.last_increment_at {
        None => true,
        Some(last) => now - last >= policy.debounce(),
    }
}

/// Kind of transition, for responses and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Created,
    Incremented,
    Absorbed,
    Closed,
    Idle,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Created => "created",
            TransitionKind::Incremented => "incremented",
            TransitionKind::Absorbed => "absorbed",
            TransitionKind::Closed => "closed",
            TransitionKind::Idle => "idle",
        }
    }
}

/// Committed outcome of evaluating one reading
#[derive(Debug, Clone, PartialEq)]
pub enum IncidentTransition {
    Created(Incident),
    Incremented(Incident),
    Absorbed(Incident),
    Closed {
        incident: Incident,
        archive: ArchivedIncident,
    },
    Idle,
}

impl IncidentTransition {
    pub fn kind(&self) -> TransitionKind {
        match self {
            IncidentTransition::Created(_) => TransitionKind::Created,
            IncidentTransition::Incremented(_) => TransitionKind::Incremented,
            IncidentTransition::Absorbed(_) => TransitionKind::Absorbed,
            IncidentTransition::Closed { .. } => TransitionKind::Closed,
            IncidentTransition::Idle => TransitionKind::Idle,
        }
    }

    /// Incident as it stands after the transition
    pub fn incident(&self) -> Option<&Incident> {
        match self {
            IncidentTransition::Created(incident)
            | IncidentTransition::Incremented(incident)
            | IncidentTransition::Absorbed(incident)
            | IncidentTransition::Closed { incident, .. } => Some(incident),
            IncidentTransition::Idle => None,
        }
    }

    /// Created and Incremented transitions raise an alert
    pub fn should_notify(&self) -> bool {
        matches!(
            self,
            IncidentTransition::Created(_) | IncidentTransition::Incremented(_)
        )
    }
}

/// Evaluates readings and persists incident transitions
pub struct IncidentEngine {
    store: Arc<dyn Store>,
    policy: IncidentPolicy,
    /// Guards every read-modify-write of the active incident
    section: Arc<Mutex<()>>,
}

impl IncidentEngine {
    pub fn new(store: Arc<dyn Store>, policy: IncidentPolicy) -> Self {
        info!(
            "Creating incident engine (ceiling {}, debounce {}s)",
            policy.max_counter, policy.debounce_seconds
        );
        Self {
            store,
            policy,
            section: Arc::new(Mutex::new(())),
        }
    }

    pub fn policy(&self) -> &IncidentPolicy {
        &self.policy
    }

    /// Ledger sharing this engine's critical section
    pub fn ledger(&self) -> CorrectiveActionLedger {
        CorrectiveActionLedger::new(Arc::clone(&self.store), Arc::clone(&self.section))
    }

    /// Evaluate one reading and commit the resulting transition
    pub async fn evaluate(
        &self,
        reading: &Reading,
        thresholds: &ThresholdConfig,
    ) -> Result<IncidentTransition, IncidentError> {
        let _guard = self.section.lock().await;

        if reading.temperature.is_none() {
            warn!("Reading {} has no temperature, skipping evaluation", reading.id);
        }

        let active = self.store.active_incident().await?;
        let transition = match decide(active.as_ref(), reading, thresholds, &self.policy) {
            Decision::Create(incident) => {
                let incident = self.store.insert_incident(incident).await?;
                info!(
                    "Incident {} opened at {:?}°C (range [{}, {}])",
                    incident.id, reading.temperature, thresholds.min_temp, thresholds.max_temp
                );
                IncidentTransition::Created(incident)
            }
            Decision::Increment(incident) => {
                self.store.update_incident(&incident).await?;
                info!(
                    "Incident {} counter {}/{}",
                    incident.id, incident.counter, self.policy.max_counter
                );
                IncidentTransition::Incremented(incident)
            }
            Decision::Absorb => {
                debug!("Abnormal reading {} absorbed", reading.id);
                match active {
                    Some(incident) => IncidentTransition::Absorbed(incident),
                    None => IncidentTransition::Idle,
                }
            }
            Decision::Close(incident) => {
                let comments = self.store.comments(incident.id).await?;
                let ended_at = incident.ended_at.unwrap_or(reading.timestamp);
                let archive = ArchivedIncident::snapshot(&incident, comments, ended_at);
                let archive = self.store.close_incident(&incident, archive).await?;
                info!(
                    "Incident {} closed with counter {}, archived as {}",
                    incident.id, incident.counter, archive.id
                );
                IncidentTransition::Closed { incident, archive }
            }
            Decision::Idle => IncidentTransition::Idle,
        };

        metrics::counter!("incident_transitions_total", "kind" => transition.kind().as_str())
            .increment(1);
        Ok(transition)
    }
}
