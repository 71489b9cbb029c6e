//! Incident Core
//!
//! Decides whether readings are abnormal, tracks the single active incident,
//! records corrective actions and drives notification fan-out.

mod engine;
mod error;
mod gateway;
mod ledger;
mod policy;
mod roles;
mod status;
mod thresholds;

pub use engine::{decide, Decision, IncidentEngine, IncidentTransition, TransitionKind};
pub use error::IncidentError;
pub use gateway::{IngestReceipt, IngestionGateway};
pub use ledger::{CorrectiveActionLedger, IncidentPatch, SlotPatch};
pub use policy::IncidentPolicy;
pub use roles::{Actor, Capability, Permissions, Role};
pub use status::{IncidentStatusView, IncidentView};
pub use thresholds::ThresholdStore;
