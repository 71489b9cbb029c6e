//! Persisted Records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ReadingId = i64;
pub type IncidentId = i64;
pub type CommentId = i64;

/// Number of corrective action slots carried by every incident
pub const ACTION_SLOTS: usize = 3;

/// Reading before the store assigns an id
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewReading {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Stored sensor reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: ReadingId,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub(crate) fn from_new(id: ReadingId, new: NewReading) -> Self {
        Self {
            id,
            temperature: new.temperature,
            humidity: new.humidity,
            timestamp: new.timestamp,
        }
    }
}

/// Acceptable temperature range, singleton
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub min_temp: f64,
    pub max_temp: f64,
    pub updated_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ThresholdConfig {
    /// True when `temperature` lies strictly outside `[min_temp, max_temp]`
    pub fn is_abnormal(&self, temperature: f64) -> bool {
        temperature < self.min_temp || temperature > self.max_temp
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_temp: 2.0,
            max_temp: 8.0,
            updated_by: None,
            updated_at: None,
        }
    }
}

/// Incident lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    InProgress,
    Closed,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::InProgress => "in_progress",
            IncidentStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_progress" => Some(IncidentStatus::InProgress),
            "closed" => Some(IncidentStatus::Closed),
            _ => None,
        }
    }
}

/// One role-owned checklist item attached to an incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectiveAction {
    pub label: String,
    pub checked: bool,
    pub comment: Option<String>,
    /// Identity that last checked the slot
    pub owner: Option<String>,
    pub acted_at: Option<DateTime<Utc>>,
}

impl CorrectiveAction {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            checked: false,
            comment: None,
            owner: None,
            acted_at: None,
        }
    }
}

/// A continuous excursion outside the threshold range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub counter: u8,
    pub active: bool,
    pub status: IncidentStatus,
    pub last_temperature: Option<f64>,
    pub last_humidity: Option<f64>,
    pub last_increment_at: Option<DateTime<Utc>>,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub corrective_actions: [CorrectiveAction; ACTION_SLOTS],
}

/// Comment on an incident, append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub incident_id: IncidentId,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Immutable copy of a closed incident.
///
/// Carries everything except the live-only `active` flag and the debounce
/// timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedIncident {
    pub id: i64,
    pub incident_id: IncidentId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub counter: u8,
    pub status: IncidentStatus,
    pub last_temperature: Option<f64>,
    pub last_humidity: Option<f64>,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub corrective_actions: [CorrectiveAction; ACTION_SLOTS],
    pub comments: Vec<Comment>,
    pub archived_at: DateTime<Utc>,
}

impl ArchivedIncident {
    /// Snapshot a closed incident. The store assigns `id`.
    pub fn snapshot(incident: &Incident, comments: Vec<Comment>, ended_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            incident_id: incident.id,
            started_at: incident.started_at,
            ended_at,
            counter: incident.counter,
            status: IncidentStatus::Closed,
            last_temperature: incident.last_temperature,
            last_humidity: incident.last_humidity,
            acknowledged: incident.acknowledged,
            acknowledged_by: incident.acknowledged_by.clone(),
            acknowledged_at: incident.acknowledged_at,
            corrective_actions: incident.corrective_actions.clone(),
            comments,
            archived_at: ended_at,
        }
    }
}
