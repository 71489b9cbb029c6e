//! Store Contract

use async_trait::async_trait;

use crate::models::{
    ArchivedIncident, Comment, Incident, IncidentId, NewReading, Reading, ThresholdConfig,
};
use crate::StorageError;

/// Persistence contract shared by the in-memory and SQLite repositories.
///
/// Implementations must reject a second row with `active = true` with
/// [`StorageError::Conflict`], and must apply [`Store::close_incident`]
/// atomically.
#[async_trait]
pub trait Store: Send + Sync {
    /// Append a reading
    async fn insert_reading(&self, reading: NewReading) -> Result<Reading, StorageError>;

    /// Most recent reading by timestamp
    async fn latest_reading(&self) -> Result<Option<Reading>, StorageError>;

    /// Newest-first readings
    async fn recent_readings(&self, limit: usize) -> Result<Vec<Reading>, StorageError>;

    async fn reading_count(&self) -> Result<u64, StorageError>;

    /// The single incident with `active = true`, if any
    async fn active_incident(&self) -> Result<Option<Incident>, StorageError>;

    async fn get_incident(&self, id: IncidentId) -> Result<Option<Incident>, StorageError>;

    /// Insert an incident, assigning its id
    async fn insert_incident(&self, incident: Incident) -> Result<Incident, StorageError>;

    /// Overwrite an existing incident row
    async fn update_incident(&self, incident: &Incident) -> Result<(), StorageError>;

    /// Write the archive snapshot and the closed incident in one step
    async fn close_incident(
        &self,
        incident: &Incident,
        archive: ArchivedIncident,
    ) -> Result<ArchivedIncident, StorageError>;

    /// Newest-first archives
    async fn archives(&self, limit: usize) -> Result<Vec<ArchivedIncident>, StorageError>;

    async fn get_archive(&self, id: i64) -> Result<Option<ArchivedIncident>, StorageError>;

    /// Append a comment, assigning its id
    async fn insert_comment(&self, comment: Comment) -> Result<Comment, StorageError>;

    /// Comments of an incident, oldest first
    async fn comments(&self, incident_id: IncidentId) -> Result<Vec<Comment>, StorageError>;

    async fn thresholds(&self) -> Result<Option<ThresholdConfig>, StorageError>;

    async fn save_thresholds(&self, config: &ThresholdConfig) -> Result<(), StorageError>;

    /// Store `defaults` only if no thresholds exist yet, returning whichever
    /// row is stored afterwards. A concurrent save always wins over the seed.
    async fn seed_thresholds(
        &self,
        defaults: &ThresholdConfig,
    ) -> Result<ThresholdConfig, StorageError>;
}
