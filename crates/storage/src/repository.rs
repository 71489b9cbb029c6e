//! In-Memory Repository

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::models::{
    ArchivedIncident, Comment, Incident, IncidentId, NewReading, Reading, ThresholdConfig,
};
use crate::{Store, StorageError};

#[derive(Default)]
struct Tables {
    readings: Vec<Reading>,
    incidents: Vec<Incident>,
    archives: Vec<ArchivedIncident>,
    comments: Vec<Comment>,
    thresholds: Option<ThresholdConfig>,
    next_reading_id: i64,
    next_incident_id: i64,
    next_archive_id: i64,
    next_comment_id: i64,
}

/// Repository keeping every table in process memory.
///
/// All tables sit behind one lock so incident closure is atomic. Readings
/// are append-only; nothing is evicted for the life of the process.
pub struct Repository {
    tables: Mutex<Tables>,
}

impl Repository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        info!("Creating in-memory repository");
        Self {
            tables: Mutex::new(Tables {
                next_reading_id: 1,
                next_incident_id: 1,
                next_archive_id: 1,
                next_comment_id: 1,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.tables
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for Repository {
    async fn insert_reading(&self, reading: NewReading) -> Result<Reading, StorageError> {
        let mut tables = self.lock()?;
        let id = tables.next_reading_id;
        tables.next_reading_id += 1;
        let stored = Reading::from_new(id, reading);
        tables.readings.push(stored);
        Ok(stored)
    }

    async fn latest_reading(&self) -> Result<Option<Reading>, StorageError> {
        let tables = self.lock()?;
        Ok(tables
            .readings
            .iter()
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)))
            .copied())
    }

    async fn recent_readings(&self, limit: usize) -> Result<Vec<Reading>, StorageError> {
        let tables = self.lock()?;
        let mut readings: Vec<_> = tables.readings.iter().copied().collect();
        readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        readings.truncate(limit);
        Ok(readings)
    }

    async fn reading_count(&self) -> Result<u64, StorageError> {
        Ok(self.lock()?.readings.len() as u64)
    }

    async fn active_incident(&self) -> Result<Option<Incident>, StorageError> {
        let tables = self.lock()?;
        Ok(tables.incidents.iter().find(|i| i.active).cloned())
    }

    async fn get_incident(&self, id: IncidentId) -> Result<Option<Incident>, StorageError> {
        let tables = self.lock()?;
        Ok(tables.incidents.iter().find(|i| i.id == id).cloned())
    }

    async fn insert_incident(&self, mut incident: Incident) -> Result<Incident, StorageError> {
        let mut tables = self.lock()?;
        if incident.active && tables.incidents.iter().any(|i| i.active) {
            return Err(StorageError::Conflict(
                "an active incident already exists".to_string(),
            ));
        }

        incident.id = tables.next_incident_id;
        tables.next_incident_id += 1;
        tables.incidents.push(incident.clone());
        debug!("Inserted incident with ID {}", incident.id);
        Ok(incident)
    }

    async fn update_incident(&self, incident: &Incident) -> Result<(), StorageError> {
        let mut tables = self.lock()?;
        if incident.active
            && tables
                .incidents
                .iter()
                .any(|i| i.active && i.id != incident.id)
        {
            return Err(StorageError::Conflict(
                "an active incident already exists".to_string(),
            ));
        }

        let slot = tables
            .incidents
            .iter_mut()
            .find(|i| i.id == incident.id)
            .ok_or(StorageError::NotFound)?;
        *slot = incident.clone();
        Ok(())
    }

    async fn close_incident(
        &self,
        incident: &Incident,
        mut archive: ArchivedIncident,
    ) -> Result<ArchivedIncident, StorageError> {
        let mut tables = self.lock()?;
        let position = tables
            .incidents
            .iter()
            .position(|i| i.id == incident.id)
            .ok_or(StorageError::NotFound)?;

        archive.id = tables.next_archive_id;
        tables.next_archive_id += 1;
        tables.incidents[position] = incident.clone();
        tables.archives.push(archive.clone());
        debug!("Archived incident {} as {}", incident.id, archive.id);
        Ok(archive)
    }

    async fn archives(&self, limit: usize) -> Result<Vec<ArchivedIncident>, StorageError> {
        let tables = self.lock()?;
        Ok(tables.archives.iter().rev().take(limit).cloned().collect())
    }

    async fn get_archive(&self, id: i64) -> Result<Option<ArchivedIncident>, StorageError> {
        let tables = self.lock()?;
        Ok(tables.archives.iter().find(|a| a.id == id).cloned())
    }

    async fn insert_comment(&self, mut comment: Comment) -> Result<Comment, StorageError> {
        let mut tables = self.lock()?;
        if !tables.incidents.iter().any(|i| i.id == comment.incident_id) {
            return Err(StorageError::NotFound);
        }

        comment.id = tables.next_comment_id;
        tables.next_comment_id += 1;
        tables.comments.push(comment.clone());
        Ok(comment)
    }

    async fn comments(&self, incident_id: IncidentId) -> Result<Vec<Comment>, StorageError> {
        let tables = self.lock()?;
        let mut comments: Vec<_> = tables
            .comments
            .iter()
            .filter(|c| c.incident_id == incident_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(comments)
    }

    async fn thresholds(&self) -> Result<Option<ThresholdConfig>, StorageError> {
        Ok(self.lock()?.thresholds.clone())
    }

    async fn save_thresholds(&self, config: &ThresholdConfig) -> Result<(), StorageError> {
        self.lock()?.thresholds = Some(config.clone());
        Ok(())
    }

    async fn seed_thresholds(
        &self,
        defaults: &ThresholdConfig,
    ) -> Result<ThresholdConfig, StorageError> {
        let mut tables = self.lock()?;
        Ok(tables
            .thresholds
            .get_or_insert_with(|| defaults.clone())
            .clone())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{CorrectiveAction, IncidentStatus};
    use chrono::{Duration, TimeZone, Utc};

    pub(crate) fn active_incident() -> Incident {
        let started = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        Incident {
            id: 0,
            started_at: started,
            ended_at: None,
            counter: 1,
            active: true,
            status: IncidentStatus::InProgress,
            last_temperature: Some(9.5),
            last_humidity: Some(40.0),
            last_increment_at: Some(started),
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
            corrective_actions: [
                CorrectiveAction::new("Check door seal"),
                CorrectiveAction::new("Move stock"),
                CorrectiveAction::new("Call technician"),
            ],
        }
    }

    #[tokio::test]
    async fn test_reading_insert_and_latest() {
        let repo = Repository::new();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        for i in 0..3 {
            repo.insert_reading(NewReading {
                temperature: Some(4.0 + i as f64),
                humidity: Some(50.0),
                timestamp: base + Duration::seconds(i),
            })
            .await
            .unwrap();
        }

        let latest = repo.latest_reading().await.unwrap().unwrap();
        assert_eq!(latest.id, 3);
        assert_eq!(latest.temperature, Some(6.0));

        let recent = repo.recent_readings(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, 3);
        assert_eq!(recent[1].id, 2);
    }

    #[tokio::test]
    async fn test_readings_are_append_only() {
        let repo = Repository::new();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        for i in 0..250 {
            repo.insert_reading(NewReading {
                temperature: Some(i as f64),
                humidity: None,
                timestamp: base + Duration::seconds(i),
            })
            .await
            .unwrap();
        }
        assert_eq!(repo.reading_count().await.unwrap(), 250);

        let oldest = repo.recent_readings(1000).await.unwrap().pop().unwrap();
        assert_eq!(oldest.id, 1);
        assert_eq!(oldest.temperature, Some(0.0));
    }

    #[tokio::test]
    async fn test_second_active_incident_conflicts() {
        let repo = Repository::new();
        let first = repo.insert_incident(active_incident()).await.unwrap();
        assert_eq!(first.id, 1);

        let err = repo.insert_incident(active_incident()).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_close_writes_archive_and_incident() {
        let repo = Repository::new();
        let mut incident = repo.insert_incident(active_incident()).await.unwrap();
        let ended = incident.started_at + Duration::minutes(5);

        let archive = ArchivedIncident::snapshot(&incident, Vec::new(), ended);
        incident.active = false;
        incident.status = IncidentStatus::Closed;
        incident.ended_at = Some(ended);
        incident.last_increment_at = None;

        let stored = repo.close_incident(&incident, archive).await.unwrap();
        assert_eq!(stored.id, 1);
        assert_eq!(stored.incident_id, incident.id);
        assert!(repo.active_incident().await.unwrap().is_none());
        assert_eq!(repo.archives(10).await.unwrap().len(), 1);

        // A fresh incident may now be opened
        assert!(repo.insert_incident(active_incident()).await.is_ok());
    }

    #[tokio::test]
    async fn test_seed_keeps_saved_thresholds() {
        let repo = Repository::new();
        let seeded = repo.seed_thresholds(&ThresholdConfig::default()).await.unwrap();
        assert_eq!((seeded.min_temp, seeded.max_temp), (2.0, 8.0));

        let saved = ThresholdConfig {
            min_temp: 0.0,
            max_temp: 10.0,
            updated_by: Some("alice".to_string()),
            updated_at: Some(Utc::now()),
        };
        repo.save_thresholds(&saved).await.unwrap();

        let after = repo.seed_thresholds(&ThresholdConfig::default()).await.unwrap();
        assert_eq!(after, saved);
        assert_eq!(repo.thresholds().await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn test_comment_requires_incident() {
        let repo = Repository::new();
        let comment = Comment {
            id: 0,
            incident_id: 42,
            author: "op1".to_string(),
            content: "door closed".to_string(),
            created_at: Utc::now(),
        };
        assert!(matches!(
            repo.insert_comment(comment).await,
            Err(StorageError::NotFound)
        ));
    }
}
