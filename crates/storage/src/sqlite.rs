//! SQLite Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use crate::models::{
    ArchivedIncident, Comment, CorrectiveAction, Incident, IncidentId, IncidentStatus, NewReading,
    Reading, ThresholdConfig, ACTION_SLOTS,
};
use crate::{Store, StorageError};

/// Repository backed by a SQLite database
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Open (creating if missing) the database at `url` and ensure the schema exists.
    ///
    /// In-memory databases are private to a connection, so `sqlite::memory:`
    /// is always opened with a single connection.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let max_connections = if url.contains(":memory:") {
            1
        } else {
            max_connections.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        info!("Connected to SQLite database: {}", url);
        let repo = Self { pool };
        repo.create_schema().await?;
        Ok(repo)
    }

    /// Create tables and indexes (idempotent)
    async fn create_schema(&self) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS readings (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                temperature   REAL,
                humidity      REAL,
                timestamp_ms  INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_readings_timestamp
                ON readings (timestamp_ms);
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS incidents (
                id                    INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at_ms         INTEGER NOT NULL,
                ended_at_ms           INTEGER,
                counter               INTEGER NOT NULL,
                active                INTEGER NOT NULL,
                status                TEXT    NOT NULL,
                last_temperature      REAL,
                last_humidity         REAL,
                last_increment_at_ms  INTEGER,
                acknowledged          INTEGER NOT NULL,
                acknowledged_by       TEXT,
                acknowledged_at_ms    INTEGER,
                corrective_actions    BLOB    NOT NULL
            );
            "#,
        )
        .execute(&mut *tx)
        .await?;

        // At most one active incident
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_incidents_single_active
                ON incidents (active) WHERE active = 1;
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS archives (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                incident_id     INTEGER NOT NULL,
                counter         INTEGER NOT NULL,
                started_at_ms   INTEGER NOT NULL,
                ended_at_ms     INTEGER NOT NULL,
                snapshot        BLOB    NOT NULL
            );
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                incident_id    INTEGER NOT NULL REFERENCES incidents (id),
                author         TEXT    NOT NULL,
                content        TEXT    NOT NULL,
                created_at_ms  INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS thresholds (
                id             INTEGER PRIMARY KEY CHECK (id = 1),
                min_temp       REAL    NOT NULL,
                max_temp       REAL    NOT NULL,
                updated_by     TEXT,
                updated_at_ms  INTEGER
            );
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("SQLite schema ready");
        Ok(())
    }
}

fn to_ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_ms(ms: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::SerializationError(format!("invalid timestamp {}", ms)))
}

fn opt_from_ms(ms: Option<i64>) -> Result<Option<DateTime<Utc>>, StorageError> {
    ms.map(from_ms).transpose()
}

fn reading_from_row(row: &SqliteRow) -> Result<Reading, StorageError> {
    Ok(Reading {
        id: row.try_get("id")?,
        temperature: row.try_get("temperature")?,
        humidity: row.try_get("humidity")?,
        timestamp: from_ms(row.try_get("timestamp_ms")?)?,
    })
}

fn incident_from_row(row: &SqliteRow) -> Result<Incident, StorageError> {
    let status: String = row.try_get("status")?;
    let status = IncidentStatus::parse(&status)
        .ok_or_else(|| StorageError::SerializationError(format!("unknown status {}", status)))?;
    let counter: i64 = row.try_get("counter")?;
    let actions: Vec<u8> = row.try_get("corrective_actions")?;
    let corrective_actions: [CorrectiveAction; ACTION_SLOTS] = postcard::from_bytes(&actions)?;

    Ok(Incident {
        id: row.try_get("id")?,
        started_at: from_ms(row.try_get("started_at_ms")?)?,
        ended_at: opt_from_ms(row.try_get("ended_at_ms")?)?,
        counter: u8::try_from(counter)
            .map_err(|_| StorageError::SerializationError(format!("counter {}", counter)))?,
        active: row.try_get("active")?,
        status,
        last_temperature: row.try_get("last_temperature")?,
        last_humidity: row.try_get("last_humidity")?,
        last_increment_at: opt_from_ms(row.try_get("last_increment_at_ms")?)?,
        acknowledged: row.try_get("acknowledged")?,
        acknowledged_by: row.try_get("acknowledged_by")?,
        acknowledged_at: opt_from_ms(row.try_get("acknowledged_at_ms")?)?,
        corrective_actions,
    })
}

fn archive_from_row(row: &SqliteRow) -> Result<ArchivedIncident, StorageError> {
    let snapshot: Vec<u8> = row.try_get("snapshot")?;
    let mut archive: ArchivedIncident = postcard::from_bytes(&snapshot)?;
    archive.id = row.try_get("id")?;
    Ok(archive)
}

fn comment_from_row(row: &SqliteRow) -> Result<Comment, StorageError> {
    Ok(Comment {
        id: row.try_get("id")?,
        incident_id: row.try_get("incident_id")?,
        author: row.try_get("author")?,
        content: row.try_get("content")?,
        created_at: from_ms(row.try_get("created_at_ms")?)?,
    })
}

const INCIDENT_COLUMNS: &str = "id, started_at_ms, ended_at_ms, counter, active, status, \
    last_temperature, last_humidity, last_increment_at_ms, acknowledged, acknowledged_by, \
    acknowledged_at_ms, corrective_actions";

#[async_trait]
impl Store for SqliteRepository {
    async fn insert_reading(&self, reading: NewReading) -> Result<Reading, StorageError> {
        let result = sqlx::query(
            "INSERT INTO readings (temperature, humidity, timestamp_ms) VALUES (?, ?, ?)",
        )
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(to_ms(reading.timestamp))
        .execute(&self.pool)
        .await?;

        Ok(Reading::from_new(result.last_insert_rowid(), reading))
    }

    async fn latest_reading(&self) -> Result<Option<Reading>, StorageError> {
        let row = sqlx::query(
            "SELECT id, temperature, humidity, timestamp_ms FROM readings \
             ORDER BY timestamp_ms DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(reading_from_row).transpose()
    }

    async fn recent_readings(&self, limit: usize) -> Result<Vec<Reading>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, temperature, humidity, timestamp_ms FROM readings \
             ORDER BY timestamp_ms DESC, id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(reading_from_row).collect()
    }

    async fn reading_count(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM readings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn active_incident(&self) -> Result<Option<Incident>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM incidents WHERE active = 1",
            INCIDENT_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(incident_from_row).transpose()
    }

    async fn get_incident(&self, id: IncidentId) -> Result<Option<Incident>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM incidents WHERE id = ?",
            INCIDENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(incident_from_row).transpose()
    }

    async fn insert_incident(&self, mut incident: Incident) -> Result<Incident, StorageError> {
        let actions = postcard::to_allocvec(&incident.corrective_actions)?;
        let result = sqlx::query(
            "INSERT INTO incidents (started_at_ms, ended_at_ms, counter, active, status, \
             last_temperature, last_humidity, last_increment_at_ms, acknowledged, \
             acknowledged_by, acknowledged_at_ms, corrective_actions) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(to_ms(incident.started_at))
        .bind(incident.ended_at.map(to_ms))
        .bind(incident.counter as i64)
        .bind(incident.active)
        .bind(incident.status.as_str())
        .bind(incident.last_temperature)
        .bind(incident.last_humidity)
        .bind(incident.last_increment_at.map(to_ms))
        .bind(incident.acknowledged)
        .bind(incident.acknowledged_by.as_deref())
        .bind(incident.acknowledged_at.map(to_ms))
        .bind(actions)
        .execute(&self.pool)
        .await?;

        incident.id = result.last_insert_rowid();
        debug!("Inserted incident with ID {}", incident.id);
        Ok(incident)
    }

    async fn update_incident(&self, incident: &Incident) -> Result<(), StorageError> {
        let actions = postcard::to_allocvec(&incident.corrective_actions)?;
        let result = sqlx::query(
            "UPDATE incidents SET ended_at_ms = ?, counter = ?, active = ?, status = ?, \
             last_temperature = ?, last_humidity = ?, last_increment_at_ms = ?, \
             acknowledged = ?, acknowledged_by = ?, acknowledged_at_ms = ?, \
             corrective_actions = ? WHERE id = ?",
        )
        .bind(incident.ended_at.map(to_ms))
        .bind(incident.counter as i64)
        .bind(incident.active)
        .bind(incident.status.as_str())
        .bind(incident.last_temperature)
        .bind(incident.last_humidity)
        .bind(incident.last_increment_at.map(to_ms))
        .bind(incident.acknowledged)
        .bind(incident.acknowledged_by.as_deref())
        .bind(incident.acknowledged_at.map(to_ms))
        .bind(actions)
        .bind(incident.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn close_incident(
        &self,
        incident: &Incident,
        mut archive: ArchivedIncident,
    ) -> Result<ArchivedIncident, StorageError> {
        let snapshot = postcard::to_allocvec(&archive)?;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE incidents SET ended_at_ms = ?, active = ?, status = ?, \
             last_increment_at_ms = ? WHERE id = ?",
        )
        .bind(incident.ended_at.map(to_ms))
        .bind(incident.active)
        .bind(incident.status.as_str())
        .bind(incident.last_increment_at.map(to_ms))
        .bind(incident.id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        let inserted = sqlx::query(
            "INSERT INTO archives (incident_id, counter, started_at_ms, ended_at_ms, snapshot) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(archive.incident_id)
        .bind(archive.counter as i64)
        .bind(to_ms(archive.started_at))
        .bind(to_ms(archive.ended_at))
        .bind(snapshot)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        archive.id = inserted.last_insert_rowid();
        debug!("Archived incident {} as {}", incident.id, archive.id);
        Ok(archive)
    }

    async fn archives(&self, limit: usize) -> Result<Vec<ArchivedIncident>, StorageError> {
        let rows = sqlx::query("SELECT id, snapshot FROM archives ORDER BY id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(archive_from_row).collect()
    }

    async fn get_archive(&self, id: i64) -> Result<Option<ArchivedIncident>, StorageError> {
        let row = sqlx::query("SELECT id, snapshot FROM archives WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(archive_from_row).transpose()
    }

    async fn insert_comment(&self, mut comment: Comment) -> Result<Comment, StorageError> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM incidents WHERE id = ?")
            .bind(comment.incident_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        let result = sqlx::query(
            "INSERT INTO comments (incident_id, author, content, created_at_ms) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(comment.incident_id)
        .bind(&comment.author)
        .bind(&comment.content)
        .bind(to_ms(comment.created_at))
        .execute(&self.pool)
        .await?;

        comment.id = result.last_insert_rowid();
        Ok(comment)
    }

    async fn comments(&self, incident_id: IncidentId) -> Result<Vec<Comment>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, incident_id, author, content, created_at_ms FROM comments \
             WHERE incident_id = ? ORDER BY created_at_ms ASC, id ASC",
        )
        .bind(incident_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(comment_from_row).collect()
    }

    async fn thresholds(&self) -> Result<Option<ThresholdConfig>, StorageError> {
        let row = sqlx::query(
            "SELECT min_temp, max_temp, updated_by, updated_at_ms FROM thresholds WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<ThresholdConfig, StorageError> {
            Ok(ThresholdConfig {
                min_temp: row.try_get("min_temp")?,
                max_temp: row.try_get("max_temp")?,
                updated_by: row.try_get("updated_by")?,
                updated_at: opt_from_ms(row.try_get("updated_at_ms")?)?,
            })
        })
        .transpose()
    }

    async fn save_thresholds(&self, config: &ThresholdConfig) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO thresholds (id, min_temp, max_temp, updated_by, updated_at_ms) \
             VALUES (1, ?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET min_temp = excluded.min_temp, \
             max_temp = excluded.max_temp, updated_by = excluded.updated_by, \
             updated_at_ms = excluded.updated_at_ms",
        )
        .bind(config.min_temp)
        .bind(config.max_temp)
        .bind(config.updated_by.as_deref())
        .bind(config.updated_at.map(to_ms))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn seed_thresholds(
        &self,
        defaults: &ThresholdConfig,
    ) -> Result<ThresholdConfig, StorageError> {
        sqlx::query(
            "INSERT INTO thresholds (id, min_temp, max_temp, updated_by, updated_at_ms) \
             VALUES (1, ?, ?, ?, ?) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(defaults.min_temp)
        .bind(defaults.max_temp)
        .bind(defaults.updated_by.as_deref())
        .bind(defaults.updated_at.map(to_ms))
        .execute(&self.pool)
        .await?;

        self.thresholds().await?.ok_or(StorageError::NotFound)
    }
}
