//! SQLite storage layer.
//!
//! The domain types in [`crate::model`] and [`crate::incident`] are plain
//! values; this module loads and saves them.
//!
//! - `tourists`: latest telemetry snapshot per tourist. Upserts keep the
//!   original insertion order, which is the tie-break for the at-risk list.
//! - `incidents` / `incident_log`: incident state and its append-only log.
//!   Log rows are only ever inserted, never updated or deleted.
//! - `registrations`: pending signups, without passwords.
//! - `geo_fences`: zones drawn by authorities. Vertices are stored as a JSON
//!   array.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::auth::Registration;
use crate::error::{Error, Result};
use crate::incident::{
    Actor, AlertType, BoardStatus, Incident, LogEntry, ResponseStage, Severity, Workflow,
};
use crate::model::{SignalQuality, TouristTelemetrySnapshot};
use crate::zone::{GeoFence, ZoneType};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:safetrail.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tourists (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                battery_level INTEGER NOT NULL,
                signal TEXT NOT NULL,
                near_high_risk_zone INTEGER NOT NULL,
                hiking_after_sunset INTEGER NOT NULL,
                deviated_from_itinerary INTEGER NOT NULL,
                updated_ts INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS incidents (
                id TEXT PRIMARY KEY,
                tourist_id TEXT NOT NULL,
                tourist_name TEXT NOT NULL,
                alert_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                location TEXT NOT NULL,
                details TEXT NOT NULL,
                created_ts INTEGER NOT NULL,
                status TEXT NOT NULL,
                stage TEXT NOT NULL,
                assigned_team TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // (incident_id, position) is unique so an entry can never be replaced
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS incident_log (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                incident_id TEXT NOT NULL REFERENCES incidents(id),
                position INTEGER NOT NULL,
                actor TEXT NOT NULL,
                message TEXT NOT NULL,
                ts INTEGER NOT NULL,
                UNIQUE (incident_id, position)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS registrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                phone TEXT NOT NULL,
                address TEXT NOT NULL,
                nationality TEXT NOT NULL,
                passport TEXT NOT NULL,
                gov_id TEXT NOT NULL,
                emergency_contact_name TEXT NOT NULL,
                emergency_contact_phone TEXT NOT NULL,
                submitted_ts INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS geo_fences (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                zone_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                alert_message TEXT NOT NULL,
                positions TEXT NOT NULL,
                created_by TEXT NOT NULL,
                modified_ts INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Tourists
    // ------------------------------------------------------------------

    /// Insert or replace the latest snapshot for a tourist.
    pub async fn upsert_tourist(
        &self,
        snapshot: &TouristTelemetrySnapshot,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tourists (
                id, name, battery_level, signal,
                near_high_risk_zone, hiking_after_sunset, deviated_from_itinerary,
                updated_ts
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                battery_level = excluded.battery_level,
                signal = excluded.signal,
                near_high_risk_zone = excluded.near_high_risk_zone,
                hiking_after_sunset = excluded.hiking_after_sunset,
                deviated_from_itinerary = excluded.deviated_from_itinerary,
                updated_ts = excluded.updated_ts
            "#,
        )
        .bind(&snapshot.id)
        .bind(&snapshot.name)
        .bind(i64::from(snapshot.battery_level))
        .bind(snapshot.signal.label())
        .bind(snapshot.near_high_risk_zone)
        .bind(snapshot.hiking_after_sunset)
        .bind(snapshot.deviated_from_itinerary)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_tourist(&self, id: &str) -> Result<Option<TouristTelemetrySnapshot>> {
        let row = sqlx::query("SELECT * FROM tourists WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(tourist_from_row).transpose()
    }

    /// All snapshots, in first-seen order.
    pub async fn list_tourists(&self) -> Result<Vec<TouristTelemetrySnapshot>> {
        let rows = sqlx::query("SELECT * FROM tourists ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(tourist_from_row).collect()
    }

    // ------------------------------------------------------------------
    // Incidents
    // ------------------------------------------------------------------

    /// Store a freshly opened incident together with its initial log.
    pub async fn insert_incident(&self, incident: &Incident) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO incidents (
                id, tourist_id, tourist_name, alert_type, severity, location,
                details, created_ts, status, stage, assigned_team
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&incident.id)
        .bind(&incident.tourist_id)
        .bind(&incident.tourist_name)
        .bind(incident.alert_type.key())
        .bind(incident.severity.key())
        .bind(&incident.location)
        .bind(&incident.details)
        .bind(incident.created_at.timestamp_millis())
        .bind(incident.status.key())
        .bind(incident.stage.key())
        .bind(incident.assigned_team.as_deref())
        .execute(&mut *tx)
        .await?;

        append_log_entries(&mut tx, &incident.id, &incident.log, 0).await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_incident(&self, id: &str) -> Result<Option<Incident>> {
        let mut conn = self.pool.acquire().await?;
        fetch_incident(&mut conn, id).await
    }

    /// All incidents with their logs, in creation order.
    pub async fn list_incidents(&self) -> Result<Vec<Incident>> {
        let rows = sqlx::query("SELECT * FROM incidents ORDER BY created_ts, rowid")
            .fetch_all(&self.pool)
            .await?;

        let log_rows = sqlx::query("SELECT * FROM incident_log ORDER BY incident_id, position")
            .fetch_all(&self.pool)
            .await?;

        let mut logs: HashMap<String, Vec<LogEntry>> = HashMap::new();
        for row in &log_rows {
            let incident_id: String = row.get("incident_id");
            logs.entry(incident_id)
                .or_default()
                .push(log_entry_from_row(row)?);
        }

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let log = logs.remove(&id).unwrap_or_default();
                incident_from_row(row, log)
            })
            .collect()
    }

    /// Apply a domain operation to one incident atomically.
    ///
    /// The incident is loaded inside a transaction and handed to `op`. If `op`
    /// succeeds, the new status, stage and team are written and only the log
    /// entries `op` appended are inserted, then the transaction commits. If
    /// `op` fails, nothing is written.
    ///
    /// The first statement is a write, so the transaction holds the write
    /// lock before it reads. Concurrent updates of the same incident wait on
    /// the busy timeout instead of failing a read-to-write lock upgrade.
    pub async fn update_incident<F>(&self, id: &str, op: F) -> Result<Incident>
    where
        F: FnOnce(&mut Incident) -> Result<()>,
    {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query("UPDATE incidents SET id = id WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if claimed == 0 {
            return Err(Error::NotFound {
                kind: "incident",
                id: id.to_string(),
            });
        }

        let mut incident = fetch_incident(&mut tx, id)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "incident",
                id: id.to_string(),
            })?;

        let persisted = incident.log.len();
        op(&mut incident)?;

        sqlx::query(
            r#"
            UPDATE incidents
            SET status = ?, stage = ?, assigned_team = ?
            WHERE id = ?
            "#,
        )
        .bind(incident.status.key())
        .bind(incident.stage.key())
        .bind(incident.assigned_team.as_deref())
        .bind(&incident.id)
        .execute(&mut *tx)
        .await?;

        append_log_entries(&mut tx, &incident.id, &incident.log[persisted..], persisted).await?;

        tx.commit().await?;
        Ok(incident)
    }

    // ------------------------------------------------------------------
    // Registrations
    // ------------------------------------------------------------------

    pub async fn insert_registration(&self, registration: &Registration) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO registrations (
                name, email, phone, address, nationality, passport, gov_id,
                emergency_contact_name, emergency_contact_phone, submitted_ts
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&registration.name)
        .bind(&registration.email)
        .bind(&registration.phone)
        .bind(&registration.address)
        .bind(&registration.nationality)
        .bind(&registration.passport)
        .bind(&registration.gov_id)
        .bind(&registration.emergency_contact_name)
        .bind(&registration.emergency_contact_phone)
        .bind(registration.submitted_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    // ------------------------------------------------------------------
    // Geo-fences
    // ------------------------------------------------------------------

    pub async fn insert_zone(&self, zone: &GeoFence) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO geo_fences (
                id, name, zone_type, severity, alert_message, positions,
                created_by, modified_ts
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&zone.id)
        .bind(&zone.name)
        .bind(zone.zone_type.label())
        .bind(zone.severity.key())
        .bind(&zone.alert_message)
        .bind(encode_positions(&zone.positions)?)
        .bind(&zone.created_by)
        .bind(zone.last_modified.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_zone(&self, id: &str) -> Result<Option<GeoFence>> {
        let row = sqlx::query("SELECT * FROM geo_fences WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(zone_from_row).transpose()
    }

    /// Newest zones first.
    pub async fn list_zones(&self) -> Result<Vec<GeoFence>> {
        let rows = sqlx::query("SELECT * FROM geo_fences ORDER BY rowid DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(zone_from_row).collect()
    }

    /// Overwrite the editable columns. Returns false for an unknown zone.
    pub async fn update_zone(&self, zone: &GeoFence) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE geo_fences
            SET name = ?, zone_type = ?, severity = ?, alert_message = ?,
                positions = ?, modified_ts = ?
            WHERE id = ?
            "#,
        )
        .bind(&zone.name)
        .bind(zone.zone_type.label())
        .bind(zone.severity.key())
        .bind(&zone.alert_message)
        .bind(encode_positions(&zone.positions)?)
        .bind(zone.last_modified.timestamp_millis())
        .bind(&zone.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Returns false when nothing was deleted.
    pub async fn delete_zone(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM geo_fences WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn encode_positions(positions: &[[f64; 2]]) -> Result<String> {
    serde_json::to_string(positions).map_err(|e| corrupt("positions", &e.to_string()))
}

async fn fetch_incident(conn: &mut SqliteConnection, id: &str) -> Result<Option<Incident>> {
    let row = sqlx::query("SELECT * FROM incidents WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let log_rows = sqlx::query("SELECT * FROM incident_log WHERE incident_id = ? ORDER BY position")
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

    let log = log_rows
        .iter()
        .map(log_entry_from_row)
        .collect::<Result<Vec<_>>>()?;

    incident_from_row(&row, log).map(Some)
}

async fn append_log_entries(
    conn: &mut SqliteConnection,
    incident_id: &str,
    entries: &[LogEntry],
    first_position: usize,
) -> Result<()> {
    for (offset, entry) in entries.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO incident_log (incident_id, position, actor, message, ts)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(incident_id)
        .bind((first_position + offset) as i64)
        .bind(entry.actor.encode())
        .bind(&entry.message)
        .bind(entry.timestamp.timestamp_millis())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn corrupt(column: &str, value: &str) -> Error {
    Error::Storage(sqlx::Error::Decode(
        format!("unexpected {} value '{}'", column, value).into(),
    ))
}

fn timestamp(column: &str, millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| corrupt(column, &millis.to_string()))
}

fn tourist_from_row(row: &SqliteRow) -> Result<TouristTelemetrySnapshot> {
    let battery: i64 = row.get("battery_level");
    let signal: String = row.get("signal");

    Ok(TouristTelemetrySnapshot {
        id: row.get("id"),
        name: row.get("name"),
        battery_level: u8::try_from(battery)
            .map_err(|_| corrupt("battery_level", &battery.to_string()))?,
        signal: SignalQuality::parse(&signal).ok_or_else(|| corrupt("signal", &signal))?,
        near_high_risk_zone: row.get("near_high_risk_zone"),
        hiking_after_sunset: row.get("hiking_after_sunset"),
        deviated_from_itinerary: row.get("deviated_from_itinerary"),
    })
}

fn zone_from_row(row: &SqliteRow) -> Result<GeoFence> {
    let zone_type: String = row.get("zone_type");
    let severity: String = row.get("severity");
    let positions: String = row.get("positions");

    Ok(GeoFence {
        id: row.get("id"),
        name: row.get("name"),
        zone_type: ZoneType::parse(&zone_type).ok_or_else(|| corrupt("zone_type", &zone_type))?,
        severity: Severity::from_key(&severity).ok_or_else(|| corrupt("severity", &severity))?,
        alert_message: row.get("alert_message"),
        positions: serde_json::from_str(&positions)
            .map_err(|_| corrupt("positions", &positions))?,
        created_by: row.get("created_by"),
        last_modified: timestamp("modified_ts", row.get("modified_ts"))?,
    })
}

fn log_entry_from_row(row: &SqliteRow) -> Result<LogEntry> {
    let actor: String = row.get("actor");
    Ok(LogEntry {
        actor: Actor::decode(&actor).ok_or_else(|| corrupt("actor", &actor))?,
        message: row.get("message"),
        timestamp: timestamp("ts", row.get("ts"))?,
    })
}

fn incident_from_row(row: &SqliteRow, log: Vec<LogEntry>) -> Result<Incident> {
    let alert_type: String = row.get("alert_type");
    let severity: String = row.get("severity");
    let status: String = row.get("status");
    let stage: String = row.get("stage");

    Ok(Incident {
        id: row.get("id"),
        tourist_id: row.get("tourist_id"),
        tourist_name: row.get("tourist_name"),
        alert_type: AlertType::from_key(&alert_type)
            .ok_or_else(|| corrupt("alert_type", &alert_type))?,
        severity: Severity::from_key(&severity).ok_or_else(|| corrupt("severity", &severity))?,
        location: row.get("location"),
        details: row.get("details"),
        created_at: timestamp("created_ts", row.get("created_ts"))?,
        status: BoardStatus::from_key(&status).ok_or_else(|| corrupt("status", &status))?,
        stage: ResponseStage::from_key(&stage).ok_or_else(|| corrupt("stage", &stage))?,
        assigned_team: row.get("assigned_team"),
        log,
    })
}
