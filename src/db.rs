use crate::curator::{MergeAction, MergeRecord, MergeRun};
use crate::domain::{AnnotationRequest, CanonicalEvent, EventAnnotation};
use crate::error::{PipelineError, Result};
use crate::storage::{EventFilter, EventStore, UpsertOutcome};
use crate::types::ChangeType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database};
use std::collections::BTreeSet;
use std::env;
use tracing::{debug, info};
use uuid::Uuid;

fn storage_err(context: &str, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Storage {
        message: format!("{context}: {e}"),
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| storage_err("Failed to parse stored timestamp", e))
}

fn parse_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| storage_err("Failed to parse stored id", e))
}

fn action_as_str(action: &MergeAction) -> &'static str {
    match action {
        MergeAction::Absorbed => "absorbed",
        MergeAction::SkippedStale => "skipped_stale",
    }
}

/// Turso/libSQL-backed event store.
pub struct LibsqlEventStore {
    db: Database,
}

impl LibsqlEventStore {
    /// Connect using `LIBSQL_URL` / `LIBSQL_AUTH_TOKEN` and run migrations.
    pub async fn connect() -> Result<Self> {
        let url = env::var("LIBSQL_URL").map_err(|_| PipelineError::Storage {
            message: "LIBSQL_URL environment variable not set".to_string(),
        })?;
        let auth_token = env::var("LIBSQL_AUTH_TOKEN").map_err(|_| PipelineError::Storage {
            message: "LIBSQL_AUTH_TOKEN environment variable not set".to_string(),
        })?;

        info!("Connecting to Turso database at {}", url);

        let db = Builder::new_remote(url, auth_token)
            .build()
            .await
            .map_err(|e| storage_err("Failed to connect to database", e))?;

        let store = Self { db };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn get_connection(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| storage_err("Failed to get database connection", e))
    }

    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");
        let conn = self.get_connection().await?;
        let migration_sql = include_str!("../migrations/001_create_events.sql");
        conn.execute_batch(migration_sql)
            .await
            .map_err(|e| storage_err("Failed to run migrations", e))?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    fn event_from_row(row: &libsql::Row) -> Result<CanonicalEvent> {
        let event_id: String = row
            .get(0)
            .map_err(|e| storage_err("Failed to get event_id", e))?;
        let name: String = row.get(1).map_err(|e| storage_err("Failed to get name", e))?;
        let description: String = row
            .get(2)
            .map_err(|e| storage_err("Failed to get description", e))?;
        let location_text: String = row
            .get(3)
            .map_err(|e| storage_err("Failed to get location_text", e))?;
        let location_lat: Option<f64> = row.get(4).ok();
        let location_lon: Option<f64> = row.get(5).ok();
        let organizer: String = row
            .get(6)
            .map_err(|e| storage_err("Failed to get organizer", e))?;
        let start_at: String = row
            .get(7)
            .map_err(|e| storage_err("Failed to get start_at", e))?;
        let end_at: String = row
            .get(8)
            .map_err(|e| storage_err("Failed to get end_at", e))?;
        let end_is_estimated: i64 = row
            .get(9)
            .map_err(|e| storage_err("Failed to get end_is_estimated", e))?;
        let is_virtual: i64 = row
            .get(10)
            .map_err(|e| storage_err("Failed to get is_virtual", e))?;
        let origin_url: String = row
            .get(11)
            .map_err(|e| storage_err("Failed to get origin_url", e))?;
        let source_name: String = row
            .get(12)
            .map_err(|e| storage_err("Failed to get source_name", e))?;
        let tags_json: String = row.get(13).map_err(|e| storage_err("Failed to get tags", e))?;
        let created_at: String = row
            .get(14)
            .map_err(|e| storage_err("Failed to get created_at", e))?;
        let updated_at: String = row
            .get(15)
            .map_err(|e| storage_err("Failed to get updated_at", e))?;

        let tags: BTreeSet<String> = serde_json::from_str(&tags_json)?;

        Ok(CanonicalEvent {
            event_id: Some(parse_uuid(&event_id)?),
            name,
            description,
            location_text,
            location_lat,
            location_lon,
            organizer,
            start_at: parse_timestamp(&start_at)?,
            end_at: parse_timestamp(&end_at)?,
            end_is_estimated: end_is_estimated != 0,
            is_virtual: is_virtual != 0,
            origin_url,
            source_name,
            tags,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

const EVENT_COLUMNS: &str = "event_id, name, description, location_text, location_lat, \
     location_lon, organizer, start_at, end_at, end_is_estimated, is_virtual, origin_url, \
     source_name, tags, created_at, updated_at";

#[async_trait]
impl EventStore for LibsqlEventStore {
    async fn upsert_event(&self, event: CanonicalEvent) -> Result<UpsertOutcome> {
        let conn = self.get_connection().await?;
        let now = Utc::now();

        // Existing identity is read up front only to report Created vs
        // Updated; the write below is a single atomic upsert either way.
        let mut rows = conn
            .query(
                "SELECT event_id, created_at FROM events WHERE origin_url = ?1",
                libsql::params![event.origin_url.clone()],
            )
            .await
            .map_err(|e| storage_err("Failed to query existing event", e))?;
        let existing = match rows
            .next()
            .await
            .map_err(|e| storage_err("Failed to read row", e))?
        {
            Some(row) => {
                let id: String = row
                    .get(0)
                    .map_err(|e| storage_err("Failed to get event_id", e))?;
                let created_at: String = row
                    .get(1)
                    .map_err(|e| storage_err("Failed to get created_at", e))?;
                Some((parse_uuid(&id)?, parse_timestamp(&created_at)?))
            }
            None => None,
        };

        let (event_id, created_at, change) = match existing {
            Some((id, created_at)) => (id, created_at, ChangeType::Updated),
            None => (Uuid::new_v4(), now, ChangeType::Created),
        };

        let tags_json = serde_json::to_string(&event.tags)?;
        conn.execute(
            "INSERT INTO events (event_id, name, description, location_text, location_lat, \
             location_lon, organizer, start_at, end_at, end_is_estimated, is_virtual, \
             origin_url, source_name, tags, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16) \
             ON CONFLICT(origin_url) DO UPDATE SET \
             name = excluded.name, description = excluded.description, \
             location_text = excluded.location_text, location_lat = excluded.location_lat, \
             location_lon = excluded.location_lon, organizer = excluded.organizer, \
             start_at = excluded.start_at, end_at = excluded.end_at, \
             end_is_estimated = excluded.end_is_estimated, is_virtual = excluded.is_virtual, \
             source_name = excluded.source_name, tags = excluded.tags, \
             updated_at = excluded.updated_at",
            libsql::params![
                event_id.to_string(),
                event.name.clone(),
                event.description.clone(),
                event.location_text.clone(),
                event.location_lat,
                event.location_lon,
                event.organizer.clone(),
                event.start_at.to_rfc3339(),
                event.end_at.to_rfc3339(),
                event.end_is_estimated as i64,
                event.is_virtual as i64,
                event.origin_url.clone(),
                event.source_name.clone(),
                tags_json,
                created_at.to_rfc3339(),
                now.to_rfc3339()
            ],
        )
        .await
        .map_err(|e| storage_err("Failed to upsert event", e))?;

        debug!("Upserted event {} ({:?})", event.origin_url, change);

        let mut stored = event;
        stored.event_id = Some(event_id);
        stored.created_at = created_at;
        stored.updated_at = now;
        Ok(UpsertOutcome {
            event: stored,
            change,
        })
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<CanonicalEvent>> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE event_id = ?1"),
                libsql::params![event_id.to_string()],
            )
            .await
            .map_err(|e| storage_err("Failed to query event", e))?;

        match rows
            .next()
            .await
            .map_err(|e| storage_err("Failed to read row", e))?
        {
            Some(row) => Ok(Some(Self::event_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_event_by_origin_url(&self, origin_url: &str) -> Result<Option<CanonicalEvent>> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE origin_url = ?1"),
                libsql::params![origin_url],
            )
            .await
            .map_err(|e| storage_err("Failed to query event", e))?;

        match rows
            .next()
            .await
            .map_err(|e| storage_err("Failed to read row", e))?
        {
            Some(row) => Ok(Some(Self::event_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<CanonicalEvent>> {
        let conn = self.get_connection().await?;

        let starts_after = filter.starts_after.map(|ts| ts.to_rfc3339());
        let starts_before = filter.starts_before.map(|ts| ts.to_rfc3339());
        let text = filter.text.as_ref().map(|t| format!("%{}%", t.to_lowercase()));
        let location = filter
            .location
            .as_ref()
            .map(|l| format!("%{}%", l.to_lowercase()));

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM events \
                     WHERE (?1 IS NULL OR start_at >= ?1) \
                     AND (?2 IS NULL OR start_at <= ?2) \
                     AND (?3 IS NULL OR lower(name) LIKE ?3 OR lower(description) LIKE ?3) \
                     AND (?4 IS NULL OR lower(location_text) LIKE ?4) \
                     ORDER BY start_at, event_id"
                ),
                libsql::params![starts_after, starts_before, text, location],
            )
            .await
            .map_err(|e| storage_err("Failed to query events", e))?;

        let mut events = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| storage_err("Failed to read row", e))?
        {
            events.push(Self::event_from_row(&row)?);
        }
        Ok(events)
    }

    async fn delete_event(&self, event_id: Uuid) -> Result<bool> {
        let conn = self.get_connection().await?;
        let changed = conn
            .execute(
                "DELETE FROM events WHERE event_id = ?1",
                libsql::params![event_id.to_string()],
            )
            .await
            .map_err(|e| storage_err("Failed to delete event", e))?;
        Ok(changed > 0)
    }

    async fn events_pending_annotation(&self) -> Result<Vec<AnnotationRequest>> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query(
                "SELECT e.event_id, e.name, e.description, e.organizer FROM events e \
                 LEFT JOIN annotations a ON a.event_id = e.event_id \
                 WHERE a.event_id IS NULL ORDER BY e.event_id",
                libsql::params![],
            )
            .await
            .map_err(|e| storage_err("Failed to query pending annotations", e))?;

        let mut pending = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| storage_err("Failed to read row", e))?
        {
            let event_id: String = row
                .get(0)
                .map_err(|e| storage_err("Failed to get event_id", e))?;
            let name: String = row.get(1).map_err(|e| storage_err("Failed to get name", e))?;
            let description: String = row
                .get(2)
                .map_err(|e| storage_err("Failed to get description", e))?;
            let organizer: String = row
                .get(3)
                .map_err(|e| storage_err("Failed to get organizer", e))?;
            pending.push(AnnotationRequest {
                event_id: parse_uuid(&event_id)?,
                name,
                description,
                organizer,
            });
        }
        Ok(pending)
    }

    async fn set_annotation(&self, event_id: Uuid, annotation: EventAnnotation) -> Result<()> {
        let conn = self.get_connection().await?;
        conn.execute(
            "INSERT OR REPLACE INTO annotations (event_id, category, summary, model, annotated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            libsql::params![
                event_id.to_string(),
                annotation.category,
                annotation.summary,
                annotation.model,
                annotation.annotated_at.to_rfc3339()
            ],
        )
        .await
        .map_err(|e| storage_err("Failed to upsert annotation", e))?;
        Ok(())
    }

    async fn create_merge_run(&self, run: &mut MergeRun) -> Result<()> {
        let id = Uuid::new_v4();
        run.id = Some(id);

        let conn = self.get_connection().await?;
        conn.execute(
            "INSERT INTO merge_runs (id, name, created_at, finished_at) VALUES (?1, ?2, ?3, ?4)",
            libsql::params![
                id.to_string(),
                run.name.clone(),
                run.created_at.to_rfc3339(),
                run.finished_at.map(|ts| ts.to_rfc3339())
            ],
        )
        .await
        .map_err(|e| storage_err("Failed to create merge run", e))?;
        Ok(())
    }

    async fn update_merge_run(&self, run: &MergeRun) -> Result<()> {
        let Some(id) = run.id else {
            return Err(PipelineError::Storage {
                message: "Cannot update merge run without id".to_string(),
            });
        };

        let conn = self.get_connection().await?;
        conn.execute(
            "UPDATE merge_runs SET name = ?2, finished_at = ?3 WHERE id = ?1",
            libsql::params![
                id.to_string(),
                run.name.clone(),
                run.finished_at.map(|ts| ts.to_rfc3339())
            ],
        )
        .await
        .map_err(|e| storage_err("Failed to update merge run", e))?;
        Ok(())
    }

    async fn create_merge_record(&self, record: &mut MergeRecord) -> Result<()> {
        let id = Uuid::new_v4();
        record.id = Some(id);

        let conn = self.get_connection().await?;
        conn.execute(
            "INSERT INTO merge_records (id, merge_run_id, fingerprint_signature, action, \
             change_log, primary_event_id, absorbed_event_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            libsql::params![
                id.to_string(),
                record.merge_run_id.to_string(),
                record.fingerprint_signature.clone(),
                action_as_str(&record.action),
                record.change_log.clone(),
                record.primary_event_id.map(|p| p.to_string()),
                record.absorbed_event_id.map(|a| a.to_string()),
                record.created_at.to_rfc3339()
            ],
        )
        .await
        .map_err(|e| storage_err("Failed to create merge record", e))?;
        Ok(())
    }
}
