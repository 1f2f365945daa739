use crate::curator::{MergeRecord, MergeRun};
use crate::domain::{AnnotationRequest, CanonicalEvent, EventAnnotation};
use crate::error::Result;
use crate::types::ChangeType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Read-side filter for the serving layer: date range on `start_at`,
/// free-text match on name/description, location substring.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub starts_after: Option<DateTime<Utc>>,
    pub starts_before: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub location: Option<String>,
}

/// What an upsert did, alongside the stored row.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub event: CanonicalEvent,
    pub change: ChangeType,
}

/// Storage trait for canonical events and merge-pass audit records.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert-or-update keyed by `origin_url`, atomic per URL.
    ///
    /// A fresh URL gets an `event_id` and `created_at = updated_at = now`.
    /// A known URL has all normalized fields replaced with the incoming
    /// values (re-scrape refresh, last-write-wins) while `event_id` and
    /// `created_at` are preserved and `updated_at` moves to now.
    async fn upsert_event(&self, event: CanonicalEvent) -> Result<UpsertOutcome>;
    async fn get_event(&self, event_id: Uuid) -> Result<Option<CanonicalEvent>>;
    async fn get_event_by_origin_url(&self, origin_url: &str) -> Result<Option<CanonicalEvent>>;
    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<CanonicalEvent>>;
    /// Remove a row; used by the merge pass for absorbed duplicates.
    async fn delete_event(&self, event_id: Uuid) -> Result<bool>;

    // Annotation feed for the external categorization layer
    async fn events_pending_annotation(&self) -> Result<Vec<AnnotationRequest>>;
    async fn set_annotation(&self, event_id: Uuid, annotation: EventAnnotation) -> Result<()>;

    // Merge pass audit trail
    async fn create_merge_run(&self, run: &mut MergeRun) -> Result<()>;
    async fn update_merge_run(&self, run: &MergeRun) -> Result<()>;
    async fn create_merge_record(&self, record: &mut MergeRecord) -> Result<()>;
}

#[derive(Default)]
struct StoreInner {
    events: HashMap<Uuid, CanonicalEvent>,
    by_origin_url: HashMap<String, Uuid>,
    annotations: HashMap<Uuid, EventAnnotation>,
    merge_runs: HashMap<Uuid, MergeRun>,
    merge_records: HashMap<Uuid, MergeRecord>,
}

/// In-memory store for development and testing.
///
/// One mutex guards all maps, so the check-then-write inside
/// `upsert_event` is atomic with respect to concurrent ingestion of the
/// same URL.
#[derive(Default)]
pub struct InMemoryEventStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn upsert_event(&self, event: CanonicalEvent) -> Result<UpsertOutcome> {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();

        if let Some(&id) = inner.by_origin_url.get(&event.origin_url) {
            let created_at = inner
                .events
                .get(&id)
                .map(|existing| existing.created_at)
                .unwrap_or(now);
            let mut updated = event;
            updated.event_id = Some(id);
            updated.created_at = created_at;
            updated.updated_at = now;
            inner.events.insert(id, updated.clone());

            debug!("Updated event: {} with id {}", updated.name, id);
            Ok(UpsertOutcome {
                event: updated,
                change: ChangeType::Updated,
            })
        } else {
            let id = Uuid::new_v4();
            let mut created = event;
            created.event_id = Some(id);
            created.created_at = now;
            created.updated_at = now;
            inner.by_origin_url.insert(created.origin_url.clone(), id);
            inner.events.insert(id, created.clone());

            debug!("Created event: {} with id {}", created.name, id);
            Ok(UpsertOutcome {
                event: created,
                change: ChangeType::Created,
            })
        }
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<CanonicalEvent>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.events.get(&event_id).cloned())
    }

    async fn get_event_by_origin_url(&self, origin_url: &str) -> Result<Option<CanonicalEvent>> {
        let inner = self.inner.lock().unwrap();
        let event = inner
            .by_origin_url
            .get(origin_url)
            .and_then(|id| inner.events.get(id))
            .cloned();
        Ok(event)
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<CanonicalEvent>> {
        let inner = self.inner.lock().unwrap();
        let text = filter.text.as_ref().map(|t| t.to_lowercase());
        let location = filter.location.as_ref().map(|l| l.to_lowercase());

        let mut events: Vec<CanonicalEvent> = inner
            .events
            .values()
            .filter(|e| filter.starts_after.map_or(true, |after| e.start_at >= after))
            .filter(|e| filter.starts_before.map_or(true, |before| e.start_at <= before))
            .filter(|e| {
                text.as_ref().map_or(true, |t| {
                    e.name.to_lowercase().contains(t) || e.description.to_lowercase().contains(t)
                })
            })
            .filter(|e| {
                location
                    .as_ref()
                    .map_or(true, |l| e.location_text.to_lowercase().contains(l))
            })
            .cloned()
            .collect();

        events.sort_by_key(|e| (e.start_at, e.event_id));
        Ok(events)
    }

    async fn delete_event(&self, event_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.events.remove(&event_id) {
            Some(event) => {
                inner.by_origin_url.remove(&event.origin_url);
                inner.annotations.remove(&event_id);
                debug!("Deleted event: {} with id {}", event.name, event_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn events_pending_annotation(&self) -> Result<Vec<AnnotationRequest>> {
        let inner = self.inner.lock().unwrap();
        let mut pending: Vec<AnnotationRequest> = inner
            .events
            .values()
            .filter(|e| e.event_id.map_or(false, |id| !inner.annotations.contains_key(&id)))
            .filter_map(|e| {
                e.event_id.map(|event_id| AnnotationRequest {
                    event_id,
                    name: e.name.clone(),
                    description: e.description.clone(),
                    organizer: e.organizer.clone(),
                })
            })
            .collect();
        pending.sort_by_key(|r| r.event_id);
        Ok(pending)
    }

    async fn set_annotation(&self, event_id: Uuid, annotation: EventAnnotation) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.annotations.insert(event_id, annotation);
        Ok(())
    }

    async fn create_merge_run(&self, run: &mut MergeRun) -> Result<()> {
        let id = Uuid::new_v4();
        run.id = Some(id);

        let mut inner = self.inner.lock().unwrap();
        inner.merge_runs.insert(id, run.clone());

        debug!("Created merge run: {} with id {}", run.name, id);
        Ok(())
    }

    async fn update_merge_run(&self, run: &MergeRun) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(id) = run.id {
            inner.merge_runs.insert(id, run.clone());
            debug!("Updated merge run: {} with id {}", run.name, id);
        }
        Ok(())
    }

    async fn create_merge_record(&self, record: &mut MergeRecord) -> Result<()> {
        let id = Uuid::new_v4();
        record.id = Some(id);

        let mut inner = self.inner.lock().unwrap();
        inner.merge_records.insert(id, record.clone());

        debug!("Created merge record with id {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn event(url: &str, name: &str) -> CanonicalEvent {
        let start_at = Utc.with_ymd_and_hms(2025, 5, 10, 18, 0, 0).unwrap();
        CanonicalEvent {
            event_id: None,
            name: name.to_string(),
            description: String::new(),
            location_text: "Palo Alto".to_string(),
            location_lat: None,
            location_lon: None,
            organizer: String::new(),
            start_at,
            end_at: start_at + chrono::Duration::hours(2),
            end_is_estimated: true,
            is_virtual: false,
            origin_url: url.to_string(),
            source_name: "meetup".to_string(),
            tags: BTreeSet::new(),
            created_at: start_at,
            updated_at: start_at,
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_per_origin_url() {
        let store = InMemoryEventStore::new();

        let first = store.upsert_event(event("u1", "DevOps Meetup")).await.unwrap();
        assert_eq!(first.change, ChangeType::Created);
        let first_id = first.event.event_id.unwrap();

        let second = store.upsert_event(event("u1", "DevOps Meetup v2")).await.unwrap();
        assert_eq!(second.change, ChangeType::Updated);
        assert_eq!(second.event.event_id, Some(first_id));
        assert_eq!(second.event.created_at, first.event.created_at);
        assert!(second.event.updated_at >= first.event.updated_at);
        assert_eq!(second.event.name, "DevOps Meetup v2");

        let all = store.list_events(&EventFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn delete_clears_url_index() {
        let store = InMemoryEventStore::new();
        let stored = store.upsert_event(event("u1", "AI Night")).await.unwrap();
        let id = stored.event.event_id.unwrap();

        assert!(store.delete_event(id).await.unwrap());
        assert!(store.get_event_by_origin_url("u1").await.unwrap().is_none());

        // URL freed: the next upsert creates a fresh row
        let again = store.upsert_event(event("u1", "AI Night")).await.unwrap();
        assert_eq!(again.change, ChangeType::Created);
        assert_ne!(again.event.event_id, Some(id));
    }

    #[tokio::test]
    async fn list_events_applies_filters() {
        let store = InMemoryEventStore::new();
        store.upsert_event(event("u1", "AI Night")).await.unwrap();
        let mut other = event("u2", "Rust Workshop");
        other.description = "Hands-on borrow checker session".to_string();
        other.location_text = "San Jose".to_string();
        store.upsert_event(other).await.unwrap();

        let by_text = store
            .list_events(&EventFilter {
                text: Some("borrow checker".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_text.len(), 1);
        assert_eq!(by_text[0].name, "Rust Workshop");

        let by_location = store
            .list_events(&EventFilter {
                location: Some("palo".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_location.len(), 1);
        assert_eq!(by_location[0].name, "AI Night");

        let none = store
            .list_events(&EventFilter {
                starts_after: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn annotation_feed_shrinks_as_annotations_land() {
        let store = InMemoryEventStore::new();
        let stored = store.upsert_event(event("u1", "AI Night")).await.unwrap();
        store.upsert_event(event("u2", "Rust Workshop")).await.unwrap();

        let pending = store.events_pending_annotation().await.unwrap();
        assert_eq!(pending.len(), 2);

        store
            .set_annotation(
                stored.event.event_id.unwrap(),
                EventAnnotation {
                    category: Some("ai".to_string()),
                    summary: None,
                    model: Some("gemini".to_string()),
                    annotated_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let pending = store.events_pending_annotation().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "Rust Workshop");
    }
}
