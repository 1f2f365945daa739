use crate::error::{PipelineError, Result};
use crate::pipeline::dedupe::duplicate_groups;
use crate::pipeline::merge::merge_group;
use crate::storage::{EventFilter, EventStore};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// What happened to a group member during a merge pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MergeAction {
    Absorbed,
    SkippedStale,
}

/// A merge pass run record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRun {
    pub id: Option<Uuid>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A record of one decision made during a merge pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRecord {
    pub id: Option<Uuid>,
    pub merge_run_id: Uuid,
    pub fingerprint_signature: String,
    pub action: MergeAction,
    pub change_log: String,
    pub primary_event_id: Option<Uuid>,
    pub absorbed_event_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl MergeRun {
    pub fn new(name: String) -> Self {
        Self {
            id: None,
            name,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Mark the run as finished
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

impl MergeRecord {
    pub fn new(
        merge_run_id: Uuid,
        fingerprint_signature: String,
        action: MergeAction,
        change_log: String,
    ) -> Self {
        Self {
            id: None,
            merge_run_id,
            fingerprint_signature,
            action,
            change_log,
            primary_event_id: None,
            absorbed_event_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_primary(mut self, event_id: Uuid) -> Self {
        self.primary_event_id = Some(event_id);
        self
    }

    pub fn with_absorbed(mut self, event_id: Uuid) -> Self {
        self.absorbed_event_id = Some(event_id);
        self
    }
}

/// Totals from one merge pass
#[derive(Debug, Clone, Default)]
pub struct MergeSummary {
    /// False when the pass was skipped because another one was in flight
    pub ran: bool,
    pub groups_found: usize,
    pub groups_merged: usize,
    pub events_absorbed: usize,
    pub skipped_stale: usize,
}

impl MergeSummary {
    fn skipped() -> Self {
        Self::default()
    }
}

/// Periodic duplicate-grouping and merge pass over the store.
///
/// Safe to run alongside fresh upserts landing under different URLs; a
/// member re-ingested between grouping and merging is detected by its
/// advanced `updated_at` and left alone until the next pass. The pass
/// itself is single-flight.
pub struct Curator {
    store: Arc<dyn EventStore>,
    in_flight: AtomicBool,
}

impl std::fmt::Debug for Curator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Curator")
            .field("store", &"<Arc<dyn EventStore>>")
            .finish()
    }
}

impl Curator {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            in_flight: AtomicBool::new(false),
        }
    }

    pub async fn run(&self) -> Result<MergeSummary> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            warn!("Merge pass already in flight, skipping");
            return Ok(MergeSummary::skipped());
        }
        let result = self.run_inner().await;
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    #[instrument(skip(self))]
    async fn run_inner(&self) -> Result<MergeSummary> {
        let started = std::time::Instant::now();
        let mut run = MergeRun::new(format!(
            "Merge pass - {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        ));
        self.store.create_merge_run(&mut run).await?;
        let run_id = run.id.ok_or_else(|| PipelineError::Storage {
            message: "Merge run was not assigned an id".to_string(),
        })?;

        info!(run_id = %run_id, "Starting merge pass");
        counter!("sve_merge_passes_total").increment(1);

        let mut events = self.store.list_events(&EventFilter::default()).await?;
        // Stable primary selection needs a stable grouping order across runs
        events.sort_by_key(|e| e.event_id);

        let groups = duplicate_groups(events);
        let mut summary = MergeSummary {
            ran: true,
            groups_found: groups.len(),
            ..Default::default()
        };
        info!("Found {} duplicate groups", groups.len());

        for (fingerprint, group) in groups {
            let signature = fingerprint.signature();

            // Re-read every member right before acting on it; anything
            // re-ingested since grouping sits this pass out.
            let mut fresh = Vec::with_capacity(group.len());
            for member in &group {
                let Some(member_id) = member.event_id else {
                    continue;
                };
                match self.store.get_event(member_id).await? {
                    Some(current) if current.updated_at > member.updated_at => {
                        summary.skipped_stale += 1;
                        debug!(event_id = %member_id, "Group member changed since grouping, deferring");
                        let mut record = MergeRecord::new(
                            run_id,
                            signature.clone(),
                            MergeAction::SkippedStale,
                            format!("member updated since grouping: {}", current.origin_url),
                        )
                        .with_absorbed(member_id);
                        self.store.create_merge_record(&mut record).await?;
                    }
                    Some(current) => fresh.push(current),
                    None => {
                        debug!(event_id = %member_id, "Group member already deleted, skipping");
                    }
                }
            }
            if fresh.len() < 2 {
                continue;
            }

            let Some(outcome) = merge_group(fresh, Utc::now()) else {
                continue;
            };
            let primary_id = outcome.primary.event_id;

            info!(
                signature = %signature,
                primary = %outcome.primary.origin_url,
                absorbed = outcome.absorbed.len(),
                changes = ?outcome.changes,
                "Merging duplicate group"
            );

            // Persist the enriched primary before removing its duplicates,
            // so an interrupted pass never loses backfilled information.
            self.store.upsert_event(outcome.primary).await?;

            for absorbed in &outcome.absorbed {
                let Some(absorbed_id) = absorbed.event_id else {
                    continue;
                };
                self.store.delete_event(absorbed_id).await?;
                summary.events_absorbed += 1;

                let mut record = MergeRecord::new(
                    run_id,
                    signature.clone(),
                    MergeAction::Absorbed,
                    format!("absorbed {}", absorbed.origin_url),
                )
                .with_absorbed(absorbed_id);
                if let Some(primary_id) = primary_id {
                    record = record.with_primary(primary_id);
                }
                self.store.create_merge_record(&mut record).await?;
            }
            summary.groups_merged += 1;
        }

        run.finish();
        self.store.update_merge_run(&run).await?;

        counter!("sve_merge_events_absorbed_total").increment(summary.events_absorbed as u64);
        histogram!("sve_merge_pass_duration_seconds").record(started.elapsed().as_secs_f64());
        info!(
            run_id = %run_id,
            groups_merged = summary.groups_merged,
            events_absorbed = summary.events_absorbed,
            skipped_stale = summary.skipped_stale,
            "Finished merge pass"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize::FieldNormalizer;
    use crate::storage::InMemoryEventStore;
    use crate::types::RawEventRecord;

    fn raw(source: &str, title: &str, url: &str, start: &str, location: &str) -> RawEventRecord {
        RawEventRecord {
            source_name: source.to_string(),
            title: title.to_string(),
            location_text: location.to_string(),
            start_text: Some(start.to_string()),
            origin_url: url.to_string(),
            ..Default::default()
        }
    }

    async fn seed(store: &InMemoryEventStore, record: RawEventRecord) {
        let normalizer = FieldNormalizer::new();
        let event = normalizer.normalize(&record, Utc::now());
        store.upsert_event(event).await.unwrap();
    }

    #[tokio::test]
    async fn merge_pass_absorbs_cross_source_duplicates() {
        let store = Arc::new(InMemoryEventStore::new());
        seed(&store, raw("sourcea", "DevOps Meetup", "u1", "May 10, 2025", "Palo Alto")).await;
        let mut dup = raw("sourceb", "devops meetup", "u2", "2025-05-10", "palo alto");
        dup.description = "Talk on CI/CD".to_string();
        seed(&store, dup).await;
        seed(&store, raw("sourcea", "Rust Workshop", "u3", "May 11, 2025", "San Jose")).await;

        let curator = Curator::new(store.clone());
        let summary = curator.run().await.unwrap();

        assert!(summary.ran);
        assert_eq!(summary.groups_found, 1);
        assert_eq!(summary.groups_merged, 1);
        assert_eq!(summary.events_absorbed, 1);

        let remaining = store.list_events(&EventFilter::default()).await.unwrap();
        assert_eq!(remaining.len(), 2);

        let merged = remaining
            .iter()
            .find(|e| e.name.to_lowercase() == "devops meetup")
            .unwrap();
        assert_eq!(merged.description, "Talk on CI/CD");
        assert!(merged.tags.contains("sourcea"));
        assert!(merged.tags.contains("sourceb"));
    }

    #[tokio::test]
    async fn second_pass_is_a_no_op() {
        let store = Arc::new(InMemoryEventStore::new());
        seed(&store, raw("sourcea", "AI Night", "u1", "May 10, 2025", "SF")).await;
        seed(&store, raw("sourceb", "ai night", "u2", "May 10, 2025", "sf")).await;

        let curator = Curator::new(store.clone());
        let first = curator.run().await.unwrap();
        assert_eq!(first.events_absorbed, 1);

        let second = curator.run().await.unwrap();
        assert_eq!(second.groups_found, 0);
        assert_eq!(second.events_absorbed, 0);
    }
}
