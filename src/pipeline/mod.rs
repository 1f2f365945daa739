pub mod dates;
pub mod dedupe;
pub mod merge;
pub mod normalize;

use crate::error::Result;
use crate::pipeline::normalize::FieldNormalizer;
use crate::storage::EventStore;
use crate::types::{ChangeType, EventSource};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Result of a complete ingestion run for one source
#[derive(Debug, Serialize)]
pub struct IngestResult {
    pub source_name: String,
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

pub struct Pipeline;

impl Pipeline {
    /// Run the ingestion pipeline for one source: fetch raw records,
    /// normalize each, and upsert into the store keyed by origin URL.
    ///
    /// Normalization is total — malformed fields degrade to defaults — so
    /// the only errors leaving here are adapter transport failures and
    /// store I/O failures.
    #[instrument(skip(source, store), fields(source = %source.source_name()))]
    pub async fn run_for_source(
        source: &dyn EventSource,
        store: Arc<dyn EventStore>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<IngestResult> {
        let source_name = source.source_name().to_string();
        counter!("sve_ingest_runs_total", "source" => source_name.clone()).increment(1);

        let fetch_started = std::time::Instant::now();
        let raw_records = source.fetch_events(window_start, window_end).await?;
        histogram!("sve_fetch_events_duration_seconds", "source" => source_name.clone())
            .record(fetch_started.elapsed().as_secs_f64());
        info!("Fetched {} raw records", raw_records.len());

        let normalizer = FieldNormalizer::new();
        let mut created = 0usize;
        let mut updated = 0usize;
        let mut skipped = 0usize;

        for raw in &raw_records {
            // Without an origin URL there is no upsert identity to key on.
            if raw.origin_url.trim().is_empty() {
                warn!(title = %raw.title, "Record missing origin_url, skipping");
                skipped += 1;
                continue;
            }

            let event = normalizer.normalize(raw, Utc::now());
            let outcome = store.upsert_event(event).await?;
            match outcome.change {
                ChangeType::Created => created += 1,
                ChangeType::Updated => updated += 1,
            }
        }

        counter!("sve_events_created_total", "source" => source_name.clone())
            .increment(created as u64);
        counter!("sve_events_updated_total", "source" => source_name.clone())
            .increment(updated as u64);
        counter!("sve_events_skipped_total", "source" => source_name.clone())
            .increment(skipped as u64);

        info!(
            created,
            updated, skipped, "Finished ingestion for {}", source_name
        );

        Ok(IngestResult {
            source_name,
            fetched: raw_records.len(),
            created,
            updated,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StaticSource;
    use crate::storage::{EventFilter, InMemoryEventStore};
    use crate::types::RawEventRecord;

    #[tokio::test]
    async fn reingestion_updates_rather_than_duplicates() {
        let record = RawEventRecord {
            source_name: "meetup".to_string(),
            title: "Rust Meetup".to_string(),
            start_text: Some("2025-05-10 18:00:00".to_string()),
            origin_url: "https://example.com/e/1".to_string(),
            ..Default::default()
        };
        let source = StaticSource::new("meetup", vec![record]);
        let store = Arc::new(InMemoryEventStore::new());
        let window_start = Utc::now();
        let window_end = window_start + chrono::Duration::days(30);

        let first = Pipeline::run_for_source(&source, store.clone(), window_start, window_end)
            .await
            .unwrap();
        assert_eq!(first.created, 1);
        assert_eq!(first.updated, 0);

        let second = Pipeline::run_for_source(&source, store.clone(), window_start, window_end)
            .await
            .unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 1);

        let all = store.list_events(&EventFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn records_without_origin_url_are_skipped() {
        let record = RawEventRecord {
            source_name: "meetup".to_string(),
            title: "Mystery Event".to_string(),
            ..Default::default()
        };
        let source = StaticSource::new("meetup", vec![record]);
        let store = Arc::new(InMemoryEventStore::new());

        let result = Pipeline::run_for_source(
            &source,
            store.clone(),
            Utc::now(),
            Utc::now() + chrono::Duration::days(30),
        )
        .await
        .unwrap();
        assert_eq!(result.skipped, 1);
        assert_eq!(result.created, 0);
        assert!(store
            .list_events(&EventFilter::default())
            .await
            .unwrap()
            .is_empty());
    }
}
