use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw event data as produced by source adapters, before normalization.
///
/// Every adapter maps its payload into this shape and nothing else; missing
/// values are empty strings or `None` rather than adapter-specific sentinels.
/// Date and time fields stay as the raw text the source published so the
/// resolver can apply its format ladder in one place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEventRecord {
    pub source_name: String,
    pub title: String,
    pub description: String,
    pub location_text: String,
    pub organizer: String,
    pub start_text: Option<String>,
    pub end_text: Option<String>,
    /// Natural key of the listing; globally unique per posting.
    pub origin_url: String,
    pub is_virtual_hint: Option<bool>,
    pub tags: Vec<String>,
}

/// Types of changes that can occur during persistence
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeType {
    Created,
    Updated,
}

/// Core trait that all event data sources must implement
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Unique identifier for this source adapter
    fn source_name(&self) -> &'static str;

    /// Fetch raw event listings starting inside the given window
    async fn fetch_events(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<RawEventRecord>>;
}
