use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A canonical event in the store.
///
/// Created by `FieldNormalizer::normalize`, persisted through the
/// `EventStore` keyed by `origin_url`. `event_id` is assigned by the store
/// on first insert and never reassigned afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub event_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub location_text: String,
    pub location_lat: Option<f64>,
    pub location_lon: Option<f64>,
    pub organizer: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    /// True when `end_at` is the start-plus-two-hours fallback rather than
    /// an end time the source actually published. Merge backfill replaces
    /// estimated ends with explicit ones, never the other way around.
    pub end_is_estimated: bool,
    pub is_virtual: bool,
    pub origin_url: String,
    pub source_name: String,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// LLM-produced categorization attached to an event after ingestion.
/// The annotation layer is an external collaborator; the store only holds
/// its results and surfaces which events still lack one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAnnotation {
    pub category: Option<String>,
    pub summary: Option<String>,
    pub model: Option<String>,
    pub annotated_at: DateTime<Utc>,
}

/// The triple handed to the annotation layer for an unannotated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationRequest {
    pub event_id: Uuid,
    pub name: String,
    pub description: String,
    pub organizer: String,
}
