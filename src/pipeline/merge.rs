use chrono::{DateTime, Utc};

use crate::domain::CanonicalEvent;

/// Result of collapsing one duplicate group.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub primary: CanonicalEvent,
    pub absorbed: Vec<CanonicalEvent>,
    /// Human-readable change log, one line per backfilled field.
    pub changes: Vec<String>,
}

/// Collapse a duplicate group into its first member.
///
/// Absorbed members only fill gaps in the primary, never overwrite it, so
/// a merge can add information but not remove any. Callers sort the events
/// by `event_id` before grouping to make the primary choice stable across
/// runs. Returns `None` for an empty group.
pub fn merge_group(group: Vec<CanonicalEvent>, now: DateTime<Utc>) -> Option<MergeOutcome> {
    let mut members = group.into_iter();
    let mut primary = members.next()?;
    let absorbed: Vec<CanonicalEvent> = members.collect();
    let mut changes = Vec::new();

    for other in &absorbed {
        if primary.description.is_empty() && !other.description.is_empty() {
            primary.description = other.description.clone();
            changes.push(format!("description filled from {}", other.origin_url));
        }

        // Estimated ends yield to a published one; the end must still land
        // after the primary's start.
        if primary.end_is_estimated && !other.end_is_estimated && other.end_at > primary.start_at {
            primary.end_at = other.end_at;
            primary.end_is_estimated = false;
            changes.push(format!("end time filled from {}", other.origin_url));
        }

        if primary.location_lat.is_none()
            && primary.location_lon.is_none()
            && other.location_lat.is_some()
            && other.location_lon.is_some()
        {
            primary.location_lat = other.location_lat;
            primary.location_lon = other.location_lon;
            changes.push(format!("coordinates filled from {}", other.origin_url));
        }

        // Tags accumulate regardless of what the primary already carries.
        let before = primary.tags.len();
        primary.tags.extend(other.tags.iter().cloned());
        if primary.tags.len() > before {
            changes.push(format!("tags merged from {}", other.origin_url));
        }
    }

    primary.updated_at = now;
    Some(MergeOutcome {
        primary,
        absorbed,
        changes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn event(url: &str) -> CanonicalEvent {
        let start_at = Utc.with_ymd_and_hms(2025, 5, 10, 18, 0, 0).unwrap();
        CanonicalEvent {
            event_id: None,
            name: "DevOps Meetup".to_string(),
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

    #[test]
    fn empty_description_is_backfilled() {
        let mut other = event("u2");
        other.description = "Talk on CI/CD".to_string();
        let outcome = merge_group(vec![event("u1"), other], now()).unwrap();
        assert_eq!(outcome.primary.description, "Talk on CI/CD");
        assert_eq!(outcome.absorbed.len(), 1);
    }

    #[test]
    fn existing_description_is_never_overwritten() {
        let mut primary = event("u1");
        primary.description = "Original".to_string();
        let mut other = event("u2");
        other.description = "Imposter".to_string();
        let outcome = merge_group(vec![primary, other], now()).unwrap();
        assert_eq!(outcome.primary.description, "Original");
    }

    #[test]
    fn estimated_end_yields_to_explicit_end() {
        let mut other = event("u2");
        other.end_at = Utc.with_ymd_and_hms(2025, 5, 10, 22, 0, 0).unwrap();
        other.end_is_estimated = false;
        let outcome = merge_group(vec![event("u1"), other], now()).unwrap();
        assert_eq!(
            outcome.primary.end_at,
            Utc.with_ymd_and_hms(2025, 5, 10, 22, 0, 0).unwrap()
        );
        assert!(!outcome.primary.end_is_estimated);
    }

    #[test]
    fn explicit_end_is_not_replaced() {
        let mut primary = event("u1");
        primary.end_at = Utc.with_ymd_and_hms(2025, 5, 10, 20, 30, 0).unwrap();
        primary.end_is_estimated = false;
        let mut other = event("u2");
        other.end_at = Utc.with_ymd_and_hms(2025, 5, 10, 23, 0, 0).unwrap();
        other.end_is_estimated = false;
        let outcome = merge_group(vec![primary, other], now()).unwrap();
        assert_eq!(
            outcome.primary.end_at,
            Utc.with_ymd_and_hms(2025, 5, 10, 20, 30, 0).unwrap()
        );
    }

    #[test]
    fn coordinates_fill_only_when_both_sides_complete() {
        let mut other = event("u2");
        other.location_lat = Some(37.4419);
        other.location_lon = Some(-122.143);
        let outcome = merge_group(vec![event("u1"), other], now()).unwrap();
        assert_eq!(outcome.primary.location_lat, Some(37.4419));
        assert_eq!(outcome.primary.location_lon, Some(-122.143));

        let mut half = event("u3");
        half.location_lat = Some(37.0);
        let outcome = merge_group(vec![event("u1"), half], now()).unwrap();
        assert_eq!(outcome.primary.location_lat, None);
    }

    #[test]
    fn tags_union_across_all_members() {
        let mut primary = event("u1");
        primary.tags.insert("sourcea".to_string());
        let mut other = event("u2");
        other.tags.insert("sourceb".to_string());
        other.tags.insert("devops".to_string());
        let outcome = merge_group(vec![primary, other], now()).unwrap();
        assert!(outcome.primary.tags.contains("sourcea"));
        assert!(outcome.primary.tags.contains("sourceb"));
        assert!(outcome.primary.tags.contains("devops"));
    }

    #[test]
    fn empty_group_merges_to_nothing() {
        assert!(merge_group(Vec::new(), now()).is_none());
    }
}
