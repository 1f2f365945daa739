use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::domain::CanonicalEvent;

/// The tuple deciding whether two stored events describe the same
/// real-world event. Calendar-date granularity is deliberate: the same
/// meetup posted with slightly different start times across two sites must
/// still collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub name: String,
    pub event_day: NaiveDate,
    pub location: String,
}

impl Fingerprint {
    pub fn of(event: &CanonicalEvent) -> Self {
        Self {
            name: event.name.to_lowercase(),
            event_day: event.start_at.date_naive(),
            location: event.location_text.to_lowercase(),
        }
    }

    /// Hex digest of the fingerprint for logs and merge audit rows.
    pub fn signature(&self) -> String {
        let mut s = String::new();
        s.push_str(&self.name);
        s.push('|');
        s.push_str(&self.event_day.to_string());
        s.push('|');
        s.push_str(&self.location);

        let mut hasher = Sha256::new();
        hasher.update(s.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Bucket events by fingerprint in a single pass. Insertion order is
/// preserved within each group and across groups, so a caller that sorts
/// its input first gets deterministic primaries downstream.
pub fn group_by_fingerprint(
    events: Vec<CanonicalEvent>,
) -> Vec<(Fingerprint, Vec<CanonicalEvent>)> {
    let mut index: HashMap<Fingerprint, usize> = HashMap::new();
    let mut groups: Vec<(Fingerprint, Vec<CanonicalEvent>)> = Vec::new();

    for event in events {
        let fingerprint = Fingerprint::of(&event);
        match index.get(&fingerprint) {
            Some(&slot) => groups[slot].1.push(event),
            None => {
                index.insert(fingerprint.clone(), groups.len());
                groups.push((fingerprint, vec![event]));
            }
        }
    }

    groups
}

/// Only the groups holding two or more events — the merge pass input.
pub fn duplicate_groups(events: Vec<CanonicalEvent>) -> Vec<(Fingerprint, Vec<CanonicalEvent>)> {
    group_by_fingerprint(events)
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .collect()
}
