use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::warn;

use crate::constants::{DEFAULT_EVENT_DURATION_HOURS, VIRTUAL_KEYWORDS};
use crate::domain::CanonicalEvent;
use crate::pipeline::dates::DateTextResolver;
use crate::types::RawEventRecord;

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strip HTML tags (tag-to-space so word boundaries survive), collapse
/// whitespace runs to a single space, and trim.
pub fn clean_text(text: &str) -> String {
    let stripped = HTML_TAG_RE.replace_all(text, " ");
    let collapsed = WHITESPACE_RE.replace_all(&stripped, " ");
    collapsed.trim().to_string()
}

/// True when every cased character is upper-case and at least one exists.
fn is_fully_upper(text: &str) -> bool {
    let mut has_alpha = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            has_alpha = true;
            if !c.is_uppercase() {
                return false;
            }
        }
    }
    has_alpha
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Turns a raw per-source record into a canonical event.
///
/// Pure transform: no I/O, no store access. Every field has a defined
/// fallback, so normalization cannot fail on malformed input.
#[derive(Debug, Default)]
pub struct FieldNormalizer {
    resolver: DateTextResolver,
}

impl FieldNormalizer {
    pub fn new() -> Self {
        Self {
            resolver: DateTextResolver::new(),
        }
    }

    pub fn normalize(&self, raw: &RawEventRecord, reference_now: DateTime<Utc>) -> CanonicalEvent {
        let cleaned_title = clean_text(&raw.title);
        // Title-case only shouting titles; mixed-case brand names stay put.
        let name = if is_fully_upper(&cleaned_title) {
            title_case(&cleaned_title)
        } else {
            cleaned_title
        };
        let description = clean_text(&raw.description);
        let location_text = clean_text(&raw.location_text);
        let organizer = clean_text(&raw.organizer);

        let (start_at, range_end) = match raw.start_text.as_deref() {
            Some(text) if !text.trim().is_empty() => {
                self.resolver.resolve_range(text, reference_now)
            }
            _ => {
                warn!(origin_url = %raw.origin_url, "missing start date text, using ingestion time");
                (reference_now, None)
            }
        };

        // An end published by the source wins; a range's far side is the
        // next-best signal for multi-day listings.
        let explicit_end = raw
            .end_text
            .as_deref()
            .and_then(|text| self.resolver.try_resolve(text, reference_now))
            .or(range_end);
        let (end_at, end_is_estimated) = match explicit_end {
            Some(end) if end > start_at => (end, false),
            _ => (
                start_at + Duration::hours(DEFAULT_EVENT_DURATION_HOURS),
                true,
            ),
        };

        let is_virtual = raw.is_virtual_hint.unwrap_or_else(|| {
            let location_lower = location_text.to_lowercase();
            let text_lower = format!("{name} {description}").to_lowercase();
            VIRTUAL_KEYWORDS
                .iter()
                .any(|kw| location_lower.contains(kw) || text_lower.contains(kw))
        });

        let mut tags: BTreeSet<String> = raw
            .tags
            .iter()
            .map(|t| clean_text(t))
            .filter(|t| !t.is_empty())
            .collect();
        // Provenance tag survives merges even after source_name changes.
        tags.insert(raw.source_name.trim().to_lowercase());

        CanonicalEvent {
            event_id: None,
            name,
            description,
            location_text,
            location_lat: None,
            location_lon: None,
            organizer,
            start_at,
            end_at,
            end_is_estimated,
            is_virtual,
            origin_url: raw.origin_url.trim().to_string(),
            source_name: raw.source_name.clone(),
            tags,
            created_at: reference_now,
            updated_at: reference_now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::seq::SliceRandom;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn raw_with(title: &str, start_text: Option<&str>, end_text: Option<&str>) -> RawEventRecord {
        RawEventRecord {
            source_name: "meetup".to_string(),
            title: title.to_string(),
            start_text: start_text.map(String::from),
            end_text: end_text.map(String::from),
            origin_url: "https://example.com/e/1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn strips_html_preserving_word_boundaries() {
        assert_eq!(clean_text("<p>AI<br/>Night</p>"), "AI Night");
        assert_eq!(clean_text("  too   much\n\twhitespace "), "too much whitespace");
    }

    #[test]
    fn shouting_titles_are_title_cased() {
        let normalizer = FieldNormalizer::new();
        let event = normalizer.normalize(&raw_with("AI SUMMIT 2025", None, None), reference());
        assert_eq!(event.name, "Ai Summit 2025");
    }

    #[test]
    fn mixed_case_titles_are_preserved() {
        let normalizer = FieldNormalizer::new();
        let event = normalizer.normalize(&raw_with("OpenAI DevDay", None, None), reference());
        assert_eq!(event.name, "OpenAI DevDay");
    }

    #[test]
    fn missing_start_falls_back_to_ingestion_time() {
        let normalizer = FieldNormalizer::new();
        let event = normalizer.normalize(&raw_with("Meetup", None, None), reference());
        assert_eq!(event.start_at, reference());
    }

    #[test]
    fn explicit_later_end_is_kept() {
        let normalizer = FieldNormalizer::new();
        let event = normalizer.normalize(
            &raw_with(
                "Meetup",
                Some("2025-05-10 18:00:00"),
                Some("2025-05-10 21:00:00"),
            ),
            reference(),
        );
        assert_eq!(
            event.end_at,
            Utc.with_ymd_and_hms(2025, 5, 10, 21, 0, 0).unwrap()
        );
        assert!(!event.end_is_estimated);
    }

    #[test]
    fn range_far_side_becomes_end_when_no_end_text() {
        let normalizer = FieldNormalizer::new();
        let event = normalizer.normalize(
            &raw_with("Conference", Some("May 10-12, 2025"), None),
            reference(),
        );
        assert_eq!(
            event.start_at,
            Utc.with_ymd_and_hms(2025, 5, 10, 0, 0, 0).unwrap()
        );
        assert_eq!(
            event.end_at,
            Utc.with_ymd_and_hms(2025, 5, 12, 0, 0, 0).unwrap()
        );
        assert!(!event.end_is_estimated);
    }

    #[test]
    fn end_always_follows_start() {
        let normalizer = FieldNormalizer::new();
        let end_variants: &[Option<&str>] = &[
            None,
            Some(""),
            Some("garbage"),
            Some("2025-05-09 18:00:00"),
            Some("2025-05-10 18:00:00"),
            Some("2025-05-10 09:00:00"),
            Some("2025-05-10 23:30:00"),
            Some("2025-05-12"),
        ];
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let end_text = end_variants.choose(&mut rng).copied().flatten();
            let event = normalizer.normalize(
                &raw_with("Meetup", Some("2025-05-10 18:00:00"), end_text),
                reference(),
            );
            assert!(
                event.end_at > event.start_at,
                "end {} not after start {} for end_text {:?}",
                event.end_at,
                event.start_at,
                end_text
            );
            if event.end_is_estimated {
                assert_eq!(event.end_at - event.start_at, Duration::hours(2));
            }
        }
    }

    #[test]
    fn virtual_keywords_in_location_or_text() {
        let normalizer = FieldNormalizer::new();

        let mut raw = raw_with("Rust Meetup", None, None);
        raw.location_text = "Zoom".to_string();
        assert!(normalizer.normalize(&raw, reference()).is_virtual);

        let mut raw = raw_with("Rust Meetup", None, None);
        raw.description = "Join our <b>webinar</b> on Rust".to_string();
        assert!(normalizer.normalize(&raw, reference()).is_virtual);

        let raw = raw_with("Rust Meetup", None, None);
        assert!(!normalizer.normalize(&raw, reference()).is_virtual);
    }

    #[test]
    fn explicit_hint_beats_keyword_detection() {
        let normalizer = FieldNormalizer::new();
        let mut raw = raw_with("Zoom fatigue support group", None, None);
        raw.is_virtual_hint = Some(false);
        assert!(!normalizer.normalize(&raw, reference()).is_virtual);
    }

    #[test]
    fn provenance_tag_joins_source_labels() {
        let normalizer = FieldNormalizer::new();
        let mut raw = raw_with("Rust Meetup", None, None);
        raw.source_name = "SourceA".to_string();
        raw.tags = vec!["rust".to_string(), "  ".to_string()];
        let event = normalizer.normalize(&raw, reference());
        assert!(event.tags.contains("rust"));
        assert!(event.tags.contains("sourcea"));
        assert!(!event.tags.contains("  "));
    }
}
