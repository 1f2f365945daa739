/// Source name constants to ensure consistency across the codebase.
/// These are the identifiers adapters report in `RawEventRecord::source_name`
/// and the names accepted by the CLI `--sources` flag.

pub const MEETUP_SOURCE: &str = "meetup";
pub const EVENTBRITE_SOURCE: &str = "eventbrite";
pub const TECHCRUNCH_SOURCE: &str = "techcrunch";
pub const STANFORD_SOURCE: &str = "stanford";
pub const LINKEDIN_SOURCE: &str = "linkedin";
pub const HACKERNEWS_SOURCE: &str = "hackernews";

/// Sources with an API-backed adapter bundled in this crate. The remaining
/// constants identify external scrapers that feed records in through the
/// ingest interface.
pub fn get_supported_sources() -> Vec<&'static str> {
    vec![MEETUP_SOURCE, EVENTBRITE_SOURCE]
}

/// Substrings that mark an event location or description as virtual.
pub const VIRTUAL_KEYWORDS: &[&str] = &["online", "zoom", "virtual", "webinar"];

/// Duration assumed for an event whose end time is missing or not after its start.
pub const DEFAULT_EVENT_DURATION_HOURS: i64 = 2;
