pub mod eventbrite;
pub mod meetup;

use crate::config::SourceConfig;
use crate::constants;
use crate::error::Result;
use crate::types::{EventSource, RawEventRecord};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;

pub use eventbrite::EventbriteSource;
pub use meetup::MeetupSource;

/// Browser user agents rotated across requests; the upstream APIs throttle
/// default client strings aggressively.
pub(crate) const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

pub(crate) fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Construct the adapter registered under `name`, if this crate bundles one.
/// External scrapers (TechCrunch, Stanford, LinkedIn, Hacker News) feed
/// records in through the ingest interface instead.
pub fn create_source(name: &str, config: &SourceConfig) -> Result<Option<Box<dyn EventSource>>> {
    match name {
        constants::MEETUP_SOURCE => Ok(Some(Box::new(MeetupSource::new(config)?))),
        constants::EVENTBRITE_SOURCE => Ok(Some(Box::new(EventbriteSource::new(config)?))),
        _ => Ok(None),
    }
}

/// Fixed set of records handed in at construction; used by tests and
/// offline runs.
pub struct StaticSource {
    name: &'static str,
    records: Vec<RawEventRecord>,
}

impl StaticSource {
    pub fn new(name: &'static str, records: Vec<RawEventRecord>) -> Self {
        Self { name, records }
    }
}

#[async_trait::async_trait]
impl EventSource for StaticSource {
    fn source_name(&self) -> &'static str {
        self.name
    }

    async fn fetch_events(
        &self,
        _window_start: DateTime<Utc>,
        _window_end: DateTime<Utc>,
    ) -> Result<Vec<RawEventRecord>> {
        Ok(self.records.clone())
    }
}
