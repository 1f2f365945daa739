use crate::config::SourceConfig;
use crate::constants::MEETUP_SOURCE;
use crate::error::{PipelineError, Result};
use crate::rate_limiter::RateLimiter;
use crate::sources::random_user_agent;
use crate::types::{EventSource, RawEventRecord};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument};

const DEFAULT_BASE_URL: &str = "https://api.meetup.com";

/// Meetup API client. Pagination is a single large page, matching how the
/// upstream endpoint caps result sets.
pub struct MeetupSource {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    rate_limiter: RateLimiter,
}

impl MeetupSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let api_key = std::env::var("MEETUP_API_KEY")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(random_user_agent())
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            rate_limiter: RateLimiter::new(config.calls_per_minute),
        })
    }

    /// Map one API event payload into the raw record contract. Date text
    /// stays raw; the resolver owns parsing. Events without a link have no
    /// upsert identity and are dropped here.
    fn record_from_payload(&self, event: &Value) -> Option<RawEventRecord> {
        let origin_url = event["link"].as_str()?.to_string();

        let start_text = match (event["local_date"].as_str(), event["local_time"].as_str()) {
            (Some(date), Some(time)) => Some(format!("{date} {time}")),
            (Some(date), None) => Some(date.to_string()),
            _ => None,
        };

        let tags = event["group"]["topics"]
            .as_array()
            .map(|topics| {
                topics
                    .iter()
                    .filter_map(|t| t["name"].as_str())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Some(RawEventRecord {
            source_name: MEETUP_SOURCE.to_string(),
            title: event["name"].as_str().unwrap_or_default().to_string(),
            description: event["description"].as_str().unwrap_or_default().to_string(),
            location_text: event["venue"]["address_1"]
                .as_str()
                .or_else(|| event["venue"]["city"].as_str())
                .unwrap_or_default()
                .to_string(),
            organizer: event["group"]["name"].as_str().unwrap_or_default().to_string(),
            start_text,
            end_text: None,
            origin_url,
            is_virtual_hint: event["is_online_event"].as_bool(),
            tags,
        })
    }
}

#[async_trait::async_trait]
impl EventSource for MeetupSource {
    fn source_name(&self) -> &'static str {
        MEETUP_SOURCE
    }

    #[instrument(skip(self))]
    async fn fetch_events(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<RawEventRecord>> {
        self.rate_limiter.wait_if_needed().await;

        let url = format!("{}/find/upcoming_events", self.base_url);
        let start_range = window_start.to_rfc3339();
        let end_range = window_end.to_rfc3339();
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[
                ("location", "Silicon Valley"),
                ("radius", "25"),
                ("topic_category", "tech"),
                ("start_date_range", start_range.as_str()),
                ("end_date_range", end_range.as_str()),
                ("page", "200"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let data: Value = response.json().await?;
        let events = data["events"]
            .as_array()
            .ok_or_else(|| PipelineError::MissingField("events not found".into()))?;

        let mut records = Vec::new();
        for event in events {
            match self.record_from_payload(event) {
                Some(record) => records.push(record),
                None => debug!("Skipping Meetup event without a link"),
            }
        }

        info!("Fetched {} events from Meetup", records.len());
        Ok(records)
    }
}
