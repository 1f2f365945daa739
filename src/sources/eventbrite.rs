use crate::config::SourceConfig;
use crate::constants::EVENTBRITE_SOURCE;
use crate::error::{PipelineError, Result};
use crate::rate_limiter::RateLimiter;
use crate::sources::random_user_agent;
use crate::types::{EventSource, RawEventRecord};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument};

const DEFAULT_BASE_URL: &str = "https://www.eventbriteapi.com/v3";

/// Eventbrite API client scoped to Bay Area technology listings.
pub struct EventbriteSource {
    client: reqwest::Client,
    api_token: String,
    base_url: String,
    rate_limiter: RateLimiter,
}

impl EventbriteSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let api_token = std::env::var("EVENTBRITE_API_TOKEN")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(random_user_agent())
            .build()?;

        Ok(Self {
            client,
            api_token,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            rate_limiter: RateLimiter::new(config.calls_per_minute),
        })
    }

    fn record_from_payload(&self, event: &Value) -> Option<RawEventRecord> {
        let origin_url = event["url"].as_str()?.to_string();

        let mut tags = Vec::new();
        if let Some(format) = event["format"]["name"].as_str() {
            tags.push(format.to_string());
        }
        if let Some(category) = event["category"]["name"].as_str() {
            tags.push(category.to_string());
        }

        Some(RawEventRecord {
            source_name: EVENTBRITE_SOURCE.to_string(),
            title: event["name"]["text"].as_str().unwrap_or_default().to_string(),
            description: event["description"]["text"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            location_text: event["venue"]["address"]["localized_address_display"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            organizer: event["organizer"]["name"].as_str().unwrap_or_default().to_string(),
            start_text: event["start"]["utc"].as_str().map(String::from),
            end_text: event["end"]["utc"].as_str().map(String::from),
            origin_url,
            is_virtual_hint: event["online_event"].as_bool(),
            tags,
        })
    }
}

#[async_trait::async_trait]
impl EventSource for EventbriteSource {
    fn source_name(&self) -> &'static str {
        EVENTBRITE_SOURCE
    }

    #[instrument(skip(self))]
    async fn fetch_events(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<RawEventRecord>> {
        self.rate_limiter.wait_if_needed().await;

        let url = format!("{}/events/search/", self.base_url);
        let start_range = window_start.to_rfc3339();
        let end_range = window_end.to_rfc3339();
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .query(&[
                ("location.address", "San Jose, CA"),
                ("location.within", "25mi"),
                ("categories", "102"),
                ("start_date.range_start", start_range.as_str()),
                ("start_date.range_end", end_range.as_str()),
                ("expand", "venue,organizer,category,format"),
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
                None => debug!("Skipping Eventbrite event without a url"),
            }
        }

        info!("Fetched {} events from Eventbrite", records.len());
        Ok(records)
    }
}
