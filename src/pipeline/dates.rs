use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Explicit date+time patterns, tried in order before anything else.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d.%m.%Y %H:%M",
    "%B %d, %Y %I:%M %p",
    "%a, %b %d, %Y %I:%M %p",
];

/// Date-only patterns; resolved timestamps land on midnight UTC.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%B %d, %Y", "%a, %b %d, %Y"];

static MONTH_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<month>[A-Za-z]+)\s+(?P<day>\d{1,2})(?:,\s*(?P<year>\d{4}))?").unwrap()
});

static MONTH_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\b",
    )
    .unwrap()
});

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").unwrap());

static DAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{1,2})(?:,|\s|$)").unwrap());

fn month_from_prefix(token: &str) -> Option<u32> {
    let prefix: String = token.to_lowercase().chars().take(3).collect();
    match prefix.as_str() {
        "jan" => Some(1),
        "feb" => Some(2),
        "mar" => Some(3),
        "apr" => Some(4),
        "may" => Some(5),
        "jun" => Some(6),
        "jul" => Some(7),
        "aug" => Some(8),
        "sep" => Some(9),
        "oct" => Some(10),
        "nov" => Some(11),
        "dec" => Some(12),
        _ => None,
    }
}

/// Parses heterogeneous date/time text into absolute UTC timestamps.
///
/// Listings publish dates in whatever shape their site templates emit, so
/// resolution is strictly best-effort: an ordered ladder of explicit
/// formats, then a month-name regex, then the supplied reference time.
/// `resolve` never fails.
#[derive(Debug, Default)]
pub struct DateTextResolver;

impl DateTextResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `text` to a timestamp, falling back to `reference_now` when
    /// no pattern matches.
    pub fn resolve(&self, text: &str, reference_now: DateTime<Utc>) -> DateTime<Utc> {
        self.resolve_range(text, reference_now).0
    }

    /// Resolve `text`, additionally extracting the end of a date range such
    /// as "May 10-12, 2025". The month found in the start half is reused
    /// for the end half when the end half lacks one.
    pub fn resolve_range(
        &self,
        text: &str,
        reference_now: DateTime<Utc>,
    ) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            warn!(input = %text, "unparseable date: empty input");
            return (reference_now, None);
        }

        if let Some(ts) = self.try_formats(trimmed) {
            return (ts, None);
        }

        // Range handling must run before the loose month-day regex, which
        // would otherwise swallow the start half of "May 10-12, 2025".
        if let Some((start, end)) = self.try_range(trimmed, reference_now) {
            return (start, end);
        }

        if let Some(ts) = self.try_month_day(trimmed, reference_now) {
            return (ts, None);
        }

        warn!(input = %trimmed, "unparseable date");
        (reference_now, None)
    }

    /// Best-effort single-value resolution; `None` when nothing matches.
    pub fn try_resolve(&self, text: &str, reference_now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        self.try_formats(trimmed)
            .or_else(|| self.try_month_day(trimmed, reference_now))
    }

    fn try_formats(&self, text: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
            return Some(ts.with_timezone(&Utc));
        }
        for fmt in DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
                return Some(Utc.from_utc_datetime(&dt));
            }
        }
        for fmt in DATE_FORMATS {
            if let Ok(day) = NaiveDate::parse_from_str(text, fmt) {
                let dt = day.and_hms_opt(0, 0, 0)?;
                return Some(Utc.from_utc_datetime(&dt));
            }
        }
        None
    }

    /// `<Month> <Day>[, <Year>]` fallback. A missing year defaults to the
    /// reference year; a token that resolves to no known month makes the
    /// input unparseable.
    fn try_month_day(&self, text: &str, reference_now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let caps = MONTH_DAY_RE.captures(text)?;
        let month = month_from_prefix(caps.name("month")?.as_str())?;
        let day: u32 = caps.name("day")?.as_str().parse().ok()?;
        let year: i32 = caps
            .name("year")
            .and_then(|y| y.as_str().parse().ok())
            .unwrap_or_else(|| reference_now.year());

        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
    }

    /// Split "May 10-12, 2025" (hyphen or en-dash) into start and end.
    fn try_range(
        &self,
        text: &str,
        reference_now: DateTime<Utc>,
    ) -> Option<(DateTime<Utc>, Option<DateTime<Utc>>)> {
        let normalized = text.replace('\u{2013}', "-");
        let parts: Vec<&str> = normalized.split('-').collect();
        if parts.len() != 2 {
            return None;
        }
        let start_part = parts[0].trim();
        let end_part = parts[1].trim();
        let has_digits = |s: &str| s.chars().any(|c| c.is_ascii_digit());
        if !has_digits(start_part) || !has_digits(end_part) {
            return None;
        }

        let month = MONTH_NAME_RE.find(start_part)?.as_str().to_string();

        // The year tends to live in the end half ("May 10-12, 2025").
        let year = YEAR_RE
            .find(end_part)
            .or_else(|| YEAR_RE.find(start_part))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| reference_now.year().to_string());

        let start_day = DAY_RE
            .captures(start_part)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or("1");
        let start = self.try_resolve(&format!("{month} {start_day}, {year}"), reference_now)?;

        // End half may carry its own month ("May 30 - Jun 1"); otherwise the
        // start month is shared across the range.
        let end_month = MONTH_NAME_RE
            .find(end_part)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| month.clone());
        let end = DAY_RE
            .captures(end_part)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .and_then(|end_day| {
                self.try_resolve(&format!("{end_month} {end_day}, {year}"), reference_now)
            });

        Some((start, end))
    }
}
