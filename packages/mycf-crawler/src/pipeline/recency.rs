//! Recency filter for posting times.
//!
//! Resolves a free-form posted string (optionally paired with a
//! machine-readable timestamp) and keeps it if it falls inside the window.
//! Anything that cannot be resolved is kept.
//!
//! The boundary is inclusive. Instants compare `posted >= now - window`;
//! calendar dates without a time compare at day granularity, so a posting
//! dated exactly `window_days` ago is kept and one dated a day earlier is
//! dropped.

use std::sync::LazyLock;

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc,
};
use regex::Regex;

static DATE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})").expect("valid regex"));

static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*(minute|min|hour|hr|day|week)s?\b").expect("valid regex")
});

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

const ABSOLUTE_DATE_FORMATS: &[&str] = &[
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%Y-%m-%d",
    "%Y/%m/%d",
];

/// A resolved posting time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posted {
    /// Exact instant (ISO timestamp or relative phrase)
    Instant(DateTime<FixedOffset>),
    /// Calendar date only
    Day(NaiveDate),
}

/// Window test against a fixed reference "now".
#[derive(Debug, Clone, Copy)]
pub struct RecencyFilter {
    window_days: u32,
    now: DateTime<FixedOffset>,
}

impl RecencyFilter {
    pub fn new(window_days: u32, now: DateTime<FixedOffset>) -> Self {
        Self { window_days, now }
    }

    /// Filter anchored at the current time in `tz`.
    pub fn now_in(window_days: u32, tz: FixedOffset) -> Self {
        Self::new(window_days, Utc::now().with_timezone(&tz))
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        self.now
    }

    pub fn window_days(&self) -> u32 {
        self.window_days
    }

    /// Oldest instant still inside the window.
    ///
    /// `None` when the window reaches past the representable range, in
    /// which case nothing is old enough to drop.
    pub fn cutoff(&self) -> Option<DateTime<FixedOffset>> {
        let window = Duration::try_days(i64::from(self.window_days))?;
        self.now.checked_sub_signed(window)
    }

    /// Whether a posting should be kept.
    pub fn keep(&self, text: Option<&str>, machine: Option<&str>) -> bool {
        let Some(posted) = self.resolve(text, machine) else {
            return true;
        };
        let Some(cutoff) = self.cutoff() else {
            return true;
        };

        match posted {
            Posted::Instant(at) => at >= cutoff,
            Posted::Day(day) => day >= cutoff.date_naive(),
        }
    }

    /// Resolve a posting time, trying forms in priority order.
    pub fn resolve(&self, text: Option<&str>, machine: Option<&str>) -> Option<Posted> {
        if let Some(posted) = machine.and_then(|m| self.parse_iso(m.trim())) {
            return Some(posted);
        }

        let text = text.map(str::trim).filter(|t| !t.is_empty())?;

        if let Some(posted) = self.parse_iso(text) {
            return Some(posted);
        }

        self.parse_relative(&text.to_lowercase())
            .or_else(|| parse_absolute(text).map(Posted::Day))
    }

    /// ISO-8601 timestamp, or a leading `YYYY-MM-DD` calendar date.
    fn parse_iso(&self, s: &str) -> Option<Posted> {
        if let Ok(at) = DateTime::parse_from_rfc3339(s) {
            return Some(Posted::Instant(at));
        }
        if let Ok(at) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
            return Some(Posted::Instant(at));
        }
        for format in NAIVE_DATETIME_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                if let Some(at) = self.now.timezone().from_local_datetime(&naive).single() {
                    return Some(Posted::Instant(at));
                }
            }
        }

        let prefix = DATE_PREFIX.captures(s)?.get(1)?.as_str();
        NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
            .ok()
            .map(Posted::Day)
    }

    /// `just now`, `today`, `yesterday`, `N minutes/hours/days/weeks ago`.
    fn parse_relative(&self, lower: &str) -> Option<Posted> {
        let mut words = lower.split(|c: char| !c.is_alphanumeric());
        if words.any(|w| w == "just" || w == "today") {
            return Some(Posted::Instant(self.now));
        }
        if lower.contains("yesterday") {
            return self.ago(Duration::days(1));
        }

        let caps = RELATIVE.captures(lower)?;
        let n: i64 = caps.get(1)?.as_str().parse().ok()?;
        let delta = match caps.get(2)?.as_str() {
            "minute" | "min" => Duration::try_minutes(n)?,
            "hour" | "hr" => Duration::try_hours(n)?,
            "day" => Duration::try_days(n)?,
            "week" => Duration::try_weeks(n)?,
            _ => return None,
        };
        self.ago(delta)
    }

    fn ago(&self, delta: Duration) -> Option<Posted> {
        self.now.checked_sub_signed(delta).map(Posted::Instant)
    }
}

/// Absolute date formats such as `10 Oct 2025` or `Oct 10, 2025`.
fn parse_absolute(text: &str) -> Option<NaiveDate> {
    let lower = text.to_lowercase();
    let stripped = ["posted on ", "posted "]
        .iter()
        .find_map(|p| lower.strip_prefix(p).and_then(|_| text.get(p.len()..)))
        .unwrap_or(text)
        .trim();

    ABSOLUTE_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(stripped, format).ok())
}
