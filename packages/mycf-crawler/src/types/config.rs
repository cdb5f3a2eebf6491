//! Run configuration.
//!
//! Defaults mirror the production crawl; the environment and the command
//! line layer on top (see [`CrawlConfig::apply_vars`]).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_KEYWORD: &str = "quant";
pub const DEFAULT_SORT: &str = "new_posting_date";
pub const DEFAULT_STORE_PATH: &str = "mycf_jobs.sqlite";
pub const DEFAULT_OUTPUT_ROOT: &str = "output";
pub const DEFAULT_API_BASE: &str = "https://api.mycareersfuture.gov.sg/v2/search";
pub const DEFAULT_SITE_SEARCH: &str = "https://www.mycareersfuture.gov.sg/search";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) mycf-scraper/1.0";

/// Where search results are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FetchMode {
    /// JSON search API, all pages issued eagerly
    #[default]
    Api,
    /// Rendered search pages, paginated while cards are found
    Dom,
}

/// How output records are bucketed into files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PartitionMode {
    #[default]
    Keyword,
    Category,
}

impl PartitionMode {
    /// Subdirectory under the output root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            PartitionMode::Keyword => "by_keyword",
            PartitionMode::Category => "by_category",
        }
    }
}

/// What to do with the remaining variants of a page once one succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProbePolicy {
    /// Normalize every variant response
    #[default]
    All,
    /// Stop awaiting siblings once a variant yields records
    FirstSuccess,
}

macro_rules! impl_option_enum {
    ($ty:ty, $name:literal, { $($text:literal => $variant:path),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($variant),)+
                    other => Err(ConfigError::UnknownValue {
                        name: $name,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let text = match self {
                    $($variant => $text,)+
                };
                f.write_str(text)
            }
        }
    };
}

impl_option_enum!(FetchMode, "mode", {
    "api" => FetchMode::Api,
    "dom" => FetchMode::Dom,
});

impl_option_enum!(PartitionMode, "split mode", {
    "keyword" => PartitionMode::Keyword,
    "category" => PartitionMode::Category,
});

impl_option_enum!(ProbePolicy, "probe policy", {
    "all" => ProbePolicy::All,
    "first-success" => ProbePolicy::FirstSuccess,
});

/// Request pacing: concurrency bound, floor delay, and adaptive backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Maximum requests in flight
    pub concurrency: usize,

    /// Minimum spacing between request starts (floor)
    pub min_delay: Duration,

    /// Initial adaptive delay
    pub start_delay: Duration,

    /// Ceiling for the adaptive delay
    pub max_delay: Duration,

    /// Average parallel requests the throttle aims for
    pub target_concurrency: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            min_delay: Duration::from_millis(800),
            start_delay: Duration::from_millis(1500),
            max_delay: Duration::from_secs(10),
            target_concurrency: 1.2,
        }
    }
}

impl ThrottleConfig {
    /// No pacing at all. Intended for tests against canned transports.
    pub fn unthrottled(concurrency: usize) -> Self {
        Self {
            concurrency,
            min_delay: Duration::ZERO,
            start_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            target_concurrency: 1.0,
        }
    }
}

/// Full configuration for one crawl run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Search keywords, deduplicated and sorted
    pub keywords: Vec<String>,

    /// Recency window in days
    pub within_days: u32,

    /// Pages requested per keyword
    pub max_pages: u32,

    pub mode: FetchMode,
    pub per_page: u32,
    pub sort: String,
    pub partition: PartitionMode,
    pub output_root: PathBuf,
    pub dedup_store_path: PathBuf,

    /// Offset of the crawl's reference timezone, in hours east of UTC
    pub tz_offset_hours: i32,

    pub request_timeout: Duration,
    pub user_agent: String,
    pub obey_robots: bool,
    pub probe_policy: ProbePolicy,
    pub throttle: ThrottleConfig,

    pub api_base: String,
    pub site_search_base: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            keywords: vec![DEFAULT_KEYWORD.to_string()],
            within_days: 7,
            max_pages: 3,
            mode: FetchMode::Api,
            per_page: 20,
            sort: DEFAULT_SORT.to_string(),
            partition: PartitionMode::Keyword,
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            dedup_store_path: PathBuf::from(DEFAULT_STORE_PATH),
            tz_offset_hours: 8,
            request_timeout: Duration::from_secs(60),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            obey_robots: true,
            probe_policy: ProbePolicy::All,
            throttle: ThrottleConfig::default(),
            api_base: DEFAULT_API_BASE.to_string(),
            site_search_base: DEFAULT_SITE_SEARCH.to_string(),
        }
    }
}

impl CrawlConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `MYCF_*` environment variables (and `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::default().apply_vars(|name| std::env::var(name).ok())
    }

    /// Overlay values from a variable lookup.
    ///
    /// Recognised: `MYCF_SQLITE_PATH`, `MYCF_OUTPUT_DIR`, `MYCF_SPLIT_MODE`,
    /// `MYCF_CONCURRENCY`, `MYCF_DOWNLOAD_DELAY_MS`, `MYCF_USER_AGENT`.
    pub fn apply_vars<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("MYCF_SQLITE_PATH") {
            self.dedup_store_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("MYCF_OUTPUT_DIR") {
            self.output_root = PathBuf::from(dir);
        }
        if let Some(mode) = lookup("MYCF_SPLIT_MODE") {
            self.partition = mode.parse()?;
        }
        if let Some(n) = lookup("MYCF_CONCURRENCY") {
            self.throttle.concurrency = parse_number("MYCF_CONCURRENCY", &n)?;
        }
        if let Some(ms) = lookup("MYCF_DOWNLOAD_DELAY_MS") {
            let ms: u64 = parse_number("MYCF_DOWNLOAD_DELAY_MS", &ms)?;
            self.throttle.min_delay = Duration::from_millis(ms);
        }
        if let Some(agent) = lookup("MYCF_USER_AGENT") {
            self.user_agent = agent;
        }
        Ok(self)
    }

    pub fn with_keywords(mut self, keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_within_days(mut self, days: u32) -> Self {
        self.within_days = days;
        self
    }

    pub fn with_max_pages(mut self, pages: u32) -> Self {
        self.max_pages = pages;
        self
    }

    pub fn with_mode(mut self, mode: FetchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_partition(mut self, partition: PartitionMode) -> Self {
        self.partition = partition;
        self
    }

    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dedup_store_path = path.into();
        self
    }

    pub fn with_obey_robots(mut self, obey: bool) -> Self {
        self.obey_robots = obey;
        self
    }

    pub fn with_probe_policy(mut self, policy: ProbePolicy) -> Self {
        self.probe_policy = policy;
        self
    }

    pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }

    /// Reference timezone for recency and output file dates.
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.tz_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }

    /// Reject values that would make the run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("max_pages", self.max_pages as u64)?;
        check_positive("per_page", self.per_page as u64)?;
        check_positive("concurrency", self.throttle.concurrency as u64)?;

        if !(-23..=23).contains(&self.tz_offset_hours) {
            return Err(ConfigError::OutOfRange {
                name: "tz_offset_hours",
                expected: "between -23 and 23",
                value: self.tz_offset_hours.to_string(),
            });
        }
        if self.throttle.min_delay > self.throttle.max_delay
            && self.throttle.max_delay > Duration::ZERO
        {
            return Err(ConfigError::OutOfRange {
                name: "min_delay",
                expected: "at most max_delay",
                value: format!("{:?}", self.throttle.min_delay),
            });
        }
        if self.throttle.target_concurrency <= 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "target_concurrency",
                expected: "> 0",
                value: self.throttle.target_concurrency.to_string(),
            });
        }
        Ok(())
    }
}

fn check_positive(name: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::OutOfRange {
            name,
            expected: ">= 1",
            value: value.to_string(),
        });
    }
    Ok(())
}

fn parse_number<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::OutOfRange {
        name,
        expected: "a non-negative integer",
        value: raw.to_string(),
    })
}
