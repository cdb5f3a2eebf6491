//! MyCareersFuture job crawler.
//!
//! Crawls the job search API (or its rendered search pages) for a set of
//! keywords, normalizes the results into [`JobRecord`]s, admits each job
//! URL at most once across runs through a persistent [`DedupStore`], and
//! appends admitted records to dated CSV files partitioned by keyword or
//! category.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mycf_crawler::{CrawlConfig, PartitionedWriter, Scheduler};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = CrawlConfig::from_env()?.with_keywords(["quant"]);
//! let mut writer = PartitionedWriter::for_today(&config.output_root, config.partition, config.timezone());
//!
//! let scheduler = Scheduler::open(config).await?;
//! let summary = scheduler.run(&mut writer, &CancellationToken::new()).await;
//! ```
//!
//! # Modules
//!
//! - [`types`] - Records, requests, configuration, keyword loading
//! - [`traits`] - Transport and dedup store abstractions
//! - [`crawlers`] - Fetch router, throttle, robots.txt gate
//! - [`pipeline`] - Normalizers, recency filter, scheduler
//! - [`stores`] - SQLite and in-memory dedup stores
//! - [`exporters`] - Partitioned CSV writer
//! - [`transports`] - HTTP and mock transports
//! - [`testing`] - Fixtures for tests

pub mod crawlers;
pub mod error;
pub mod exporters;
pub mod pipeline;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod transports;
pub mod types;

pub use error::{
    ConfigError, CrawlError, NormalizeError, StoreError, TransportError, WriterError,
};
pub use traits::{
    store::{Admission, DedupStore, JobQuery},
    transport::Transport,
};
pub use types::{
    config::{CrawlConfig, FetchMode, PartitionMode, ProbePolicy, ThrottleConfig},
    keywords::load_keywords,
    record::{DedupEntry, JobRecord},
    request::{Method, Request, RequestContext, Response},
};

pub use crawlers::{AutoThrottle, FetchRouter, RobotsGate, RobotsTxt};
pub use exporters::{sanitize_partition_key, PartitionedWriter};
pub use pipeline::{
    ApiNormalizer, DomNormalizer, DomOutcome, KeywordReport, KeywordState, Normalized,
    RecencyFilter, RunSummary, Scheduler,
};
pub use stores::{MemoryStore, SqliteStore};
pub use transports::{HttpTransport, MockTransport};
