//! Typed errors for the crawler library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so each stage of the
//! pipeline can decide which failures are recoverable.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can abort a crawl run.
///
/// Only startup failures end up here. Per-request and per-record problems
/// are logged and counted by the scheduler instead.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Dedup store could not be opened
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid run configuration
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(#[source] reqwest::Error),
}

/// Errors raised by a transport while fetching one request variant.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No response within the configured timeout
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// Connection or protocol failure
    #[error("connection error fetching {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Upstream answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Request URL could not be parsed
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// robots.txt disallows the request path
    #[error("robots.txt disallows: {url}")]
    RobotsDisallowed { url: String },
}

impl TransportError {
    /// Whether sibling variants or later pages are still worth trying.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connection { .. } => true,
            Self::Status { status, .. } => !matches!(status, 401 | 403),
            Self::InvalidUrl { .. } | Self::RobotsDisallowed { .. } => false,
        }
    }
}

/// Errors raised while turning a response body into records.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// Body is not valid JSON
    #[error("unparseable response from {url}: {snippet}")]
    Parse { url: String, snippet: String },

    /// JSON parsed, but no known results container was present
    #[error("no results container in response from {url} (keys: {keys:?})")]
    SchemaMismatch { url: String, keys: Vec<String> },
}

/// Errors raised by the dedup store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store could not be opened or its schema created
    #[error("failed to open store at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Store file does not exist (read-only consumers)
    #[error("store not found: {0}")]
    NotFound(PathBuf),

    /// A query against an open store failed
    #[error("store query failed: {0}")]
    Query(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Query(Box::new(e))
    }
}

/// Errors raised by the partitioned writer.
#[derive(Debug, Error)]
pub enum WriterError {
    /// Filesystem failure creating or appending to a partition file
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV serialization failure
    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Partition failed earlier in this run and no longer accepts writes
    #[error("partition closed after earlier failure: {key}")]
    PartitionClosed { key: String },
}

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric option is outside its allowed range
    #[error("{name} must be {expected}, got {value}")]
    OutOfRange {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    /// An enumerated option has an unknown value
    #[error("unknown {name}: {value}")]
    UnknownValue { name: &'static str, value: String },
}

/// Result type alias for crawl runs.
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for writer operations.
pub type WriterResult<T> = std::result::Result<T, WriterError>;
