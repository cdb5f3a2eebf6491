//! Dedup store trait: the gate that admits each job URL exactly once.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::record::{DedupEntry, JobRecord};

/// Outcome of offering a record to the dedup gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First sight of this job URL; the record continues to the writer
    Admitted,
    /// Job URL already stored (this run or an earlier one)
    RejectedDuplicate,
    /// Record has no job URL
    RejectedInvalid,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Filter for reading stored jobs back out.
///
/// Patterns use SQL `LIKE` syntax (`%` any run, `_` one character) and
/// match case-insensitively. A `%` pattern also matches missing values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobQuery {
    pub category_like: String,
    pub keyword_like: String,
    pub posted_like: String,
    pub limit: usize,
}

impl Default for JobQuery {
    fn default() -> Self {
        Self {
            category_like: "%".to_string(),
            keyword_like: "%".to_string(),
            posted_like: "%".to_string(),
            limit: 50,
        }
    }
}

impl JobQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, pattern: impl Into<String>) -> Self {
        self.category_like = pattern.into();
        self
    }

    pub fn with_keyword(mut self, pattern: impl Into<String>) -> Self {
        self.keyword_like = pattern.into();
        self
    }

    pub fn with_posted_prefix(mut self, pattern: impl Into<String>) -> Self {
        self.posted_like = pattern.into();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Persistent key → presence index keyed by job URL.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Atomically insert the entry unless its job URL is already present.
    ///
    /// Returns `true` if this call inserted it. Concurrent callers racing on
    /// the same job URL must see exactly one `true`.
    async fn insert_if_absent(&self, entry: &DedupEntry) -> StoreResult<bool>;

    /// Whether a job URL has been admitted.
    async fn contains(&self, job_url: &str) -> StoreResult<bool>;

    /// Number of admitted jobs.
    async fn count(&self) -> StoreResult<usize>;

    /// Read admitted jobs, newest first.
    async fn query_jobs(&self, query: &JobQuery) -> StoreResult<Vec<DedupEntry>>;

    /// Offer a record to the gate.
    async fn admit(&self, record: &JobRecord) -> StoreResult<Admission> {
        if !record.has_identity() {
            return Ok(Admission::RejectedInvalid);
        }

        if self.insert_if_absent(&DedupEntry::from(record)).await? {
            Ok(Admission::Admitted)
        } else {
            Ok(Admission::RejectedDuplicate)
        }
    }
}
