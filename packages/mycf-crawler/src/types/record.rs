//! Job posting record and its persisted dedup projection.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One scraped job posting in canonical form.
///
/// Field order matches the CSV column order of the partition files.
/// `job_url` is the identity; `search_query` and `page_index` are provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Keyword that produced this record
    pub search_query: String,

    /// Logical result page the record came from
    pub page_index: u32,

    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,

    /// Raw or ISO-8601 posting time, as reported upstream
    pub posted: Option<String>,

    pub employment_type: Option<String>,
    pub seniority: Option<String>,
    pub category: Option<String>,

    /// Absolute job URL (identity key)
    pub job_url: String,

    /// Page or request that yielded this record
    pub source_url: String,
}

impl JobRecord {
    /// Create a record with only identity and provenance set.
    pub fn new(
        search_query: impl Into<String>,
        page_index: u32,
        job_url: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            search_query: search_query.into(),
            page_index,
            title: None,
            company: None,
            location: None,
            salary: None,
            posted: None,
            employment_type: None,
            seniority: None,
            category: None,
            job_url: job_url.into(),
            source_url: source_url.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_posted(mut self, posted: impl Into<String>) -> Self {
        self.posted = Some(posted.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// A record without a job URL must never reach the store or writer.
    pub fn has_identity(&self) -> bool {
        !self.job_url.trim().is_empty()
    }

    /// Stable SHA-256 fingerprint of the identity key.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.job_url)
    }
}

/// SHA-256 hex digest of a job URL.
pub fn fingerprint(job_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(job_url.trim().as_bytes());
    hex::encode(hasher.finalize())
}

/// Row persisted in the dedup store on first sight of a job URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DedupEntry {
    pub job_url: String,
    pub search_query: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub posted: Option<String>,
    pub employment_type: Option<String>,
    pub seniority: Option<String>,
    pub category: Option<String>,
}

impl From<&JobRecord> for DedupEntry {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_url: record.job_url.clone(),
            search_query: Some(record.search_query.clone()),
            title: record.title.clone(),
            company: record.company.clone(),
            location: record.location.clone(),
            posted: record.posted.clone(),
            employment_type: record.employment_type.clone(),
            seniority: record.seniority.clone(),
            category: record.category.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_requires_job_url() {
        let valid = JobRecord::new("quant", 0, "https://x/job/1", "https://x/search");
        let blank = JobRecord::new("quant", 0, "   ", "https://x/search");

        assert!(valid.has_identity());
        assert!(!blank.has_identity());
    }

    #[test]
    fn test_fingerprint_ignores_provenance() {
        let a = JobRecord::new("quant", 0, "https://x/job/1", "https://x/a");
        let b = JobRecord::new("data scientist", 2, "https://x/job/1", "https://x/b")
            .with_title("Different title");

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_dedup_entry_projection() {
        let record = JobRecord::new("quant", 1, "https://x/job/1", "https://x/s")
            .with_title("Quant Analyst")
            .with_category("Banking");

        let entry = DedupEntry::from(&record);
        assert_eq!(entry.job_url, "https://x/job/1");
        assert_eq!(entry.search_query.as_deref(), Some("quant"));
        assert_eq!(entry.title.as_deref(), Some("Quant Analyst"));
        assert_eq!(entry.category.as_deref(), Some("Banking"));
        assert!(entry.company.is_none());
    }
}
