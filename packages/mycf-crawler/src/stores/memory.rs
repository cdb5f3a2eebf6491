//! In-memory dedup store for testing and dry runs.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;

use crate::error::StoreResult;
use crate::traits::store::{DedupStore, JobQuery};
use crate::types::record::DedupEntry;

#[derive(Default)]
struct Inner {
    keys: HashSet<String>,
    /// Insertion order, oldest first
    entries: Vec<DedupEntry>,
}

/// In-memory dedup store.
///
/// Not suitable for production: admissions are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DedupStore for MemoryStore {
    async fn insert_if_absent(&self, entry: &DedupEntry) -> StoreResult<bool> {
        let mut inner = self.inner.write().unwrap();
        if !inner.keys.insert(entry.job_url.clone()) {
            return Ok(false);
        }
        inner.entries.push(entry.clone());
        Ok(true)
    }

    async fn contains(&self, job_url: &str) -> StoreResult<bool> {
        Ok(self.inner.read().unwrap().keys.contains(job_url))
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.len())
    }

    async fn query_jobs(&self, query: &JobQuery) -> StoreResult<Vec<DedupEntry>> {
        let inner = self.inner.read().unwrap();
        let matches = |pattern: &str, value: &Option<String>| {
            like_match(pattern, value.as_deref().unwrap_or(""))
        };

        Ok(inner
            .entries
            .iter()
            .rev()
            .filter(|e| {
                matches(&query.category_like, &e.category)
                    && matches(&query.keyword_like, &e.search_query)
                    && matches(&query.posted_like, &e.posted)
            })
            .take(query.limit)
            .cloned()
            .collect())
    }
}

/// Case-insensitive SQL `LIKE` (`%` and `_` wildcards, no escapes).
pub fn like_match(pattern: &str, value: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let value: Vec<char> = value.to_lowercase().chars().collect();

    // Classic wildcard matching with single backtrack point
    let (mut p, mut v) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_v = 0;

    while v < value.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == value[v]) {
            p += 1;
            v += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            star = Some(p);
            star_v = v;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            star_v += 1;
            v = star_v;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '%' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::store::Admission;
    use crate::types::record::JobRecord;

    #[test]
    fn test_like_match() {
        assert!(like_match("%", ""));
        assert!(like_match("%", "anything"));
        assert!(like_match("2025-10%", "2025-10-12T00:00:00Z"));
        assert!(!like_match("2025-10%", "3 days ago"));
        assert!(like_match("bank%", "Banking and Finance"));
        assert!(like_match("%data%", "Senior Data Scientist"));
        assert!(like_match("q_ant", "quant"));
        assert!(!like_match("quant", "quants"));
    }

    #[tokio::test]
    async fn test_memory_admission() {
        let store = MemoryStore::new();
        let rec = JobRecord::new("quant", 0, "https://x/job/1", "https://x/s");

        assert_eq!(store.admit(&rec).await.unwrap(), Admission::Admitted);
        assert_eq!(store.admit(&rec).await.unwrap(), Admission::RejectedDuplicate);
        assert_eq!(
            store
                .admit(&JobRecord::new("quant", 0, "", "https://x/s"))
                .await
                .unwrap(),
            Admission::RejectedInvalid
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_query_newest_first() {
        let store = MemoryStore::new();
        for i in 0..3 {
            let rec = JobRecord::new("quant", 0, format!("https://x/job/{i}"), "https://x/s");
            store.admit(&rec).await.unwrap();
        }

        let rows = store.query_jobs(&JobQuery::new().with_limit(2)).await.unwrap();
        let urls: Vec<_> = rows.iter().map(|e| e.job_url.as_str()).collect();
        assert_eq!(urls, vec!["https://x/job/2", "https://x/job/1"]);
    }
}
