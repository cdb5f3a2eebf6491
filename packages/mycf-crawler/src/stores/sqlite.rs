//! SQLite dedup store.
//!
//! A single `jobs` table keyed by `job_url`. Admission is one
//! `INSERT ... ON CONFLICT DO NOTHING`, so racing callers for the same key
//! get exactly one winner without an explicit lock.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::{DedupStore, JobQuery};
use crate::types::record::DedupEntry;

/// SQLite-backed dedup store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if absent) the store file at `path`.
    ///
    /// Parent directories are created as needed and the schema is applied
    /// idempotently.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let open_err = |e: Box<dyn std::error::Error + Send + Sync>| StoreError::Open {
            path: path.display().to_string(),
            source: e,
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| open_err(Box::new(e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| open_err(Box::new(e)))?;

        let store = Self { pool };
        store
            .run_migrations()
            .await
            .map_err(|e| open_err(Box::new(e)))?;

        debug!(path = %path.display(), "Dedup store opened");
        Ok(store)
    }

    /// Open a store that must already exist (read-only consumers).
    pub async fn open_existing(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        Self::open(path).await
    }

    /// Create an in-memory store (for testing).
    ///
    /// Uses a single long-lived connection since every SQLite memory
    /// connection is its own database.
    pub async fn in_memory() -> StoreResult<Self> {
        let open_err = |e: sqlx::Error| StoreError::Open {
            path: ":memory:".to_string(),
            source: Box::new(e),
        };

        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(open_err)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(open_err)?;

        let store = Self { pool };
        store.run_migrations().await.map_err(open_err)?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                job_url TEXT PRIMARY KEY,
                search_query TEXT,
                title TEXT,
                company TEXT,
                location TEXT,
                posted TEXT,
                employment_type TEXT,
                seniority TEXT,
                category TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Close the pool, waiting for connections to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DedupStore for SqliteStore {
    async fn insert_if_absent(&self, entry: &DedupEntry) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs
                (job_url, search_query, title, company, location, posted, employment_type, seniority, category)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(job_url) DO NOTHING
            "#,
        )
        .bind(&entry.job_url)
        .bind(&entry.search_query)
        .bind(&entry.title)
        .bind(&entry.company)
        .bind(&entry.location)
        .bind(&entry.posted)
        .bind(&entry.employment_type)
        .bind(&entry.seniority)
        .bind(&entry.category)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn contains(&self, job_url: &str) -> StoreResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM jobs WHERE job_url = ?")
            .bind(job_url)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn count(&self) -> StoreResult<usize> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0 as usize)
    }

    async fn query_jobs(&self, query: &JobQuery) -> StoreResult<Vec<DedupEntry>> {
        let rows = sqlx::query_as::<_, DedupEntry>(
            r#"
            SELECT job_url, search_query, title, company, location, posted,
                   employment_type, seniority, category
            FROM jobs
            WHERE COALESCE(category, '') LIKE ?
              AND COALESCE(search_query, '') LIKE ?
              AND COALESCE(posted, '') LIKE ?
            ORDER BY rowid DESC
            LIMIT ?
            "#,
        )
        .bind(&query.category_like)
        .bind(&query.keyword_like)
        .bind(&query.posted_like)
        .bind(query.limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::store::Admission;
    use crate::types::record::JobRecord;
    use std::sync::Arc;

    fn record(url: &str) -> JobRecord {
        JobRecord::new("quant", 0, url, "https://www.mycareersfuture.gov.sg/search")
    }

    #[tokio::test]
    async fn test_admit_once() {
        let store = SqliteStore::in_memory().await.unwrap();

        let first = store.admit(&record("https://x/job/1")).await.unwrap();
        let second = store
            .admit(&record("https://x/job/1").with_title("changed"))
            .await
            .unwrap();

        assert_eq!(first, Admission::Admitted);
        assert_eq!(second, Admission::RejectedDuplicate);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_admit_invalid_never_stored() {
        let store = SqliteStore::in_memory().await.unwrap();

        let result = store.admit(&record("")).await.unwrap();

        assert_eq!(result, Admission::RejectedInvalid);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_admission_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("jobs.sqlite")).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let rec = JobRecord::new(format!("kw{i}"), 0, "https://x/job/race", "https://x/s");
                store.admit(&rec).await.unwrap()
            }));
        }

        let mut admitted = 0;
        let mut duplicate = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Admission::Admitted => admitted += 1,
                Admission::RejectedDuplicate => duplicate += 1,
                Admission::RejectedInvalid => panic!("unexpected invalid"),
            }
        }

        assert_eq!(admitted, 1);
        assert_eq!(duplicate, 7);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mycf_jobs.sqlite");

        {
            let store = SqliteStore::open(&path).await.unwrap();
            assert!(store.admit(&record("https://x/job/1")).await.unwrap().is_admitted());
            store.close().await;
        }

        let reopened = SqliteStore::open(&path).await.unwrap();
        assert!(reopened.contains("https://x/job/1").await.unwrap());
        assert_eq!(
            reopened.admit(&record("https://x/job/1")).await.unwrap(),
            Admission::RejectedDuplicate
        );
    }

    #[tokio::test]
    async fn test_open_existing_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = SqliteStore::open_existing(dir.path().join("missing.sqlite")).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_query_filters_and_order() {
        let store = SqliteStore::in_memory().await.unwrap();

        store
            .admit(&record("https://x/job/1").with_category("Banking").with_posted("2025-10-01"))
            .await
            .unwrap();
        store
            .admit(&record("https://x/job/2").with_category("IT").with_posted("2025-09-30"))
            .await
            .unwrap();
        store
            .admit(&record("https://x/job/3").with_posted("3 days ago"))
            .await
            .unwrap();

        let all = store.query_jobs(&JobQuery::new()).await.unwrap();
        let urls: Vec<_> = all.iter().map(|e| e.job_url.as_str()).collect();
        assert_eq!(urls, vec!["https://x/job/3", "https://x/job/2", "https://x/job/1"]);

        let banking = store
            .query_jobs(&JobQuery::new().with_category("bank%"))
            .await
            .unwrap();
        assert_eq!(banking.len(), 1);
        assert_eq!(banking[0].job_url, "https://x/job/1");

        let october = store
            .query_jobs(&JobQuery::new().with_posted_prefix("2025-10%"))
            .await
            .unwrap();
        assert_eq!(october.len(), 1);

        let limited = store.query_jobs(&JobQuery::new().with_limit(2)).await.unwrap();
        assert_eq!(limited.len(), 2);
    }
}
