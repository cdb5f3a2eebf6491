//! Partitioned CSV writer.
//!
//! Records land in `{root}/{by_keyword|by_category}/{key}/{YYYY-MM-DD}.csv`.
//! The writer owns a registry of open partition files: each is opened
//! lazily on first write, appended to for the rest of the run, and closed
//! by [`PartitionedWriter::close`]. The header row is written only when the
//! file did not exist before it was opened, so reruns on the same day
//! append without repeating it.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{FixedOffset, NaiveDate, Utc};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{WriterError, WriterResult};
use crate::types::config::PartitionMode;
use crate::types::record::JobRecord;

/// Longest partition key, in characters.
pub const MAX_KEY_LEN: usize = 80;

pub const UNKNOWN_KEY: &str = "Unknown";

static ILLEGAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[\\/:*?"<>|\x00-\x1f]+"#).expect("static regex is valid")
});

/// Turn a keyword or category into a safe directory name.
///
/// Never returns an empty string.
pub fn sanitize_partition_key(raw: Option<&str>) -> String {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    let replaced = ILLEGAL.replace_all(trimmed, "_");
    let capped: String = replaced.chars().take(MAX_KEY_LEN).collect();

    if capped.is_empty() {
        UNKNOWN_KEY.to_string()
    } else if capped.chars().all(|c| c == '.') {
        // "." and ".." would escape the partition directory.
        "_".repeat(capped.len())
    } else {
        capped
    }
}

struct Partition {
    path: PathBuf,
    writer: csv::Writer<File>,
}

enum Slot {
    Open(Partition),

    /// Failed earlier this run; rejects further writes
    Failed,
}

/// Registry of open partition files for one run.
pub struct PartitionedWriter {
    root: PathBuf,
    mode: PartitionMode,
    date: String,
    partitions: HashMap<String, Slot>,
    written: usize,
}

impl PartitionedWriter {
    pub fn new(root: impl Into<PathBuf>, mode: PartitionMode, date: NaiveDate) -> Self {
        Self {
            root: root.into(),
            mode,
            date: date.format("%Y-%m-%d").to_string(),
            partitions: HashMap::new(),
            written: 0,
        }
    }

    /// Writer dated with the current day in `tz`.
    pub fn for_today(root: impl Into<PathBuf>, mode: PartitionMode, tz: FixedOffset) -> Self {
        Self::new(root, mode, Utc::now().with_timezone(&tz).date_naive())
    }

    pub fn mode(&self) -> PartitionMode {
        self.mode
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    /// Records successfully written this run.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Partitions currently holding an open file.
    pub fn open_partitions(&self) -> usize {
        self.partitions
            .values()
            .filter(|slot| matches!(slot, Slot::Open(_)))
            .count()
    }

    /// Partition key a record is routed to.
    pub fn key_for(&self, record: &JobRecord) -> String {
        match self.mode {
            PartitionMode::Keyword => sanitize_partition_key(Some(&record.search_query)),
            PartitionMode::Category => sanitize_partition_key(record.category.as_deref()),
        }
    }

    pub fn partition_path(&self, key: &str) -> PathBuf {
        self.root
            .join(self.mode.dir_name())
            .join(key)
            .join(format!("{}.csv", self.date))
    }

    /// Append one record to its partition.
    ///
    /// A partition that fails is marked failed and rejects every later
    /// write this run with [`WriterError::PartitionClosed`].
    pub fn write(&mut self, record: &JobRecord) -> WriterResult<()> {
        let key = self.key_for(record);

        if !self.partitions.contains_key(&key) {
            let slot = match open_partition(&self.partition_path(&key)) {
                Ok(partition) => Slot::Open(partition),
                Err(e) => {
                    warn!(partition = %key, error = %e, "Failed to open partition");
                    self.partitions.insert(key, Slot::Failed);
                    return Err(e);
                }
            };
            self.partitions.insert(key.clone(), slot);
        }

        let Some(slot) = self.partitions.get_mut(&key) else {
            return Err(WriterError::PartitionClosed { key });
        };
        let Slot::Open(partition) = slot else {
            return Err(WriterError::PartitionClosed { key });
        };

        match append(partition, record) {
            Ok(()) => {
                self.written += 1;
                Ok(())
            }
            Err(e) => {
                warn!(partition = %key, error = %e, "Partition write failed, closing it for this run");
                *slot = Slot::Failed;
                Err(e)
            }
        }
    }

    /// Flush and close every open partition.
    ///
    /// Every partition is attempted; the errors of those that failed are
    /// returned.
    pub fn close(&mut self) -> Vec<WriterError> {
        let mut errors = Vec::new();

        for (key, slot) in self.partitions.drain() {
            let Slot::Open(mut partition) = slot else {
                continue;
            };
            if let Err(source) = partition.writer.flush() {
                warn!(partition = %key, error = %source, "Failed to flush partition");
                errors.push(WriterError::Io {
                    path: partition.path,
                    source,
                });
                continue;
            }
            debug!(partition = %key, path = %partition.path.display(), "Closed partition");
        }

        info!(written = self.written, failed = errors.len(), "Partitioned writer closed");
        errors
    }
}

fn open_partition(path: &Path) -> WriterResult<Partition> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| WriterError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let existed = path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| WriterError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    debug!(path = %path.display(), header = !existed, "Opened partition");
    let writer = csv::WriterBuilder::new()
        .has_headers(!existed)
        .from_writer(file);

    Ok(Partition {
        path: path.to_path_buf(),
        writer,
    })
}

fn append(partition: &mut Partition, record: &JobRecord) -> WriterResult<()> {
    partition
        .writer
        .serialize(record)
        .map_err(|source| WriterError::Csv {
            path: partition.path.clone(),
            source,
        })?;
    partition.writer.flush().map_err(|source| WriterError::Io {
        path: partition.path.clone(),
        source,
    })
}
