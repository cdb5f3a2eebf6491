//! Output exporters.
//!
//! - `PartitionedWriter` - dated CSV files per keyword or category
//! - `jobs` - console table and CSV export of stored jobs

pub mod jobs;
pub mod partitioned;

pub use partitioned::{sanitize_partition_key, PartitionedWriter};
