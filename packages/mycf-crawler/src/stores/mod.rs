//! Dedup store implementations.
//!
//! Available backends:
//! - `SqliteStore` - file-backed store that survives restarts
//! - `MemoryStore` - in-process store for tests and dry runs

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
