//! Crawl pipeline: scheduler → router → transport → normalizer → dedup gate → writer.
//!
//! - `recency` - posted-time resolution and the within-window check
//! - `normalize` - JSON search responses → records
//! - `dom` - rendered search pages → records
//! - `scheduler` - keyword × page iteration and run summary

pub mod dom;
pub mod normalize;
pub mod recency;
pub mod scheduler;

pub use dom::{DomNormalizer, DomOutcome};
pub use normalize::{ApiNormalizer, Normalized};
pub use recency::{Posted, RecencyFilter};
pub use scheduler::{KeywordReport, KeywordState, RunSummary, Scheduler};
