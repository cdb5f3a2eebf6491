//! Domain types for the crawl pipeline.

pub mod config;
pub mod keywords;
pub mod record;
pub mod request;
