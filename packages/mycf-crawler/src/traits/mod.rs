//! Core trait abstractions.
//!
//! - [`transport::Transport`] - fetches one request variant
//! - [`store::DedupStore`] - persistent at-most-once admission gate

pub mod store;
pub mod transport;
