//! Transport implementations.
//!
//! - `HttpTransport` - reqwest client with timeout and user agent
//! - `MockTransport` - canned replies for tests

pub mod http;
pub mod mock;

pub use http::HttpTransport;
pub use mock::{MockFailure, MockTransport, Route};
