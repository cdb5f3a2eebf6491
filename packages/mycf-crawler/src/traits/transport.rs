//! Transport trait for dispatching requests.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::TransportResult;
use crate::types::request::{Request, Response};

/// Fetches a single request and returns the raw response.
///
/// Implementations must enforce their own per-request timeout and report it
/// as [`TransportError::Timeout`](crate::error::TransportError::Timeout).
/// Non-success statuses are returned as errors, not as responses.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: &Request) -> TransportResult<Response>;

    /// Short identifier for logs.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn fetch(&self, request: &Request) -> TransportResult<Response> {
        (**self).fetch(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
