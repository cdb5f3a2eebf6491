//! Mock transport for testing.
//!
//! A canned reply applies to every request matching its [`Route`]. When
//! several routes match, the most specific one wins, and among equally
//! specific routes the one added last. Anything unmatched answers HTTP 404.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{TransportError, TransportResult};
use crate::traits::transport::Transport;
use crate::types::request::{Method, Request, Response};

/// Which requests a canned reply applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    url: String,
    method: Option<Method>,
    page: Option<u32>,
    keyword: Option<String>,
}

impl Route {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: None,
            page: None,
            keyword: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Match only requests sending this page parameter.
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Match only requests issued for this keyword.
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    fn matches(&self, request: &Request) -> bool {
        self.url == request.url
            && self.method.map_or(true, |m| m == request.method)
            && self.page.map_or(true, |p| p == request.page_param)
            && self
                .keyword
                .as_ref()
                .map_or(true, |k| *k == request.context.keyword)
    }

    fn specificity(&self) -> usize {
        usize::from(self.method.is_some())
            + usize::from(self.page.is_some())
            + usize::from(self.keyword.is_some())
    }
}

/// Failure a route can be configured to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Timeout,
    Connection,
    Status(u16),
}

#[derive(Debug, Clone)]
enum Reply {
    Respond(Response),
    Fail(MockFailure),
}

/// Mock transport with canned replies and call recording.
///
/// # Example
///
/// ```rust
/// use mycf_crawler::transports::{MockTransport, Route};
/// use mycf_crawler::types::request::{Method, Response};
///
/// let mock = MockTransport::new()
///     .with_route(Route::url("https://api/x").method(Method::Post), Response::ok("https://api/x", "{}"));
/// ```
#[derive(Default, Clone)]
pub struct MockTransport {
    routes: Arc<RwLock<Vec<(Route, Reply)>>>,
    calls: Arc<RwLock<Vec<Request>>>,
    latency: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to any request for `url`.
    pub fn with_response(self, url: impl Into<String>, response: Response) -> Self {
        self.with_route(Route::url(url), response)
    }

    pub fn with_route(self, route: Route, response: Response) -> Self {
        self.routes
            .write()
            .unwrap()
            .push((route, Reply::Respond(response)));
        self
    }

    pub fn with_failure(self, route: Route, failure: MockFailure) -> Self {
        self.routes
            .write()
            .unwrap()
            .push((route, Reply::Fail(failure)));
        self
    }

    /// Delay every reply.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// All requests received, in order.
    pub fn calls(&self) -> Vec<Request> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Number of requests received for exactly `url`.
    pub fn calls_to(&self, url: &str) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    pub fn reset_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn lookup(&self, request: &Request) -> Option<Reply> {
        let routes = self.routes.read().unwrap();
        routes
            .iter()
            .enumerate()
            .filter(|(_, (route, _))| route.matches(request))
            .max_by_key(|(i, (route, _))| (route.specificity(), *i))
            .map(|(_, (_, reply))| reply.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, request: &Request) -> TransportResult<Response> {
        self.calls.write().unwrap().push(request.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let url = request.url.clone();
        match self.lookup(request) {
            Some(Reply::Respond(response)) if response.is_success() => Ok(response),
            Some(Reply::Respond(response)) => Err(TransportError::Status {
                url,
                status: response.status,
            }),
            Some(Reply::Fail(MockFailure::Timeout)) => Err(TransportError::Timeout { url }),
            Some(Reply::Fail(MockFailure::Connection)) => Err(TransportError::Connection {
                url,
                source: "connection reset by peer".into(),
            }),
            Some(Reply::Fail(MockFailure::Status(status))) => {
                Err(TransportError::Status { url, status })
            }
            None => Err(TransportError::Status { url, status: 404 }),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawlers::router::FetchRouter;

    fn requests() -> Vec<Request> {
        FetchRouter::new("https://api/search", "https://site/search", "new", 20)
            .build_requests("quant", 0, "https://site/search?search=quant")
    }

    #[tokio::test]
    async fn test_most_specific_route_wins() {
        let mock = MockTransport::new()
            .with_route(
                Route::url("https://api/search").method(Method::Post),
                Response::ok("https://api/search", "any page"),
            )
            .with_route(
                Route::url("https://api/search").method(Method::Post).page(1),
                Response::ok("https://api/search", "page one"),
            );

        let requests = requests();
        assert_eq!(mock.fetch(&requests[0]).await.unwrap().body, "any page");
        assert_eq!(mock.fetch(&requests[2]).await.unwrap().body, "page one");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_keyword_routes() {
        let router = FetchRouter::new("https://api/search", "https://site/search", "new", 20);
        let quant = router.api_request("quant", 0, 0, Method::Post, "https://ref");
        let data = router.api_request("data", 0, 0, Method::Post, "https://ref");

        let mock = MockTransport::new()
            .with_route(
                Route::url("https://api/search").keyword("quant"),
                Response::ok("https://api/search", "quant"),
            )
            .with_route(
                Route::url("https://api/search").keyword("data"),
                Response::ok("https://api/search", "data"),
            );

        assert_eq!(mock.fetch(&quant).await.unwrap().body, "quant");
        assert_eq!(mock.fetch(&data).await.unwrap().body, "data");
    }

    #[tokio::test]
    async fn test_unmatched_and_failures() {
        let requests = requests();
        let mock = MockTransport::new().with_failure(Route::url(&requests[1].url), MockFailure::Timeout);

        let err = mock.fetch(&requests[0]).await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 404, .. }));

        let err = mock.fetch(&requests[1]).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
        assert!(err.is_recoverable());

        assert_eq!(mock.calls().len(), 2);
        mock.reset_calls();
        assert_eq!(mock.call_count(), 0);
    }
}
