//! reqwest-backed transport.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{TransportError, TransportResult};
use crate::traits::transport::Transport;
use crate::types::config::CrawlConfig;
use crate::types::request::{Method, Request, Response};

/// Sends requests over HTTP with a per-request timeout.
///
/// # Example
///
/// ```rust,ignore
/// use mycf_crawler::transports::HttpTransport;
///
/// let transport = HttpTransport::new(Duration::from_secs(60), "mycf-scraper/1.0")?;
/// let response = transport.fetch(&request).await?;
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    pub fn from_config(config: &CrawlConfig) -> Result<Self, reqwest::Error> {
        Self::new(config.request_timeout, &config.user_agent)
    }

    /// Use a preconfigured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn map_error(url: &str, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
            }
        } else if e.is_builder() {
            TransportError::InvalidUrl {
                url: url.to_string(),
            }
        } else {
            TransportError::Connection {
                url: url.to_string(),
                source: Box::new(e),
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &Request) -> TransportResult<Response> {
        let url = reqwest::Url::parse(&request.url).map_err(|_| TransportError::InvalidUrl {
            url: request.url.clone(),
        })?;

        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        debug!(url = %request.url, variant = %request.variant_label(), "HTTP fetch starting");
        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_error(&request.url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %request.url, status = status.as_u16(), "Non-success status");
            return Err(TransportError::Status {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .text()
            .await
            .map_err(|e| Self::map_error(&request.url, e))?;

        Ok(Response {
            status: status.as_u16(),
            headers,
            body,
            url: final_url,
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}
