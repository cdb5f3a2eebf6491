//! Request and response shapes exchanged with a transport.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// HTTP method of a request variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance carried from request to the records it yields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub keyword: String,

    /// Logical page this request probes
    pub page_index: u32,

    /// Search page used as referer and as base for relative job links
    pub referer: String,
}

/// One request the scheduler may dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub url: String,
    pub method: Method,

    /// Header names are lowercase
    pub headers: BTreeMap<String, String>,

    /// JSON body for POST variants
    pub body: Option<serde_json::Value>,

    /// Page number actually sent upstream (may differ from the logical page)
    pub page_param: u32,

    /// Deliberately redundant variant: issue even if an identical request
    /// already went out this run
    pub always_issue: bool,

    pub context: RequestContext,
}

impl Request {
    /// Short label for logs, e.g. `POST p1`.
    pub fn variant_label(&self) -> String {
        format!("{} p{}", self.method, self.page_param)
    }

    /// Base URL relative job links are resolved against.
    pub fn source_url(&self) -> &str {
        &self.context.referer
    }

    /// Identity used to spot repeated requests: method, URL and body.
    pub fn fingerprint(&self) -> String {
        match &self.body {
            Some(body) => format!("{} {} {}", self.method, self.url, body),
            None => format!("{} {}", self.method, self.url),
        }
    }
}

/// A fetched response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,

    /// Final URL after redirects
    pub url: String,
}

impl Response {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
            url: url.into(),
        }
    }

    pub fn ok(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(url, 200, body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
