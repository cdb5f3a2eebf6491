//! Fetch router.
//!
//! The upstream search API is inconsistent about both the HTTP method it
//! accepts and whether pages are 0- or 1-indexed, so every logical page is
//! probed with four variants. All of them are marked `always_issue`; the
//! dedup gate is what collapses the duplicate results.

use std::collections::BTreeMap;

use serde_json::json;
use url::form_urlencoded;

use crate::types::config::CrawlConfig;
use crate::types::request::{Method, Request, RequestContext};

const ORIGIN: &str = "https://www.mycareersfuture.gov.sg";

/// Builds the candidate requests for a `(keyword, page)` pair.
#[derive(Debug, Clone)]
pub struct FetchRouter {
    api_base: String,
    site_search_base: String,
    sort: String,
    per_page: u32,
}

impl FetchRouter {
    pub fn new(
        api_base: impl Into<String>,
        site_search_base: impl Into<String>,
        sort: impl Into<String>,
        per_page: u32,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            site_search_base: site_search_base.into(),
            sort: sort.into(),
            per_page,
        }
    }

    pub fn from_config(config: &CrawlConfig) -> Self {
        Self::new(
            &config.api_base,
            &config.site_search_base,
            &config.sort,
            config.per_page,
        )
    }

    /// Public search page URL, used as referer and as the DOM page.
    pub fn search_url(&self, keyword: &str, page: u32) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("search", keyword)
            .append_pair("sortBy", &self.sort)
            .append_pair("page", &page.to_string())
            .finish();
        format!("{}?{}", self.site_search_base, query)
    }

    /// POST(i), GET(i), POST(i+1), GET(i+1).
    pub fn build_requests(&self, keyword: &str, page_index: u32, referer: &str) -> Vec<Request> {
        [
            (Method::Post, page_index),
            (Method::Get, page_index),
            (Method::Post, page_index + 1),
            (Method::Get, page_index + 1),
        ]
        .into_iter()
        .map(|(method, page_param)| {
            self.api_request(keyword, page_index, page_param, method, referer)
        })
        .collect()
    }

    /// API variants issued when a DOM page rendered no cards.
    pub fn fallback_requests(&self, keyword: &str, page_index: u32, referer: &str) -> Vec<Request> {
        [Method::Post, Method::Get]
            .into_iter()
            .map(|method| self.api_request(keyword, page_index, page_index, method, referer))
            .collect()
    }

    /// Rendered search page for DOM mode.
    pub fn dom_request(&self, keyword: &str, page_index: u32) -> Request {
        let url = self.search_url(keyword, page_index);
        let mut headers = BTreeMap::new();
        headers.insert("accept".to_string(), "text/html,application/xhtml+xml".to_string());

        Request {
            url: url.clone(),
            method: Method::Get,
            headers,
            body: None,
            page_param: page_index,
            always_issue: false,
            context: RequestContext {
                keyword: keyword.to_string(),
                page_index,
                referer: url,
            },
        }
    }

    pub fn api_request(
        &self,
        keyword: &str,
        page_index: u32,
        page_param: u32,
        method: Method,
        referer: &str,
    ) -> Request {
        let (url, body) = match method {
            Method::Get => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair("limit", &self.per_page.to_string())
                    .append_pair("page", &page_param.to_string())
                    .append_pair("search", keyword)
                    .append_pair("sortBy", &self.sort)
                    .finish();
                (format!("{}?{}", self.api_base, query), None)
            }
            Method::Post => {
                let body = json!({
                    "search": keyword,
                    "sortBy": self.sort,
                    "filters": {},
                    "page": page_param,
                    "limit": self.per_page,
                });
                (self.api_base.clone(), Some(body))
            }
        };

        Request {
            url,
            method,
            headers: api_headers(referer),
            body,
            page_param,
            always_issue: true,
            context: RequestContext {
                keyword: keyword.to_string(),
                page_index,
                referer: referer.to_string(),
            },
        }
    }
}

fn api_headers(referer: &str) -> BTreeMap<String, String> {
    [
        ("content-type", "application/json;charset=UTF-8"),
        ("origin", ORIGIN),
        ("referer", referer),
        ("accept", "application/json"),
        ("accept-language", "en-US,en;q=0.9,zh-CN;q=0.8"),
        ("x-requested-with", "XMLHttpRequest"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::config::{DEFAULT_API_BASE, DEFAULT_SITE_SEARCH, DEFAULT_SORT};

    fn router() -> FetchRouter {
        FetchRouter::new(DEFAULT_API_BASE, DEFAULT_SITE_SEARCH, DEFAULT_SORT, 20)
    }

    #[test]
    fn test_variant_order() {
        let router = router();
        let referer = router.search_url("quant", 0);
        let requests = router.build_requests("quant", 1, &referer);

        let labels: Vec<_> = requests.iter().map(|r| r.variant_label()).collect();
        assert_eq!(labels, vec!["POST p1", "GET p1", "POST p2", "GET p2"]);

        for request in &requests {
            assert!(request.always_issue);
            assert_eq!(request.headers["accept"], "application/json");
            assert_eq!(request.context.page_index, 1);
            assert_eq!(request.context.referer, referer);
            assert_eq!(request.headers["referer"], referer);
            assert_eq!(request.headers["x-requested-with"], "XMLHttpRequest");
        }
    }

    #[test]
    fn test_post_body() {
        let requests = router().build_requests("data scientist", 0, "https://ref");
        let body = requests[2].body.as_ref().unwrap();

        assert_eq!(requests[2].url, DEFAULT_API_BASE);
        assert_eq!(body["search"], "data scientist");
        assert_eq!(body["sortBy"], "new_posting_date");
        assert_eq!(body["page"], 1);
        assert_eq!(body["limit"], 20);
        assert!(body["filters"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_get_query() {
        let requests = router().build_requests("data scientist", 0, "https://ref");
        assert_eq!(
            requests[1].url,
            format!("{DEFAULT_API_BASE}?limit=20&page=0&search=data+scientist&sortBy=new_posting_date")
        );
        assert!(requests[1].body.is_none());
    }

    #[test]
    fn test_search_url() {
        assert_eq!(
            router().search_url("c++ dev", 2),
            format!("{DEFAULT_SITE_SEARCH}?search=c%2B%2B+dev&sortBy=new_posting_date&page=2")
        );
    }

    #[test]
    fn test_fallback_and_dom_requests() {
        let router = router();
        let dom = router.dom_request("quant", 3);
        assert_eq!(dom.method, Method::Get);
        assert_eq!(dom.context.referer, dom.url);
        assert!(!dom.always_issue);

        let fallback = router.fallback_requests("quant", 3, &dom.url);
        let labels: Vec<_> = fallback.iter().map(|r| r.variant_label()).collect();
        assert_eq!(labels, vec!["POST p3", "GET p3"]);
    }
}
