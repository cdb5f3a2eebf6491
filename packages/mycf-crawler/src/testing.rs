//! Fixtures for exercising the pipeline without the network.
//!
//! Everything here is pinned to 2025-10-12 12:00 in UTC+8 so recency
//! checks are clock-independent.

use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde_json::{json, Value};

use crate::crawlers::router::FetchRouter;
use crate::exporters::partitioned::PartitionedWriter;
use crate::pipeline::recency::RecencyFilter;
use crate::transports::mock::{MockTransport, Route};
use crate::types::config::{CrawlConfig, ThrottleConfig};
use crate::types::record::JobRecord;
use crate::types::request::{Method, Response};

/// Reference "now" for fixtures.
pub fn pinned_now() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2025-10-12T12:00:00+08:00").unwrap_or_default()
}

/// Date of [`pinned_now`], used for output file names.
pub fn pinned_date() -> NaiveDate {
    pinned_now().date_naive()
}

pub fn pinned_recency(within_days: u32) -> RecencyFilter {
    RecencyFilter::new(within_days, pinned_now())
}

/// Config writing under `dir`, with robots and throttling off.
pub fn test_config(dir: &Path) -> CrawlConfig {
    CrawlConfig::new()
        .with_output_root(dir.join("output"))
        .with_store_path(dir.join("mycf_jobs.sqlite"))
        .with_obey_robots(false)
        .with_throttle(ThrottleConfig::unthrottled(4))
}

/// Writer for `config`, dated [`pinned_date`].
pub fn writer(config: &CrawlConfig) -> PartitionedWriter {
    PartitionedWriter::new(&config.output_root, config.partition, pinned_date())
}

/// A record with identity and provenance only.
pub fn record(keyword: &str, job_url: &str) -> JobRecord {
    JobRecord::new(
        keyword,
        0,
        job_url,
        format!("https://www.mycareersfuture.gov.sg/search?search={keyword}"),
    )
}

/// One search result entry in the API's usual shape.
pub fn api_job(job_url: &str, title: &str, posted: &str) -> Value {
    json!({
        "uuid": job_url.rsplit('/').next().unwrap_or_default(),
        "jobDetailsUrl": job_url,
        "title": title,
        "company": { "name": "Acme Capital", "uen": "201912345K" },
        "location": "Central",
        "minSalary": 6000,
        "maxSalary": 9000,
        "salaryCurrency": "SGD",
        "postingDate": posted,
        "employmentType": "Full Time",
        "seniority": "Executive",
        "category": "Banking and Finance",
    })
}

/// API body `{"results": [...], "total": n}` for `(job_url, title, posted)` triples.
pub fn api_body(jobs: &[(&str, &str, &str)]) -> String {
    let results: Vec<Value> = jobs
        .iter()
        .map(|(url, title, posted)| api_job(url, title, posted))
        .collect();
    json!({ "results": results, "total": jobs.len() }).to_string()
}

/// Rendered search page with one card per `(href, title, posted)` triple.
pub fn html_search_page(cards: &[(&str, &str, &str)]) -> String {
    let cards: String = cards
        .iter()
        .map(|(href, title, posted)| {
            format!(
                r#"<div data-testid="job-card">
  <a href="{href}"><span data-testid="job-card__job-title">{title}</span></a>
  <p data-testid="job-card__company-hire-info">Acme Capital</p>
  <p data-testid="job-card__location">Central</p>
  <span data-testid="job-card__posted-date">Posted {posted}</span>
</div>
"#
            )
        })
        .collect();
    format!("<html><body><main>{cards}</main></body></html>")
}

/// Answer both POST and GET for `keyword` at upstream page `page_param`.
pub fn serve_api_page(
    transport: MockTransport,
    config: &CrawlConfig,
    keyword: &str,
    page_param: u32,
    body: &str,
) -> MockTransport {
    let router = FetchRouter::from_config(config);
    let get = router.api_request(keyword, page_param, page_param, Method::Get, "");

    transport
        .with_route(
            Route::url(&config.api_base)
                .method(Method::Post)
                .page(page_param)
                .keyword(keyword),
            Response::ok(&config.api_base, body),
        )
        .with_route(
            Route::url(&get.url).method(Method::Get),
            Response::ok(&get.url, body),
        )
}
