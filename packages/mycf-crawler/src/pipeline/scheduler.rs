//! Crawl scheduler - keyword × page iteration, fan-out probes, and the
//! normalize → admit → write path for every response.
//!
//! Keywords are crawled one after another. In API mode every page of a
//! keyword is issued eagerly and the four router variants of all pages run
//! concurrently under the shared [`AutoThrottle`]; responses are consumed
//! one at a time in arrival order. In DOM mode pages are fetched one by one
//! while cards keep appearing.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::crawlers::robots::RobotsGate;
use crate::crawlers::router::FetchRouter;
use crate::crawlers::throttle::{AutoThrottle, Outcome};
use crate::error::{ConfigError, CrawlError, NormalizeError, TransportError};
use crate::exporters::partitioned::PartitionedWriter;
use crate::pipeline::dom::{DomNormalizer, DomOutcome};
use crate::pipeline::normalize::{ApiNormalizer, Normalized};
use crate::pipeline::recency::RecencyFilter;
use crate::stores::SqliteStore;
use crate::traits::store::{Admission, DedupStore};
use crate::traits::transport::Transport;
use crate::transports::HttpTransport;
use crate::types::config::{CrawlConfig, FetchMode, ProbePolicy};
use crate::types::request::{Request, Response};

/// Lifecycle of one keyword within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeywordState {
    Pending,
    InProgress,
    Exhausted,
    Failed,
}

impl fmt::Display for KeywordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeywordState::Pending => "pending",
            KeywordState::InProgress => "in_progress",
            KeywordState::Exhausted => "exhausted",
            KeywordState::Failed => "failed",
        })
    }
}

/// Outcome of one keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordReport {
    pub keyword: String,
    pub state: KeywordState,

    /// Logical pages fully processed
    pub pages: u32,

    /// Records admitted for this keyword
    pub admitted: usize,
}

impl KeywordReport {
    fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            state: KeywordState::Pending,
            pages: 0,
            admitted: 0,
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Requests handed to the transport
    pub requests: usize,
    /// Successful responses
    pub responses: usize,
    pub transport_failures: usize,
    pub parse_failed: usize,
    pub schema_mismatch: usize,
    /// Records produced by the normalizers
    pub records_seen: usize,
    /// Entries dropped by the recency filter
    pub stale: usize,
    pub admitted: usize,
    pub duplicate: usize,
    pub invalid: usize,
    /// Admitted records the writer could not append
    pub write_failed: usize,
    /// Partitions whose final flush failed on close
    pub close_failed: usize,
    /// Admissions that failed on a store error
    pub store_failed: usize,
    pub keywords: Vec<KeywordReport>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report for a keyword, if it was part of the run.
    pub fn keyword(&self, keyword: &str) -> Option<&KeywordReport> {
        self.keywords.iter().find(|k| k.keyword == keyword)
    }

    /// No keyword failed.
    pub fn is_success(&self) -> bool {
        self.keywords
            .iter()
            .all(|k| k.state != KeywordState::Failed)
    }

    fn log(&self) {
        for report in &self.keywords {
            info!(
                keyword = %report.keyword,
                state = %report.state,
                pages = report.pages,
                admitted = report.admitted,
                "Keyword result"
            );
        }
        info!(
            requests = self.requests,
            responses = self.responses,
            transport_failures = self.transport_failures,
            parse_failed = self.parse_failed,
            schema_mismatch = self.schema_mismatch,
            records_seen = self.records_seen,
            stale = self.stale,
            admitted = self.admitted,
            duplicate = self.duplicate,
            invalid = self.invalid,
            write_failed = self.write_failed,
            close_failed = self.close_failed,
            store_failed = self.store_failed,
            "Run complete"
        );
    }
}

/// Result of one probe.
#[derive(Debug)]
enum Probe {
    Fetched(Response),
    Failed(TransportError),
    /// Cancelled before a response arrived
    Skipped,
}

/// Per-page bookkeeping for API fan-out.
#[derive(Debug, Default)]
struct PageProgress {
    pending: usize,
    /// Some variant went out rather than being skipped
    attempted: bool,
    responded: bool,
    fatal: bool,
}

impl PageProgress {
    fn new(pending: usize) -> Self {
        Self {
            pending,
            ..Default::default()
        }
    }

    fn observe(&mut self, result: ProbeResult) {
        self.pending = self.pending.saturating_sub(1);
        match result {
            ProbeResult::Responded { .. } => {
                self.attempted = true;
                self.responded = true;
            }
            ProbeResult::Failed { recoverable } => {
                self.attempted = true;
                self.fatal |= !recoverable;
            }
            ProbeResult::Skipped => {}
        }
    }

    /// Nothing answered and at least one variant failed for good.
    fn abandoned(&self) -> bool {
        !self.responded && self.fatal
    }
}

/// Drives a crawl run.
pub struct Scheduler<T, S> {
    config: CrawlConfig,
    transport: T,
    store: S,
    router: FetchRouter,
    throttle: AutoThrottle,
    robots: Option<RobotsGate>,
    api: ApiNormalizer,
    dom: DomNormalizer,

    /// Fingerprints of suppressible requests issued this run
    issued: Mutex<HashSet<String>>,
}

impl Scheduler<HttpTransport, SqliteStore> {
    /// Validate `config`, open its dedup store and build the HTTP client.
    pub async fn open(config: CrawlConfig) -> crate::error::Result<Self> {
        config.validate()?;

        let store = SqliteStore::open(&config.dedup_store_path).await?;
        let transport = HttpTransport::from_config(&config).map_err(CrawlError::Client)?;

        Ok(Self::new(config, transport, store)?)
    }
}

impl<T: Transport, S: DedupStore> Scheduler<T, S> {
    /// Validate the configuration and build a scheduler.
    pub fn new(config: CrawlConfig, transport: T, store: S) -> Result<Self, ConfigError> {
        config.validate()?;

        let filter = RecencyFilter::now_in(config.within_days, config.timezone());
        let robots = config
            .obey_robots
            .then(|| RobotsGate::new(config.user_agent.clone()));

        Ok(Self {
            router: FetchRouter::from_config(&config),
            throttle: AutoThrottle::new(config.throttle.clone()),
            robots,
            api: ApiNormalizer::new(filter),
            dom: DomNormalizer::new(filter),
            issued: Mutex::new(HashSet::new()),
            config,
            transport,
            store,
        })
    }

    /// Replace the recency filter, e.g. to pin "now".
    pub fn with_recency(mut self, filter: RecencyFilter) -> Self {
        self.api = ApiNormalizer::new(filter);
        self.dom = DomNormalizer::new(filter);
        self
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Crawl every configured keyword, then close the writer.
    ///
    /// Once `cancel` fires no further requests are issued; responses already
    /// received are still admitted and written.
    pub async fn run(&self, writer: &mut PartitionedWriter, cancel: &CancellationToken) -> RunSummary {
        let mut summary = RunSummary::new();
        self.issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        info!(
            keywords = self.config.keywords.len(),
            mode = %self.config.mode,
            max_pages = self.config.max_pages,
            within_days = self.config.within_days,
            transport = self.transport.name(),
            "Starting crawl"
        );

        for keyword in &self.config.keywords {
            let mut report = KeywordReport::new(keyword);
            if cancel.is_cancelled() {
                summary.keywords.push(report);
                continue;
            }

            report.state = KeywordState::InProgress;
            info!(keyword = %keyword, state = %report.state, "Keyword started");

            match self.config.mode {
                FetchMode::Api => {
                    self.crawl_api(keyword, &mut report, &mut summary, writer, cancel)
                        .await
                }
                FetchMode::Dom => {
                    self.crawl_dom(keyword, &mut report, &mut summary, writer, cancel)
                        .await
                }
            }

            if report.state == KeywordState::InProgress {
                report.state = KeywordState::Exhausted;
            }
            info!(keyword = %keyword, state = %report.state, pages = report.pages, "Keyword finished");
            summary.keywords.push(report);
        }

        summary.close_failed = writer.close().len();

        summary.log();
        summary
    }

    /// Issue every page eagerly and consume responses as they arrive.
    async fn crawl_api(
        &self,
        keyword: &str,
        report: &mut KeywordReport,
        summary: &mut RunSummary,
        writer: &mut PartitionedWriter,
        cancel: &CancellationToken,
    ) {
        let referer = self.router.search_url(keyword, 0);
        let keyword_token = cancel.child_token();

        let mut requests = Vec::new();
        let mut tokens = Vec::new();
        let mut progress = Vec::new();
        for page in 0..self.config.max_pages {
            let variants = self.router.build_requests(keyword, page, &referer);
            tokens.push(keyword_token.child_token());
            progress.push(PageProgress::new(variants.len()));
            requests.extend(variants);
        }

        let mut in_flight: FuturesUnordered<_> = requests
            .iter()
            .map(|request| {
                let token = &tokens[request.context.page_index as usize];
                async move { (request, self.probe(request, token).await) }
            })
            .collect();

        while let Some((request, probe)) = in_flight.next().await {
            let page = request.context.page_index;
            let result = self.handle_probe(request, probe, report, summary, writer).await;

            let Some(state) = progress.get_mut(page as usize) else {
                continue;
            };
            if let ProbeResult::Responded { records } = result {
                if records > 0 && self.config.probe_policy == ProbePolicy::FirstSuccess {
                    debug!(keyword = %keyword, page, "Page satisfied, skipping remaining variants");
                    tokens[page as usize].cancel();
                }
            }
            state.observe(result);

            if state.pending == 0 {
                if state.attempted {
                    report.pages += 1;
                }
                if state.abandoned() {
                    warn!(keyword = %keyword, page, "Every variant failed, abandoning keyword");
                    report.state = KeywordState::Failed;
                    keyword_token.cancel();
                } else if !state.responded {
                    debug!(keyword = %keyword, page, "No variant responded, treating page as empty");
                }
            }
        }
    }

    /// Fetch pages one by one while cards are found.
    async fn crawl_dom(
        &self,
        keyword: &str,
        report: &mut KeywordReport,
        summary: &mut RunSummary,
        writer: &mut PartitionedWriter,
        cancel: &CancellationToken,
    ) {
        for page in 0..self.config.max_pages {
            if cancel.is_cancelled() {
                return;
            }

            let request = self.router.dom_request(keyword, page);
            let probe = self.probe(&request, cancel).await;
            let response = match probe {
                Probe::Fetched(response) => response,
                Probe::Failed(e) => {
                    summary.transport_failures += 1;
                    if !matches!(e, TransportError::RobotsDisallowed { .. }) {
                        summary.requests += 1;
                    }
                    if !e.is_recoverable() {
                        warn!(keyword = %keyword, page, error = %e, "DOM page failed");
                        report.state = KeywordState::Failed;
                        return;
                    }
                    warn!(keyword = %keyword, page, error = %e, "DOM page failed, falling back to API");
                    let fallback = self
                        .fallback_to_api(&request, report, summary, writer, cancel)
                        .await;
                    Self::settle_fallback(keyword, page, &fallback, report);
                    return;
                }
                Probe::Skipped => return,
            };
            summary.requests += 1;
            summary.responses += 1;

            let source_url = if response.url.is_empty() {
                request.source_url().to_string()
            } else {
                response.url.clone()
            };

            match self.dom.normalize(&response.body, keyword, page, &source_url) {
                DomOutcome::Cards(normalized) => {
                    self.consume(&request, normalized, report, summary, writer)
                        .await;
                    report.pages += 1;
                }
                DomOutcome::FallbackRequired => {
                    warn!(keyword = %keyword, page, url = %source_url, "No cards on page, falling back to API");
                    let fallback = self
                        .fallback_to_api(&request, report, summary, writer, cancel)
                        .await;
                    Self::settle_fallback(keyword, page, &fallback, report);
                    return;
                }
            }
        }
    }

    async fn fallback_to_api(
        &self,
        dom_request: &Request,
        report: &mut KeywordReport,
        summary: &mut RunSummary,
        writer: &mut PartitionedWriter,
        cancel: &CancellationToken,
    ) -> PageProgress {
        let requests = self.router.fallback_requests(
            &dom_request.context.keyword,
            dom_request.context.page_index,
            dom_request.source_url(),
        );

        let mut in_flight: FuturesUnordered<_> = requests
            .iter()
            .map(|request| async move { (request, self.probe(request, cancel).await) })
            .collect();

        let mut progress = PageProgress::new(requests.len());
        while let Some((request, probe)) = in_flight.next().await {
            let result = self.handle_probe(request, probe, report, summary, writer).await;
            progress.observe(result);
        }
        progress
    }

    /// Count the DOM page once its fallback is done, failing the keyword if
    /// the fallback could not get an answer.
    fn settle_fallback(keyword: &str, page: u32, fallback: &PageProgress, report: &mut KeywordReport) {
        // The DOM request itself went out, so the page counts.
        report.pages += 1;
        if fallback.abandoned() {
            warn!(keyword = %keyword, page, "API fallback failed, abandoning keyword");
            report.state = KeywordState::Failed;
        }
    }

    /// Issue one request unless `token` is cancelled first.
    async fn probe(&self, request: &Request, token: &CancellationToken) -> Probe {
        if token.is_cancelled() {
            return Probe::Skipped;
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => Probe::Skipped,
            probe = self.issue(request) => probe,
        }
    }

    async fn issue(&self, request: &Request) -> Probe {
        if self.is_repeat(request) {
            debug!(url = %request.url, variant = %request.variant_label(), "Request already issued this run");
            return Probe::Skipped;
        }

        if let Some(robots) = &self.robots {
            if let Err(e) = robots.check(&self.transport, &self.throttle, request).await {
                return Probe::Failed(e);
            }
        }

        let Some(permit) = self.throttle.acquire().await else {
            return Probe::Skipped;
        };

        let result = self.transport.fetch(request).await;
        self.throttle.record(permit, Outcome::of(&result)).await;

        match result {
            Ok(response) => Probe::Fetched(response),
            Err(e) => Probe::Failed(e),
        }
    }

    /// Whether an identical request already went out and may be suppressed.
    fn is_repeat(&self, request: &Request) -> bool {
        if request.always_issue {
            return false;
        }
        let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        !issued.insert(request.fingerprint())
    }

    /// Normalize an API probe result and push its records through the gate.
    async fn handle_probe(
        &self,
        request: &Request,
        probe: Probe,
        report: &mut KeywordReport,
        summary: &mut RunSummary,
        writer: &mut PartitionedWriter,
    ) -> ProbeResult {
        let ctx = &request.context;
        let response = match probe {
            Probe::Fetched(response) => response,
            Probe::Failed(e) => {
                if !matches!(e, TransportError::RobotsDisallowed { .. }) {
                    summary.requests += 1;
                }
                summary.transport_failures += 1;
                warn!(
                    keyword = %ctx.keyword,
                    page = ctx.page_index,
                    variant = %request.variant_label(),
                    error = %e,
                    "Request variant failed"
                );
                return ProbeResult::Failed {
                    recoverable: e.is_recoverable(),
                };
            }
            Probe::Skipped => return ProbeResult::Skipped,
        };
        summary.requests += 1;
        summary.responses += 1;

        let normalized = match self.api.normalize(
            &response,
            &ctx.keyword,
            ctx.page_index,
            request.source_url(),
        ) {
            Ok(normalized) => normalized,
            Err(NormalizeError::Parse { url, snippet }) => {
                summary.parse_failed += 1;
                warn!(
                    keyword = %ctx.keyword,
                    page = ctx.page_index,
                    variant = %request.variant_label(),
                    url = %url,
                    snippet = %snippet,
                    "Response body is not JSON"
                );
                return ProbeResult::Responded { records: 0 };
            }
            Err(NormalizeError::SchemaMismatch { url, keys }) => {
                summary.schema_mismatch += 1;
                warn!(
                    keyword = %ctx.keyword,
                    page = ctx.page_index,
                    variant = %request.variant_label(),
                    url = %url,
                    keys = ?keys,
                    "No known results container"
                );
                return ProbeResult::Responded { records: 0 };
            }
        };

        let records = normalized.records.len();
        self.consume(request, normalized, report, summary, writer)
            .await;
        ProbeResult::Responded { records }
    }

    /// Admit and write records in order.
    async fn consume(
        &self,
        request: &Request,
        normalized: Normalized,
        report: &mut KeywordReport,
        summary: &mut RunSummary,
        writer: &mut PartitionedWriter,
    ) {
        let (mut admitted, mut duplicate, mut invalid) = (0, 0, normalized.malformed);
        for record in &normalized.records {
            summary.records_seen += 1;
            match self.store.admit(record).await {
                Ok(Admission::Admitted) => {
                    admitted += 1;
                    if let Err(e) = writer.write(record) {
                        summary.write_failed += 1;
                        debug!(job_url = %record.job_url, error = %e, "Admitted record not written");
                    }
                }
                Ok(Admission::RejectedDuplicate) => duplicate += 1,
                Ok(Admission::RejectedInvalid) => invalid += 1,
                Err(e) => {
                    summary.store_failed += 1;
                    warn!(job_url = %record.job_url, error = %e, "Dedup store admission failed");
                }
            }
        }

        summary.stale += normalized.stale;
        summary.admitted += admitted;
        summary.duplicate += duplicate;
        summary.invalid += invalid;
        report.admitted += admitted;

        debug!(
            keyword = %request.context.keyword,
            page = request.context.page_index,
            variant = %request.variant_label(),
            records = normalized.records.len(),
            stale = normalized.stale,
            admitted,
            duplicate,
            invalid,
            "Processed response"
        );
    }
}

/// What a probe contributed to its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeResult {
    Responded { records: usize },
    Failed { recoverable: bool },
    Skipped,
}
