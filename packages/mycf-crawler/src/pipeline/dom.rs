//! HTML search-page normalizer.
//!
//! Cards are located by their `data-testid` marker. A page with no cards
//! signals the scheduler to re-route that page through the API.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::pipeline::normalize::{resolve_url, Normalized};
use crate::pipeline::recency::RecencyFilter;
use crate::types::record::JobRecord;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static CARD: LazyLock<Selector> = LazyLock::new(|| {
    selector("[data-testid='job-card'], a[data-testid='job-card-link']")
});
static TITLE: LazyLock<Selector> = LazyLock::new(|| {
    selector("[data-testid='job-card__job-title'], [data-testid='job-card-title'], h2, h3")
});
static COMPANY: LazyLock<Selector> = LazyLock::new(|| {
    selector("[data-testid='job-card__company-hire-info'], [data-testid='company-hire-info']")
});
static LOCATION: LazyLock<Selector> = LazyLock::new(|| {
    selector("[data-testid='job-card__location'], [data-testid='job-card-location']")
});
static POSTED: LazyLock<Selector> = LazyLock::new(|| {
    selector("[data-testid='job-card__posted-date'], [data-testid='job-card-date']")
});
static TIME: LazyLock<Selector> = LazyLock::new(|| selector("time[datetime]"));
static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));

/// Result of normalizing one HTML page.
#[derive(Debug, Clone, PartialEq)]
pub enum DomOutcome {
    Cards(Normalized),

    /// No job cards on the page; retry it through the API
    FallbackRequired,
}

/// Collapsed text of the first element matching `sel` under `card`.
fn first_text(card: &ElementRef<'_>, sel: &Selector) -> Option<String> {
    card.select(sel).find_map(|el| {
        let text = el.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        (!text.is_empty()).then_some(text)
    })
}

fn card_link<'a>(card: &ElementRef<'a>) -> Option<&'a str> {
    card.value()
        .attr("href")
        .or_else(|| card.select(&LINK).find_map(|a| a.value().attr("href")))
}

/// Maps rendered search pages onto job records.
#[derive(Debug, Clone, Copy)]
pub struct DomNormalizer {
    filter: RecencyFilter,
}

impl DomNormalizer {
    pub fn new(filter: RecencyFilter) -> Self {
        Self { filter }
    }

    pub fn normalize(
        &self,
        html: &str,
        keyword: &str,
        page_index: u32,
        source_url: &str,
    ) -> DomOutcome {
        let document = Html::parse_document(html);
        let cards: Vec<_> = document.select(&CARD).collect();
        if cards.is_empty() {
            return DomOutcome::FallbackRequired;
        }

        let mut out = Normalized::default();
        for card in cards {
            let posted_text = first_text(&card, &POSTED);
            let machine = card
                .select(&TIME)
                .find_map(|t| t.value().attr("datetime"))
                .map(str::trim)
                .filter(|s| !s.is_empty());

            if !self.filter.keep(posted_text.as_deref(), machine) {
                out.stale += 1;
                continue;
            }

            let job_url = card_link(&card)
                .and_then(|href| resolve_url(source_url, href))
                .unwrap_or_default();

            out.records.push(JobRecord {
                search_query: keyword.to_string(),
                page_index,
                title: first_text(&card, &TITLE),
                company: first_text(&card, &COMPANY),
                location: first_text(&card, &LOCATION),
                salary: None,
                posted: posted_text.or_else(|| machine.map(String::from)),
                employment_type: None,
                seniority: None,
                category: None,
                job_url,
                source_url: source_url.to_string(),
            });
        }

        DomOutcome::Cards(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::html_search_page;
    use chrono::DateTime;

    const SOURCE: &str = "https://www.mycareersfuture.gov.sg/search?search=quant&page=0";

    fn normalizer() -> DomNormalizer {
        let now = DateTime::parse_from_rfc3339("2025-10-12T12:00:00+08:00").unwrap();
        DomNormalizer::new(RecencyFilter::new(7, now))
    }

    fn cards(outcome: DomOutcome) -> Normalized {
        match outcome {
            DomOutcome::Cards(n) => n,
            DomOutcome::FallbackRequired => panic!("expected cards"),
        }
    }

    #[test]
    fn test_extracts_card_fields() {
        let html = r#"
            <div data-testid="job-card">
              <a href="/job/banking/quant-analyst-1">
                <span data-testid="job-card__job-title">Quant  Analyst</span>
              </a>
              <p data-testid="job-card__company-hire-info">Acme Capital</p>
              <p data-testid="job-card__location">Central</p>
              <span data-testid="job-card__posted-date">Posted 2 days ago</span>
            </div>"#;

        let out = cards(normalizer().normalize(html, "quant", 0, SOURCE));
        assert_eq!(out.records.len(), 1);

        let rec = &out.records[0];
        assert_eq!(rec.title.as_deref(), Some("Quant Analyst"));
        assert_eq!(rec.company.as_deref(), Some("Acme Capital"));
        assert_eq!(rec.location.as_deref(), Some("Central"));
        assert_eq!(rec.posted.as_deref(), Some("Posted 2 days ago"));
        assert_eq!(
            rec.job_url,
            "https://www.mycareersfuture.gov.sg/job/banking/quant-analyst-1"
        );
        assert_eq!(rec.source_url, SOURCE);
    }

    #[test]
    fn test_machine_timestamp_wins() {
        let html = r#"
            <a data-testid="job-card-link" href="https://x/job/old">
              <h3>Old role</h3>
              <span data-testid="job-card-date">just now</span>
              <time datetime="2025-08-01T00:00:00+08:00"></time>
            </a>"#;

        let out = cards(normalizer().normalize(html, "quant", 0, SOURCE));
        assert!(out.records.is_empty());
        assert_eq!(out.stale, 1);
    }

    #[test]
    fn test_no_cards_requires_fallback() {
        let html = "<html><body><p>Loading…</p></body></html>";
        assert_eq!(
            normalizer().normalize(html, "quant", 0, SOURCE),
            DomOutcome::FallbackRequired
        );
    }

    #[test]
    fn test_fixture_page() {
        let html = html_search_page(&[
            ("/job/1", "Quant Analyst", "2025-10-10"),
            ("/job/2", "Quant Dev", "2025-09-01"),
        ]);

        let out = cards(normalizer().normalize(&html, "quant", 2, SOURCE));
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].page_index, 2);
        assert_eq!(out.stale, 1);
    }
}
