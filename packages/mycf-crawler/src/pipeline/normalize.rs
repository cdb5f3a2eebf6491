//! JSON response normalizer.
//!
//! The search API has answered with several shapes over time. The results
//! array is located by an ordered table of container strategies; each entry
//! is then decoded into [`RawJob`], a typed view where every field is
//! optional and tolerant of unexpected JSON types, and mapped onto a
//! [`JobRecord`] through per-field fallback chains.

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::NormalizeError;
use crate::pipeline::recency::RecencyFilter;
use crate::types::record::JobRecord;
use crate::types::request::Response;

/// Records extracted from one response, plus what was dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub records: Vec<JobRecord>,

    /// Entries dropped by the recency filter
    pub stale: usize,

    /// Entries that were not JSON objects
    pub malformed: usize,
}

/// A named way of locating the results array.
struct ContainerStrategy {
    name: &'static str,
    locate: fn(&Value) -> Option<&Vec<Value>>,
}

fn top_level<'a>(data: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    data.get(key)?.as_array()
}

/// Tried in order; the first match wins, even if its array is empty.
const CONTAINERS: &[ContainerStrategy] = &[
    ContainerStrategy {
        name: "results",
        locate: |v| top_level(v, "results"),
    },
    ContainerStrategy {
        name: "data",
        locate: |v| top_level(v, "data"),
    },
    ContainerStrategy {
        name: "payload",
        locate: |v| top_level(v, "payload"),
    },
    ContainerStrategy {
        name: "result.results",
        locate: |v| v.get("result")?.get("results")?.as_array(),
    },
    ContainerStrategy {
        name: "jobs",
        locate: |v| top_level(v, "jobs"),
    },
    ContainerStrategy {
        name: "items",
        locate: |v| top_level(v, "items"),
    },
];

/// Locate the results array and the strategy that found it.
pub fn locate_results(data: &Value) -> Option<(&'static str, &Vec<Value>)> {
    CONTAINERS
        .iter()
        .find_map(|s| (s.locate)(data).map(|results| (s.name, results)))
}

/// String or number → trimmed, non-empty text. Anything else → `None`.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Like [`lenient_text`] but numeric zero counts as absent.
fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<f64>() {
                Ok(v) if v == 0.0 => None,
                _ => Some(s.to_string()).filter(|s| !s.is_empty()),
            }
        }
        _ => None,
    })
}

/// Any shape `T` accepts; anything else → `None` instead of an error.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(serde_json::from_value(Value::deserialize(deserializer)?).ok())
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum RawCompany {
    Plain(String),
    Named {
        #[serde(default, deserialize_with = "lenient_text")]
        name: Option<String>,
        #[serde(default, rename = "companyName", deserialize_with = "lenient_text")]
        company_name: Option<String>,
    },
    #[default]
    Unknown,
}

impl RawCompany {
    fn into_name(self) -> Option<String> {
        match self {
            RawCompany::Plain(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            RawCompany::Named { name, company_name } => name.or(company_name),
            RawCompany::Unknown => None,
        }
    }
}

/// One raw result entry. Every field is optional and type-tolerant.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawJob {
    #[serde(deserialize_with = "lenient_text")]
    job_details_url: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    seo_url: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    url_path: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    job_url: Option<String>,

    #[serde(deserialize_with = "lenient_text")]
    title: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    job_title: Option<String>,

    #[serde(deserialize_with = "lenient")]
    company: Option<RawCompany>,

    #[serde(deserialize_with = "lenient_text")]
    location: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    postal: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    job_location: Option<String>,

    #[serde(deserialize_with = "lenient_amount")]
    min_salary: Option<String>,
    #[serde(deserialize_with = "lenient_amount")]
    max_salary: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    salary_currency: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    currency: Option<String>,

    #[serde(deserialize_with = "lenient_text")]
    posting_date: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    posted_date: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    create_date: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    last_updated_date: Option<String>,

    #[serde(deserialize_with = "lenient_text")]
    employment_type: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    seniority: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    category: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    job_category: Option<String>,
}

impl RawJob {
    fn link(&self) -> Option<&str> {
        self.job_details_url
            .as_deref()
            .or(self.seo_url.as_deref())
            .or(self.url_path.as_deref())
            .or(self.job_url.as_deref())
    }

    fn posted(&self) -> Option<&str> {
        self.posting_date
            .as_deref()
            .or(self.posted_date.as_deref())
            .or(self.create_date.as_deref())
            .or(self.last_updated_date.as_deref())
    }

    fn into_record(self, keyword: &str, page_index: u32, source_url: &str) -> JobRecord {
        let job_url = self
            .link()
            .and_then(|link| resolve_url(source_url, link))
            .unwrap_or_default();
        let posted = self.posted().map(String::from);
        let salary = format_salary(
            self.min_salary,
            self.max_salary,
            self.salary_currency.or(self.currency),
        );

        JobRecord {
            search_query: keyword.to_string(),
            page_index,
            title: self.title.or(self.job_title),
            company: self.company.and_then(RawCompany::into_name),
            location: self.location.or(self.postal).or(self.job_location),
            salary,
            posted,
            employment_type: self.employment_type,
            seniority: self.seniority,
            category: self.category.or(self.job_category),
            job_url,
            source_url: source_url.to_string(),
        }
    }
}

/// `"{min}-{max} {currency}"`, omitting absent parts.
pub fn format_salary(
    min: Option<String>,
    max: Option<String>,
    currency: Option<String>,
) -> Option<String> {
    if min.is_none() && max.is_none() {
        return None;
    }

    let range = format!("{}-{}", min.unwrap_or_default(), max.unwrap_or_default());
    let salary = format!(
        "{} {}",
        range.trim_matches('-'),
        currency.unwrap_or_default()
    );
    Some(salary.trim().to_string())
}

/// Resolve a possibly relative link against the page that yielded it.
pub fn resolve_url(base: &str, link: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }

    match Url::parse(base) {
        Ok(base) => base.join(link).ok().map(String::from),
        Err(_) => Url::parse(link).ok().map(String::from),
    }
}

/// Maps search API responses onto job records.
#[derive(Debug, Clone, Copy)]
pub struct ApiNormalizer {
    filter: RecencyFilter,
}

impl ApiNormalizer {
    pub fn new(filter: RecencyFilter) -> Self {
        Self { filter }
    }

    /// Normalize one response.
    ///
    /// Returns an error for an unparseable body or an unknown shape; both
    /// mean "zero records" to the caller, which decides how to log them.
    pub fn normalize(
        &self,
        response: &Response,
        keyword: &str,
        page_index: u32,
        source_url: &str,
    ) -> Result<Normalized, NormalizeError> {
        let data: Value =
            serde_json::from_str(&response.body).map_err(|_| NormalizeError::Parse {
                url: response.url.clone(),
                snippet: response.body.chars().take(200).collect(),
            })?;

        let Some((strategy, entries)) = locate_results(&data) else {
            let keys = data
                .as_object()
                .map(|o| o.keys().take(8).cloned().collect())
                .unwrap_or_default();
            return Err(NormalizeError::SchemaMismatch {
                url: response.url.clone(),
                keys,
            });
        };

        debug!(
            url = %response.url,
            container = strategy,
            entries = entries.len(),
            "Located results container"
        );

        let mut out = Normalized::default();
        for entry in entries {
            if !entry.is_object() {
                out.malformed += 1;
                continue;
            }
            // Every field is lenient, so this only fails on non-objects.
            let Ok(raw) = RawJob::deserialize(entry) else {
                out.malformed += 1;
                continue;
            };

            if let Some(posted) = raw.posted() {
                if !self.filter.keep(Some(posted), None) {
                    out.stale += 1;
                    continue;
                }
            }

            out.records
                .push(raw.into_record(keyword, page_index, source_url));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use serde_json::json;

    const SOURCE: &str = "https://www.mycareersfuture.gov.sg/search?search=quant&sortBy=new_posting_date&page=0";

    fn normalizer() -> ApiNormalizer {
        let now = DateTime::parse_from_rfc3339("2025-10-12T12:00:00+08:00").unwrap();
        ApiNormalizer::new(RecencyFilter::new(7, now))
    }

    fn respond(body: Value) -> Response {
        Response::ok("https://api.mycareersfuture.gov.sg/v2/search", body.to_string())
    }

    fn run(body: Value) -> Normalized {
        normalizer()
            .normalize(&respond(body), "quant", 0, SOURCE)
            .unwrap()
    }

    #[test]
    fn test_container_priority() {
        let body = json!({
            "data": [{"jobUrl": "/job/from-data"}],
            "results": [{"jobUrl": "/job/from-results"}],
        });
        let out = run(body);
        assert_eq!(out.records.len(), 1);
        assert_eq!(
            out.records[0].job_url,
            "https://www.mycareersfuture.gov.sg/job/from-results"
        );
    }

    #[test]
    fn test_each_container_shape() {
        for body in [
            json!({"results": [{"jobUrl": "https://x/job/1"}]}),
            json!({"data": [{"jobUrl": "https://x/job/1"}]}),
            json!({"payload": [{"jobUrl": "https://x/job/1"}]}),
            json!({"result": {"results": [{"jobUrl": "https://x/job/1"}]}}),
            json!({"jobs": [{"jobUrl": "https://x/job/1"}]}),
            json!({"items": [{"jobUrl": "https://x/job/1"}]}),
        ] {
            let out = run(body.clone());
            assert_eq!(out.records.len(), 1, "shape {body}");
            assert_eq!(out.records[0].job_url, "https://x/job/1");
        }
    }

    #[test]
    fn test_first_match_wins_even_if_empty() {
        let out = run(json!({"results": [], "jobs": [{"jobUrl": "https://x/job/1"}]}));
        assert!(out.records.is_empty());
    }

    #[test]
    fn test_unparseable_body() {
        let response = Response::ok("https://api/x", "<html>Service Unavailable</html>");
        let err = normalizer()
            .normalize(&response, "quant", 0, SOURCE)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::Parse { .. }));
    }

    #[test]
    fn test_schema_mismatch_reports_keys() {
        let response = respond(json!({"total": 0, "message": "ok"}));
        let err = normalizer()
            .normalize(&response, "quant", 0, SOURCE)
            .unwrap_err();
        match err {
            NormalizeError::SchemaMismatch { keys, .. } => {
                assert!(keys.contains(&"total".to_string()));
                assert!(keys.contains(&"message".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_field_fallback_chains() {
        let out = run(json!({"results": [{
            "seoUrl": "/job/engineering/quant-analyst-abc",
            "urlPath": "/ignored",
            "jobTitle": "Quant Analyst",
            "company": {"companyName": "Acme Capital"},
            "postal": 18956,
            "minSalary": 8000,
            "maxSalary": "12000",
            "salaryCurrency": "SGD",
            "createDate": "2025-10-10",
            "employmentType": "Full Time",
            "seniority": "Executive",
            "jobCategory": "Banking and Finance"
        }]}));

        let rec = &out.records[0];
        assert_eq!(
            rec.job_url,
            "https://www.mycareersfuture.gov.sg/job/engineering/quant-analyst-abc"
        );
        assert_eq!(rec.title.as_deref(), Some("Quant Analyst"));
        assert_eq!(rec.company.as_deref(), Some("Acme Capital"));
        assert_eq!(rec.location.as_deref(), Some("18956"));
        assert_eq!(rec.salary.as_deref(), Some("8000-12000 SGD"));
        assert_eq!(rec.posted.as_deref(), Some("2025-10-10"));
        assert_eq!(rec.employment_type.as_deref(), Some("Full Time"));
        assert_eq!(rec.seniority.as_deref(), Some("Executive"));
        assert_eq!(rec.category.as_deref(), Some("Banking and Finance"));
        assert_eq!(rec.search_query, "quant");
        assert_eq!(rec.source_url, SOURCE);
    }

    #[test]
    fn test_company_shapes() {
        let out = run(json!({"results": [
            {"jobUrl": "https://x/1", "company": "Plain Co"},
            {"jobUrl": "https://x/2", "company": {"name": "Named Co", "companyName": "Other"}},
            {"jobUrl": "https://x/3", "company": 42},
        ]}));

        let companies: Vec<_> = out.records.iter().map(|r| r.company.clone()).collect();
        assert_eq!(
            companies,
            vec![Some("Plain Co".to_string()), Some("Named Co".to_string()), None]
        );
    }

    #[test]
    fn test_salary_formatting() {
        let s = |a: Option<&str>, b: Option<&str>, c: Option<&str>| {
            format_salary(a.map(String::from), b.map(String::from), c.map(String::from))
        };

        assert_eq!(s(Some("5000"), Some("7000"), Some("SGD")).as_deref(), Some("5000-7000 SGD"));
        assert_eq!(s(Some("5000"), None, Some("SGD")).as_deref(), Some("5000 SGD"));
        assert_eq!(s(None, Some("6000"), None).as_deref(), Some("6000"));
        assert_eq!(s(None, None, Some("SGD")), None);

        let out = run(json!({"results": [
            {"jobUrl": "https://x/1", "minSalary": 0, "maxSalary": 0},
            {"jobUrl": "https://x/2", "minSalary": "0", "maxSalary": "0.00"},
            {"jobUrl": "https://x/3", "minSalary": "0", "maxSalary": "6000", "currency": "SGD"},
            {"jobUrl": "https://x/4", "minSalary": " 4500 ", "maxSalary": "", "currency": "SGD"},
        ]}));
        let salaries: Vec<_> = out.records.iter().map(|r| r.salary.as_deref()).collect();
        assert_eq!(salaries, vec![None, None, Some("6000 SGD"), Some("4500 SGD")]);
    }

    #[test]
    fn test_recency_drops_stale_and_keeps_unknown() {
        let out = run(json!({"results": [
            {"jobUrl": "https://x/fresh", "postingDate": "2025-10-10T09:00:00.000Z"},
            {"jobUrl": "https://x/stale", "postingDate": "2025-09-01"},
            {"jobUrl": "https://x/unknown", "postedDate": "sometime"},
            {"jobUrl": "https://x/undated"},
        ]}));

        let urls: Vec<_> = out.records.iter().map(|r| r.job_url.as_str()).collect();
        assert_eq!(urls, vec!["https://x/fresh", "https://x/unknown", "https://x/undated"]);
        assert_eq!(out.stale, 1);
    }

    #[test]
    fn test_missing_link_yields_invalid_record() {
        let out = run(json!({"results": [{"title": "No link"}, "not an object"]}));

        assert_eq!(out.records.len(), 1);
        assert!(!out.records[0].has_identity());
        assert_eq!(out.malformed, 1);
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("https://www.mycareersfuture.gov.sg/search?search=q", "/job/1").as_deref(),
            Some("https://www.mycareersfuture.gov.sg/job/1")
        );
        assert_eq!(
            resolve_url("https://a/search", "https://b/job/2").as_deref(),
            Some("https://b/job/2")
        );
        assert_eq!(resolve_url("not a url", "/job/1"), None);
        assert_eq!(resolve_url("https://a/", "  "), None);
    }
}
