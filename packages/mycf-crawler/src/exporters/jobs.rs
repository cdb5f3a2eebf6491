//! Read-back of stored jobs: console table and CSV export.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::{WriterError, WriterResult};
use crate::types::record::DedupEntry;

/// Column widths of the console table, in characters.
const COLUMNS: [(&str, usize); 7] = [
    ("title", 28),
    ("company", 20),
    ("location", 18),
    ("category", 20),
    ("posted", 18),
    ("search_query", 16),
    ("job_url", 50),
];

pub const NO_MATCHES: &str = "(no matching records)";

/// Collapse whitespace and cut to `width` characters, ending in `…` when cut.
pub fn shorten(text: &str, width: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= width {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Render rows as a `|`-separated console table.
pub fn format_table(rows: &[DedupEntry]) -> String {
    if rows.is_empty() {
        return NO_MATCHES.to_string();
    }

    let header = COLUMNS
        .iter()
        .map(|(name, _)| name.to_uppercase())
        .collect::<Vec<_>>()
        .join(" | ");

    let mut lines = vec![header, "-".repeat(120)];
    for row in rows {
        let values = [
            row.title.as_deref(),
            row.company.as_deref(),
            row.location.as_deref(),
            row.category.as_deref(),
            row.posted.as_deref(),
            row.search_query.as_deref(),
            Some(row.job_url.as_str()),
        ];
        let line = values
            .iter()
            .zip(COLUMNS)
            .map(|(value, (_, width))| shorten(value.unwrap_or_default(), width))
            .collect::<Vec<_>>()
            .join(" | ");
        lines.push(line);
    }
    lines.join("\n")
}

/// Export column order.
#[derive(Serialize)]
struct ExportRow<'a> {
    search_query: Option<&'a str>,
    title: Option<&'a str>,
    company: Option<&'a str>,
    location: Option<&'a str>,
    category: Option<&'a str>,
    employment_type: Option<&'a str>,
    seniority: Option<&'a str>,
    posted: Option<&'a str>,
    job_url: &'a str,
}

impl<'a> From<&'a DedupEntry> for ExportRow<'a> {
    fn from(entry: &'a DedupEntry) -> Self {
        Self {
            search_query: entry.search_query.as_deref(),
            title: entry.title.as_deref(),
            company: entry.company.as_deref(),
            location: entry.location.as_deref(),
            category: entry.category.as_deref(),
            employment_type: entry.employment_type.as_deref(),
            seniority: entry.seniority.as_deref(),
            posted: entry.posted.as_deref(),
            job_url: &entry.job_url,
        }
    }
}

/// Write rows to a fresh CSV file at `path`, creating parent directories.
///
/// The header is always written, even with no rows.
pub fn export_csv(rows: &[DedupEntry], path: &Path) -> WriterResult<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| WriterError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let csv_err = |source: csv::Error| WriterError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_err)?;
    writer
        .write_record([
            "search_query",
            "title",
            "company",
            "location",
            "category",
            "employment_type",
            "seniority",
            "posted",
            "job_url",
        ])
        .map_err(csv_err)?;
    for row in rows {
        writer.serialize(ExportRow::from(row)).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| WriterError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;

    fn entry(url: &str) -> DedupEntry {
        DedupEntry::from(&record("quant", url).with_title("Quant Analyst"))
    }

    #[test]
    fn test_shorten() {
        assert_eq!(shorten("short", 10), "short");
        assert_eq!(shorten("  spaced   out  ", 20), "spaced out");
        assert_eq!(shorten("abcdefghij", 5), "abcd…");
        assert_eq!(shorten("量化分析师职位", 4), "量化分…");
    }

    #[test]
    fn test_table() {
        assert_eq!(format_table(&[]), NO_MATCHES);

        let table = format_table(&[entry("https://x/job/1")]);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("TITLE | COMPANY"));
        assert_eq!(lines[2], "Quant Analyst |  |  |  |  | quant | https://x/job/1");
    }

    #[test]
    fn test_export_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exports/jobs.csv");

        export_csv(&[entry("https://x/job/1")], &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(
            lines[0],
            "search_query,title,company,location,category,employment_type,seniority,posted,job_url"
        );
        assert_eq!(lines[1], "quant,Quant Analyst,,,,,,,https://x/job/1");
    }
}
