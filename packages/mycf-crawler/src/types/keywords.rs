//! Keyword list loading.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::warn;

use crate::types::config::DEFAULT_KEYWORD;

/// Parse keyword file content: one keyword per line, `#` comments allowed.
pub fn parse_keywords(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Build the keyword set for a run.
///
/// Combines the keywords file (if any) with a single keyword, deduplicates,
/// sorts, and falls back to the default keyword when nothing is left.
pub fn load_keywords(file: Option<&Path>, single: Option<&str>) -> Vec<String> {
    let mut keywords = BTreeSet::new();

    if let Some(path) = file {
        match std::fs::read_to_string(path) {
            Ok(content) => keywords.extend(parse_keywords(&content)),
            Err(e) => warn!(path = %path.display(), error = %e, "Keywords file unreadable, ignoring"),
        }
    }

    if let Some(q) = single.map(str::trim).filter(|q| !q.is_empty()) {
        keywords.insert(q.to_string());
    }

    if keywords.is_empty() {
        keywords.insert(DEFAULT_KEYWORD.to_string());
    }

    keywords.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let content = "# finance roles\nquant\n\n  data scientist  \n#skip\n";
        assert_eq!(parse_keywords(content), vec!["quant", "data scientist"]);
    }

    #[test]
    fn test_load_merges_dedups_and_sorts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "risk\nquant\nquant").unwrap();

        let keywords = load_keywords(Some(file.path()), Some(" analyst "));
        assert_eq!(keywords, vec!["analyst", "quant", "risk"]);
    }

    #[test]
    fn test_load_defaults_when_empty() {
        assert_eq!(load_keywords(None, None), vec!["quant"]);
        assert_eq!(load_keywords(None, Some("   ")), vec!["quant"]);
    }

    #[test]
    fn test_missing_file_is_not_fatal() {
        let keywords = load_keywords(Some(Path::new("/nonexistent/keywords.txt")), Some("ml"));
        assert_eq!(keywords, vec!["ml"]);
    }
}
