//! Catalog search.
//!
//! A pure filter + sort + slice over the current catalog snapshot. Keywords
//! are `|`-separated and all of them must appear (case-insensitively) in the
//! record's file name or path.

use crate::catalog::CatalogStore;
use crate::error::{ApkFinderError, Result};
use crate::models::{BuildClassification, FileRecord, SearchPage};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which build classifications a search returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildFilter {
    #[default]
    Release,
    Debug,
    /// No filtering: every classification, including unknown.
    Combine,
}

impl BuildFilter {
    pub fn matches(&self, classification: BuildClassification) -> bool {
        match self {
            BuildFilter::Release => classification == BuildClassification::Release,
            BuildFilter::Debug => classification == BuildClassification::Debug,
            BuildFilter::Combine => true,
        }
    }
}

impl FromStr for BuildFilter {
    type Err = ApkFinderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "release" => Ok(BuildFilter::Release),
            "debug" => Ok(BuildFilter::Debug),
            "combine" => Ok(BuildFilter::Combine),
            other => Err(ApkFinderError::Validation {
                field: "build_type".to_string(),
                message: format!(
                    "expected one of release, debug, combine; got {:?}",
                    other
                ),
            }),
        }
    }
}

/// Parameters of one search.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub keyword: String,
    pub share: Option<String>,
    pub build_filter: BuildFilter,
    pub limit: usize,
    pub offset: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            share: None,
            build_filter: BuildFilter::default(),
            limit: 10,
            offset: 0,
        }
    }
}

/// Split a keyword expression into lowercase terms.
pub fn parse_keywords(expr: &str) -> Vec<String> {
    expr.split('|')
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .collect()
}

/// True if every term occurs in the record's name or path.
pub fn matches_keywords(record: &FileRecord, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }
    let haystack = format!("{} {}", record.file_name, record.relative_path).to_lowercase();
    terms.iter().all(|term| haystack.contains(term.as_str()))
}

/// Filter, sort and page a set of `(share, record)` pairs.
///
/// Newest first; ties are broken by share then path so paging is stable.
pub fn filter_records(
    records: impl IntoIterator<Item = (String, FileRecord)>,
    query: &SearchQuery,
) -> SearchPage {
    let terms = parse_keywords(&query.keyword);

    let mut hits: Vec<(String, FileRecord)> = records
        .into_iter()
        .filter(|(_, r)| query.build_filter.matches(r.build_classification))
        .filter(|(_, r)| matches_keywords(r, &terms))
        .collect();

    hits.sort_by(|(share_a, a), (share_b, b)| {
        b.created_time
            .cmp(&a.created_time)
            .then_with(|| share_a.cmp(share_b))
            .then_with(|| a.relative_path.cmp(&b.relative_path))
    });

    let total = hits.len();
    let items = hits
        .into_iter()
        .skip(query.offset)
        .take(query.limit)
        .map(|(_, record)| record)
        .collect();

    SearchPage {
        total,
        items,
        limit: query.limit,
        offset: query.offset,
    }
}

/// Run a search against the catalog.
pub fn search(catalog: &dyn CatalogStore, query: &SearchQuery) -> Result<SearchPage> {
    let entries = catalog.list_entries(query.share.as_deref())?;
    let records = entries.into_iter().flat_map(|entry| {
        let share = entry.share;
        entry
            .files
            .into_iter()
            .map(move |record| (share.clone(), record))
    });
    Ok(filter_records(records, query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use chrono::{TimeZone, Utc};

    fn record(path: &str, day: u32) -> FileRecord {
        FileRecord::discovered(
            path.to_string(),
            100,
            Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            r"\\host\builds",
        )
    }

    fn query(keyword: &str, filter: BuildFilter) -> SearchQuery {
        SearchQuery {
            keyword: keyword.to_string(),
            build_filter: filter,
            limit: 100,
            ..Default::default()
        }
    }

    fn sample() -> Vec<(String, FileRecord)> {
        vec![
            ("s1".into(), record("/AppA/release/app-release.apk", 3)),
            ("s1".into(), record("/AppA/debug/app-debug.apk", 4)),
            ("s1".into(), record("/Shop/release/shop-v2.apk", 5)),
            ("s2".into(), record("/AppA/nightly.apk", 1)),
        ]
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(parse_keywords(" AppA | | Release "), vec!["appa", "release"]);
        assert!(parse_keywords("  |  ").is_empty());
    }

    #[test]
    fn test_keywords_are_anded() {
        let page = filter_records(sample(), &query("appa|release", BuildFilter::Combine));
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].file_name, "app-release.apk");

        let page = filter_records(sample(), &query("appa|shop", BuildFilter::Combine));
        assert_eq!(page.total, 0);
    }

    #[test]
    fn test_build_filter() {
        let page = filter_records(sample(), &query("", BuildFilter::Release));
        assert_eq!(page.total, 2);

        let page = filter_records(sample(), &query("", BuildFilter::Debug));
        assert_eq!(page.total, 1);

        let page = filter_records(sample(), &query("", BuildFilter::Combine));
        assert_eq!(page.total, 4);
    }

    #[test]
    fn test_sorted_newest_first() {
        let page = filter_records(sample(), &query("", BuildFilter::Combine));
        let names: Vec<_> = page.items.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["shop-v2.apk", "app-debug.apk", "app-release.apk", "nightly.apk"]
        );
    }

    #[test]
    fn test_pages_concatenate_to_full_set() {
        let mut records = Vec::new();
        for i in 0..23 {
            // Several records share a timestamp to exercise the tie-break.
            records.push(("s1".to_string(), record(&format!("/App/r{:02}.apk", i), 1 + i % 4)));
        }

        let full = filter_records(records.clone(), &query("", BuildFilter::Combine));
        let mut paged = Vec::new();
        for offset in (0..30).step_by(5) {
            let page = filter_records(
                records.clone(),
                &SearchQuery {
                    limit: 5,
                    offset,
                    build_filter: BuildFilter::Combine,
                    ..Default::default()
                },
            );
            assert_eq!(page.total, 23);
            paged.extend(page.items);
        }
        assert_eq!(paged, full.items);
    }

    #[test]
    fn test_offset_past_end() {
        let page = filter_records(
            sample(),
            &SearchQuery {
                offset: 50,
                build_filter: BuildFilter::Combine,
                ..Default::default()
            },
        );
        assert_eq!(page.total, 4);
        assert!(page.items.is_empty());
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!("Combine".parse::<BuildFilter>().unwrap(), BuildFilter::Combine);
        assert!("all".parse::<BuildFilter>().is_err());
    }

    #[test]
    fn test_search_by_share() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog
            .set_files("s1", "AppA", vec![record("/AppA/release/a.apk", 1)])
            .unwrap();
        catalog
            .set_files("s2", "AppA", vec![record("/AppA/release/a.apk", 2)])
            .unwrap();

        let mut q = query("", BuildFilter::Release);
        assert_eq!(search(&catalog, &q).unwrap().total, 2);

        q.share = Some("s2".to_string());
        let page = search(&catalog, &q).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].created_time.format("%d").to_string(), "02");
    }
}
