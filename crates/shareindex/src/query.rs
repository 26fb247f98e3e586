//! Multi-keyword search over cached directory indexes.
//!
//! A keyword string splits on `|` into required substrings (logical AND,
//! case-insensitive, matched against the file name). Results are ordered by
//! descending creation time, then relative path, then share prefix, so that
//! repeated identical queries paginate without gaps or repeats.

use std::cmp::Ordering;

use crate::types::{FileEntry, SearchPage, SearchQuery};

pub const KEYWORD_SEPARATOR: char = '|';

/// Splits a raw keyword into lowercase, trimmed, non-empty terms.
pub fn parse_keywords(keyword: &str) -> Vec<String> {
    keyword
        .split(KEYWORD_SEPARATOR)
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Compiled form of a [`SearchQuery`].
#[derive(Debug, Clone)]
pub struct EntryMatcher {
    terms: Vec<String>,
    query: SearchQuery,
}

impl EntryMatcher {
    pub fn new(query: &SearchQuery) -> Self {
        Self {
            terms: parse_keywords(&query.keyword),
            query: query.clone(),
        }
    }

    pub fn matches(&self, entry: &FileEntry) -> bool {
        if !self.query.build_type.matches(entry.build_type) {
            return false;
        }
        let name = entry.file_name.to_lowercase();
        self.terms.iter().all(|term| name.contains(term.as_str()))
    }

    /// Filters, orders, and paginates `entries`.
    pub fn page<'a, I>(&self, entries: I) -> SearchPage
    where
        I: IntoIterator<Item = &'a FileEntry>,
    {
        let mut matched: Vec<&FileEntry> =
            entries.into_iter().filter(|entry| self.matches(entry)).collect();
        matched.sort_by(|a, b| compare_entries(a, b));
        let total = matched.len();
        let items = matched
            .into_iter()
            .skip(self.query.offset)
            .take(self.query.limit)
            .cloned()
            .collect();
        SearchPage {
            total,
            items,
            limit: self.query.limit,
            offset: self.query.offset,
        }
    }
}

/// Stable result ordering: newest first, then path, then share.
pub fn compare_entries(a: &FileEntry, b: &FileEntry) -> Ordering {
    b.created_time
        .cmp(&a.created_time)
        .then_with(|| a.relative_path.cmp(&b.relative_path))
        .then_with(|| a.server_prefix.cmp(&b.server_prefix))
}
