//! News source trait and structured fetch error types.
//!
//! The `NewsSource` trait abstracts over the upstream article-search endpoint
//! so the fetcher and driver can run against a mock in tests.

use crate::domain::{article_id, ArticleRecord, FetchWindow};
use serde::Deserialize;
use std::collections::BTreeSet;
use thiserror::Error;

/// Structured error types for fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limited by source (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("response format changed: {0}")]
    ResponseFormat(String),
}

impl FetchError {
    /// Rate-limit and transport failures are retried with backoff; a changed
    /// response format never fixes itself by retrying.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited { .. } | FetchError::Transport(_)
        )
    }
}

/// An article as the upstream endpoint returns it, before any validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawArticle {
    pub url: String,
    #[serde(default)]
    pub url_mobile: String,
    #[serde(default)]
    pub title: String,
    /// Upstream timestamp string, e.g. `20241101T133000Z`.
    #[serde(default)]
    pub seendate: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub sourcecountry: String,
    #[serde(default)]
    pub socialimage: String,
    #[serde(default)]
    pub tone: f64,
}

impl RawArticle {
    /// Convert into a bronze record, tagged with the query label that matched.
    pub fn into_record(self, label: &str) -> ArticleRecord {
        let mut query_labels = BTreeSet::new();
        query_labels.insert(label.to_string());
        ArticleRecord {
            id: article_id(&self.url),
            url: self.url,
            title: self.title,
            domain: self.domain,
            language: self.language,
            source_country: self.sourcecountry,
            tone: self.tone,
            seen_at_raw: self.seendate,
            query_labels,
        }
    }
}

/// Trait for news-search sources (GDELT DOC 2.0, mocks).
pub trait NewsSource {
    /// Human-readable source name; also the storage directory name.
    fn name(&self) -> &str;

    /// Issue one bounded query for a keyword expression over a window.
    fn query(
        &self,
        expression: &str,
        window: FetchWindow,
        max_records: usize,
    ) -> Result<Vec<RawArticle>, FetchError>;
}

/// Progress callbacks for fetch operations.
pub trait FetchProgress {
    /// Called before a query is issued.
    fn on_query_start(&self, label: &str, index: usize, total: usize);

    /// Called when a query completes, with the fetched count or the error.
    fn on_query_complete(
        &self,
        label: &str,
        index: usize,
        total: usize,
        result: &Result<usize, FetchError>,
    );

    /// Called once per window after deduplication.
    fn on_window_complete(&self, window: FetchWindow, unique_records: usize);
}

/// Progress reporter that prints to stdout.
pub struct StdoutProgress;

impl FetchProgress for StdoutProgress {
    fn on_query_start(&self, label: &str, index: usize, total: usize) {
        println!("[{}/{}] Fetching {label}...", index + 1, total);
    }

    fn on_query_complete(
        &self,
        label: &str,
        _index: usize,
        _total: usize,
        result: &Result<usize, FetchError>,
    ) {
        match result {
            Ok(count) => println!("  OK: {label} ({count} records)"),
            Err(e) => println!("  FAIL: {label}: {e}"),
        }
    }

    fn on_window_complete(&self, window: FetchWindow, unique_records: usize) {
        println!("Window {window}: {unique_records} unique records");
    }
}

/// Progress reporter that stays quiet. Used in tests and library callers.
pub struct SilentProgress;

impl FetchProgress for SilentProgress {
    fn on_query_start(&self, _label: &str, _index: usize, _total: usize) {}
    fn on_query_complete(
        &self,
        _label: &str,
        _index: usize,
        _total: usize,
        _result: &Result<usize, FetchError>,
    ) {
    }
    fn on_window_complete(&self, _window: FetchWindow, _unique_records: usize) {}
}
