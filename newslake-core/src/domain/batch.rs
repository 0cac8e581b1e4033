//! Fetch metadata and the bronze batch unit.

use super::article::ArticleRecord;
use super::window::FetchWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single keyword query within one fetch invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub label: String,
    pub status: QueryStatus,
    pub record_count: usize,
    pub retries: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum QueryStatus {
    Ok,
    Failed(String),
}

impl QueryStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, QueryStatus::Ok)
    }
}

/// One fetch invocation's metadata. Appended next to the records, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchMetadata {
    pub window: FetchWindow,
    pub queries_run: Vec<QueryOutcome>,
    pub record_count: usize,
    pub max_records_per_query: usize,
    pub fetched_at: DateTime<Utc>,
    /// Total retry attempts across all queries in this invocation.
    pub retry_count: u32,
}

impl FetchMetadata {
    /// A batch counts as failed when every query in it failed.
    pub fn all_queries_failed(&self) -> bool {
        !self.queries_run.is_empty() && self.queries_run.iter().all(|q| !q.status.is_ok())
    }

    pub fn failed_labels(&self) -> Vec<&str> {
        self.queries_run
            .iter()
            .filter(|q| !q.status.is_ok())
            .map(|q| q.label.as_str())
            .collect()
    }
}

/// An immutable, append-only set of records plus its fetch metadata,
/// scoped to one fetch invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BronzeBatch {
    pub records: Vec<ArticleRecord>,
    pub metadata: FetchMetadata,
}
