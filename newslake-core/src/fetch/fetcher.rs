//! Rate-limited fetcher: sequential queries, fixed inter-query delay,
//! exponential backoff, partial-failure semantics.
//!
//! The source enforces a global rate limit, not a per-query one, so queries
//! run strictly one at a time in declared order. A query that exhausts its
//! retries is omitted from the batch while its failure is recorded in the
//! metadata; the batch itself is never aborted.

use super::backoff::{RetryOutcome, RetryPolicy, RetryState, Sleeper};
use super::source::{FetchError, FetchProgress, NewsSource, RawArticle};
use crate::domain::{
    dedupe_records, ArticleRecord, BronzeBatch, FetchMetadata, FetchWindow, QueryOutcome,
    QueryStatus,
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Duration;

pub struct RateLimitedFetcher<'a> {
    source: &'a dyn NewsSource,
    policy: RetryPolicy,
    between_query_wait: Duration,
    sleeper: &'a dyn Sleeper,
}

impl<'a> RateLimitedFetcher<'a> {
    pub fn new(
        source: &'a dyn NewsSource,
        policy: RetryPolicy,
        between_query_wait: Duration,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            source,
            policy,
            between_query_wait,
            sleeper,
        }
    }

    /// Run every query in the set against one window and return the deduped
    /// union of records plus the per-query metadata.
    pub fn fetch(
        &self,
        queries: &BTreeMap<String, String>,
        window: FetchWindow,
        max_records: usize,
        progress: &dyn FetchProgress,
    ) -> BronzeBatch {
        let total = queries.len();
        let mut collected: Vec<ArticleRecord> = Vec::new();
        let mut outcomes: Vec<QueryOutcome> = Vec::with_capacity(total);
        let mut total_retries = 0;

        for (index, (label, expression)) in queries.iter().enumerate() {
            if index > 0 {
                self.sleeper.sleep(self.between_query_wait);
            }
            progress.on_query_start(label, index, total);

            let (result, retries) = self.query_with_retry(expression, window, max_records);
            total_retries += retries;

            let (status, count) = match result {
                Ok(articles) => {
                    let count = articles.len();
                    collected.extend(articles.into_iter().map(|a| a.into_record(label)));
                    progress.on_query_complete(label, index, total, &Ok(count));
                    (QueryStatus::Ok, count)
                }
                Err(e) => {
                    let message = e.to_string();
                    progress.on_query_complete(label, index, total, &Err(e));
                    (QueryStatus::Failed(message), 0)
                }
            };

            outcomes.push(QueryOutcome {
                label: label.clone(),
                status,
                record_count: count,
                retries,
            });
        }

        let records = dedupe_records(collected);
        let metadata = FetchMetadata {
            window,
            queries_run: outcomes,
            record_count: records.len(),
            max_records_per_query: max_records,
            fetched_at: Utc::now(),
            retry_count: total_retries,
        };

        progress.on_window_complete(window, records.len());
        BronzeBatch { records, metadata }
    }

    /// Issue one request, retrying retriable failures per the backoff policy.
    /// Returns the result and the number of retries consumed.
    fn query_with_retry(
        &self,
        expression: &str,
        window: FetchWindow,
        max_records: usize,
    ) -> (Result<Vec<RawArticle>, FetchError>, u32) {
        let mut state = RetryState::new(self.policy);

        loop {
            match self.source.query(expression, window, max_records) {
                Ok(articles) => return (Ok(articles), state.retries()),
                Err(e) if e.is_retriable() => match state.on_failure() {
                    RetryOutcome::RetryAfter(delay) => self.sleeper.sleep(delay),
                    RetryOutcome::Exhausted => return (Err(e), state.retries()),
                },
                Err(e) => return (Err(e), state.retries()),
            }
        }
    }
}
