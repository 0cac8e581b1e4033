//! Incremental/backfill driver: window planning and fetch orchestration.
//!
//! Two modes share the same fetcher. Incremental fetches a single trailing
//! window; backfill partitions a historical range into consecutive
//! `batch_hours` chunks and fetches them in chronological order. A chunk
//! whose queries all fail is skipped and reported, not fatal — the report
//! lists failed windows so the caller can re-run just those chunks.
//!
//! After all windows complete, records are deduped across the entire
//! accumulated set (overlapping windows are expected to return overlapping
//! records) before the combined bronze artifact is written.

use crate::config::ConfigError;
use crate::domain::{
    dedupe_records, ArticleRecord, FetchMetadata, FetchWindow, QueryOutcome, QueryStatus,
};
use crate::fetch::source::FetchProgress;
use crate::fetch::RateLimitedFetcher;
use crate::store::{BronzeStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Partition `[start, end)` into consecutive non-overlapping chunks of
/// `batch_hours`; the last chunk is truncated to `end`.
pub fn plan_backfill_chunks(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    batch_hours: i64,
) -> Result<Vec<FetchWindow>, ConfigError> {
    if batch_hours <= 0 {
        return Err(ConfigError::InvalidParameter {
            name: "backfill.batch_hours",
            reason: format!("must be positive, got {batch_hours}"),
        });
    }
    if start >= end {
        return Err(ConfigError::InvalidWindow { start, end });
    }

    let step = Duration::hours(batch_hours);
    let mut chunks = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let next = (cursor + step).min(end);
        chunks.push(FetchWindow::new(cursor, next)?);
        cursor = next;
    }
    Ok(chunks)
}

/// Descriptive counts over the combined record set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub unique_domains: usize,
    pub unique_languages: usize,
    pub unique_countries: usize,
}

impl RunSummary {
    fn from_records(records: &[ArticleRecord]) -> Self {
        let mut domains = BTreeSet::new();
        let mut languages = BTreeSet::new();
        let mut countries = BTreeSet::new();
        for r in records {
            if !r.domain.is_empty() {
                domains.insert(r.domain.as_str());
            }
            if !r.language.is_empty() {
                languages.insert(r.language.as_str());
            }
            if !r.source_country.is_empty() {
                countries.insert(r.source_country.as_str());
            }
        }
        Self {
            unique_domains: domains.len(),
            unique_languages: languages.len(),
            unique_countries: countries.len(),
        }
    }
}

/// What a driver run did, including which windows need a re-run.
#[derive(Debug, Clone, Serialize)]
pub struct DriverReport {
    pub windows_planned: usize,
    /// Windows where every query failed. Re-invoke backfill for these.
    pub failed_windows: Vec<FetchWindow>,
    /// Records fetched before cross-window deduplication.
    pub total_fetched: usize,
    pub unique_records: usize,
    pub total_retries: u32,
    pub summary: RunSummary,
    pub combined_file: Option<String>,
}

impl DriverReport {
    pub fn is_complete(&self) -> bool {
        self.failed_windows.is_empty()
    }
}

/// Incremental mode: fetch the trailing window `[now - timespan, now)` once.
pub fn run_incremental(
    fetcher: &RateLimitedFetcher<'_>,
    bronze: &BronzeStore,
    queries: &BTreeMap<String, String>,
    now: DateTime<Utc>,
    timespan_minutes: i64,
    max_records: usize,
    progress: &dyn FetchProgress,
) -> Result<DriverReport, DriverError> {
    let window = FetchWindow::trailing(now, timespan_minutes)?;
    run_windows(fetcher, bronze, queries, &[window], max_records, progress)
}

/// Backfill mode: fetch every chunk of `[start, end)` in chronological order.
pub fn run_backfill(
    fetcher: &RateLimitedFetcher<'_>,
    bronze: &BronzeStore,
    queries: &BTreeMap<String, String>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    batch_hours: i64,
    max_records: usize,
    progress: &dyn FetchProgress,
) -> Result<DriverReport, DriverError> {
    let windows = plan_backfill_chunks(start, end, batch_hours)?;
    run_windows(fetcher, bronze, queries, &windows, max_records, progress)
}

fn run_windows(
    fetcher: &RateLimitedFetcher<'_>,
    bronze: &BronzeStore,
    queries: &BTreeMap<String, String>,
    windows: &[FetchWindow],
    max_records: usize,
    progress: &dyn FetchProgress,
) -> Result<DriverReport, DriverError> {
    let mut accumulated: Vec<ArticleRecord> = Vec::new();
    let mut metas: Vec<FetchMetadata> = Vec::new();
    let mut failed_windows = Vec::new();
    let mut total_fetched = 0;
    let mut total_retries = 0;

    for window in windows {
        let batch = fetcher.fetch(queries, *window, max_records, progress);
        total_retries += batch.metadata.retry_count;
        total_fetched += batch.records.len();

        if batch.metadata.all_queries_failed() {
            eprintln!("WARNING: all queries failed for window {window}; chunk skipped");
            failed_windows.push(*window);
        }

        // Every invocation is captured in bronze, failures included, so the
        // metadata trail stays complete.
        bronze.write_batch(&batch)?;

        accumulated.extend(batch.records);
        metas.push(batch.metadata);
    }

    let unique = dedupe_records(accumulated);
    let summary = RunSummary::from_records(&unique);

    let combined_file = if windows.is_empty() {
        None
    } else {
        let metadata = combine_metadata(windows, &metas, unique.len(), max_records);
        let path = bronze.write_combined(&unique, &metadata)?;
        Some(path.display().to_string())
    };

    Ok(DriverReport {
        windows_planned: windows.len(),
        failed_windows,
        total_fetched,
        unique_records: unique.len(),
        total_retries,
        summary,
        combined_file,
    })
}

/// Roll per-window metadata up into one record for the combined artifact:
/// per-label counts and retries are summed, and a label counts as Ok if it
/// succeeded in any window.
fn combine_metadata(
    windows: &[FetchWindow],
    metas: &[FetchMetadata],
    unique_records: usize,
    max_records: usize,
) -> FetchMetadata {
    let window = FetchWindow {
        start: windows[0].start,
        end: windows[windows.len() - 1].end,
    };

    let mut rolled: BTreeMap<&str, QueryOutcome> = BTreeMap::new();
    for meta in metas {
        for outcome in &meta.queries_run {
            rolled
                .entry(outcome.label.as_str())
                .and_modify(|agg| {
                    agg.record_count += outcome.record_count;
                    agg.retries += outcome.retries;
                    if outcome.status.is_ok() {
                        agg.status = QueryStatus::Ok;
                    }
                })
                .or_insert_with(|| outcome.clone());
        }
    }

    FetchMetadata {
        window,
        queries_run: rolled.into_values().collect(),
        record_count: unique_records,
        max_records_per_query: max_records,
        fetched_at: Utc::now(),
        retry_count: metas.iter().map(|m| m.retry_count).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn two_day_range_with_daily_chunks_yields_two_chunks() {
        let chunks =
            plan_backfill_chunks(at(2024, 11, 1, 0), at(2024, 11, 3, 0), 24).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].start, at(2024, 11, 1, 0));
        assert_eq!(chunks[0].end, at(2024, 11, 2, 0));
        assert_eq!(chunks[1].start, at(2024, 11, 2, 0));
        assert_eq!(chunks[1].end, at(2024, 11, 3, 0));
    }

    #[test]
    fn last_chunk_is_truncated() {
        let chunks =
            plan_backfill_chunks(at(2024, 11, 1, 0), at(2024, 11, 2, 6), 24).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].start, at(2024, 11, 2, 0));
        assert_eq!(chunks[1].end, at(2024, 11, 2, 6));
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(plan_backfill_chunks(at(2024, 11, 3, 0), at(2024, 11, 1, 0), 24).is_err());
        assert!(plan_backfill_chunks(at(2024, 11, 1, 0), at(2024, 11, 3, 0), 0).is_err());
        assert!(plan_backfill_chunks(at(2024, 11, 1, 0), at(2024, 11, 3, 0), -6).is_err());
    }

    proptest! {
        /// Chunks tile the range: consecutive, non-overlapping, covering [start, end).
        #[test]
        fn chunks_tile_the_range(hours_total in 1i64..400, batch_hours in 1i64..100) {
            let start = at(2024, 1, 1, 0);
            let end = start + Duration::hours(hours_total);
            let chunks = plan_backfill_chunks(start, end, batch_hours).unwrap();

            prop_assert_eq!(chunks[0].start, start);
            prop_assert_eq!(chunks[chunks.len() - 1].end, end);
            for pair in chunks.windows(2) {
                prop_assert_eq!(pair[0].end, pair[1].start);
            }
            for chunk in &chunks[..chunks.len() - 1] {
                prop_assert_eq!(chunk.duration(), Duration::hours(batch_hours));
            }
        }
    }
}
