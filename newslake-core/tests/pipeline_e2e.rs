//! End-to-end pipeline test: scripted source → bronze → silver → gold.

use chrono::{DateTime, TimeZone, Utc};
use newslake_core::domain::dedupe_records;
use newslake_core::fetch::source::{FetchError, NewsSource, RawArticle, SilentProgress};
use newslake_core::fetch::{RateLimitedFetcher, RetryPolicy, Sleeper};
use newslake_core::{
    aggregate, normalize, run_backfill, BronzeStore, FetchWindow, GoldStore, SilverStore,
};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::Duration;
use tempfile::TempDir;

struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _d: Duration) {}
}

/// Source that returns a fixed per-window article set, with one URL shared
/// across windows and one article carrying a malformed timestamp.
struct WindowedSource {
    calls: RefCell<usize>,
}

fn raw(url: &str, seendate: &str, domain: &str, tone: f64) -> RawArticle {
    RawArticle {
        url: url.to_string(),
        url_mobile: String::new(),
        title: "Fed article".to_string(),
        seendate: seendate.to_string(),
        domain: domain.to_string(),
        language: "English".to_string(),
        sourcecountry: "United States".to_string(),
        socialimage: String::new(),
        tone,
    }
}

impl NewsSource for WindowedSource {
    fn name(&self) -> &str {
        "gdelt"
    }

    fn query(
        &self,
        _expression: &str,
        window: FetchWindow,
        _max_records: usize,
    ) -> Result<Vec<RawArticle>, FetchError> {
        *self.calls.borrow_mut() += 1;
        let day1 = Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap();

        if window.start == day1 {
            Ok(vec![
                raw("https://a.com/shared", "20241101T100000Z", "a.com", -1.0),
                raw("https://a.com/only-day1", "20241101T113000Z", "a.com", 1.0),
                raw("https://b.com/bad-ts", "garbage", "b.com", 0.0),
            ])
        } else {
            Ok(vec![
                // Same URL seen again in the second window
                raw("https://a.com/shared", "20241101T100000Z", "a.com", -1.0),
                raw("https://c.com/only-day2", "20241102T091500Z", "c.com", 3.0),
            ])
        }
    }
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        initial_backoff: Duration::from_secs(10),
        max_backoff: Duration::from_secs(120),
        multiplier: 2,
        max_retries: 5,
    }
}

fn queries() -> BTreeMap<String, String> {
    let mut q = BTreeMap::new();
    q.insert("fed_decision".to_string(), "Federal Reserve".to_string());
    q
}

#[test]
fn backfill_through_all_three_layers() {
    let dir = TempDir::new().unwrap();
    let source = WindowedSource {
        calls: RefCell::new(0),
    };
    let sleeper = NoSleep;
    let fetcher = RateLimitedFetcher::new(&source, policy(), Duration::from_secs(5), &sleeper);
    let bronze = BronzeStore::new(dir.path(), "gdelt");

    let start = Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 11, 3, 0, 0, 0).unwrap();

    let report = run_backfill(
        &fetcher,
        &bronze,
        &queries(),
        start,
        end,
        24,
        250,
        &SilentProgress,
    )
    .unwrap();

    // Two daily chunks, one query each
    assert_eq!(report.windows_planned, 2);
    assert_eq!(*source.calls.borrow(), 2);
    assert!(report.is_complete());

    // 5 fetched, 4 unique after cross-window dedupe
    assert_eq!(report.total_fetched, 5);
    assert_eq!(report.unique_records, 4);
    assert_eq!(report.summary.unique_domains, 3);

    // Bronze holds both batch files; combined artifact excluded from load_all
    let bronze_records = bronze.load_all().unwrap();
    assert_eq!(bronze_records.len(), 5);
    assert!(bronze.latest().unwrap().file.contains("combined_"));

    // Silver: dedupe happens again over the full bronze set, malformed
    // timestamp dropped and counted
    let outcome = normalize(bronze_records);
    assert_eq!(outcome.rejected, 1);
    assert_eq!(outcome.records.len(), 3);

    let silver = SilverStore::new(dir.path(), "gdelt");
    silver.write(&outcome.records).unwrap();
    let silver_records = silver.load_all().unwrap();
    assert_eq!(silver_records, outcome.records);

    // Gold: hourly rows spanning 2024-11-01 10:00 .. 2024-11-02 09:00
    let rows = aggregate(&silver_records, 60, 24).unwrap();
    assert_eq!(rows.len(), 24);
    assert_eq!(
        rows[0].window_start,
        Utc.with_ymd_and_hms(2024, 11, 1, 10, 0, 0).unwrap()
    );
    assert_eq!(rows[0].article_count, 1);
    assert_eq!(rows[1].article_count, 1);
    assert_eq!(rows[23].article_count, 1);
    assert!(rows.iter().skip(2).take(21).all(|r| r.article_count == 0));

    let gold = GoldStore::new(dir.path(), "gdelt");
    gold.write(&rows, 60, 24).unwrap();
    assert_eq!(gold.load().unwrap().len(), 24);
    assert_eq!(gold.meta().unwrap().window_minutes, 60);
}

#[test]
fn reprocessing_bronze_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let source = WindowedSource {
        calls: RefCell::new(0),
    };
    let sleeper = NoSleep;
    let fetcher = RateLimitedFetcher::new(&source, policy(), Duration::from_secs(5), &sleeper);
    let bronze = BronzeStore::new(dir.path(), "gdelt");

    let start = Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 11, 2, 0, 0, 0).unwrap();
    run_backfill(
        &fetcher,
        &bronze,
        &queries(),
        start,
        end,
        24,
        250,
        &SilentProgress,
    )
    .unwrap();

    let silver = SilverStore::new(dir.path(), "gdelt");

    let first = normalize(bronze.load_all().unwrap());
    silver.write(&first.records).unwrap();
    let silver_a = silver.load_all().unwrap();

    let second = normalize(bronze.load_all().unwrap());
    silver.write(&second.records).unwrap();
    let silver_b = silver.load_all().unwrap();

    assert_eq!(silver_a, silver_b);
    assert_eq!(first.rejected, second.rejected);
}

#[test]
fn overlapping_trailing_windows_dedupe_to_one_copy() {
    // A 15-minute window re-run with overlap returns the same article twice;
    // the merged set holds exactly one copy.
    let a = raw("https://a.com/x", "20241101T120500Z", "a.com", 0.5).into_record("fed_decision");
    let b = raw("https://a.com/x", "20241101T120500Z", "a.com", 0.5).into_record("fed_decision");
    let merged = dedupe_records(vec![a, b]);
    assert_eq!(merged.len(), 1);
}

/// Failed chunks are reported but do not abort the run.
struct FlakyFirstWindow {
    day1: DateTime<Utc>,
}

impl NewsSource for FlakyFirstWindow {
    fn name(&self) -> &str {
        "gdelt"
    }

    fn query(
        &self,
        _expression: &str,
        window: FetchWindow,
        _max_records: usize,
    ) -> Result<Vec<RawArticle>, FetchError> {
        if window.start == self.day1 {
            Err(FetchError::RateLimited {
                retry_after_secs: 60,
            })
        } else {
            Ok(vec![raw(
                "https://c.com/ok",
                "20241102T091500Z",
                "c.com",
                1.0,
            )])
        }
    }
}

#[test]
fn failed_chunk_is_skipped_and_reported() {
    let dir = TempDir::new().unwrap();
    let day1 = Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap();
    let source = FlakyFirstWindow { day1 };
    let sleeper = NoSleep;
    let fetcher = RateLimitedFetcher::new(&source, policy(), Duration::from_secs(5), &sleeper);
    let bronze = BronzeStore::new(dir.path(), "gdelt");

    let end = Utc.with_ymd_and_hms(2024, 11, 3, 0, 0, 0).unwrap();
    let report = run_backfill(
        &fetcher,
        &bronze,
        &queries(),
        day1,
        end,
        24,
        250,
        &SilentProgress,
    )
    .unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.failed_windows.len(), 1);
    assert_eq!(report.failed_windows[0].start, day1);
    assert_eq!(report.unique_records, 1);
    // The failed query burned through all retries
    assert_eq!(report.total_retries, 5);
}
