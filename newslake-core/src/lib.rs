//! newslake core — rate-limited news fetching and bronze/silver/gold layering.
//!
//! The pipeline is strictly sequential batch processing:
//! - `fetch` issues bounded GDELT DOC 2.0 queries one at a time, with a fixed
//!   inter-query delay and exponential backoff on rate limits
//! - `driver` plans incremental or backfill windows and orchestrates fetches
//! - `store::bronze` captures raw records append-only with fetch metadata
//! - `silver` parses and deduplicates into `(date, hour)` Parquet partitions
//! - `gold` aggregates per-window feature rows (counts, tone stats, news shock)
//!
//! Bronze is write-once; silver is idempotently rebuildable from bronze; gold
//! is a pure function of silver. Only configuration errors abort a run —
//! everything else degrades to partial results plus a report.

pub mod config;
pub mod domain;
pub mod driver;
pub mod fetch;
pub mod gold;
pub mod silver;
pub mod store;

pub use config::{ConfigError, PipelineConfig};
pub use domain::{
    ArticleRecord, BronzeBatch, FetchMetadata, FetchWindow, GoldFeatureRow, SilverRecord,
};
pub use driver::{run_backfill, run_incremental, DriverError, DriverReport};
pub use fetch::{
    FetchError, GdeltClient, RateLimitedFetcher, RetryPolicy, SilentProgress, StdoutProgress,
    ThreadSleeper,
};
pub use gold::aggregate;
pub use silver::normalize;
pub use store::{BronzeStore, GoldStore, SilverStore, StoreError};
