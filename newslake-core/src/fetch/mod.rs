//! Fetch layer: source trait, GDELT client, retry policy, rate-limited fetcher.

pub mod backoff;
pub mod fetcher;
pub mod gdelt;
pub mod source;

pub use backoff::{RetryOutcome, RetryPolicy, RetryState, Sleeper, ThreadSleeper};
pub use fetcher::RateLimitedFetcher;
pub use gdelt::GdeltClient;
pub use source::{FetchError, FetchProgress, NewsSource, RawArticle, SilentProgress, StdoutProgress};
