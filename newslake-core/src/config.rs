//! Serializable pipeline configuration.
//!
//! All knobs the pipeline consumes live here: the query set, the trailing
//! window size, rate-limit parameters, the backfill chunk size, and the gold
//! window/lookback. Configuration is an explicit immutable value passed into
//! the fetcher and driver; there are no module-level mutable defaults.
//!
//! Configuration errors are the only fatal failures — they surface before
//! any I/O and never trigger a retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration and parameter validation errors. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid window: start {start} is not before end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("failed to read config file '{path}': {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Full pipeline configuration, loadable from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Default query set: label → boolean keyword expression.
    pub queries: BTreeMap<String, String>,

    /// Additional queries a caller can opt into with an explicit union.
    pub extra_queries: BTreeMap<String, String>,

    pub fetch: FetchConfig,
    pub backfill: BackfillConfig,
    pub gold: GoldConfig,
}

/// Rate-limit and window parameters for the fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Trailing window size for incremental fetches, in minutes.
    pub timespan_minutes: i64,

    /// Per-query record cap passed to the upstream endpoint.
    pub max_records_per_query: usize,

    /// Fixed delay between successive requests, regardless of query label.
    pub between_query_wait_secs: u64,

    /// First retry delay after a rate-limit or transport failure.
    pub initial_backoff_secs: u64,

    /// Cap on any single retry delay.
    pub max_backoff_secs: u64,

    /// Backoff growth factor per retry.
    pub backoff_multiplier: u32,

    /// Retry attempts after the initial request before a query fails.
    pub max_retries: u32,
}

/// Backfill chunking parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    /// Chunk size for partitioning a historical range, in hours.
    pub batch_hours: i64,
}

/// Gold aggregation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoldConfig {
    /// Fixed aggregation window size, in minutes.
    pub window_minutes: i64,

    /// Trailing windows used as the news-shock baseline.
    pub lookback: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut queries = BTreeMap::new();
        queries.insert(
            "fed_decision".to_string(),
            r#"("Federal Reserve" OR FOMC OR "rate cut" OR "rate hike" OR "interest rate")"#
                .to_string(),
        );

        let mut extra_queries = BTreeMap::new();
        extra_queries.insert(
            "fed_policy".to_string(),
            r#"("Fed policy" OR "monetary policy" OR "Powell" OR "Jerome Powell")"#.to_string(),
        );
        extra_queries.insert(
            "fed_inflation".to_string(),
            r#"("Federal Reserve" AND (inflation OR CPI OR PCE))"#.to_string(),
        );

        Self {
            queries,
            extra_queries,
            fetch: FetchConfig::default(),
            backfill: BackfillConfig::default(),
            gold: GoldConfig::default(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timespan_minutes: 15,
            max_records_per_query: 250,
            between_query_wait_secs: 5,
            initial_backoff_secs: 10,
            max_backoff_secs: 120,
            backoff_multiplier: 2,
            max_retries: 5,
        }
    }
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self { batch_hours: 24 }
    }
}

impl Default for GoldConfig {
    fn default() -> Self {
        Self {
            window_minutes: 60,
            lookback: 24,
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// The query set to run: defaults, optionally unioned with the extras.
    pub fn effective_queries(&self, include_extra: bool) -> BTreeMap<String, String> {
        let mut queries = self.queries.clone();
        if include_extra {
            queries.extend(self.extra_queries.clone());
        }
        queries
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queries.is_empty() {
            return Err(ConfigError::InvalidParameter {
                name: "queries",
                reason: "at least one query is required".to_string(),
            });
        }
        if self.fetch.timespan_minutes <= 0 {
            return Err(ConfigError::InvalidParameter {
                name: "fetch.timespan_minutes",
                reason: format!("must be positive, got {}", self.fetch.timespan_minutes),
            });
        }
        if self.fetch.max_records_per_query == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "fetch.max_records_per_query",
                reason: "must be positive".to_string(),
            });
        }
        if self.fetch.backoff_multiplier < 1 {
            return Err(ConfigError::InvalidParameter {
                name: "fetch.backoff_multiplier",
                reason: format!("must be at least 1, got {}", self.fetch.backoff_multiplier),
            });
        }
        if self.fetch.max_backoff_secs < self.fetch.initial_backoff_secs {
            return Err(ConfigError::InvalidParameter {
                name: "fetch.max_backoff_secs",
                reason: format!(
                    "cap {} is below initial backoff {}",
                    self.fetch.max_backoff_secs, self.fetch.initial_backoff_secs
                ),
            });
        }
        if self.backfill.batch_hours <= 0 {
            return Err(ConfigError::InvalidParameter {
                name: "backfill.batch_hours",
                reason: format!("must be positive, got {}", self.backfill.batch_hours),
            });
        }
        if self.gold.window_minutes <= 0 {
            return Err(ConfigError::InvalidParameter {
                name: "gold.window_minutes",
                reason: format!("must be positive, got {}", self.gold.window_minutes),
            });
        }
        Ok(())
    }
}

impl FetchConfig {
    pub fn between_query_wait(&self) -> Duration {
        Duration::from_secs(self.between_query_wait_secs)
    }
}
