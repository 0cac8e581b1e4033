//! Gold-layer feature rows: one row per fixed-size UTC window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A ranked (name, count) pair for top-domain/top-country lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedCount {
    pub name: String,
    pub count: u32,
}

/// Per-window feature row for downstream joins.
///
/// `window_start` is floored to the configured window size and serves as the
/// join key against other time series. Windows with zero articles still
/// produce a row with zero counts and null tone statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldFeatureRow {
    pub window_start: DateTime<Utc>,
    pub article_count: u32,
    pub unique_domain_count: u32,
    pub avg_tone: Option<f64>,
    /// Sample standard deviation; null when the window holds fewer than 2 articles.
    pub tone_stddev: Option<f64>,
    pub tone_min: Option<f64>,
    pub tone_max: Option<f64>,
    /// Z-score of `article_count` against the trailing baseline; null for the
    /// first `lookback` windows of a run.
    pub news_shock: Option<f64>,
    pub top_domains: Vec<RankedCount>,
    pub top_countries: Vec<RankedCount>,
}

impl GoldFeatureRow {
    pub fn is_empty_window(&self) -> bool {
        self.article_count == 0
    }
}

/// Render a ranked list as `name:count;name:count` for the CSV mirror.
pub fn ranked_to_string(ranked: &[RankedCount]) -> String {
    ranked
        .iter()
        .map(|r| format!("{}:{}", r.name, r.count))
        .collect::<Vec<_>>()
        .join(";")
}

/// Parse the `name:count;name:count` rendering back into a ranked list.
pub fn ranked_from_string(s: &str) -> Vec<RankedCount> {
    s.split(';')
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let (name, count) = part.rsplit_once(':')?;
            Some(RankedCount {
                name: name.to_string(),
                count: count.parse().ok()?,
            })
        })
        .collect()
}
