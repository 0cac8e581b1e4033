//! Gold aggregation: per-window feature rows over silver records.
//!
//! Each record is floored to the configured window size; a row is emitted for
//! every window in the covered range, including empty ones, so downstream
//! joins never special-case missing windows. Recomputing over the same silver
//! set is deterministic and order-independent.

use crate::config::ConfigError;
use crate::domain::{GoldFeatureRow, RankedCount, SilverRecord};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Entries kept in the ranked top-domain/top-country lists.
pub const TOP_RANK_LIMIT: usize = 10;

/// Floor a timestamp to the window boundary.
pub fn floor_to_window(ts: DateTime<Utc>, window_minutes: i64) -> DateTime<Utc> {
    let window_secs = window_minutes * 60;
    let secs = ts.timestamp();
    let floored = secs - secs.rem_euclid(window_secs);
    DateTime::from_timestamp(floored, 0).expect("floored timestamp in range")
}

/// Aggregate silver records into one feature row per window.
///
/// `news_shock` is the z-score of a window's article count against the mean
/// and sample standard deviation of the `lookback` preceding windows. The
/// first `lookback` windows of a run have no valid baseline and carry null,
/// as do windows whose baseline has zero variance.
pub fn aggregate(
    records: &[SilverRecord],
    window_minutes: i64,
    lookback: usize,
) -> Result<Vec<GoldFeatureRow>, ConfigError> {
    if window_minutes <= 0 {
        return Err(ConfigError::InvalidParameter {
            name: "gold.window_minutes",
            reason: format!("must be positive, got {window_minutes}"),
        });
    }

    if records.is_empty() {
        return Ok(Vec::new());
    }

    let mut by_window: BTreeMap<i64, Vec<&SilverRecord>> = BTreeMap::new();
    for r in records {
        let start = floor_to_window(r.seen_at, window_minutes).timestamp();
        by_window.entry(start).or_default().push(r);
    }

    let window_secs = window_minutes * 60;
    let first = *by_window.keys().next().expect("non-empty window map");
    let last = *by_window.keys().next_back().expect("non-empty window map");

    let mut rows = Vec::new();
    let mut start = first;
    while start <= last {
        let group = by_window.get(&start).map(Vec::as_slice).unwrap_or(&[]);
        rows.push(window_row(start, group));
        start += window_secs;
    }

    apply_news_shock(&mut rows, lookback);
    Ok(rows)
}

fn window_row(start_secs: i64, group: &[&SilverRecord]) -> GoldFeatureRow {
    let window_start =
        DateTime::from_timestamp(start_secs, 0).expect("window start in range");

    let tones: Vec<f64> = group.iter().map(|r| r.tone).collect();
    let (avg_tone, tone_stddev) = mean_and_sample_std(&tones);
    let tone_min = tones.iter().copied().reduce(f64::min);
    let tone_max = tones.iter().copied().reduce(f64::max);

    let mut domains: BTreeMap<&str, u32> = BTreeMap::new();
    let mut countries: BTreeMap<&str, u32> = BTreeMap::new();
    for r in group {
        *domains.entry(r.domain.as_str()).or_default() += 1;
        *countries.entry(r.source_country.as_str()).or_default() += 1;
    }

    GoldFeatureRow {
        window_start,
        article_count: group.len() as u32,
        unique_domain_count: domains.len() as u32,
        avg_tone,
        tone_stddev,
        tone_min,
        tone_max,
        news_shock: None,
        top_domains: rank(&domains),
        top_countries: rank(&countries),
    }
}

/// Mean always present for non-empty input; sample stddev needs n >= 2.
fn mean_and_sample_std(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (Some(mean), None);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (Some(mean), Some(variance.sqrt()))
}

/// Rank by descending count; ties break by lexical order of the name.
fn rank(counts: &BTreeMap<&str, u32>) -> Vec<RankedCount> {
    let mut ranked: Vec<RankedCount> = counts
        .iter()
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, count)| RankedCount {
            name: name.to_string(),
            count: *count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(TOP_RANK_LIMIT);
    ranked
}

fn apply_news_shock(rows: &mut [GoldFeatureRow], lookback: usize) {
    if lookback == 0 || rows.len() <= lookback {
        return;
    }
    let counts: Vec<f64> = rows.iter().map(|r| r.article_count as f64).collect();
    for i in lookback..rows.len() {
        let baseline = &counts[i - lookback..i];
        let (mean, std) = mean_and_sample_std(baseline);
        rows[i].news_shock = match (mean, std) {
            (Some(mean), Some(std)) if std > 0.0 && std.is_finite() => {
                Some((counts[i] - mean) / std)
            }
            _ => None,
        };
    }
}
