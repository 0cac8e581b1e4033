//! Gold layer: one feature table per source.
//!
//! Layout: `{root}/gold/{source}/`
//! - `features.parquet` — the feature table
//! - `features.csv` — CSV mirror for spreadsheet/notebook consumers
//! - `meta.json` — window size, lookback, and computation timestamp
//!
//! The table is replaced wholesale on every write; gold rows are a pure
//! function of the silver set they were computed from.

use super::{atomic_write, StoreError};
use crate::domain::{ranked_from_string, ranked_to_string, GoldFeatureRow};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Computation parameters recorded next to the feature table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldMeta {
    pub window_minutes: i64,
    pub lookback: usize,
    pub row_count: usize,
    pub window_start_min: Option<DateTime<Utc>>,
    pub window_start_max: Option<DateTime<Utc>>,
    pub computed_at: DateTime<Utc>,
}

pub struct GoldStore {
    root: PathBuf,
    source: String,
}

impl GoldStore {
    pub fn new(root: impl Into<PathBuf>, source: &str) -> Self {
        Self {
            root: root.into(),
            source: source.to_string(),
        }
    }

    fn source_dir(&self) -> PathBuf {
        self.root.join("gold").join(&self.source)
    }

    fn parquet_path(&self) -> PathBuf {
        self.source_dir().join("features.parquet")
    }

    fn csv_path(&self) -> PathBuf {
        self.source_dir().join("features.csv")
    }

    fn meta_path(&self) -> PathBuf {
        self.source_dir().join("meta.json")
    }

    /// Replace the feature table: Parquet, CSV mirror, and metadata.
    pub fn write(
        &self,
        rows: &[GoldFeatureRow],
        window_minutes: i64,
        lookback: usize,
    ) -> Result<(), StoreError> {
        let dir = self.source_dir();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let df = rows_to_dataframe(rows)?;
        let tmp = self.parquet_path().with_extension("parquet.tmp");
        let file = fs::File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        ParquetWriter::new(file)
            .finish(&mut df.clone())
            .map_err(|e| StoreError::Parquet(format!("write features: {e}")))?;
        fs::rename(&tmp, self.parquet_path()).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StoreError::io(&self.parquet_path(), e)
        })?;

        atomic_write(&self.csv_path(), &rows_to_csv(rows)?)?;

        let meta = GoldMeta {
            window_minutes,
            lookback,
            row_count: rows.len(),
            window_start_min: rows.first().map(|r| r.window_start),
            window_start_max: rows.last().map(|r| r.window_start),
            computed_at: Utc::now(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        atomic_write(&self.meta_path(), &meta_json)?;

        Ok(())
    }

    /// Load the feature table from Parquet. The CSV file is a mirror for
    /// spreadsheet consumers and is never read back.
    pub fn load(&self) -> Result<Vec<GoldFeatureRow>, StoreError> {
        let path = self.parquet_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&path).map_err(|e| StoreError::io(&path, e))?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| StoreError::Parquet(format!("read features: {e}")))?;
        dataframe_to_rows(&df)
    }

    pub fn meta(&self) -> Option<GoldMeta> {
        let content = fs::read_to_string(self.meta_path()).ok()?;
        serde_json::from_str(&content).ok()
    }
}

// ── DataFrame conversion ────────────────────────────────────────────

fn rows_to_dataframe(rows: &[GoldFeatureRow]) -> Result<DataFrame, StoreError> {
    let window_starts: Vec<i64> = rows
        .iter()
        .map(|r| r.window_start.timestamp_millis())
        .collect();
    let counts: Vec<u32> = rows.iter().map(|r| r.article_count).collect();
    let domains: Vec<u32> = rows.iter().map(|r| r.unique_domain_count).collect();
    let avg_tones: Vec<Option<f64>> = rows.iter().map(|r| r.avg_tone).collect();
    let stddevs: Vec<Option<f64>> = rows.iter().map(|r| r.tone_stddev).collect();
    let mins: Vec<Option<f64>> = rows.iter().map(|r| r.tone_min).collect();
    let maxs: Vec<Option<f64>> = rows.iter().map(|r| r.tone_max).collect();
    let shocks: Vec<Option<f64>> = rows.iter().map(|r| r.news_shock).collect();
    let top_domains: Vec<String> = rows.iter().map(|r| ranked_to_string(&r.top_domains)).collect();
    let top_countries: Vec<String> = rows
        .iter()
        .map(|r| ranked_to_string(&r.top_countries))
        .collect();

    DataFrame::new(vec![
        Column::new("window_start".into(), window_starts)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(|e| StoreError::Parquet(format!("window_start cast: {e}")))?,
        Column::new("article_count".into(), counts),
        Column::new("unique_domain_count".into(), domains),
        Column::new("avg_tone".into(), avg_tones),
        Column::new("tone_stddev".into(), stddevs),
        Column::new("tone_min".into(), mins),
        Column::new("tone_max".into(), maxs),
        Column::new("news_shock".into(), shocks),
        Column::new("top_domains".into(), top_domains),
        Column::new("top_countries".into(), top_countries),
    ])
    .map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

fn dataframe_to_rows(df: &DataFrame) -> Result<Vec<GoldFeatureRow>, StoreError> {
    let col_err = |name: &str, e: PolarsError| {
        StoreError::Parquet(format!("column '{name}': {e}"))
    };

    let opt_f64_col = |name: &str| -> Result<Vec<Option<f64>>, StoreError> {
        Ok(df
            .column(name)
            .map_err(|e| col_err(name, e))?
            .f64()
            .map_err(|e| col_err(name, e))?
            .into_iter()
            .collect())
    };
    let u32_col = |name: &str| -> Result<Vec<u32>, StoreError> {
        Ok(df
            .column(name)
            .map_err(|e| col_err(name, e))?
            .u32()
            .map_err(|e| col_err(name, e))?
            .into_iter()
            .map(|v| v.unwrap_or(0))
            .collect())
    };
    let str_col = |name: &str| -> Result<Vec<String>, StoreError> {
        Ok(df
            .column(name)
            .map_err(|e| col_err(name, e))?
            .str()
            .map_err(|e| col_err(name, e))?
            .into_iter()
            .map(|v| v.unwrap_or("").to_string())
            .collect())
    };

    let window_starts = df
        .column("window_start")
        .map_err(|e| col_err("window_start", e))?
        .datetime()
        .map_err(|e| col_err("window_start", e))?;
    let counts = u32_col("article_count")?;
    let domain_counts = u32_col("unique_domain_count")?;
    let avg_tones = opt_f64_col("avg_tone")?;
    let stddevs = opt_f64_col("tone_stddev")?;
    let mins = opt_f64_col("tone_min")?;
    let maxs = opt_f64_col("tone_max")?;
    let shocks = opt_f64_col("news_shock")?;
    let top_domains = str_col("top_domains")?;
    let top_countries = str_col("top_countries")?;

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let millis = window_starts
            .get(i)
            .ok_or_else(|| StoreError::Validation(format!("null window_start at row {i}")))?;
        let window_start = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| StoreError::Validation(format!("invalid window_start at row {i}")))?;

        rows.push(GoldFeatureRow {
            window_start,
            article_count: counts[i],
            unique_domain_count: domain_counts[i],
            avg_tone: avg_tones[i],
            tone_stddev: stddevs[i],
            tone_min: mins[i],
            tone_max: maxs[i],
            news_shock: shocks[i],
            top_domains: ranked_from_string(&top_domains[i]),
            top_countries: ranked_from_string(&top_countries[i]),
        });
    }
    Ok(rows)
}

// ── CSV mirror ──────────────────────────────────────────────────────

const CSV_HEADER: [&str; 10] = [
    "window_start",
    "article_count",
    "unique_domain_count",
    "avg_tone",
    "tone_stddev",
    "tone_min",
    "tone_max",
    "news_shock",
    "top_domains",
    "top_countries",
];

fn opt_to_field(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.6}")).unwrap_or_default()
}

fn rows_to_csv(rows: &[GoldFeatureRow]) -> Result<Vec<u8>, StoreError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(CSV_HEADER)
        .map_err(|e| StoreError::Csv(e.to_string()))?;

    for r in rows {
        wtr.write_record([
            r.window_start.to_rfc3339(),
            r.article_count.to_string(),
            r.unique_domain_count.to_string(),
            opt_to_field(r.avg_tone),
            opt_to_field(r.tone_stddev),
            opt_to_field(r.tone_min),
            opt_to_field(r.tone_max),
            opt_to_field(r.news_shock),
            ranked_to_string(&r.top_domains),
            ranked_to_string(&r.top_countries),
        ])
        .map_err(|e| StoreError::Csv(e.to_string()))?;
    }

    wtr.into_inner().map_err(|e| StoreError::Csv(e.to_string()))
}
