//! Silver layer: Parquet partitions with Hive-style keys.
//!
//! Layout: `{root}/silver/{source}/date=YYYY-MM-DD/hour=HH/articles.parquet`
//!
//! Partitions are rebuilt wholesale on every write — a partition file is
//! fully overwritten, never appended — which makes reprocessing the same
//! bronze set idempotent. Corrupt partition files are quarantined on load.

use super::StoreError;
use crate::domain::SilverRecord;
use chrono::{NaiveDate, Timelike};
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// What a silver write touched.
#[derive(Debug, Clone)]
pub struct SilverWriteReport {
    pub partitions_written: usize,
    pub rows_written: usize,
    pub partitions: Vec<(NaiveDate, u32)>,
}

pub struct SilverStore {
    root: PathBuf,
    source: String,
}

impl SilverStore {
    pub fn new(root: impl Into<PathBuf>, source: &str) -> Self {
        Self {
            root: root.into(),
            source: source.to_string(),
        }
    }

    fn source_dir(&self) -> PathBuf {
        self.root.join("silver").join(&self.source)
    }

    fn partition_path(&self, date: NaiveDate, hour: u32) -> PathBuf {
        self.source_dir()
            .join(format!("date={date}"))
            .join(format!("hour={hour:02}"))
            .join("articles.parquet")
    }

    /// Write records, one fully-overwritten Parquet file per `(date, hour)`.
    pub fn write(&self, records: &[SilverRecord]) -> Result<SilverWriteReport, StoreError> {
        let mut by_partition: BTreeMap<(NaiveDate, u32), Vec<&SilverRecord>> = BTreeMap::new();
        for r in records {
            by_partition.entry(r.partition()).or_default().push(r);
        }

        let mut partitions = Vec::with_capacity(by_partition.len());
        for ((date, hour), rows) in &by_partition {
            let df = records_to_dataframe(rows)?;
            let path = self.partition_path(*date, *hour);
            write_parquet_atomic(&df, &path)?;
            partitions.push((*date, *hour));
        }

        Ok(SilverWriteReport {
            partitions_written: partitions.len(),
            rows_written: records.len(),
            partitions,
        })
    }

    /// Load every partition, sorted by `(seen_at, id)`.
    pub fn load_all(&self) -> Result<Vec<SilverRecord>, StoreError> {
        let dir = self.source_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        collect_parquet_files(&dir, &mut files)?;
        files.sort();

        let mut records = Vec::new();
        for path in &files {
            match load_partition(path) {
                Ok(rows) => records.extend(rows),
                Err(e) => {
                    // Quarantine the corrupt file so a re-run can proceed
                    let quarantine = path.with_extension("parquet.quarantined");
                    eprintln!(
                        "WARNING: quarantining corrupt silver partition {}: {e}",
                        path.display()
                    );
                    let _ = fs::rename(path, &quarantine);
                }
            }
        }

        records.sort_by(|a, b| (a.seen_at, &a.id).cmp(&(b.seen_at, &b.id)));
        Ok(records)
    }

    /// Partition keys currently present on disk.
    pub fn partitions(&self) -> Result<Vec<(NaiveDate, u32)>, StoreError> {
        let dir = self.source_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        collect_parquet_files(&dir, &mut files)?;

        let mut keys = BTreeSet::new();
        for path in &files {
            if let Some(key) = partition_key_from_path(path) {
                keys.insert(key);
            }
        }
        Ok(keys.into_iter().collect())
    }
}

fn collect_parquet_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), StoreError> {
    for entry in fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))? {
        let path = entry.map_err(|e| StoreError::io(dir, e))?.path();
        if path.is_dir() {
            collect_parquet_files(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("parquet") {
            out.push(path);
        }
    }
    Ok(())
}

/// Recover `(date, hour)` from `.../date=YYYY-MM-DD/hour=HH/articles.parquet`.
fn partition_key_from_path(path: &Path) -> Option<(NaiveDate, u32)> {
    let hour_dir = path.parent()?.file_name()?.to_str()?;
    let date_dir = path.parent()?.parent()?.file_name()?.to_str()?;
    let date = NaiveDate::parse_from_str(date_dir.strip_prefix("date=")?, "%Y-%m-%d").ok()?;
    let hour = hour_dir.strip_prefix("hour=")?.parse().ok()?;
    Some((date, hour))
}

// ── Parquet I/O ─────────────────────────────────────────────────────

fn records_to_dataframe(records: &[&SilverRecord]) -> Result<DataFrame, StoreError> {
    let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
    let urls: Vec<String> = records.iter().map(|r| r.url.clone()).collect();
    let titles: Vec<String> = records.iter().map(|r| r.title.clone()).collect();
    let domains: Vec<String> = records.iter().map(|r| r.domain.clone()).collect();
    let languages: Vec<String> = records.iter().map(|r| r.language.clone()).collect();
    let countries: Vec<String> = records.iter().map(|r| r.source_country.clone()).collect();
    let tones: Vec<f64> = records.iter().map(|r| r.tone).collect();
    let seen_ats: Vec<i64> = records.iter().map(|r| r.seen_at.timestamp_millis()).collect();
    let labels: Vec<String> = records
        .iter()
        .map(|r| {
            r.query_labels
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(";")
        })
        .collect();

    DataFrame::new(vec![
        Column::new("id".into(), ids),
        Column::new("url".into(), urls),
        Column::new("title".into(), titles),
        Column::new("domain".into(), domains),
        Column::new("language".into(), languages),
        Column::new("source_country".into(), countries),
        Column::new("tone".into(), tones),
        Column::new("seen_at".into(), seen_ats)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(|e| StoreError::Parquet(format!("seen_at cast: {e}")))?,
        Column::new("query_labels".into(), labels),
    ])
    .map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet_atomic(df: &DataFrame, path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let tmp = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| StoreError::Parquet(format!("write parquet: {e}")))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StoreError::io(path, e)
    })?;
    Ok(())
}

fn load_partition(path: &Path) -> Result<Vec<SilverRecord>, StoreError> {
    let file = fs::File::open(path).map_err(|e| StoreError::io(path, e))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::Parquet(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(StoreError::Validation("empty parquet partition".into()));
    }

    dataframe_to_records(&df)
}

fn dataframe_to_records(df: &DataFrame) -> Result<Vec<SilverRecord>, StoreError> {
    let col_err = |name: &str, e: PolarsError| {
        StoreError::Parquet(format!("column '{name}': {e}"))
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

    let ids = str_col("id")?;
    let urls = str_col("url")?;
    let titles = str_col("title")?;
    let domains = str_col("domain")?;
    let languages = str_col("language")?;
    let countries = str_col("source_country")?;
    let labels = str_col("query_labels")?;

    let tones = df
        .column("tone")
        .map_err(|e| col_err("tone", e))?
        .f64()
        .map_err(|e| col_err("tone", e))?;
    let seen_ats = df
        .column("seen_at")
        .map_err(|e| col_err("seen_at", e))?
        .datetime()
        .map_err(|e| col_err("seen_at", e))?;

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let millis = seen_ats
            .get(i)
            .ok_or_else(|| StoreError::Validation(format!("null seen_at at row {i}")))?;
        let seen_at = chrono::DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| StoreError::Validation(format!("invalid seen_at at row {i}")))?;

        records.push(SilverRecord {
            id: ids[i].clone(),
            url: urls[i].clone(),
            title: titles[i].clone(),
            domain: domains[i].clone(),
            language: languages[i].clone(),
            source_country: countries[i].clone(),
            tone: tones.get(i).unwrap_or(0.0),
            seen_at,
            date: seen_at.date_naive(),
            hour: seen_at.hour(),
            query_labels: labels[i]
                .split(';')
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect(),
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn record(url: &str, ts: chrono::DateTime<Utc>) -> SilverRecord {
        let mut labels = BTreeSet::new();
        labels.insert("fed_decision".to_string());
        SilverRecord {
            id: crate::domain::article_id(url),
            url: url.to_string(),
            title: "t".to_string(),
            domain: "example.com".to_string(),
            language: "English".to_string(),
            source_country: "United States".to_string(),
            tone: -0.5,
            seen_at: ts,
            date: ts.date_naive(),
            hour: ts.hour(),
            query_labels: labels,
        }
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = SilverStore::new(dir.path(), "gdelt");

        let records = vec![
            record(
                "https://a.com/1",
                Utc.with_ymd_and_hms(2024, 11, 1, 13, 30, 0).unwrap(),
            ),
            record(
                "https://a.com/2",
                Utc.with_ymd_and_hms(2024, 11, 1, 14, 5, 0).unwrap(),
            ),
        ];

        let report = store.write(&records).unwrap();
        assert_eq!(report.partitions_written, 2);
        assert_eq!(report.rows_written, 2);

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn rewrite_overwrites_partition() {
        let dir = TempDir::new().unwrap();
        let store = SilverStore::new(dir.path(), "gdelt");
        let ts = Utc.with_ymd_and_hms(2024, 11, 1, 13, 0, 0).unwrap();

        store
            .write(&[record("https://a.com/1", ts), record("https://a.com/2", ts)])
            .unwrap();
        // Reprocessing with a smaller set replaces the partition wholesale
        store.write(&[record("https://a.com/1", ts)]).unwrap();

        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn idempotent_rewrite_same_content() {
        let dir = TempDir::new().unwrap();
        let store = SilverStore::new(dir.path(), "gdelt");

        let records = vec![
            record(
                "https://a.com/1",
                Utc.with_ymd_and_hms(2024, 11, 1, 13, 30, 0).unwrap(),
            ),
            record(
                "https://b.com/2",
                Utc.with_ymd_and_hms(2024, 11, 2, 9, 0, 0).unwrap(),
            ),
        ];

        store.write(&records).unwrap();
        let first = store.load_all().unwrap();
        store.write(&records).unwrap();
        let second = store.load_all().unwrap();

        assert_eq!(first, second);
        assert_eq!(
            store.partitions().unwrap(),
            vec![
                (chrono::NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(), 13),
                (chrono::NaiveDate::from_ymd_opt(2024, 11, 2).unwrap(), 9),
            ]
        );
    }
}
