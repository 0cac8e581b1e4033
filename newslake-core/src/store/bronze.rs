//! Bronze layer: append-only raw capture.
//!
//! Layout: `{root}/bronze/{source}/`
//! - `articles_{fetched_at}.csv` — raw records from one fetch invocation
//! - `articles_{fetched_at}.meta.json` — the invocation's `FetchMetadata`
//! - `combined_{ts}.csv` — deduped union across a driver run (convenience)
//! - `latest.json` — pointer to the most recent artifact
//!
//! Batch files are never rewritten; reprocessing reads them all and the
//! silver transform handles overlap.

use super::{atomic_write, StoreError};
use crate::domain::{ArticleRecord, BronzeBatch, FetchMetadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

const CSV_HEADER: [&str; 9] = [
    "id",
    "url",
    "title",
    "domain",
    "language",
    "source_country",
    "tone",
    "seen_at_raw",
    "query_labels",
];

/// Pointer to the most recently written bronze artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestPointer {
    pub file: String,
    pub meta_file: String,
    pub record_count: usize,
    pub written_at: DateTime<Utc>,
}

/// Summary of what the bronze directory currently holds.
#[derive(Debug, Clone)]
pub struct BronzeStatus {
    pub batch_count: usize,
    pub total_records: usize,
    pub latest: Option<LatestPointer>,
}

pub struct BronzeStore {
    root: PathBuf,
    source: String,
}

impl BronzeStore {
    pub fn new(root: impl Into<PathBuf>, source: &str) -> Self {
        Self {
            root: root.into(),
            source: source.to_string(),
        }
    }

    fn source_dir(&self) -> PathBuf {
        self.root.join("bronze").join(&self.source)
    }

    fn latest_path(&self) -> PathBuf {
        self.source_dir().join("latest.json")
    }

    fn timestamp_stem(prefix: &str, at: DateTime<Utc>) -> String {
        format!("{prefix}_{}", at.format("%Y%m%dT%H%M%S%3fZ"))
    }

    /// Append one fetch invocation: records CSV plus metadata sidecar.
    /// Returns the path of the records file.
    ///
    /// The window start is part of the filename so batches for distinct
    /// windows written in the same instant cannot collide.
    pub fn write_batch(&self, batch: &BronzeBatch) -> Result<PathBuf, StoreError> {
        let stem = format!(
            "articles_{}_{}",
            batch.metadata.window.start.format("%Y%m%dT%H%M%S"),
            batch.metadata.fetched_at.format("%Y%m%dT%H%M%S%3fZ"),
        );
        self.write_artifact(&stem, &batch.records, &batch.metadata)
    }

    /// Write the combined, cross-window-deduped artifact for a driver run
    /// and point `latest.json` at it.
    pub fn write_combined(
        &self,
        records: &[ArticleRecord],
        metadata: &FetchMetadata,
    ) -> Result<PathBuf, StoreError> {
        let stem = Self::timestamp_stem("combined", metadata.fetched_at);
        self.write_artifact(&stem, records, metadata)
    }

    fn write_artifact(
        &self,
        stem: &str,
        records: &[ArticleRecord],
        metadata: &FetchMetadata,
    ) -> Result<PathBuf, StoreError> {
        let dir = self.source_dir();
        let csv_path = dir.join(format!("{stem}.csv"));
        let meta_path = dir.join(format!("{stem}.meta.json"));

        atomic_write(&csv_path, &records_to_csv(records)?)?;

        let meta_json = serde_json::to_vec_pretty(metadata)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        atomic_write(&meta_path, &meta_json)?;

        let pointer = LatestPointer {
            file: csv_path.display().to_string(),
            meta_file: meta_path.display().to_string(),
            record_count: records.len(),
            written_at: Utc::now(),
        };
        let pointer_json = serde_json::to_vec_pretty(&pointer)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        atomic_write(&self.latest_path(), &pointer_json)?;

        Ok(csv_path)
    }

    /// Read every per-invocation batch file, in filename (chronological) order.
    ///
    /// Combined artifacts are convenience mirrors of the batch files and are
    /// skipped here so records are not double-counted.
    pub fn load_all(&self) -> Result<Vec<ArticleRecord>, StoreError> {
        let dir = self.source_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut batch_files: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(|e| StoreError::io(&dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension().and_then(|e| e.to_str()) == Some("csv")
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with("articles_"))
            })
            .collect();
        batch_files.sort();

        let mut records = Vec::new();
        for path in &batch_files {
            records.extend(records_from_csv(path)?);
        }
        Ok(records)
    }

    pub fn latest(&self) -> Option<LatestPointer> {
        let content = fs::read_to_string(self.latest_path()).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn status(&self) -> Result<BronzeStatus, StoreError> {
        let dir = self.source_dir();
        if !dir.exists() {
            return Ok(BronzeStatus {
                batch_count: 0,
                total_records: 0,
                latest: None,
            });
        }

        let mut batch_count = 0;
        let mut total_records = 0;
        for entry in fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))? {
            let path = entry.map_err(|e| StoreError::io(&dir, e))?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with("articles_") && name.ends_with(".meta.json") {
                batch_count += 1;
                if let Ok(content) = fs::read_to_string(&path) {
                    if let Ok(meta) = serde_json::from_str::<FetchMetadata>(&content) {
                        total_records += meta.record_count;
                    }
                }
            }
        }

        Ok(BronzeStatus {
            batch_count,
            total_records,
            latest: self.latest(),
        })
    }
}

// ── CSV codec ───────────────────────────────────────────────────────

fn records_to_csv(records: &[ArticleRecord]) -> Result<Vec<u8>, StoreError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(CSV_HEADER)
        .map_err(|e| StoreError::Csv(e.to_string()))?;

    for r in records {
        let labels = r
            .query_labels
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(";");
        wtr.write_record([
            &r.id,
            &r.url,
            &r.title,
            &r.domain,
            &r.language,
            &r.source_country,
            &r.tone.to_string(),
            &r.seen_at_raw,
            &labels,
        ])
        .map_err(|e| StoreError::Csv(e.to_string()))?;
    }

    wtr.into_inner()
        .map_err(|e| StoreError::Csv(e.to_string()))
}

fn records_from_csv(path: &Path) -> Result<Vec<ArticleRecord>, StoreError> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| StoreError::io(path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| StoreError::Csv(e.to_string()))?
        .clone();
    if headers.iter().ne(CSV_HEADER) {
        return Err(StoreError::Validation(format!(
            "unexpected bronze header in {}",
            path.display()
        )));
    }

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row.map_err(|e| StoreError::Csv(e.to_string()))?;
        let field = |i: usize| row.get(i).unwrap_or("").to_string();
        let labels: BTreeSet<String> = row
            .get(8)
            .unwrap_or("")
            .split(';')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        records.push(ArticleRecord {
            id: field(0),
            url: field(1),
            title: field(2),
            domain: field(3),
            language: field(4),
            source_country: field(5),
            tone: row
                .get(6)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0),
            seen_at_raw: field(7),
            query_labels: labels,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FetchWindow, QueryOutcome, QueryStatus};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record(url: &str) -> ArticleRecord {
        let mut labels = BTreeSet::new();
        labels.insert("fed_decision".to_string());
        ArticleRecord {
            id: crate::domain::article_id(url),
            url: url.to_string(),
            title: "Fed holds rates, markets shrug".to_string(),
            domain: "example.com".to_string(),
            language: "English".to_string(),
            source_country: "United States".to_string(),
            tone: -2.35,
            seen_at_raw: "20241101T133000Z".to_string(),
            query_labels: labels,
        }
    }

    fn metadata(fetched_at: DateTime<Utc>, count: usize) -> FetchMetadata {
        FetchMetadata {
            window: FetchWindow::new(
                Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 11, 2, 0, 0, 0).unwrap(),
            )
            .unwrap(),
            queries_run: vec![QueryOutcome {
                label: "fed_decision".to_string(),
                status: QueryStatus::Ok,
                record_count: count,
                retries: 0,
            }],
            record_count: count,
            max_records_per_query: 250,
            fetched_at,
            retry_count: 0,
        }
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = BronzeStore::new(dir.path(), "gdelt");

        let records = vec![record("https://a.com/1"), record("https://a.com/2")];
        let batch = BronzeBatch {
            records: records.clone(),
            metadata: metadata(Utc.with_ymd_and_hms(2024, 11, 1, 12, 0, 0).unwrap(), 2),
        };
        store.write_batch(&batch).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn tone_roundtrips_at_full_precision() {
        let dir = TempDir::new().unwrap();
        let store = BronzeStore::new(dir.path(), "gdelt");

        let mut r = record("https://a.com/1");
        r.tone = 1.0 / 3.0;
        let batch = BronzeBatch {
            records: vec![r.clone()],
            metadata: metadata(Utc.with_ymd_and_hms(2024, 11, 1, 12, 0, 0).unwrap(), 1),
        };
        store.write_batch(&batch).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded[0].tone, 1.0 / 3.0);
        assert_eq!(loaded[0], r);
    }

    #[test]
    fn batches_append_and_never_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = BronzeStore::new(dir.path(), "gdelt");

        let first = BronzeBatch {
            records: vec![record("https://a.com/1")],
            metadata: metadata(Utc.with_ymd_and_hms(2024, 11, 1, 12, 0, 0).unwrap(), 1),
        };
        let second = BronzeBatch {
            records: vec![record("https://a.com/2")],
            metadata: metadata(Utc.with_ymd_and_hms(2024, 11, 1, 12, 10, 0).unwrap(), 1),
        };
        let p1 = store.write_batch(&first).unwrap();
        let p2 = store.write_batch(&second).unwrap();

        assert_ne!(p1, p2);
        assert_eq!(store.load_all().unwrap().len(), 2);

        let status = store.status().unwrap();
        assert_eq!(status.batch_count, 2);
        assert_eq!(status.total_records, 2);
    }

    #[test]
    fn combined_artifact_is_excluded_from_load_all() {
        let dir = TempDir::new().unwrap();
        let store = BronzeStore::new(dir.path(), "gdelt");

        let batch = BronzeBatch {
            records: vec![record("https://a.com/1")],
            metadata: metadata(Utc.with_ymd_and_hms(2024, 11, 1, 12, 0, 0).unwrap(), 1),
        };
        store.write_batch(&batch).unwrap();
        store
            .write_combined(&batch.records, &batch.metadata)
            .unwrap();

        // Combined mirror must not double-count
        assert_eq!(store.load_all().unwrap().len(), 1);

        let latest = store.latest().unwrap();
        assert!(latest.file.contains("combined_"));
        assert_eq!(latest.record_count, 1);
    }

    #[test]
    fn empty_store_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let store = BronzeStore::new(dir.path(), "gdelt");
        assert!(store.load_all().unwrap().is_empty());
        assert!(store.latest().is_none());
    }
}
