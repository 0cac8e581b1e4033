//! Article records across the bronze and silver layers.
//!
//! The uniqueness key for an article is its id, derived from the URL
//! (GDELT's artlist responses carry no explicit article id). Records sharing
//! an id across overlapping fetch windows are duplicates: the first-seen copy
//! wins and the matched query labels are unioned.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Stable article id derived from the URL.
pub fn article_id(url: &str) -> String {
    blake3::hash(url.as_bytes()).to_hex()[..16].to_string()
}

/// A raw fetched article as stored in the bronze layer.
///
/// `seen_at_raw` keeps the upstream timestamp string untouched; parsing
/// happens in the silver transform so bronze stays a faithful capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub id: String,
    pub url: String,
    pub title: String,
    pub domain: String,
    pub language: String,
    pub source_country: String,
    pub tone: f64,
    /// Upstream `seendate`, e.g. `20241101T133000Z`.
    pub seen_at_raw: String,
    /// Query labels that matched this article (a record may match several).
    pub query_labels: BTreeSet<String>,
}

impl ArticleRecord {
    pub fn key(&self) -> &str {
        &self.id
    }
}

/// Deduplicate records by id, preserving first-seen order.
///
/// First-seen-wins on field content; query labels from later duplicates are
/// unioned into the kept record.
pub fn dedupe_records(records: Vec<ArticleRecord>) -> Vec<ArticleRecord> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut kept: Vec<ArticleRecord> = Vec::with_capacity(records.len());

    for record in records {
        match index.get(record.key()) {
            Some(&i) => {
                let labels = record.query_labels;
                kept[i].query_labels.extend(labels);
            }
            None => {
                index.insert(record.id.clone(), kept.len());
                kept.push(record);
            }
        }
    }

    kept
}

/// A cleaned article in the silver layer: parsed UTC timestamp plus the
/// `(date, hour)` partition keys derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilverRecord {
    pub id: String,
    pub url: String,
    pub title: String,
    pub domain: String,
    pub language: String,
    pub source_country: String,
    pub tone: f64,
    pub seen_at: DateTime<Utc>,
    pub date: NaiveDate,
    pub hour: u32,
    pub query_labels: BTreeSet<String>,
}

impl SilverRecord {
    pub fn partition(&self) -> (NaiveDate, u32) {
        (self.date, self.hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, labels: &[&str]) -> ArticleRecord {
        ArticleRecord {
            id: article_id(url),
            url: url.to_string(),
            title: "t".to_string(),
            domain: "example.com".to_string(),
            language: "English".to_string(),
            source_country: "US".to_string(),
            tone: 0.0,
            seen_at_raw: "20241101T120000Z".to_string(),
            query_labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[test]
    fn article_id_is_stable_and_distinct() {
        assert_eq!(article_id("https://a.com/x"), article_id("https://a.com/x"));
        assert_ne!(article_id("https://a.com/x"), article_id("https://a.com/y"));
        assert_eq!(article_id("https://a.com/x").len(), 16);
    }

    #[test]
    fn dedupe_keeps_first_seen_and_unions_labels() {
        let mut second = record("https://a.com/x", &["fomc"]);
        second.title = "updated title".to_string();
        let records = vec![record("https://a.com/x", &["fed"]), second];

        let deduped = dedupe_records(records);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].title, "t");
        let labels: Vec<&str> = deduped[0].query_labels.iter().map(|s| s.as_str()).collect();
        assert_eq!(labels, vec!["fed", "fomc"]);
    }

    #[test]
    fn dedupe_preserves_first_seen_order() {
        let records = vec![
            record("https://a.com/1", &["fed"]),
            record("https://a.com/2", &["fed"]),
            record("https://a.com/1", &["fomc"]),
            record("https://a.com/3", &["fed"]),
        ];
        let deduped = dedupe_records(records);
        let urls: Vec<&str> = deduped.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://a.com/1", "https://a.com/2", "https://a.com/3"]
        );
    }
}
