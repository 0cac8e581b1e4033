//! Silver transform: bronze records → typed, partitioned silver records.
//!
//! Parses the raw upstream timestamp into UTC, derives the `(date, hour)`
//! partition keys, deduplicates by record key across the full bronze input,
//! and drops (but counts) records whose timestamp does not parse. The
//! transform is pure and deterministic: the same bronze set always yields the
//! same silver set, regardless of input order across batches.

use crate::domain::{dedupe_records, ArticleRecord, SilverRecord};
use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;

/// Upstream `seendate` format, e.g. `20241101T133000Z`.
pub const SEENDATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Result of normalizing a bronze record set.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizeOutcome {
    pub records: Vec<SilverRecord>,
    /// Records dropped for an unparseable timestamp. Never fatal.
    pub rejected: usize,
}

/// Normalize a bronze record set into silver records.
pub fn normalize(bronze: Vec<ArticleRecord>) -> NormalizeOutcome {
    let deduped = dedupe_records(bronze);

    let mut records = Vec::with_capacity(deduped.len());
    let mut rejected = 0;

    for r in deduped {
        let seen_at = match NaiveDateTime::parse_from_str(&r.seen_at_raw, SEENDATE_FORMAT) {
            Ok(naive) => naive.and_utc(),
            Err(_) => {
                rejected += 1;
                continue;
            }
        };

        records.push(SilverRecord {
            id: r.id,
            url: r.url,
            title: r.title,
            domain: r.domain,
            language: r.language,
            source_country: r.source_country,
            tone: r.tone,
            seen_at,
            date: seen_at.date_naive(),
            hour: seen_at.hour(),
            query_labels: r.query_labels,
        });
    }

    // Canonical order so reprocessing is byte-for-byte idempotent.
    records.sort_by(|a, b| (a.seen_at, &a.id).cmp(&(b.seen_at, &b.id)));

    NormalizeOutcome { records, rejected }
}
