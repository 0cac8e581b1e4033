//! GDELT DOC 2.0 article-list client.
//!
//! Issues `mode=artlist` queries against the DOC 2.0 API with explicit
//! `startdatetime`/`enddatetime` bounds. GDELT enforces a global rate limit;
//! HTTP 429 maps to `FetchError::RateLimited` so the fetcher's backoff policy
//! applies. The API is free-tier and subject to unannounced format changes.

use super::source::{FetchError, NewsSource, RawArticle};
use crate::domain::FetchWindow;
use chrono::Duration as ChronoDuration;
use serde::Deserialize;
use std::time::Duration;

pub const API_BASE_URL: &str = "https://api.gdeltproject.org/api/v2/doc/doc";

/// DOC 2.0 artlist response envelope.
#[derive(Debug, Deserialize)]
struct ArtlistResponse {
    #[serde(default)]
    articles: Vec<RawArticle>,
}

/// Blocking GDELT DOC 2.0 client.
pub struct GdeltClient {
    client: reqwest::blocking::Client,
}

impl GdeltClient {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("newslake/0.1")
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }

    /// GDELT datetime parameter format: `YYYYMMDDHHMMSS`, UTC, second granularity.
    ///
    /// GDELT treats `enddatetime` as inclusive, so the half-open window end
    /// maps to `end - 1s`.
    fn window_params(window: FetchWindow) -> (String, String) {
        let start = window.start.format("%Y%m%d%H%M%S").to_string();
        let end = (window.end - ChronoDuration::seconds(1))
            .format("%Y%m%d%H%M%S")
            .to_string();
        (start, end)
    }
}

impl Default for GdeltClient {
    fn default() -> Self {
        Self::new()
    }
}

impl NewsSource for GdeltClient {
    fn name(&self) -> &str {
        "gdelt"
    }

    fn query(
        &self,
        expression: &str,
        window: FetchWindow,
        max_records: usize,
    ) -> Result<Vec<RawArticle>, FetchError> {
        let (start, end) = Self::window_params(window);
        let max_records = max_records.to_string();

        let response = self
            .client
            .get(API_BASE_URL)
            .query(&[
                ("query", expression),
                ("mode", "artlist"),
                ("format", "json"),
                ("sort", "datedesc"),
                ("maxrecords", max_records.as_str()),
                ("startdatetime", start.as_str()),
                ("enddatetime", end.as_str()),
            ])
            .send()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(FetchError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !status.is_success() {
            return Err(FetchError::Transport(format!("HTTP {status}")));
        }

        let parsed: ArtlistResponse = response
            .json()
            .map_err(|e| FetchError::ResponseFormat(format!("failed to parse artlist: {e}")))?;

        Ok(parsed.articles)
    }
}
