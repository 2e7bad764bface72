//! External Data Sources
//!
//! Clients for the three gather-time providers. Each implements
//! [`DataSource`] and is only ever called through [`fetch_cached`], so
//! every request is cached, timed out and retried uniformly.
//!
//! ## Modules
//!
//! - `web`: Serper web search
//! - `trends`: SerpApi Google Trends timeline
//! - `discussions`: Reddit search (client-credentials OAuth)

mod discussions;
mod trends;
mod web;

pub use discussions::RedditSearch;
pub use trends::SerpApiTrends;
pub use web::SerperWebSearch;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::cache::CacheType;
use crate::fetch::{CachedFetcher, FetchRequest, Fetched};
use crate::types::{ErrorClassifier, LensError, Result};

// =============================================================================
// Source Trait
// =============================================================================

#[async_trait]
pub trait DataSource: Send + Sync {
    type Output: Serialize + DeserializeOwned + Default + Send + Sync;

    /// Operation name, also the cache key namespace
    fn name(&self) -> &'static str;

    fn cache_type(&self) -> CacheType;

    /// Request parameters that identify a call for caching
    fn params(&self, query: &str) -> Value;

    async fn fetch(&self, query: &str) -> Result<Self::Output>;
}

/// Run `source` for `query` through the cache-aware fetcher
pub async fn fetch_cached<S>(fetcher: &CachedFetcher, source: &S, query: &str) -> Fetched<S::Output>
where
    S: DataSource + ?Sized,
{
    let request = FetchRequest::new(source.name(), source.params(query), source.cache_type())
        .for_query(query);
    fetcher.fetch(request, || source.fetch(query)).await
}

// =============================================================================
// Source Records
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Web,
    Trends,
    Reddit,
}

/// One organic web search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSource {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// Publication date as reported by the search provider
    pub date: Option<String>,
    pub source_type: SourceKind,
}

impl WebSource {
    pub fn new(url: impl Into<String>, title: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
            date: None,
            source_type: SourceKind::Web,
        }
    }

    /// Title and snippet joined for text analysis
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.snippet)
    }
}

/// Search interest over the trends window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendSnapshot {
    pub query: String,
    /// ISO date → interest (0-100)
    pub trend_data: BTreeMap<String, u32>,
    pub average_interest: f64,
}

impl TrendSnapshot {
    pub fn from_points(query: impl Into<String>, trend_data: BTreeMap<String, u32>) -> Self {
        let average_interest = if trend_data.is_empty() {
            0.0
        } else {
            trend_data.values().map(|v| f64::from(*v)).sum::<f64>() / trend_data.len() as f64
        };
        Self {
            query: query.into(),
            trend_data,
            average_interest,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.trend_data.is_empty()
    }
}

/// One community discussion thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discussion {
    pub title: String,
    pub url: String,
    pub score: i64,
    pub num_comments: u64,
    /// Creation time, unix seconds
    pub created: f64,
    pub subreddit: String,
    pub source_type: SourceKind,
}

// =============================================================================
// HTTP helpers
// =============================================================================

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LensError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Turn a non-2xx response into a categorized source error
pub(crate) async fn check_status(
    source_name: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(200).collect();
    Err(LensError::source(
        source_name,
        ErrorClassifier::classify_http_status(status.as_u16()),
        format!("HTTP {}: {}", status, body),
    ))
}
