//! Google Trends interest timeline via SerpApi

use async_trait::async_trait;
use chrono::DateTime;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use super::{DataSource, TrendSnapshot, check_status, http_client};
use crate::cache::CacheType;
use crate::config::TrendsConfig;
use crate::types::{LensError, Result};

const NAME: &str = "google_trends";

pub struct SerpApiTrends {
    api_key: Option<SecretString>,
    endpoint: String,
    timeframe: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for SerpApiTrends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerpApiTrends")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("endpoint", &self.endpoint)
            .field("timeframe", &self.timeframe)
            .finish()
    }
}

impl SerpApiTrends {
    pub fn from_config(config: &TrendsConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_key: config.api_key.clone().map(SecretString::from),
            endpoint: config.endpoint.clone(),
            timeframe: config.timeframe.clone(),
            client: http_client(timeout)?,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn request_url(&self, query: &str, api_key: &SecretString) -> Result<Url> {
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("engine", "google_trends"),
                ("q", query),
                ("data_type", "TIMESERIES"),
                ("date", self.timeframe.as_str()),
                ("api_key", api_key.expose_secret()),
            ],
        )
        .map_err(|e| LensError::Config(format!("Invalid trends endpoint: {}", e)))
    }
}

#[derive(Debug, Default, Deserialize)]
struct TrendsResponse {
    #[serde(default)]
    interest_over_time: Option<InterestOverTime>,
}

#[derive(Debug, Default, Deserialize)]
struct InterestOverTime {
    #[serde(default)]
    timeline_data: Vec<TimelinePoint>,
}

#[derive(Debug, Deserialize)]
struct TimelinePoint {
    timestamp: String,
    #[serde(default)]
    values: Vec<TimelineValue>,
}

#[derive(Debug, Deserialize)]
struct TimelineValue {
    #[serde(default)]
    extracted_value: u32,
}

fn into_snapshot(query: &str, response: TrendsResponse) -> TrendSnapshot {
    let mut points = BTreeMap::new();
    for point in response
        .interest_over_time
        .unwrap_or_default()
        .timeline_data
    {
        let Some(date) = point
            .timestamp
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
        else {
            warn!("Skipping trends point with bad timestamp: {}", point.timestamp);
            continue;
        };
        let value = point.values.first().map_or(0, |v| v.extracted_value);
        points.insert(date.format("%Y-%m-%d").to_string(), value);
    }
    TrendSnapshot::from_points(query, points)
}

#[async_trait]
impl DataSource for SerpApiTrends {
    type Output = TrendSnapshot;

    fn name(&self) -> &'static str {
        NAME
    }

    fn cache_type(&self) -> CacheType {
        CacheType::GoogleTrends
    }

    fn params(&self, query: &str) -> Value {
        json!({"q": query, "date": self.timeframe, "data_type": "TIMESERIES"})
    }

    async fn fetch(&self, query: &str) -> Result<TrendSnapshot> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| LensError::source_unavailable(NAME, "SERPAPI_API_KEY not set"))?;

        let response = self
            .client
            .get(self.request_url(query, api_key)?)
            .send()
            .await?;
        let body: TrendsResponse = check_status(NAME, response).await?.json().await?;

        let snapshot = into_snapshot(query, body);
        if snapshot.is_empty() {
            warn!("Google Trends: no data for '{}'", query);
        } else {
            info!(
                "Google Trends: average interest {:.1}/100",
                snapshot.average_interest
            );
        }
        Ok(snapshot)
    }
}
