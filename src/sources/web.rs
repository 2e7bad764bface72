//! Serper web search

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::info;

use super::{DataSource, SourceKind, WebSource, check_status, http_client};
use crate::cache::CacheType;
use crate::config::WebSearchConfig;
use crate::types::{LensError, Result};

const NAME: &str = "web_search";

pub struct SerperWebSearch {
    api_key: Option<SecretString>,
    endpoint: String,
    num_results: u32,
    country: String,
    language: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for SerperWebSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerperWebSearch")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("endpoint", &self.endpoint)
            .field("num_results", &self.num_results)
            .finish()
    }
}

impl SerperWebSearch {
    pub fn from_config(config: &WebSearchConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_key: config.api_key.clone().map(SecretString::from),
            endpoint: config.endpoint.clone(),
            num_results: config.num_results,
            country: config.country.clone(),
            language: config.language.clone(),
            client: http_client(timeout)?,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    num: u32,
    gl: &'a str,
    hl: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    date: Option<String>,
}

fn into_sources(response: SearchResponse) -> Vec<WebSource> {
    response
        .organic
        .into_iter()
        .map(|item| WebSource {
            url: item.link,
            title: item.title,
            snippet: item.snippet,
            date: item.date,
            source_type: SourceKind::Web,
        })
        .collect()
}

#[async_trait]
impl DataSource for SerperWebSearch {
    type Output = Vec<WebSource>;

    fn name(&self) -> &'static str {
        NAME
    }

    fn cache_type(&self) -> CacheType {
        CacheType::WebSearch
    }

    fn params(&self, query: &str) -> Value {
        json!({
            "q": query,
            "num": self.num_results,
            "gl": self.country,
            "hl": self.language,
        })
    }

    async fn fetch(&self, query: &str) -> Result<Vec<WebSource>> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| LensError::source_unavailable(NAME, "SERPER_API_KEY not set"))?;

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", api_key.expose_secret())
            .json(&SearchRequest {
                q: query,
                num: self.num_results,
                gl: &self.country,
                hl: &self.language,
            })
            .send()
            .await?;

        let body: SearchResponse = check_status(NAME, response).await?.json().await?;
        let sources = into_sources(body);

        info!("Serper: retrieved {} web results", sources.len());
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unconfigured() -> SerperWebSearch {
        SerperWebSearch::from_config(&WebSearchConfig::default(), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_parse_organic_results() {
        let body: SearchResponse = serde_json::from_value(json!({
            "organic": [
                {"link": "https://a.example", "title": "A", "snippet": "first", "date": "Mar 3, 2024"},
                {"link": "https://b.example", "title": "B"}
            ],
            "peopleAlsoAsk": []
        }))
        .unwrap();

        let sources = into_sources(body);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].date.as_deref(), Some("Mar 3, 2024"));
        assert_eq!(sources[1].snippet, "");
        assert_eq!(sources[1].source_type, SourceKind::Web);
    }

    #[test]
    fn test_params_shape() {
        let params = unconfigured().params("crm tools");
        assert_eq!(params["q"], "crm tools");
        assert_eq!(params["num"], 20);
        assert_eq!(params["gl"], "us");
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let source = unconfigured();
        assert!(!source.is_configured());

        let err = source.fetch("crm").await.unwrap_err();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("SERPER_API_KEY"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = WebSearchConfig {
            api_key: Some("very-secret".to_string()),
            ..WebSearchConfig::default()
        };
        let source = SerperWebSearch::from_config(&config, Duration::from_secs(1)).unwrap();
        assert!(!format!("{:?}", source).contains("very-secret"));
    }
}
