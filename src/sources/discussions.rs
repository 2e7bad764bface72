//! Reddit discussion search
//!
//! Uses the application-only OAuth flow (client credentials). The bearer
//! token is cached in memory until shortly before it expires.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use super::{DataSource, Discussion, SourceKind, check_status, http_client};
use crate::cache::CacheType;
use crate::config::DiscussionsConfig;
use crate::constants::sources::{REDDIT_API_BASE, REDDIT_TOKEN_ENDPOINT};
use crate::types::{ErrorCategory, LensError, Result};

const NAME: &str = "reddit_search";

/// Refresh this long before the token actually expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

struct BearerToken {
    value: SecretString,
    expires_at: Instant,
}

pub struct RedditSearch {
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    user_agent: String,
    limit: u32,
    time_filter: String,
    token: Mutex<Option<BearerToken>>,
    client: reqwest::Client,
}

impl std::fmt::Debug for RedditSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditSearch")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("user_agent", &self.user_agent)
            .field("limit", &self.limit)
            .finish()
    }
}

impl RedditSearch {
    pub fn from_config(config: &DiscussionsConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone().map(SecretString::from),
            user_agent: config.user_agent.clone(),
            limit: config.limit,
            time_filter: config.time_filter.clone(),
            token: Mutex::new(None),
            client: http_client(timeout)?,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    async fn bearer_token(&self) -> Result<SecretString> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            return Err(LensError::source_unavailable(
                NAME,
                "REDDIT_CLIENT_ID / REDDIT_CLIENT_SECRET not set",
            ));
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now()
        {
            return Ok(token.value.clone());
        }

        debug!("Requesting Reddit access token");
        let response = self
            .client
            .post(REDDIT_TOKEN_ENDPOINT)
            .basic_auth(client_id, Some(client_secret.expose_secret()))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let body: TokenResponse = check_status(NAME, response).await?.json().await?;

        let access_token = body.access_token.ok_or_else(|| {
            LensError::source(
                NAME,
                ErrorCategory::Auth,
                body.error.unwrap_or_else(|| "no access token returned".to_string()),
            )
        })?;

        let value = SecretString::from(access_token);
        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(BearerToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(value)
    }

    fn search_url(&self, query: &str) -> Result<Url> {
        let limit = self.limit.to_string();
        Url::parse_with_params(
            &format!("{}/search", REDDIT_API_BASE),
            &[
                ("q", query),
                ("limit", limit.as_str()),
                ("t", self.time_filter.as_str()),
                ("sort", "relevance"),
                ("raw_json", "1"),
            ],
        )
        .map_err(|e| LensError::Config(format!("Invalid Reddit search URL: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: u64,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Listing {
    #[serde(default)]
    data: ListingData,
}

#[derive(Debug, Default, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Submission,
}

#[derive(Debug, Deserialize)]
struct Submission {
    #[serde(default)]
    title: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    subreddit: String,
}

fn into_discussions(listing: Listing) -> Vec<Discussion> {
    listing
        .data
        .children
        .into_iter()
        .map(|child| {
            let post = child.data;
            Discussion {
                title: post.title,
                url: format!("https://reddit.com{}", post.permalink),
                score: post.score,
                num_comments: post.num_comments,
                created: post.created_utc,
                subreddit: post.subreddit,
                source_type: SourceKind::Reddit,
            }
        })
        .collect()
}

#[async_trait]
impl DataSource for RedditSearch {
    type Output = Vec<Discussion>;

    fn name(&self) -> &'static str {
        NAME
    }

    fn cache_type(&self) -> CacheType {
        CacheType::RedditDiscussions
    }

    fn params(&self, query: &str) -> Value {
        json!({"q": query, "limit": self.limit, "t": self.time_filter})
    }

    async fn fetch(&self, query: &str) -> Result<Vec<Discussion>> {
        let token = self.bearer_token().await?;

        let response = self
            .client
            .get(self.search_url(query)?)
            .bearer_auth(token.expose_secret())
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await?;
        let listing: Listing = check_status(NAME, response).await?.json().await?;

        let discussions = into_discussions(listing);
        info!("Reddit: retrieved {} discussions", discussions.len());
        Ok(discussions)
    }
}
