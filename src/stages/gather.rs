//! Gather stage: fan out to every data source
//!
//! All three sources run concurrently through the cache-aware fetcher. A
//! source that fails contributes empty data plus a [`SourceFailure`]; the
//! stage itself only fails if it cannot be built.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::SourcesConfig;
use crate::fetch::{CachedFetcher, Fetched};
use crate::pipeline::{FetchStats, GatherOutput, GatherStage, SourceFailure, StageContext};
use crate::sources::{
    DataSource, Discussion, RedditSearch, SerpApiTrends, SerperWebSearch, TrendSnapshot,
    WebSource, fetch_cached,
};
use crate::types::Result;

pub type WebSearchSource = Arc<dyn DataSource<Output = Vec<WebSource>>>;
pub type TrendsSource = Arc<dyn DataSource<Output = TrendSnapshot>>;
pub type DiscussionSource = Arc<dyn DataSource<Output = Vec<Discussion>>>;

pub struct SourceGatherer {
    fetcher: Arc<CachedFetcher>,
    web: WebSearchSource,
    trends: TrendsSource,
    discussions: DiscussionSource,
}

impl SourceGatherer {
    pub fn new(
        fetcher: Arc<CachedFetcher>,
        web: WebSearchSource,
        trends: TrendsSource,
        discussions: DiscussionSource,
    ) -> Self {
        Self {
            fetcher,
            web,
            trends,
            discussions,
        }
    }

    /// Build the Serper, SerpApi and Reddit clients from configuration
    pub fn from_config(
        fetcher: Arc<CachedFetcher>,
        config: &SourcesConfig,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self::new(
            fetcher,
            Arc::new(SerperWebSearch::from_config(&config.web, timeout)?),
            Arc::new(SerpApiTrends::from_config(&config.trends, timeout)?),
            Arc::new(RedditSearch::from_config(&config.discussions, timeout)?),
        ))
    }
}

fn failure_of<T>(source: &str, fetched: &Fetched<T>) -> Option<SourceFailure> {
    fetched.failure().map(|message| SourceFailure {
        source: source.to_string(),
        message: message.to_string(),
    })
}

#[async_trait]
impl GatherStage for SourceGatherer {
    async fn gather(&self, ctx: &StageContext) -> Result<GatherOutput> {
        info!("Gathering sources for '{}'", ctx.query);

        let (web, trends, discussions) = tokio::join!(
            fetch_cached(&self.fetcher, self.web.as_ref(), &ctx.query),
            fetch_cached(&self.fetcher, self.trends.as_ref(), &ctx.query),
            fetch_cached(&self.fetcher, self.discussions.as_ref(), &ctx.query),
        );

        let mut fetch_stats = FetchStats::default();
        fetch_stats.record(&web);
        fetch_stats.record(&trends);
        fetch_stats.record(&discussions);

        let source_failures: Vec<SourceFailure> = [
            failure_of(self.web.name(), &web),
            failure_of(self.trends.name(), &trends),
            failure_of(self.discussions.name(), &discussions),
        ]
        .into_iter()
        .flatten()
        .collect();

        let output = GatherOutput {
            sources: web.value,
            trends: trends.value,
            discussions: discussions.value,
            source_failures,
            fetch_stats,
        };

        info!(
            web = output.sources.len(),
            trends = output.has_trends(),
            discussions = output.discussions.len(),
            failed = output.source_failures.len(),
            "Gather complete: {:?}",
            output.source_types()
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, CacheType};
    use crate::fetch::FetchPolicy;
    use crate::pipeline::Parameters;
    use crate::types::{ErrorCategory, LensError};
    use serde::Serialize;
    use serde::de::DeserializeOwned;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Source double that counts external calls
    struct Counting<T> {
        name: &'static str,
        cache_type: CacheType,
        reply: Option<T>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl<T> Counting<T> {
        fn new(name: &'static str, cache_type: CacheType, reply: Option<T>) -> Arc<Self> {
            Arc::new(Self {
                name,
                cache_type,
                reply,
                delay: Duration::from_millis(20),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<T> DataSource for Counting<T>
    where
        T: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static,
    {
        type Output = T;

        fn name(&self) -> &'static str {
            self.name
        }

        fn cache_type(&self) -> CacheType {
            self.cache_type
        }

        fn params(&self, query: &str) -> Value {
            json!({"q": query})
        }

        async fn fetch(&self, _query: &str) -> Result<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.reply
                .clone()
                .ok_or_else(|| LensError::source(self.name, ErrorCategory::Auth, "rejected"))
        }
    }

    /// Source double whose fetch panics
    struct Exploding;

    #[async_trait]
    impl DataSource for Exploding {
        type Output = TrendSnapshot;

        fn name(&self) -> &'static str {
            "google_trends"
        }

        fn cache_type(&self) -> CacheType {
            CacheType::GoogleTrends
        }

        fn params(&self, query: &str) -> Value {
            json!({"q": query})
        }

        async fn fetch(&self, _query: &str) -> Result<TrendSnapshot> {
            let snapshots: Vec<TrendSnapshot> = Vec::new();
            Ok(snapshots[0].clone())
        }
    }

    struct Fixture {
        web: Arc<Counting<Vec<WebSource>>>,
        trends: Arc<Counting<TrendSnapshot>>,
        discussions: Arc<Counting<Vec<Discussion>>>,
        gatherer: SourceGatherer,
    }

    fn fixture(trends_ok: bool) -> Fixture {
        let cache = Arc::new(CacheStore::in_memory().unwrap());
        let policy = FetchPolicy {
            timeout: Duration::from_secs(5),
            max_retries: 0,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        };
        let fetcher = Arc::new(CachedFetcher::new(cache, policy));

        let web = Counting::new(
            "web_search",
            CacheType::WebSearch,
            Some(vec![WebSource::new("https://a.example", "Acme", "crm")]),
        );
        let snapshot = TrendSnapshot::from_points("crm", BTreeMap::from([("2024-01-01".to_string(), 40)]));
        let trends = Counting::new(
            "google_trends",
            CacheType::GoogleTrends,
            trends_ok.then_some(snapshot),
        );
        let discussions = Counting::new(
            "reddit_search",
            CacheType::RedditDiscussions,
            Some(Vec::<Discussion>::new()),
        );

        let gatherer = SourceGatherer::new(
            fetcher,
            web.clone(),
            trends.clone(),
            discussions.clone(),
        );
        Fixture {
            web,
            trends,
            discussions,
            gatherer,
        }
    }

    fn ctx(query: &str) -> StageContext {
        StageContext {
            run_id: Uuid::new_v4(),
            query: query.to_string(),
            parameters: Parameters::new(),
        }
    }

    #[tokio::test]
    async fn test_gathers_all_sources() {
        let f = fixture(true);
        let output = f.gatherer.gather(&ctx("crm tools")).await.unwrap();

        assert_eq!(output.sources.len(), 1);
        assert!(output.has_trends());
        assert!(output.source_failures.is_empty());
        assert_eq!(output.fetch_stats.external_calls, 3);
        assert_eq!(output.fetch_stats.cache_misses, 3);
    }

    #[tokio::test]
    async fn test_one_failing_source_is_isolated() {
        let f = fixture(false);
        let output = f.gatherer.gather(&ctx("crm tools")).await.unwrap();

        assert_eq!(output.sources.len(), 1);
        assert!(!output.has_trends());
        assert_eq!(output.source_failures.len(), 1);
        assert_eq!(output.source_failures[0].source, "google_trends");
        assert!(output.source_failures[0].message.contains("rejected"));
        assert_eq!(f.web.calls(), 1);
        assert_eq!(f.discussions.calls(), 1);
    }

    #[tokio::test]
    async fn test_second_run_is_served_from_cache() {
        let f = fixture(true);
        f.gatherer.gather(&ctx("crm tools")).await.unwrap();
        let second = f.gatherer.gather(&ctx("crm tools")).await.unwrap();

        assert_eq!(second.fetch_stats.cache_hits, 3);
        assert_eq!(second.fetch_stats.external_calls, 0);
        assert_eq!(f.web.calls(), 1);
        assert_eq!(f.trends.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_runs_issue_one_call_per_source() {
        let f = fixture(true);
        let (ca, cb) = (ctx("crm tools"), ctx("crm tools"));
        let (a, b) = tokio::join!(f.gatherer.gather(&ca), f.gatherer.gather(&cb));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(f.web.calls(), 1);
        assert_eq!(f.trends.calls(), 1);
        assert_eq!(f.discussions.calls(), 1);
        assert_eq!(a.sources, b.sources);
        assert_eq!(
            a.fetch_stats.external_calls + b.fetch_stats.external_calls,
            3
        );
    }

    #[tokio::test]
    async fn test_panicking_source_keeps_other_results() {
        let f = fixture(true);
        let gatherer = SourceGatherer::new(
            f.gatherer.fetcher.clone(),
            f.web.clone(),
            Arc::new(Exploding),
            f.discussions.clone(),
        );

        let output = gatherer.gather(&ctx("crm tools")).await.unwrap();

        assert_eq!(output.sources.len(), 1);
        assert!(!output.has_trends());
        assert_eq!(output.source_failures.len(), 1);
        assert_eq!(output.source_failures[0].source, "google_trends");
        assert!(output.source_failures[0].message.contains("panicked"));
        assert_eq!(f.web.calls(), 1);
        assert_eq!(f.discussions.calls(), 1);
    }
}
