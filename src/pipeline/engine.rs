//! Workflow Engine
//!
//! Drives one run through `Gather → Extract → Recommend → Validate → Done`.
//! A failing or panicking stage is recorded and the run moves on; the
//! caller always gets a schema-complete [`Report`] unless the query itself
//! is rejected.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use super::report::Report;
use super::stage::{
    ExtractStage, GatherStage, Parameters, RecommendStage, StageKind, ValidateStage,
};
use super::state::{PipelineState, StageOutput, WorkflowState};
use crate::cache::{CacheStats, CacheStore, CacheType};
use crate::config::Config;
use crate::constants::query;
use crate::fetch::{CachedFetcher, FetchPolicy};
use crate::stages::{HeuristicExtractor, HeuristicRecommender, QualityValidator, SourceGatherer};
use crate::types::error::panic_message;
use crate::types::{LensError, Result};

/// Final report together with the state that produced it
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub report: Report,
    pub state: PipelineState,
}

/// Which cache entries to remove
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    All,
    Type(CacheType),
    Query(String),
}

pub struct WorkflowEngine {
    cache: Arc<CacheStore>,
    gather: Arc<dyn GatherStage>,
    extract: Arc<dyn ExtractStage>,
    recommend: Arc<dyn RecommendStage>,
    validate: Arc<dyn ValidateStage>,
}

impl WorkflowEngine {
    pub fn new(
        cache: Arc<CacheStore>,
        gather: Arc<dyn GatherStage>,
        extract: Arc<dyn ExtractStage>,
        recommend: Arc<dyn RecommendStage>,
        validate: Arc<dyn ValidateStage>,
    ) -> Self {
        Self {
            cache,
            gather,
            extract,
            recommend,
            validate,
        }
    }

    /// Engine wired with the built-in stages and the on-disk cache
    pub fn with_defaults(config: &Config) -> Result<Self> {
        let cache = Arc::new(CacheStore::open(&config.cache)?);
        Self::with_cache(config, cache)
    }

    /// Built-in stages over an existing cache
    pub fn with_cache(config: &Config, cache: Arc<CacheStore>) -> Result<Self> {
        let fetcher = Arc::new(CachedFetcher::new(
            cache.clone(),
            FetchPolicy::from_config(&config.fetch),
        ));
        let gather = SourceGatherer::from_config(fetcher, &config.sources, config.fetch.timeout())?;

        Ok(Self::new(
            cache,
            Arc::new(gather),
            Arc::new(HeuristicExtractor::new(&config.extract)),
            Arc::new(HeuristicRecommender::new()),
            Arc::new(QualityValidator::new(&config.validate)),
        ))
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Run the pipeline and return only the report
    pub async fn run(&self, query: &str, parameters: Parameters) -> Result<Report> {
        Ok(self.execute(query, parameters).await?.report)
    }

    /// Run the pipeline and keep the final state for inspection
    ///
    /// Only [`LensError::InvalidQuery`] is returned as an error.
    #[instrument(
        skip(self, query, parameters),
        fields(run_id = tracing::field::Empty, query = %query.trim())
    )]
    pub async fn execute(&self, query: &str, parameters: Parameters) -> Result<PipelineRun> {
        let query = validate_query(query)?;
        let mut state = PipelineState::new(query, parameters);
        tracing::Span::current().record("run_id", tracing::field::display(state.run_id()));
        let ctx = state.context();

        info!("Pipeline started");

        // Gather
        state.enter(WorkflowState::Gather);
        let started = Instant::now();
        let result = guarded(StageKind::Gather, self.gather.gather(&ctx)).await;
        if let Ok(output) = &result {
            state.counters_mut().add_fetch_stats(&output.fetch_stats);
            for failure in &output.source_failures {
                warn!("Source failed during gather: {}", failure);
                state.record_error(StageKind::Gather, failure.to_string(), true);
            }
        }
        settle(&mut state, result.map(StageOutput::Gather), StageKind::Gather, started);

        // Extract
        state.enter(WorkflowState::Extract);
        let started = Instant::now();
        let result = guarded(
            StageKind::Extract,
            self.extract.extract(&ctx, state.outputs().gather()),
        )
        .await;
        settle(&mut state, result.map(StageOutput::Extract), StageKind::Extract, started);

        // Recommend
        state.enter(WorkflowState::Recommend);
        let started = Instant::now();
        let result = guarded(
            StageKind::Recommend,
            self.recommend.recommend(&ctx, state.outputs().extract()),
        )
        .await;
        settle(
            &mut state,
            result.map(StageOutput::Recommend),
            StageKind::Recommend,
            started,
        );

        // Validate
        state.enter(WorkflowState::Validate);
        let started = Instant::now();
        let result = guarded(StageKind::Validate, self.validate.validate(&ctx, &state)).await;
        settle(
            &mut state,
            result.map(|report| StageOutput::Validate(Box::new(report))),
            StageKind::Validate,
            started,
        );

        state.enter(WorkflowState::Done);
        let report = compile_report(&state);

        info!(
            status = %report.status(),
            confidence = report.confidence(),
            errors = state.errors().len(),
            "Pipeline finished in {:.2}s",
            report.report_metadata.processing_time_seconds
        );

        Ok(PipelineRun { report, state })
    }

    // =========================================================================
    // Cache Administration
    // =========================================================================

    pub fn cache_stats(&self) -> Result<CacheStats> {
        self.cache.get_stats()
    }

    /// Remove cache entries, returning how many were deleted
    pub fn clear_cache(&self, scope: ClearScope) -> usize {
        match scope {
            ClearScope::All => self.cache.clear_all(),
            ClearScope::Type(cache_type) => self.cache.delete_by_type(cache_type),
            ClearScope::Query(query) => self.cache.delete_by_query(&query),
        }
    }

    pub fn cleanup_expired_cache(&self) -> usize {
        self.cache.cleanup_expired()
    }
}

/// Trim and bound-check a query
fn validate_query(query: &str) -> Result<&str> {
    let trimmed = query.trim();
    let len = trimmed.chars().count();
    if len < query::MIN_LEN {
        return Err(LensError::InvalidQuery(format!(
            "query must be at least {} characters (got {})",
            query::MIN_LEN,
            len
        )));
    }
    if len > query::MAX_LEN {
        return Err(LensError::InvalidQuery(format!(
            "query must be at most {} characters (got {})",
            query::MAX_LEN,
            len
        )));
    }
    Ok(trimmed)
}

/// Await a stage, turning a panic into a stage error
async fn guarded<T, F>(stage: StageKind, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(LensError::stage(
            stage,
            format!("panicked: {}", panic_message(panic.as_ref())),
        )),
    }
}

/// Store a stage outcome or record its failure
fn settle(
    state: &mut PipelineState,
    result: Result<StageOutput>,
    stage: StageKind,
    started: Instant,
) {
    let elapsed = started.elapsed();
    match result.and_then(|output| state.store(output)) {
        Ok(()) => {
            info!(
                stage = %stage,
                duration_ms = elapsed.as_millis() as u64,
                "Stage completed"
            );
            state.record_timing(stage, elapsed, true);
        }
        Err(e) => {
            warn!(stage = %stage, "Stage failed: {}", e);
            state.record_error(stage, e.to_string(), false);
            state.record_timing(stage, elapsed, false);
        }
    }
}

fn compile_report(state: &PipelineState) -> Report {
    let (mut report, validated) = match state.outputs().validate() {
        Some(report) => (report.clone(), true),
        None => (Report::fallback(state), false),
    };
    report.stamp(state, validated);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::report::{FlagKind, ORCHESTRATOR, RunStatus};
    use crate::pipeline::stage::{
        ExtractOutput, FetchStats, GatherOutput, RecommendOutput, SourceFailure, StageContext,
    };
    use crate::sources::WebSource;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    enum Script<T> {
        Ok(T),
        Fail,
        Panic,
    }

    /// Stage double that replays a fixed outcome and records what it saw
    struct Scripted<T> {
        stage: StageKind,
        script: Script<T>,
        calls: AtomicUsize,
        saw_input: Mutex<Vec<bool>>,
    }

    impl<T: Clone> Scripted<T> {
        fn new(stage: StageKind, script: Script<T>) -> Arc<Self> {
            Arc::new(Self {
                stage,
                script,
                calls: AtomicUsize::new(0),
                saw_input: Mutex::new(Vec::new()),
            })
        }

        fn play(&self, had_input: bool) -> Result<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.saw_input.lock().unwrap().push(had_input);
            match &self.script {
                Script::Ok(value) => Ok(value.clone()),
                Script::Fail => Err(LensError::stage(self.stage, "scripted failure")),
                Script::Panic => panic!("scripted panic in {}", self.stage),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn inputs(&self) -> Vec<bool> {
            self.saw_input.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GatherStage for Scripted<GatherOutput> {
        async fn gather(&self, _ctx: &StageContext) -> Result<GatherOutput> {
            self.play(true)
        }
    }

    #[async_trait]
    impl ExtractStage for Scripted<ExtractOutput> {
        async fn extract(
            &self,
            _ctx: &StageContext,
            input: Option<&GatherOutput>,
        ) -> Result<ExtractOutput> {
            self.play(input.is_some())
        }
    }

    #[async_trait]
    impl RecommendStage for Scripted<RecommendOutput> {
        async fn recommend(
            &self,
            _ctx: &StageContext,
            input: Option<&ExtractOutput>,
        ) -> Result<RecommendOutput> {
            self.play(input.is_some())
        }
    }

    /// Validate double: the script value is the confidence to report
    #[async_trait]
    impl ValidateStage for Scripted<f64> {
        async fn validate(&self, _ctx: &StageContext, state: &PipelineState) -> Result<Report> {
            let confidence = self.play(state.outputs().recommend().is_some())?;
            let mut report = Report::fallback(state);
            report.quality_flags.clear();
            report.report_metadata.confidence_score = confidence;
            Ok(report)
        }
    }

    struct Doubles {
        gather: Arc<Scripted<GatherOutput>>,
        extract: Arc<Scripted<ExtractOutput>>,
        recommend: Arc<Scripted<RecommendOutput>>,
        validate: Arc<Scripted<f64>>,
    }

    impl Doubles {
        fn healthy() -> Self {
            Self {
                gather: Scripted::new(StageKind::Gather, Script::Ok(gathered(Vec::new()))),
                extract: Scripted::new(StageKind::Extract, Script::Ok(ExtractOutput::default())),
                recommend: Scripted::new(
                    StageKind::Recommend,
                    Script::Ok(RecommendOutput::default()),
                ),
                validate: Scripted::new(StageKind::Validate, Script::Ok(0.85)),
            }
        }

        fn engine(&self) -> WorkflowEngine {
            WorkflowEngine::new(
                Arc::new(CacheStore::in_memory().unwrap()),
                self.gather.clone(),
                self.extract.clone(),
                self.recommend.clone(),
                self.validate.clone(),
            )
        }
    }

    fn gathered(source_failures: Vec<SourceFailure>) -> GatherOutput {
        GatherOutput {
            sources: vec![WebSource::new("https://a.example", "Acme CRM", "simple crm")],
            source_failures,
            fetch_stats: FetchStats {
                external_calls: 2,
                cache_hits: 1,
                cache_misses: 2,
            },
            ..GatherOutput::default()
        }
    }

    #[tokio::test]
    async fn test_all_stages_succeed() {
        let doubles = Doubles::healthy();
        let run = doubles
            .engine()
            .execute("CRM tools for real estate agents", Parameters::new())
            .await
            .unwrap();

        assert_eq!(run.report.status(), RunStatus::Completed);
        assert!(run.report.report_metadata.errors.is_empty());
        assert_eq!(run.report.confidence(), 0.85);
        assert_eq!(run.report.report_metadata.api_calls, 2);
        assert_eq!(run.report.report_metadata.run_id, run.state.run_id());

        assert_eq!(run.state.current(), WorkflowState::Done);
        assert_eq!(run.state.counters().stage_calls, 4);
        assert_eq!(run.state.counters().cache_hits, 1);
        let stages: Vec<StageKind> = run.state.timings().iter().map(|t| t.stage).collect();
        assert_eq!(stages, StageKind::ALL);
        assert!(run.state.timings().iter().all(|t| t.succeeded));
    }

    #[tokio::test]
    async fn test_source_failure_is_recorded_against_gather() {
        let mut doubles = Doubles::healthy();
        doubles.gather = Scripted::new(
            StageKind::Gather,
            Script::Ok(gathered(vec![SourceFailure {
                source: "google_trends".to_string(),
                message: "timed out".to_string(),
            }])),
        );

        let run = doubles
            .engine()
            .execute("CRM tools", Parameters::new())
            .await
            .unwrap();

        let errors = &run.report.report_metadata.errors;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stage, StageKind::Gather);
        assert!(errors[0].recovered);
        assert!(errors[0].error.contains("google_trends"));

        // Gather itself succeeded, so every later stage ran with input
        assert!(run.state.outputs().gather().is_some());
        assert_eq!(doubles.extract.inputs(), [true]);
        assert_eq!(run.report.status(), RunStatus::Degraded);
        assert_eq!(run.report.confidence(), 0.85);
    }

    #[tokio::test]
    async fn test_failed_stage_does_not_stop_pipeline() {
        let mut doubles = Doubles::healthy();
        doubles.extract = Scripted::new(StageKind::Extract, Script::Fail);

        let run = doubles
            .engine()
            .execute("CRM tools", Parameters::new())
            .await
            .unwrap();

        assert!(run.state.outputs().extract().is_none());
        assert_eq!(doubles.recommend.calls(), 1);
        assert_eq!(doubles.recommend.inputs(), [false]);
        assert_eq!(doubles.validate.calls(), 1);

        let errors = run.state.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stage, StageKind::Extract);
        assert!(!errors[0].recovered);
        assert_eq!(run.report.status(), RunStatus::Degraded);
    }

    #[tokio::test]
    async fn test_panicking_stage_is_contained() {
        let mut doubles = Doubles::healthy();
        doubles.recommend = Scripted::new(StageKind::Recommend, Script::Panic);

        let run = doubles
            .engine()
            .execute("CRM tools", Parameters::new())
            .await
            .unwrap();

        assert_eq!(run.state.errors().len(), 1);
        assert_eq!(run.state.errors()[0].stage, StageKind::Recommend);
        assert!(run.state.errors()[0].error.contains("scripted panic"));
        assert_eq!(doubles.validate.inputs(), [false]);
        assert_eq!(run.report.status(), RunStatus::Degraded);
    }

    #[tokio::test]
    async fn test_validate_failure_yields_fallback_report() {
        let mut doubles = Doubles::healthy();
        doubles.validate = Scripted::new(StageKind::Validate, Script::Fail);

        let run = doubles
            .engine()
            .execute("CRM tools", Parameters::new())
            .await
            .unwrap();

        let report = &run.report;
        assert_eq!(report.status(), RunStatus::Incomplete);
        assert_eq!(report.confidence(), 0.0);
        assert_eq!(report.report_metadata.total_sources, 1);
        assert!(report.validated_insights.competitors.is_empty());
        assert!(
            report
                .flags_of(FlagKind::Error)
                .any(|f| f.stage == ORCHESTRATOR)
        );
        assert_eq!(report.report_metadata.errors.len(), 1);
        assert_eq!(report.report_metadata.errors[0].stage, StageKind::Validate);
    }

    #[tokio::test]
    async fn test_every_stage_failing_still_reports() {
        let doubles = Doubles {
            gather: Scripted::new(StageKind::Gather, Script::Fail),
            extract: Scripted::new(StageKind::Extract, Script::Panic),
            recommend: Scripted::new(StageKind::Recommend, Script::Fail),
            validate: Scripted::new(StageKind::Validate, Script::Fail),
        };

        let run = doubles
            .engine()
            .execute("CRM tools", Parameters::new())
            .await
            .unwrap();

        let stages: Vec<StageKind> = run.state.errors().iter().map(|e| e.stage).collect();
        assert_eq!(stages, StageKind::ALL);
        assert_eq!(run.report.status(), RunStatus::Incomplete);
        assert_eq!(run.report.report_metadata.total_sources, 0);
        assert_eq!(run.state.counters().stage_calls, 0);

        let report = &run.report;
        assert_eq!(report.confidence(), 0.0);
        assert_eq!(report.report_metadata.errors.len(), 4);
        let insights = &report.validated_insights;
        assert!(insights.competitors.is_empty());
        assert!(insights.content_themes.is_empty());
        assert!(insights.positioning_map.companies.is_empty());
        assert!(insights.content_recommendations.is_empty());
        assert!(insights.strategic_recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_query_runs_nothing() {
        let doubles = Doubles::healthy();
        let engine = doubles.engine();

        let err = engine.run("  ab  ", Parameters::new()).await.unwrap_err();
        assert!(matches!(err, LensError::InvalidQuery(_)));

        let long = "x".repeat(query::MAX_LEN + 1);
        assert!(matches!(
            engine.run(&long, Parameters::new()).await,
            Err(LensError::InvalidQuery(_))
        ));

        assert_eq!(doubles.gather.calls(), 0);
    }

    #[tokio::test]
    async fn test_query_is_trimmed() {
        let doubles = Doubles::healthy();
        let report = doubles
            .engine()
            .run("   crm  ", Parameters::new())
            .await
            .unwrap();
        assert_eq!(report.report_metadata.query, "crm");
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_isolated() {
        let doubles = Doubles::healthy();
        let engine = doubles.engine();

        let (a, b) = tokio::join!(
            engine.execute("first query", Parameters::new()),
            engine.execute("second query", Parameters::new()),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.state.run_id(), b.state.run_id());
        assert_eq!(a.report.report_metadata.query, "first query");
        assert_eq!(b.report.report_metadata.query, "second query");
        assert_eq!(doubles.gather.calls(), 2);
    }

    #[tokio::test]
    async fn test_clear_cache_scopes() {
        let engine = Doubles::healthy().engine();
        let cache = engine.cache();
        let write = |q: &str| crate::cache::CacheWrite::for_query(q);

        cache.set("k1", &1, CacheType::WebSearch, write("crm"));
        cache.set("k2", &2, CacheType::GoogleTrends, write("crm"));
        cache.set("k3", &3, CacheType::WebSearch, write("erp"));

        assert_eq!(engine.clear_cache(ClearScope::Type(CacheType::GoogleTrends)), 1);
        assert_eq!(engine.clear_cache(ClearScope::Query("erp".to_string())), 1);
        assert_eq!(engine.cache_stats().unwrap().total_entries_all, 1);
        assert_eq!(engine.clear_cache(ClearScope::All), 1);
        assert_eq!(engine.cleanup_expired_cache(), 0);
    }
}
