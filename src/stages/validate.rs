//! Validate stage: cross-check stage outputs and score confidence
//!
//! ## Confidence
//!
//! ```text
//! confidence = 0.35 * min(1, sources / 15)
//!            + 0.50 * (passed validations / 3)
//!            + 0.15 * min(1, 0.5 [trends] + 0.3 [discussions] + 0.2 [sources >= 10])
//! ```
//!
//! Floored at 0.65 once there are at least 8 sources and one validation
//! passed; rounded to two decimals.

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use super::text::round_to;
use crate::config::ValidateConfig;
use crate::constants::validate::{
    CONFIDENCE_FLOOR, FLOOR_MIN_SOURCES, MIN_COMPETITOR_MENTIONS, MIN_POSITIONING_COVERAGE,
    MIN_VALIDATED_COMPETITORS, SOURCE_SATURATION,
};
use crate::pipeline::{
    ExtractOutput, GatherOutput, PipelineState, QualityFlag, RecommendOutput, Report,
    ReportMetadata, RunStatus, SourceAttribution, StageContext, ValidateStage, ValidatedInsights,
};
use crate::types::Result;

/// Source count below which research is flagged as thin
const LOW_SOURCE_COUNT: usize = 10;

/// Outcome of one validation check
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub area: &'static str,
    pub valid: bool,
    pub issues: Vec<String>,
}

pub struct QualityValidator {
    confidence_threshold: f64,
    min_sources: usize,
}

impl QualityValidator {
    pub fn new(config: &ValidateConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            min_sources: config.min_sources,
        }
    }

    fn validate_research(&self, gather: Option<&GatherOutput>) -> Validation {
        let count = gather.map_or(0, GatherOutput::total_sources);
        let valid = count >= self.min_sources;
        let issues = if valid {
            Vec::new()
        } else {
            vec![format!(
                "Insufficient sources ({}/{} minimum required)",
                count, self.min_sources
            )]
        };
        Validation {
            area: "research",
            valid,
            issues,
        }
    }
}

impl Default for QualityValidator {
    fn default() -> Self {
        Self::new(&ValidateConfig::default())
    }
}

/// Competitors mentioned by enough distinct sources
pub(crate) fn validated_competitors<'a>(
    extract: &'a ExtractOutput,
    gather: Option<&GatherOutput>,
) -> Vec<&'a str> {
    let texts: Vec<String> = gather
        .map(|g| g.sources.iter().map(|s| s.text().to_lowercase()).collect())
        .unwrap_or_default();

    extract
        .competitors
        .iter()
        .filter(|name| {
            let needle = name.to_lowercase();
            texts.iter().filter(|t| t.contains(&needle)).count() >= MIN_COMPETITOR_MENTIONS
        })
        .map(String::as_str)
        .collect()
}

fn validate_analysis(extract: Option<&ExtractOutput>, gather: Option<&GatherOutput>) -> Validation {
    let mut issues = Vec::new();
    let validated = extract.map_or(0, |e| validated_competitors(e, gather).len());
    let has_themes = extract.is_some_and(|e| !e.content_themes.is_empty());

    if validated < MIN_VALIDATED_COMPETITORS {
        issues.push(format!(
            "Insufficient validated competitors ({}/{} minimum)",
            validated, MIN_VALIDATED_COMPETITORS
        ));
    }
    if !has_themes {
        issues.push("No content themes identified".to_string());
    }

    Validation {
        area: "analysis",
        valid: issues.is_empty(),
        issues,
    }
}

fn validate_strategy(
    recommend: Option<&RecommendOutput>,
    extract: Option<&ExtractOutput>,
) -> Validation {
    let mut issues = Vec::new();
    let competitors = extract.map_or(0, |e| e.competitors.len());
    let positioned = recommend.map_or(0, |r| r.positioning_map.companies.len());
    let coverage = if competitors > 0 {
        positioned as f64 / competitors as f64
    } else {
        0.0
    };

    let positioning_valid = coverage >= MIN_POSITIONING_COVERAGE;
    if !positioning_valid && competitors > 0 {
        issues.push(format!(
            "Low positioning coverage ({:.0}%)",
            coverage * 100.0
        ));
    }
    if recommend.is_none_or(|r| r.content_recommendations.is_empty()) {
        issues.push("No content recommendations generated".to_string());
    }
    if recommend.is_none_or(|r| r.strategic_moves.is_empty()) {
        issues.push("No strategic moves generated".to_string());
    }

    Validation {
        area: "strategy",
        valid: positioning_valid && issues.is_empty(),
        issues,
    }
}

pub(crate) fn confidence(validations: &[Validation], gather: Option<&GatherOutput>) -> f64 {
    let sources = gather.map_or(0, GatherOutput::total_sources);
    let source_score = (sources as f64 / SOURCE_SATURATION).min(1.0);

    let passed = validations.iter().filter(|v| v.valid).count();
    let validation_score = if validations.is_empty() {
        0.0
    } else {
        passed as f64 / validations.len() as f64
    };

    let mut bonus = 0.0;
    if gather.is_some_and(GatherOutput::has_trends) {
        bonus += 0.5;
    }
    if gather.is_some_and(GatherOutput::has_discussions) {
        bonus += 0.3;
    }
    if sources >= LOW_SOURCE_COUNT {
        bonus += 0.2;
    }
    let data_score = f64::min(bonus, 1.0);

    let mut score = source_score * 0.35 + validation_score * 0.50 + data_score * 0.15;
    if sources >= FLOOR_MIN_SOURCES && passed >= 1 {
        score = score.max(CONFIDENCE_FLOOR);
    }
    round_to(score, 2)
}

fn quality_flags(
    validations: &[Validation],
    state: &PipelineState,
    confidence: f64,
    threshold: f64,
) -> Vec<QualityFlag> {
    let gather = state.outputs().gather();
    let mut flags: Vec<QualityFlag> = validations
        .iter()
        .flat_map(|v| v.issues.iter().map(|issue| QualityFlag::warning(issue, v.area)))
        .collect();

    let sources = gather.map_or(0, GatherOutput::total_sources);
    if sources < LOW_SOURCE_COUNT {
        flags.push(QualityFlag::warning(
            format!("Low source count ({}). Results may be incomplete.", sources),
            "research",
        ));
    } else if sources as f64 >= SOURCE_SATURATION {
        flags.push(QualityFlag::info(
            format!("Good source count ({}). Results are well-supported.", sources),
            "research",
        ));
    }

    if let Some(gather) = gather {
        if gather.has_trends() {
            flags.push(QualityFlag::info(
                "Trend data available for temporal analysis",
                "research",
            ));
        }
        if gather.has_discussions() {
            flags.push(QualityFlag::info(
                format!(
                    "Community insights from {} discussions",
                    gather.discussions.len()
                ),
                "research",
            ));
        }
    }

    for error in state.errors() {
        if error.recovered {
            flags.push(QualityFlag::warning(
                format!("Source unavailable: {}", error.error),
                "research",
            ));
        } else {
            flags.push(QualityFlag::error(error.error.clone(), error.stage.as_str()));
        }
    }

    if confidence < threshold {
        flags.push(QualityFlag::warning(
            format!(
                "Confidence {:.2} is below the {:.2} threshold",
                confidence, threshold
            ),
            "quality",
        ));
    }

    flags
}

#[async_trait]
impl ValidateStage for QualityValidator {
    async fn validate(&self, ctx: &StageContext, state: &PipelineState) -> Result<Report> {
        let outputs = state.outputs();
        let gather = outputs.gather();
        let extract = outputs.extract();
        let recommend = outputs.recommend();

        let validations = [
            self.validate_research(gather),
            validate_analysis(extract, gather),
            validate_strategy(recommend, extract),
        ];
        let confidence = confidence(&validations, gather);
        let quality_flags =
            quality_flags(&validations, state, confidence, self.confidence_threshold);

        info!(
            confidence,
            flags = quality_flags.len(),
            "Validation complete"
        );

        Ok(Report {
            report_metadata: ReportMetadata {
                query: ctx.query.clone(),
                timestamp: Utc::now(),
                total_sources: gather.map_or(0, GatherOutput::total_sources),
                processing_time_seconds: state.elapsed().as_secs_f64(),
                confidence_score: confidence,
                api_calls: state.counters().external_calls,
                total_tokens: state.counters().total_tokens,
                run_id: ctx.run_id,
                status: RunStatus::Completed,
                errors: state.errors().to_vec(),
            },
            validated_insights: ValidatedInsights {
                competitors: extract.map(|e| e.competitors.clone()).unwrap_or_default(),
                content_themes: extract
                    .map(|e| e.content_themes.clone())
                    .unwrap_or_default(),
                positioning_map: recommend
                    .map(|r| r.positioning_map.clone())
                    .unwrap_or_default(),
                content_recommendations: recommend
                    .map(|r| r.content_recommendations.clone())
                    .unwrap_or_default(),
                strategic_recommendations: recommend
                    .map(|r| r.strategic_moves.clone())
                    .unwrap_or_default(),
            },
            quality_flags,
            source_attribution: SourceAttribution::from_gather(gather),
        })
    }
}
