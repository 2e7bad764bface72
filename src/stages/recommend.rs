//! Recommend stage: positioning map, gaps and recommendations
//!
//! Axes run 1-10 (x: price positioning, y: target company size). Competitors
//! without a measured position are spread over an even grid.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::text::round_to;
use crate::constants::recommend::{AXIS_MAX, AXIS_MIN, GAP_DISTANCE, MAX_MOVES, MAX_ZONES};
use crate::pipeline::{
    CompetitorAttributes, ContentRecommendation, ContentTheme, ExtractOutput, OpportunityZone,
    Point, Position, PositioningMap, Priority, RecommendOutput, RecommendStage, StageContext,
};
use crate::types::Result;

/// Attribute value meaning "not measured"
const UNMEASURED: f64 = 5.0;

/// Themes turned into content recommendations
const MAX_CONTENT_RECOMMENDATIONS: usize = 5;

#[derive(Debug, Default)]
pub struct HeuristicRecommender;

impl HeuristicRecommender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RecommendStage for HeuristicRecommender {
    async fn recommend(
        &self,
        ctx: &StageContext,
        input: Option<&ExtractOutput>,
    ) -> Result<RecommendOutput> {
        let Some(extract) = input.filter(|e| !e.competitors.is_empty()) else {
            warn!("No competitors for '{}', recommendations are empty", ctx.query);
            return Ok(RecommendOutput::default());
        };

        let positioning_map =
            position_competitors(&extract.competitors, &extract.competitor_attributes);
        let opportunity_zones = detect_opportunity_zones(&positioning_map);
        let content_recommendations =
            recommend_content(&extract.content_themes, extract.competitors.len());
        let strategic_moves = strategic_moves(&positioning_map, &opportunity_zones);

        info!(
            positioned = positioning_map.companies.len(),
            zones = opportunity_zones.len(),
            content = content_recommendations.len(),
            "Recommendations generated"
        );

        Ok(RecommendOutput {
            positioning_map,
            opportunity_zones,
            content_recommendations,
            strategic_moves,
        })
    }
}

// =============================================================================
// Positioning
// =============================================================================

fn clamp_axis(value: f64) -> f64 {
    round_to(value.clamp(AXIS_MIN, AXIS_MAX), 1)
}

/// Even grid over 2..=8 on both axes, filled row by row
fn grid_position(index: usize, total: usize) -> (f64, f64) {
    let cols = (total as f64).sqrt().ceil().max(1.0) as usize;
    let (row, col) = (index / cols, index % cols);
    let x = 2.0 + col as f64 * 6.0 / (cols.saturating_sub(1)).max(1) as f64;
    let y = 2.0 + row as f64 * 6.0 / (total / cols).max(1) as f64;
    (x, y)
}

pub(crate) fn position_competitors(
    competitors: &[String],
    attributes: &BTreeMap<String, CompetitorAttributes>,
) -> PositioningMap {
    let mut map = PositioningMap::default();
    for (i, name) in competitors.iter().enumerate() {
        let measured = attributes.get(name).filter(|a| {
            a.price_positioning != UNMEASURED || a.target_market_size != UNMEASURED
        });
        let position = match measured {
            Some(a) => Position {
                x: clamp_axis(a.price_positioning),
                y: clamp_axis(a.target_market_size),
                rationale: "Positioning based on market analysis".to_string(),
            },
            None => {
                let (x, y) = grid_position(i, competitors.len());
                Position {
                    x: clamp_axis(x),
                    y: clamp_axis(y),
                    rationale: "Estimated positioning".to_string(),
                }
            }
        };
        map.companies.insert(name.clone(), position);
    }
    map
}

// =============================================================================
// Opportunity Zones
// =============================================================================

fn describe_zone(x: f64, y: f64) -> &'static str {
    if x < 5.0 && y > 7.0 {
        "Budget enterprise gap"
    } else if x > 6.0 && y < 4.0 {
        "Premium SMB gap"
    } else if (4.0..=6.0).contains(&x) && y > 7.0 {
        "Mid-price enterprise gap"
    } else {
        "Market gap"
    }
}

pub(crate) fn detect_opportunity_zones(map: &PositioningMap) -> Vec<OpportunityZone> {
    if map.companies.is_empty() {
        return Vec::new();
    }

    let mut zones = Vec::new();
    for x in [2.0, 4.0, 6.0, 8.0] {
        for y in [2.0, 4.0, 6.0, 8.0] {
            let nearest = map
                .companies
                .values()
                .map(|p| ((x - p.x).powi(2) + (y - p.y).powi(2)).sqrt())
                .fold(f64::INFINITY, f64::min);

            if nearest > GAP_DISTANCE {
                zones.push(OpportunityZone {
                    coordinates: Point { x, y },
                    description: describe_zone(x, y).to_string(),
                    rationale: "No major competitors in this segment".to_string(),
                    opportunity_score: round_to(nearest * 2.0, 1),
                });
            }
        }
    }

    zones.sort_by(|a, b| b.opportunity_score.total_cmp(&a.opportunity_score));
    zones.truncate(MAX_ZONES);
    zones
}

// =============================================================================
// Content Recommendations
// =============================================================================

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

fn content_format(theme: &str) -> &'static str {
    let theme = theme.to_lowercase();

    if contains_any(&theme, &["how", "guide", "tutorial"]) {
        "Tutorial + video"
    } else if contains_any(&theme, &["comparison", "vs", "versus"]) {
        "Comparison article + infographic"
    } else if contains_any(&theme, &["best", "top", "review"]) {
        "Review roundup + checklist"
    } else if contains_any(&theme, &["case", "study", "example"]) {
        "Case study + webinar"
    } else {
        "Blog post + infographic"
    }
}

fn priority_for(frequency: usize) -> Priority {
    match frequency {
        f if f > 10 => Priority::High,
        f if f > 5 => Priority::Medium,
        _ => Priority::Low,
    }
}

pub(crate) fn recommend_content(
    themes: &[ContentTheme],
    competitor_count: usize,
) -> Vec<ContentRecommendation> {
    let mut recommendations: Vec<ContentRecommendation> = themes
        .iter()
        .take(MAX_CONTENT_RECOMMENDATIONS)
        .map(|theme| {
            let score = (theme.frequency as f64 / 3.0 + theme.sentiment * 2.0 + 5.0).min(10.0);
            ContentRecommendation {
                topic: format!("{} best practices", theme.theme),
                priority: priority_for(theme.frequency),
                opportunity_score: round_to(score, 1),
                search_volume_monthly: theme.frequency as u64 * 200,
                competitor_coverage: format!("Limited coverage by {} competitors", competitor_count),
                recommended_format: content_format(&theme.theme).to_string(),
                estimated_effort: "medium".to_string(),
            }
        })
        .collect();

    recommendations.sort_by(|a, b| b.opportunity_score.total_cmp(&a.opportunity_score));
    recommendations
}

// =============================================================================
// Strategic Moves
// =============================================================================

pub(crate) fn strategic_moves(map: &PositioningMap, zones: &[OpportunityZone]) -> Vec<String> {
    if map.companies.is_empty() {
        return vec!["Conduct additional market research to identify competitors".to_string()];
    }

    let n = map.companies.len() as f64;
    let avg_x = map.companies.values().map(|p| p.x).sum::<f64>() / n;
    let avg_y = map.companies.values().map(|p| p.y).sum::<f64>() / n;

    let mut moves = Vec::new();

    if let Some(top) = zones.first() {
        let Point { x, y } = top.coordinates;
        if x < 5.0 && y > 7.0 {
            moves.push("Position as 'enterprise features at SMB pricing'");
        } else if x > 6.0 && y < 4.0 {
            moves.push("Target premium small business segment with high-touch service");
        } else if (4.0..=6.0).contains(&x) {
            moves.push("Position in mid-market sweet spot with balanced offering");
        }
    }

    if avg_x > 6.0 {
        moves.push("Consider value-based positioning to differentiate from premium competitors");
    } else if avg_x < 4.0 {
        moves.push("Opportunity to establish premium positioning in budget-dominated market");
    }

    if avg_y > 6.0 {
        moves.push(
            "Most competitors target enterprises - consider focusing on underserved SMB segment",
        );
    } else if avg_y < 4.0 {
        moves.push("SMB market is crowded - explore enterprise opportunity");
    }

    moves.push("Emphasize unique value propositions not covered by competitors");
    moves.push("Develop content addressing underserved topics identified in gap analysis");

    moves.into_iter().take(MAX_MOVES).map(String::from).collect()
}
