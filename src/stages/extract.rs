//! Extract stage: competitors, content themes and competitor attributes
//!
//! Competitors are capitalized name runs ranked by frequency. Themes are
//! frequent content words. Each competitor's attributes are scored on a
//! bounded worker pool; one failed scoring job drops only that competitor.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use super::text::{self, CAPITALIZED_RUN, KEYWORD};
use crate::config::ExtractConfig;
use crate::constants::extract::MIN_NAME_LEN;
use crate::pipeline::{
    CompetitorAttributes, ContentTheme, ExtractOutput, ExtractStage, GatherOutput, StageContext,
};
use crate::sources::WebSource;
use crate::types::Result;

/// Neutral axis value before the recommend stage positions a competitor
const NEUTRAL_POSITION: f64 = 5.0;

pub struct HeuristicExtractor {
    workers: usize,
    max_competitors: usize,
    max_themes: usize,
}

impl HeuristicExtractor {
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            workers: config.sentiment_workers.max(1),
            max_competitors: config.max_competitors,
            max_themes: config.max_themes,
        }
    }

    async fn score_competitors(
        &self,
        competitors: &[String],
        sources: &[WebSource],
    ) -> BTreeMap<String, CompetitorAttributes> {
        let scored: Vec<_> = stream::iter(competitors.iter().cloned())
            .map(|name| {
                let texts = mentions(&name, sources);
                async move {
                    let mention_count = texts.len();
                    let sentiment = tokio::task::spawn_blocking(move || {
                        let scores: Vec<f64> = texts.iter().map(|t| text::sentiment(t)).collect();
                        text::round_to(text::mean(&scores), 2)
                    })
                    .await;
                    (name, sentiment, mention_count)
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut attributes = BTreeMap::new();
        for (name, sentiment, mention_count) in scored {
            match sentiment {
                Ok(sentiment) => {
                    attributes.insert(
                        name,
                        CompetitorAttributes {
                            price_positioning: NEUTRAL_POSITION,
                            target_market_size: NEUTRAL_POSITION,
                            sentiment,
                            mention_count,
                        },
                    );
                }
                Err(e) => warn!("Scoring failed for {}: {}", name, e),
            }
        }
        attributes
    }
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        Self::new(&ExtractConfig::default())
    }
}

#[async_trait]
impl ExtractStage for HeuristicExtractor {
    async fn extract(
        &self,
        ctx: &StageContext,
        input: Option<&GatherOutput>,
    ) -> Result<ExtractOutput> {
        let Some(gather) = input else {
            warn!("No gathered data for '{}', extraction is empty", ctx.query);
            return Ok(ExtractOutput::default());
        };
        let sources = &gather.sources;

        let competitors = detect_competitors(sources, self.max_competitors);
        let content_themes = extract_themes(sources, self.max_themes);
        let competitor_attributes = self.score_competitors(&competitors, sources).await;

        info!(
            competitors = competitors.len(),
            themes = content_themes.len(),
            "Extraction complete"
        );

        Ok(ExtractOutput {
            competitors,
            content_themes,
            competitor_attributes,
        })
    }
}

// =============================================================================
// Heuristics
// =============================================================================

/// Occurrence counter that breaks ties by first appearance
#[derive(Default)]
struct Tally {
    counts: HashMap<String, (usize, usize)>,
}

impl Tally {
    fn add(&mut self, item: &str) {
        let order = self.counts.len();
        self.counts.entry(item.to_string()).or_insert((0, order)).0 += 1;
    }

    fn top(self, limit: usize) -> Vec<(String, usize)> {
        let mut ranked: Vec<_> = self.counts.into_iter().collect();
        ranked.sort_by(|(_, (ca, oa)), (_, (cb, ob))| cb.cmp(ca).then(oa.cmp(ob)));
        ranked
            .into_iter()
            .take(limit)
            .map(|(item, (count, _))| (item, count))
            .collect()
    }
}

fn is_candidate_name(name: &str) -> bool {
    name.chars().count() >= MIN_NAME_LEN
        && !text::is_name_stop_word(name)
        && name.chars().any(char::is_lowercase)
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

pub(crate) fn detect_competitors(sources: &[WebSource], limit: usize) -> Vec<String> {
    let mut tally = Tally::default();
    for source in sources {
        let text = source.text();
        for found in CAPITALIZED_RUN.find_iter(&text) {
            let name = found.as_str().trim();
            if is_candidate_name(name) {
                tally.add(name);
            }
        }
    }
    tally.top(limit).into_iter().map(|(name, _)| name).collect()
}

pub(crate) fn extract_themes(sources: &[WebSource], limit: usize) -> Vec<ContentTheme> {
    let mut tally = Tally::default();
    for source in sources {
        let text = source.text().to_lowercase();
        for word in KEYWORD.find_iter(&text).map(|m| m.as_str()) {
            if !text::is_theme_stop_word(word) {
                tally.add(word);
            }
        }
    }

    let ranked = tally.top(limit);
    debug!("Top themes: {:?}", ranked);

    ranked
        .into_iter()
        .map(|(word, frequency)| {
            let scores: Vec<f64> = sources
                .iter()
                .filter(|s| !s.snippet.is_empty() && s.snippet.to_lowercase().contains(&word))
                .map(|s| text::sentiment(&s.snippet))
                .collect();
            ContentTheme {
                theme: text::capitalize(&word),
                frequency,
                sentiment: text::round_to(text::mean(&scores), 2),
                key_phrases: vec![word],
            }
        })
        .collect()
}

/// Texts of sources that mention `name`, case-insensitively
fn mentions(name: &str, sources: &[WebSource]) -> Vec<String> {
    let needle = name.to_lowercase();
    sources
        .iter()
        .map(WebSource::text)
        .filter(|text| text.to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Parameters;
    use uuid::Uuid;

    fn sources() -> Vec<WebSource> {
        vec![
            WebSource::new(
                "https://a.example",
                "HubSpot vs Salesforce for agents",
                "HubSpot is easy to use.",
            ),
            WebSource::new(
                "https://b.example",
                "Top picks: Pipedrive and HubSpot compared",
                "Pipedrive is affordable.",
            ),
            WebSource::new("https://c.example", "ZOHO review", "nothing here"),
        ]
    }

    fn ctx() -> StageContext {
        StageContext {
            run_id: Uuid::new_v4(),
            query: "crm".to_string(),
            parameters: Parameters::new(),
        }
    }

    #[test]
    fn test_detect_competitors_ranked() {
        let competitors = detect_competitors(&sources(), 10);
        assert_eq!(competitors, ["HubSpot", "Pipedrive", "Salesforce"]);
    }

    #[test]
    fn test_detect_competitors_limit() {
        assert_eq!(detect_competitors(&sources(), 1), ["HubSpot"]);
    }

    #[test]
    fn test_candidate_filters() {
        assert!(!is_candidate_name("ZOHO"));
        assert!(!is_candidate_name("Best"));
        assert!(!is_candidate_name("Kvx"));
        assert!(is_candidate_name("Zoho CRM"));
    }

    #[test]
    fn test_extract_themes() {
        let themes = extract_themes(&sources(), 5);
        assert_eq!(themes.len(), 5);
        assert_eq!(themes[0].theme, "Hubspot");
        assert_eq!(themes[0].frequency, 3);
        assert_eq!(themes[1].theme, "Pipedrive");
        assert_eq!(themes[1].key_phrases, ["pipedrive"]);
        assert!(themes[1].sentiment > 0.0);
        assert!(themes.iter().all(|t| t.theme != "Review"));
    }

    #[tokio::test]
    async fn test_extract_scores_attributes() {
        let gather = GatherOutput {
            sources: sources(),
            ..GatherOutput::default()
        };
        let output = HeuristicExtractor::default()
            .extract(&ctx(), Some(&gather))
            .await
            .unwrap();

        let hubspot = &output.competitor_attributes["HubSpot"];
        assert_eq!(hubspot.mention_count, 2);
        assert_eq!(hubspot.price_positioning, NEUTRAL_POSITION);
        assert_eq!(output.competitor_attributes["Salesforce"].mention_count, 1);
        assert_eq!(output.competitor_attributes.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_input_degrades_to_empty() {
        let output = HeuristicExtractor::default()
            .extract(&ctx(), None)
            .await
            .unwrap();
        assert!(output.competitors.is_empty());
        assert!(output.content_themes.is_empty());
    }
}
