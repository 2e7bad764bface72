use console::style;
use std::fmt::Write;
use std::str::FromStr;

use crate::cache::CacheStats;
use crate::pipeline::{FlagKind, Priority, Report, RunStatus};
use crate::sources::SourceKind;
use crate::types::{LensError, Result, ResultExt};

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Report Rendering
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
    Yaml,
}

impl FromStr for ReportFormat {
    type Err = LensError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(LensError::Config(format!(
                "Invalid format '{}'. Valid values: text, json, yaml",
                other
            ))),
        }
    }
}

impl ReportFormat {
    pub fn render(self, report: &Report) -> Result<String> {
        match self {
            Self::Text => Ok(render_report(report)),
            Self::Json => Ok(serde_json::to_string_pretty(report)?),
            Self::Yaml => serde_yaml::to_string(report).with_context("Failed to render YAML report"),
        }
    }
}

fn status_label(status: RunStatus) -> String {
    match status {
        RunStatus::Completed => style("completed").green().to_string(),
        RunStatus::Degraded => style("degraded").yellow().to_string(),
        RunStatus::Incomplete => style("incomplete").red().to_string(),
    }
}

fn flag_marker(kind: FlagKind) -> String {
    match kind {
        FlagKind::Error => style("✗").red().to_string(),
        FlagKind::Warning => style("⚠").yellow().to_string(),
        FlagKind::Info => style("ℹ").blue().to_string(),
    }
}

fn priority_label(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "high",
        Priority::Medium => "medium",
        Priority::Low => "low",
    }
}

fn source_label(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Web => "web",
        SourceKind::Trends => "trends",
        SourceKind::Reddit => "reddit",
    }
}

/// Human-readable report for terminal output
pub fn render_report(report: &Report) -> String {
    let meta = &report.report_metadata;
    let insights = &report.validated_insights;
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "{}", style("Market Research Report").bold().underlined());
    let _ = writeln!(out, "  Query:       {}", meta.query);
    let _ = writeln!(out, "  Run:         {}", meta.run_id);
    let _ = writeln!(out, "  Status:      {}", status_label(meta.status));
    let _ = writeln!(out, "  Confidence:  {:.0}%", meta.confidence_score * 100.0);
    let _ = writeln!(out, "  Sources:     {}", meta.total_sources);
    let _ = writeln!(out, "  API calls:   {}", meta.api_calls);
    let _ = writeln!(out, "  Duration:    {:.2}s", meta.processing_time_seconds);

    section(&mut out, "Competitors");
    if insights.competitors.is_empty() {
        let _ = writeln!(out, "  (none detected)");
    }
    for name in &insights.competitors {
        match insights.positioning_map.companies.get(name) {
            Some(position) => {
                let _ = writeln!(out, "  - {} ({:.1}, {:.1})", name, position.x, position.y);
            }
            None => {
                let _ = writeln!(out, "  - {}", name);
            }
        }
    }

    if !insights.content_themes.is_empty() {
        section(&mut out, "Content Themes");
        for theme in &insights.content_themes {
            let _ = writeln!(
                out,
                "  - {} (mentions: {}, sentiment: {:+.2})",
                theme.theme, theme.frequency, theme.sentiment
            );
        }
    }

    if !insights.content_recommendations.is_empty() {
        section(&mut out, "Content Recommendations");
        for rec in &insights.content_recommendations {
            let _ = writeln!(
                out,
                "  - [{}] {} as {} (score {:.1})",
                priority_label(rec.priority),
                rec.topic,
                rec.recommended_format,
                rec.opportunity_score
            );
        }
    }

    if !insights.strategic_recommendations.is_empty() {
        section(&mut out, "Strategic Recommendations");
        for (i, move_) in insights.strategic_recommendations.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, move_);
        }
    }

    if !report.quality_flags.is_empty() {
        section(&mut out, "Quality Flags");
        for flag in &report.quality_flags {
            let _ = writeln!(
                out,
                "  {} [{}] {}",
                flag_marker(flag.kind),
                flag.stage,
                flag.message
            );
        }
    }

    let attribution = &report.source_attribution;
    section(&mut out, "Sources");
    let breakdown: Vec<String> = attribution
        .source_breakdown
        .iter()
        .map(|(kind, count)| format!("{}: {}", source_label(*kind), count))
        .collect();
    let _ = writeln!(out, "  Breakdown:   {}", breakdown.join(", "));
    let _ = writeln!(out, "  Date range:  {}", attribution.date_range);

    out
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n{}", style(title).bold());
}

/// Cache statistics for terminal output
pub fn render_cache_stats(stats: &CacheStats) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", style("Cache Statistics").bold().underlined());
    let _ = writeln!(out, "  Valid entries:   {}", stats.total_entries_valid);
    let _ = writeln!(out, "  Expired entries: {}", stats.expired_entries());
    let _ = writeln!(out, "  Size:            {} bytes", stats.total_size_bytes);
    let _ = writeln!(out, "  Hit rate:        {:.1}%", stats.hit_rate * 100.0);

    if !stats.by_type.is_empty() {
        section(&mut out, "By Type");
        for (cache_type, type_stats) in &stats.by_type {
            let _ = writeln!(
                out,
                "  {:<20} {:>6} entries {:>8} hits",
                cache_type.as_str(),
                type_stats.count,
                type_stats.hits
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheType, TypeStats};
    use crate::pipeline::{PipelineState, QualityFlag};
    use std::collections::BTreeMap;

    fn plain(s: &str) -> String {
        console::strip_ansi_codes(s).into_owned()
    }

    fn sample_report() -> Report {
        let state = PipelineState::new("crm for agents".to_string(), BTreeMap::new());
        let mut report = Report::fallback(&state);
        report.validated_insights.competitors = vec!["HubSpot".to_string()];
        report.validated_insights.strategic_recommendations =
            vec!["Own the mid-market".to_string()];
        report
            .quality_flags
            .push(QualityFlag::warning("Low source count", "research"));
        report
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("yml".parse::<ReportFormat>().unwrap(), ReportFormat::Yaml);
        assert!("xml".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_render_text_report() {
        let text = plain(&render_report(&sample_report()));
        assert!(text.contains("Query:       crm for agents"));
        assert!(text.contains("Status:      incomplete"));
        assert!(text.contains("- HubSpot"));
        assert!(text.contains("1. Own the mid-market"));
        assert!(text.contains("[research] Low source count"));
        assert!(text.contains("Date range:  Unknown"));
    }

    #[test]
    fn test_render_json_keeps_schema() {
        let json = ReportFormat::Json.render(&sample_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["report_metadata"]["status"], "incomplete");
        assert_eq!(value["quality_flags"][1]["type"], "warning");
    }

    #[test]
    fn test_render_yaml() {
        let yaml = ReportFormat::Yaml.render(&sample_report()).unwrap();
        assert!(yaml.contains("report_metadata:"));
        assert!(yaml.contains("query: crm for agents"));
    }

    #[test]
    fn test_render_cache_stats() {
        let stats = CacheStats {
            total_entries_valid: 3,
            total_entries_all: 5,
            hit_rate: 0.5,
            by_type: BTreeMap::from([(CacheType::WebSearch, TypeStats { count: 3, hits: 7 })]),
            ..CacheStats::default()
        };
        let text = plain(&render_cache_stats(&stats));
        assert!(text.contains("Valid entries:   3"));
        assert!(text.contains("Expired entries: 2"));
        assert!(text.contains("Hit rate:        50.0%"));
        assert!(text.contains("web_search"));
    }
}
