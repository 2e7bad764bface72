//! Text heuristics shared by the built-in stages
//!
//! Word lists and a small lexicon sentiment scorer. Scores follow the
//! compound convention: summed word valences normalized into `-1.0..=1.0`.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Capitalized word runs ("HubSpot", "Zoho CRM", "Follow Up Boss")
pub static CAPITALIZED_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z][a-zA-Z]*(?:\s+[A-Z][a-zA-Z]*)*\b").expect("valid regex")
});

/// Lowercase words of four letters or more
pub static KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z]{4,}\b").expect("valid regex"));

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z]+(?:'[a-z]+)?").expect("valid regex"));

/// Generic words that look like names when capitalized in titles
const NAME_STOP_WORDS: &[&str] = &[
    "best", "top", "free", "simple", "easy", "popular", "leading", "powerful", "essential",
    "ultimate", "complete", "perfect", "software", "tool", "tools", "platform", "solution",
    "solutions", "service", "services", "app", "apps", "system", "systems", "business", "small",
    "contact", "management", "customer", "crm", "marketing", "sales", "email", "campaign", "the",
    "and", "for", "with", "your", "more", "about", "this", "that", "from", "their", "they", "what",
    "when",
];

/// Function words and generic product vocabulary excluded from themes
const THEME_STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "and", "a", "an", "as", "are", "was", "were", "been", "be",
    "have", "has", "had", "do", "does", "did", "but", "if", "or", "because", "until", "while",
    "of", "for", "with", "about", "against", "between", "into", "through", "during", "before",
    "after", "above", "below", "from", "then", "once", "here", "there", "than", "that", "this",
    "these", "those", "also", "just", "only", "very", "best", "top", "free", "simple", "easy",
    "software", "tool", "tools", "platform", "solution", "service", "app", "system", "business",
    "company", "product", "features", "pricing", "review", "reviews", "what", "when", "where",
    "who", "how", "why", "can", "will", "should", "would", "could", "may", "might", "more",
    "most", "some", "any", "all", "each", "every", "their", "they", "them", "your", "you", "our",
    "we", "us",
];

static NAME_STOPS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| NAME_STOP_WORDS.iter().copied().collect());

static THEME_STOPS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| THEME_STOP_WORDS.iter().copied().collect());

pub fn is_name_stop_word(word: &str) -> bool {
    NAME_STOPS.contains(word.to_lowercase().as_str())
}

pub fn is_theme_stop_word(word: &str) -> bool {
    THEME_STOPS.contains(word)
}

// =============================================================================
// Sentiment
// =============================================================================

const POSITIVE: &[(&str, f64)] = &[
    ("good", 1.9),
    ("great", 3.1),
    ("excellent", 3.2),
    ("amazing", 2.8),
    ("awesome", 3.1),
    ("love", 3.2),
    ("loved", 2.9),
    ("like", 1.5),
    ("best", 3.2),
    ("better", 1.9),
    ("easy", 1.9),
    ("simple", 1.2),
    ("powerful", 1.8),
    ("intuitive", 1.8),
    ("reliable", 1.9),
    ("affordable", 1.6),
    ("helpful", 1.8),
    ("recommend", 1.5),
    ("recommended", 1.5),
    ("efficient", 1.8),
    ("fast", 1.2),
    ("flexible", 1.3),
    ("popular", 1.8),
    ("leading", 1.2),
    ("perfect", 2.7),
    ("success", 2.7),
    ("successful", 2.8),
    ("improve", 1.9),
    ("improved", 2.1),
    ("free", 1.4),
    ("top", 0.8),
    ("win", 2.8),
    ("happy", 2.7),
    ("useful", 1.9),
];

const NEGATIVE: &[(&str, f64)] = &[
    ("bad", -2.5),
    ("poor", -2.1),
    ("terrible", -2.1),
    ("awful", -2.0),
    ("hate", -2.7),
    ("worst", -3.1),
    ("worse", -2.1),
    ("expensive", -1.2),
    ("overpriced", -1.9),
    ("difficult", -1.5),
    ("hard", -0.4),
    ("complicated", -1.1),
    ("confusing", -1.3),
    ("slow", -1.1),
    ("buggy", -1.8),
    ("broken", -2.1),
    ("problem", -1.7),
    ("problems", -1.7),
    ("issue", -0.9),
    ("issues", -0.9),
    ("fail", -2.5),
    ("failed", -2.3),
    ("lack", -1.3),
    ("lacking", -1.3),
    ("limited", -0.9),
    ("frustrating", -2.2),
    ("annoying", -1.8),
    ("clunky", -1.5),
    ("scam", -2.6),
    ("waste", -1.8),
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "without", "isn't", "aren't", "don't", "doesn't", "didn't", "can't",
    "won't", "hardly",
];

/// Valence multiplier applied to a word that follows a negation
const NEGATION_SCALAR: f64 = -0.74;

/// Normalization constant for the compound score
const ALPHA: f64 = 15.0;

fn valence(word: &str) -> Option<f64> {
    POSITIVE
        .iter()
        .chain(NEGATIVE)
        .find(|(w, _)| *w == word)
        .map(|(_, v)| *v)
}

/// Compound sentiment of `text` in `-1.0..=1.0`; 0.0 when no lexicon word occurs
pub fn sentiment(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let words: Vec<&str> = WORD.find_iter(&lower).map(|m| m.as_str()).collect();

    let mut total = 0.0;
    for (i, word) in words.iter().enumerate() {
        let Some(mut score) = valence(word) else {
            continue;
        };
        let window = &words[i.saturating_sub(3)..i];
        if window.iter().any(|w| NEGATIONS.contains(w)) {
            score *= NEGATION_SCALAR;
        }
        total += score;
    }

    if total == 0.0 {
        return 0.0;
    }
    (total / (total * total + ALPHA).sqrt()).clamp(-1.0, 1.0)
}

/// Mean of `scores`, 0.0 when empty
pub fn mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

/// Round to `places` decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Uppercase the first character
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_polarity() {
        assert!(sentiment("Great CRM, easy to use and reliable") > 0.5);
        assert!(sentiment("Buggy, slow and overpriced") < -0.5);
        assert_eq!(sentiment("Pipeline tracking for agents"), 0.0);
    }

    #[test]
    fn test_sentiment_negation_flips() {
        assert!(sentiment("good") > 0.0);
        assert!(sentiment("not good") < 0.0);
        assert!(sentiment("never had a problem") > 0.0);
    }

    #[test]
    fn test_sentiment_is_bounded() {
        let gushing = "great ".repeat(200);
        let score = sentiment(&gushing);
        assert!(score <= 1.0 && score > 0.99);
    }

    #[test]
    fn test_capitalized_runs() {
        let names: Vec<&str> = CAPITALIZED_RUN
            .find_iter("Compare Follow Up Boss and kvCORE with HubSpot")
            .map(|m| m.as_str())
            .collect();
        assert_eq!(names, ["Compare Follow Up Boss", "HubSpot"]);
    }

    #[test]
    fn test_stop_words() {
        assert!(is_name_stop_word("Software"));
        assert!(!is_name_stop_word("HubSpot"));
        assert!(is_theme_stop_word("pricing"));
        assert!(!is_theme_stop_word("automation"));
    }

    #[test]
    fn test_helpers() {
        assert_eq!(round_to(0.456, 2), 0.46);
        assert_eq!(round_to(3.25, 1), 3.3);
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[1.0, 0.0]), 0.5);
        assert_eq!(capitalize("automation"), "Automation");
    }
}
