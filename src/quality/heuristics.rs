//! Deterministic scoring heuristics used where no model is consulted.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w{3,}\b").expect("valid token regex"));

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(20[0-3][0-9])\b").expect("valid year regex"));

const STOPWORDS: &[&str] = &[
    "the", "and", "but", "for", "with", "from", "was", "are", "were", "been", "being", "have",
    "has", "had", "does", "did", "will", "would", "should", "could", "may", "might", "must",
    "can", "this", "that", "these", "those", "into", "about", "its", "our", "their",
];

fn tokenize(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Jaccard overlap between the topic and a result's title and snippet,
/// scaled to `[0, 10]` and rounded to one decimal. Returns 5.0 when either
/// side has no usable tokens.
pub fn quick_relevance(topic: &str, title: &str, snippet: &str) -> f32 {
    let topic_tokens = tokenize(topic);
    let content_tokens = tokenize(&format!("{} {}", title, snippet));

    if topic_tokens.is_empty() || content_tokens.is_empty() {
        return 5.0;
    }

    let intersection = topic_tokens.intersection(&content_tokens).count();
    let union = topic_tokens.union(&content_tokens).count();
    if union == 0 {
        return 5.0;
    }

    let jaccard = intersection as f32 / union as f32;
    round1((jaccard * 25.0).clamp(0.0, 10.0))
}

/// Currency from the most recent year (2000-2039) mentioned in the title or
/// snippet. Returns 5.0 when no year is found.
pub fn estimate_currency(title: &str, snippet: &str, current_year: i32) -> f32 {
    let text = format!("{} {}", title, snippet);
    let newest = YEAR_RE
        .captures_iter(&text)
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse::<i32>().ok()))
        .max();

    let Some(year) = newest else {
        return 5.0;
    };

    match current_year - year {
        age if age <= 1 => 10.0,
        2 => 9.0,
        3 => 8.0,
        4 | 5 => 7.0,
        age if age <= 10 => 6.0,
        age => round1((10.0 - (age - 10) as f32 * 0.3).max(3.0)),
    }
}

pub(crate) fn round1(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
