//! Heuristic response quality scoring
//!
//! [`assess`] is a pure function over the response text (and optionally the
//! prompt). It combines weighted components into a score in `[0, 1]`:
//!
//! | component | weight |
//! |---|---|
//! | length relative to `min_tokens` | 0.45 |
//! | lexical relevance to the prompt | 0.15 |
//! | structure (headings, lists, code fences) | 0.10 |
//! | no refusal or apology phrasing | 0.10 |
//! | valid JSON, only when JSON is expected | 0.05 |
//!
//! Components that do not apply (no prompt, no JSON expected) are left out
//! and the remaining weights are rescaled. Small adjustments for repetition,
//! vocabulary variety, code/prose balance, and requested list length are
//! applied last.

#![allow(clippy::must_use_candidate, clippy::cast_precision_loss)]

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

const LENGTH_WEIGHT: f64 = 0.45;
const RELEVANCE_WEIGHT: f64 = 0.15;
const STRUCTURE_WEIGHT: f64 = 0.10;
const REFUSAL_WEIGHT: f64 = 0.10;
const JSON_WEIGHT: f64 = 0.05;

/// Jaccard overlap at which relevance saturates
const RELEVANCE_SATURATION: f64 = 0.25;
const INVALID_JSON_PENALTY: f64 = 0.10;
/// Responses shorter than this skip the vocabulary adjustment
const MIN_WORDS_FOR_VARIETY: usize = 20;

static REFUSAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(i'm sorry|i am sorry|i apologi[sz]e|my apologies|i can't help|i cannot help|i can't assist|i cannot assist|i'm unable to|i am unable to|i'm not able to|as an ai\b)",
    )
    .expect("must be valid regex")
});

static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s{0,3}#{1,6}\s+\S").expect("must be valid regex"));

static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[-*+]\s+\S").expect("must be valid regex"));

static NUMBERED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\d+[.)]\s+\S").expect("must be valid regex"));

/// "5 bullet points", "3 steps", "top 10 reasons", "list of 4 items"
static REQUESTED_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s+(?:\w+\s+)?(?:points|items|steps|ways|reasons|examples|tips|ideas|bullets|things|options)\b")
        .expect("must be valid regex")
});

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z0-9][a-z0-9']*").expect("must be valid regex"));

const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been", "but", "by", "can",
    "could", "did", "do", "does", "for", "from", "had", "has", "have", "he", "her", "his", "how", "i", "if", "in",
    "into", "is", "it", "its", "just", "me", "more", "my", "no", "not", "of", "on", "or", "our", "out", "please", "she",
    "so", "some", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this", "to", "up", "us",
    "was", "we", "were", "what", "when", "which", "who", "why", "will", "with", "would", "you", "your",
];

/// Score plus the signals it was derived from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityAssessment {
    /// Overall quality in `[0, 1]`
    pub score: f64,
    pub signals: QualitySignals,
}

/// Individual quality observations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualitySignals {
    /// Whitespace-separated words in the response
    pub word_count: usize,
    /// Length adequacy in `[0, 1]`
    pub length: f64,
    /// Prompt relevance in `[0, 1]`; absent without a prompt
    pub relevance: Option<f64>,
    /// Structural cues in `[0, 1]`
    pub structure: f64,
    /// Whether refusal or apology phrasing was found
    pub refusal: bool,
    /// JSON validity; absent when JSON was not expected
    pub json_valid: Option<bool>,
    /// Share of non-empty lines that repeat an earlier line
    pub repetition_ratio: f64,
    /// Distinct words over total words
    pub type_token_ratio: f64,
    /// Whether the response contains fenced code
    pub has_code: bool,
    /// Requested and produced numbered list length, when the prompt asked for one
    pub list_length: Option<ListLength>,
    /// Sum of the post-weighting adjustments
    pub adjustment: f64,
}

/// Numbered list length requested by the prompt versus produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListLength {
    pub requested: usize,
    pub produced: usize,
}

/// Assess a response
///
/// Deterministic and side-effect free.
pub fn assess(response: &str, prompt: Option<&str>, min_tokens: usize, expect_json: bool) -> QualityAssessment {
    let word_count = response.split_whitespace().count();
    let words = words(response);

    let length = if min_tokens == 0 {
        1.0
    } else {
        (word_count as f64 / min_tokens as f64).min(1.0)
    };
    let relevance = prompt.and_then(|prompt| relevance(prompt, &words));
    let structure = structure(response);
    let refusal = REFUSAL.is_match(&response.replace('\u{2019}', "'"));
    let json_valid = expect_json.then(|| is_json(response));

    let mut weighted = LENGTH_WEIGHT * length + STRUCTURE_WEIGHT * structure;
    let mut total_weight = LENGTH_WEIGHT + STRUCTURE_WEIGHT + REFUSAL_WEIGHT;
    if !refusal {
        weighted += REFUSAL_WEIGHT;
    }
    if let Some(relevance) = relevance {
        weighted += RELEVANCE_WEIGHT * relevance;
        total_weight += RELEVANCE_WEIGHT;
    }
    if let Some(valid) = json_valid {
        total_weight += JSON_WEIGHT;
        if valid {
            weighted += JSON_WEIGHT;
        }
    }

    let repetition_ratio = repetition_ratio(response);
    let type_token_ratio = if words.is_empty() {
        0.0
    } else {
        words.iter().collect::<HashSet<_>>().len() as f64 / words.len() as f64
    };
    let has_code = response.lines().any(|line| line.trim_start().starts_with("```"));
    let list_length = prompt.and_then(|prompt| list_length(prompt, response));

    let mut adjustment = 0.0;
    if json_valid == Some(false) {
        adjustment -= INVALID_JSON_PENALTY;
    }
    if repetition_ratio > 0.2 {
        adjustment -= 0.15 * repetition_ratio;
    }
    if words.len() >= MIN_WORDS_FOR_VARIETY {
        if type_token_ratio < 0.3 {
            adjustment -= 0.05;
        } else if type_token_ratio > 0.6 {
            adjustment += 0.02;
        }
    }
    if has_code {
        adjustment += code_balance(response);
    }
    if let Some(list) = list_length {
        adjustment += if list.produced == list.requested { 0.05 } else { -0.05 };
    }

    let score = (weighted / total_weight + adjustment).clamp(0.0, 1.0);

    QualityAssessment {
        score,
        signals: QualitySignals {
            word_count,
            length,
            relevance,
            structure,
            refusal,
            json_valid,
            repetition_ratio,
            type_token_ratio,
            has_code,
            list_length,
            adjustment,
        },
    }
}

fn words(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD.find_iter(&lower).map(|m| m.as_str().to_owned()).collect()
}

fn content_words(words: &[String]) -> HashSet<&str> {
    words
        .iter()
        .map(String::as_str)
        .filter(|w| w.len() > 1 && !STOPWORDS.contains(w))
        .collect()
}

/// Jaccard overlap of content words, scaled so 25% overlap counts as fully relevant
fn relevance(prompt: &str, response_words: &[String]) -> Option<f64> {
    let prompt_words = words(prompt);
    let prompt_set = content_words(&prompt_words);
    if prompt_set.is_empty() {
        return None;
    }
    let response_set = content_words(response_words);

    let intersection = prompt_set.intersection(&response_set).count();
    let union = prompt_set.union(&response_set).count();
    let jaccard = intersection as f64 / union as f64;

    Some((jaccard / RELEVANCE_SATURATION).min(1.0))
}

fn structure(response: &str) -> f64 {
    let headings = response.lines().filter(|line| HEADING.is_match(line)).count();
    let has_list = response.lines().any(|line| BULLET.is_match(line) || NUMBERED.is_match(line));
    let has_fence = response.lines().any(|line| line.trim_start().starts_with("```"));

    let mut score = (0.5 * headings as f64).min(1.0);
    if has_list {
        score += 0.5;
    }
    if has_fence {
        score += 0.5;
    }
    score.min(1.0)
}

fn is_json(response: &str) -> bool {
    let trimmed = response.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str::<serde_json::Value>(body.trim()).is_ok()
}

fn repetition_ratio(response: &str) -> f64 {
    let lines: Vec<&str> = response.lines().map(str::trim).filter(|line| !line.is_empty()).collect();
    if lines.len() < 2 {
        return 0.0;
    }
    let unique = lines.iter().collect::<HashSet<_>>().len();
    1.0 - unique as f64 / lines.len() as f64
}

/// Reward code that comes with explanation, penalize bare code dumps
fn code_balance(response: &str) -> f64 {
    let mut in_fence = false;
    let mut prose_words = 0;
    let mut code_lines = 0;

    for line in response.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            code_lines += 1;
        } else {
            prose_words += line.split_whitespace().count();
        }
    }

    if code_lines == 0 {
        return 0.0;
    }
    if prose_words >= 20 {
        0.02
    } else if prose_words < 5 {
        -0.03
    } else {
        0.0
    }
}

fn list_length(prompt: &str, response: &str) -> Option<ListLength> {
    let requested = REQUESTED_COUNT.captures(prompt)?.get(1)?.as_str().parse().ok()?;
    if requested == 0 {
        return None;
    }
    let produced = response.lines().filter(|line| NUMBERED.is_match(line)).count();
    Some(ListLength { requested, produced })
}
