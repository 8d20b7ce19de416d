use std::collections::HashSet;

/// Candidates scoring at or above this are treated as the same suggestion.
pub const SIMILARITY_THRESHOLD: f64 = 0.7;

const EXACT_SCORE: f64 = 1.0;
const CONTAINMENT_SCORE: f64 = 0.8;

/// Words skipped when looking for the activity term that leads a title.
const FILLER_WORDS: &[&str] = &[
    "a", "an", "the", "to", "for", "of", "and", "some", "my", "your", "go", "do", "take", "have",
    "make", "get", "try", "quick", "short", "little",
];

/// Score how alike two suggestion texts are, in `[0, 1]`.
///
/// Exact matches score 1.0. Containment in either direction scores 0.8,
/// either of the whole normalized text or of the leading activity term
/// ("read", "walk", ...) as a word of the other text. Everything else is
/// the share of common tokens relative to the longer text.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let left = normalize(a);
    let right = normalize(b);

    if left.is_empty() || right.is_empty() {
        return if left == right { EXACT_SCORE } else { 0.0 };
    }
    if left == right {
        return EXACT_SCORE;
    }
    if left.contains(&right) || right.contains(&left) {
        return CONTAINMENT_SCORE;
    }

    let left_tokens: Vec<&str> = left.split_whitespace().collect();
    let right_tokens: Vec<&str> = right.split_whitespace().collect();

    if shares_activity_term(&left_tokens, &right_tokens)
        || shares_activity_term(&right_tokens, &left_tokens)
    {
        return CONTAINMENT_SCORE;
    }

    let left_set: HashSet<&str> = left_tokens.iter().copied().collect();
    let right_set: HashSet<&str> = right_tokens.iter().copied().collect();
    let shared = left_set.intersection(&right_set).count();
    let longest = left_tokens.len().max(right_tokens.len());

    shared as f64 / longest as f64
}

pub fn is_too_similar(candidate: &str, rejected: &str) -> bool {
    text_similarity(candidate, rejected) >= SIMILARITY_THRESHOLD
}

fn normalize(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch.is_whitespace() {
                ch
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn activity_term<'a>(tokens: &[&'a str]) -> Option<&'a str> {
    tokens
        .iter()
        .copied()
        .find(|token| !FILLER_WORDS.contains(token) && !token.chars().all(|ch| ch.is_ascii_digit()))
}

/// The first content word need not be a verb: "Mom's birthday card" leads
/// with "mom" and so matches "Call mom".
fn shares_activity_term(source: &[&str], other: &[&str]) -> bool {
    match activity_term(source) {
        Some(term) => other.contains(&term),
        None => false,
    }
}
