//! Free-text query normalization.
//!
//! Turns "find documentation about server setup in space IT" into the search
//! phrase `server setup` plus the scope `IT`.
use regex::Regex;
use thiserror::Error;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "for", "about", "and", "or", "in", "on", "with", "is", "are", "was", "were",
    "of", "to", "from", "can", "should", "i", "my", "find", "show", "search", "documentation",
    "notes", "tell", "need", "looking", "me", "you", "give",
];

/// Tokens this short never survive filtering.
const MIN_TOKEN_CHARS: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("enter a meaningful search term")]
pub struct EmptyQuery;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    pub term: String,
    pub scope: Option<String>,
}

/// Normalize raw user text. A non-empty `scope_override` replaces any scope
/// found in the text.
pub fn normalize_query(
    raw: &str,
    scope_override: Option<&str>,
) -> Result<NormalizedQuery, EmptyQuery> {
    let scope_pattern = Regex::new(r"(?i)\bin\s+(?:space|scope)\s+([A-Z0-9]{2,10})\b")
        .expect("regex for scope token");
    let extracted = scope_pattern
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_uppercase());
    let phrase = scope_pattern.replace_all(raw, "");
    let phrase = phrase.trim();

    let punctuation = Regex::new(r"[^\w\s]").expect("regex for punctuation");
    let lowered = phrase.to_lowercase();
    let cleaned = punctuation.replace_all(&lowered, "");
    let kept: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|word| !STOP_WORDS.contains(word) && word.chars().count() >= MIN_TOKEN_CHARS)
        .collect();

    let term = if kept.is_empty() {
        phrase.to_string()
    } else {
        kept.join(" ")
    };
    if term.is_empty() {
        return Err(EmptyQuery);
    }

    let scope = scope_override
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_uppercase)
        .or(extracted);
    Ok(NormalizedQuery { term, scope })
}
