//! Candidate ranking.
//!
//! With several candidates the model names a winning page id on its first
//! line. Anything unusable (unknown id, failed call) falls back to the most
//! recently updated candidate; ranking never fails.
use crate::lm::{LanguageModel, ModelTier};
use crate::store::SearchResult;
use crate::util::fill_template;
use chrono::NaiveDateTime;

const RANK_CANDIDATES: &str = include_str!("../prompts/rank_candidates.md");

const NO_JUSTIFICATION: &str = "No detailed recommendation provided.";

/// How the winning candidate was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankSource {
    /// Only one candidate; no ranking call was made.
    Single,
    /// The model named a known candidate.
    Model,
    /// The model reply named an id outside the candidate set.
    FallbackInvalidId { returned: String },
    /// The ranking call itself failed.
    FallbackCallFailed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub page_id: String,
    pub justification: String,
    pub source: RankSource,
}

impl Recommendation {
    pub fn is_fallback(&self) -> bool {
        matches!(
            self.source,
            RankSource::FallbackInvalidId { .. } | RankSource::FallbackCallFailed { .. }
        )
    }
}

/// Pick the page to edit. `candidates` must be non-empty.
pub fn rank_candidates(
    model: &dyn LanguageModel,
    candidates: &[SearchResult],
    search_term: &str,
) -> Recommendation {
    if let [only] = candidates {
        return Recommendation {
            page_id: only.id.clone(),
            justification: format!("Found one match: {}.", only.title),
            source: RankSource::Single,
        };
    }

    let prompt = build_rank_prompt(candidates, search_term);
    match model.complete(ModelTier::Standard, &prompt) {
        Ok(completion) => {
            let (returned, justification) = split_rank_reply(&completion.text);
            if candidates.iter().any(|candidate| candidate.id == returned) {
                return Recommendation {
                    page_id: returned,
                    justification,
                    source: RankSource::Model,
                };
            }
            tracing::warn!(returned = %returned, "ranking named an unknown page id");
            fallback(candidates, RankSource::FallbackInvalidId { returned })
        }
        Err(err) => {
            tracing::warn!(error = %err, "ranking call failed");
            fallback(
                candidates,
                RankSource::FallbackCallFailed {
                    error: format!("{err:#}"),
                },
            )
        }
    }
}

/// The candidate with the latest parseable last-modified time. Unparseable
/// values rank lowest; ties keep the earliest candidate.
pub fn latest_updated(candidates: &[SearchResult]) -> Option<&SearchResult> {
    let mut best: Option<(&SearchResult, NaiveDateTime)> = None;
    for candidate in candidates {
        let stamp = candidate.last_modified_at().unwrap_or(NaiveDateTime::MIN);
        match best {
            Some((_, best_stamp)) if stamp <= best_stamp => {}
            _ => best = Some((candidate, stamp)),
        }
    }
    best.map(|(candidate, _)| candidate)
}

fn fallback(candidates: &[SearchResult], source: RankSource) -> Recommendation {
    let latest = latest_updated(candidates);
    let (page_id, title) = latest
        .map(|candidate| (candidate.id.clone(), candidate.title.as_str()))
        .unwrap_or_default();
    let reason = match &source {
        RankSource::FallbackInvalidId { returned } => {
            format!("Model recommended an invalid ID: '{returned}'.")
        }
        RankSource::FallbackCallFailed { error } => format!("Recommendation failed: {error}."),
        RankSource::Single | RankSource::Model => String::new(),
    };
    Recommendation {
        page_id,
        justification: format!("{reason} Defaulting to the latest updated page: {title}."),
        source,
    }
}

fn build_rank_prompt(candidates: &[SearchResult], search_term: &str) -> String {
    let page_list = candidates
        .iter()
        .enumerate()
        .map(|(idx, candidate)| {
            format!(
                "Page {}:\n  - ID: {}\n  - Title: '{}'\n  - Space: '{}'\n  - Last Updated: {}\n",
                idx + 1,
                candidate.id,
                candidate.title,
                candidate.scope,
                candidate.last_modified
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let count = candidates.len().to_string();
    fill_template(
        RANK_CANDIDATES,
        &[
            ("count", count.as_str()),
            ("search_term", search_term),
            ("page_list", page_list.as_str()),
        ],
    )
}

/// First line is the id, the remainder is the justification.
fn split_rank_reply(text: &str) -> (String, String) {
    let trimmed = text.trim();
    let (first, rest) = trimmed.split_once('\n').unwrap_or((trimmed, ""));
    let id = first.trim().trim_matches('`').trim().to_string();
    let rest = rest.trim();
    let justification = if rest.is_empty() {
        NO_JUSTIFICATION.to_string()
    } else {
        rest.to_string()
    };
    (id, justification)
}
