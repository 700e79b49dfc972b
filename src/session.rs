//! Session workflow controller.
//!
//! The workflow is a linear state machine:
//!
//! ```text
//! idle -> searching -> choose_page -> choose_action -> generating -> review
//!   ^__________________________________________________________________|
//! ```
//!
//! Every user action maps to one transition on [`Controller`], which takes
//! the session by mutable reference. Fields in [`SessionState`] accumulate as
//! the workflow advances and are cleared together on a reset; nothing is
//! shared between sessions.
mod history;

pub use history::{SearchHistory, HISTORY_LIMIT};

use crate::lm::LanguageModel;
use crate::proposal::{generate_proposal, ActionRequest, MissingCustomNotes, ProposalInput};
use crate::query::{normalize_query, EmptyQuery, NormalizedQuery};
use crate::rank::{rank_candidates, Recommendation};
use crate::review::{review_view, ReviewView};
use crate::store::{DocumentStore, SearchResult, StoreError};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Step {
    #[default]
    Idle,
    Searching,
    ChoosePage,
    ChooseAction,
    Generating,
    Review,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Idle => "idle",
            Step::Searching => "searching",
            Step::ChoosePage => "choose_page",
            Step::ChooseAction => "choose_action",
            Step::Generating => "generating",
            Step::Review => "review",
        };
        f.write_str(name)
    }
}

/// Workflow record for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub step: Step,
    pub search_term: Option<String>,
    pub scope: Option<String>,
    pub scope_description: Option<String>,
    pub matches: Vec<SearchResult>,
    /// Ranking result, computed once per page-choice visit.
    pub recommendation: Option<Recommendation>,
    pub selected: Option<SearchResult>,
    pub request: Option<ActionRequest>,
    pub page_title: Option<String>,
    pub raw_content: Option<String>,
    pub proposed_content: Option<String>,
    /// Set when content retrieval failed; only a new search recovers.
    pub fetch_failure: Option<String>,
    /// Prompt plus completion tokens across the session; survives resets.
    pub cumulative_tokens: u64,
}

impl SessionState {
    /// Clear every workflow field and return to idle.
    pub fn reset(&mut self) {
        *self = SessionState {
            cumulative_tokens: self.cumulative_tokens,
            ..SessionState::default()
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub state: SessionState,
    pub history: SearchHistory,
}

impl Session {
    pub fn step(&self) -> Step {
        self.state.step
    }

    /// Wipe state, history, and the token total.
    pub fn clear_all(&mut self) {
        *self = Session::default();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStatus {
    Candidates { count: usize },
    NoMatches { scope_description: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationReport {
    pub failed: bool,
    pub tokens_used: u64,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    EmptyQuery(#[from] EmptyQuery),
    #[error(transparent)]
    MissingCustomNotes(#[from] MissingCustomNotes),
    #[error("{action} is not available in the {step} step")]
    InvalidStep { action: &'static str, step: Step },
    #[error("content retrieval failed; start a new search to continue")]
    Halted,
    #[error("no search history entry {0}")]
    UnknownHistoryEntry(usize),
    #[error("recommended page {0} is not among the candidates")]
    UnknownCandidate(String),
    #[error("search error: {0}")]
    Search(#[source] StoreError),
    #[error("failed to retrieve content for ID {id}: {source}")]
    Fetch {
        id: String,
        #[source]
        source: StoreError,
    },
}

impl SessionError {
    /// Input problems the user can fix in place.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SessionError::EmptyQuery(_) | SessionError::MissingCustomNotes(_)
        )
    }
}

/// Drives a [`Session`] through the workflow using the two collaborators.
pub struct Controller<'a> {
    store: &'a dyn DocumentStore,
    model: &'a dyn LanguageModel,
}

impl<'a> Controller<'a> {
    pub fn new(store: &'a dyn DocumentStore, model: &'a dyn LanguageModel) -> Self {
        Self { store, model }
    }

    /// Normalize and run a new search. Available from any step; an empty
    /// query leaves the session untouched.
    pub fn submit_query(
        &self,
        session: &mut Session,
        raw: &str,
        scope_override: Option<&str>,
    ) -> Result<SearchStatus, SessionError> {
        let query = normalize_query(raw, scope_override)?;
        session.history.record(raw.trim());
        self.run_search(session, query)
    }

    /// Re-submit a history entry (newest first) with cleared downstream state.
    pub fn rerun(
        &self,
        session: &mut Session,
        index: usize,
        scope_override: Option<&str>,
    ) -> Result<SearchStatus, SessionError> {
        let raw = session
            .history
            .get(index)
            .map(str::to_string)
            .ok_or(SessionError::UnknownHistoryEntry(index))?;
        session.state.reset();
        let query = normalize_query(&raw, scope_override)?;
        self.run_search(session, query)
    }

    fn run_search(
        &self,
        session: &mut Session,
        query: NormalizedQuery,
    ) -> Result<SearchStatus, SessionError> {
        let state = &mut session.state;
        state.reset();
        state.step = Step::Searching;
        tracing::debug!(term = %query.term, scope = ?query.scope, "search submitted");

        let outcome = match self.store.search(&query.term, query.scope.as_deref()) {
            Ok(outcome) => outcome,
            Err(err) => {
                state.reset();
                return Err(SessionError::Search(err));
            }
        };
        if outcome.matches.is_empty() {
            state.reset();
            return Ok(SearchStatus::NoMatches {
                scope_description: outcome.scope_description,
            });
        }

        let count = outcome.total();
        state.search_term = Some(query.term);
        state.scope = query.scope;
        state.scope_description = Some(outcome.scope_description);
        state.matches = outcome.matches;
        state.step = Step::ChoosePage;
        Ok(SearchStatus::Candidates { count })
    }

    /// The ranked pick for the current candidates, computed on first use.
    pub fn recommendation<'s>(
        &self,
        session: &'s mut Session,
    ) -> Result<&'s Recommendation, SessionError> {
        let state = &mut session.state;
        require_step(state, Step::ChoosePage, "recommendation")?;
        let term = state.search_term.as_deref().unwrap_or_default();
        let model = self.model;
        let matches = &state.matches;
        Ok(state
            .recommendation
            .get_or_insert_with(|| rank_candidates(model, matches, term)))
    }

    /// Accept the recommended page and move on to choosing an action.
    pub fn proceed(&self, session: &mut Session) -> Result<SearchResult, SessionError> {
        let page_id = self.recommendation(session)?.page_id.clone();
        let state = &mut session.state;
        let chosen = state
            .matches
            .iter()
            .find(|candidate| candidate.id == page_id)
            .cloned()
            .ok_or(SessionError::UnknownCandidate(page_id))?;
        state.selected = Some(chosen.clone());
        state.step = Step::ChooseAction;
        Ok(chosen)
    }

    /// Validate the action choice and fetch the page body.
    pub fn confirm_action(
        &self,
        session: &mut Session,
        request: ActionRequest,
    ) -> Result<(), SessionError> {
        let state = &mut session.state;
        require_step(state, Step::ChooseAction, "confirm action")?;
        if state.fetch_failure.is_some() {
            return Err(SessionError::Halted);
        }
        let request = request.validated()?;
        let id = state
            .selected
            .as_ref()
            .map(|page| page.id.clone())
            .ok_or(SessionError::InvalidStep {
                action: "confirm action",
                step: state.step,
            })?;

        match self.store.fetch_page(&id) {
            Ok(page) => {
                state.request = Some(request);
                state.page_title = Some(page.title);
                state.raw_content = Some(page.content);
                state.step = Step::Generating;
                Ok(())
            }
            Err(source) => {
                state.fetch_failure = Some(source.to_string());
                Err(SessionError::Fetch { id, source })
            }
        }
    }

    /// Generate the proposal. Always lands in review; failures become the
    /// proposal text.
    pub fn generate(&self, session: &mut Session) -> Result<GenerationReport, SessionError> {
        let state = &mut session.state;
        require_step(state, Step::Generating, "generate")?;
        let (Some(request), Some(raw_content)) = (&state.request, &state.raw_content) else {
            return Err(SessionError::InvalidStep {
                action: "generate",
                step: state.step,
            });
        };
        let page_title = state
            .page_title
            .as_deref()
            .or(state.selected.as_ref().map(|page| page.title.as_str()))
            .unwrap_or_default();
        let input = ProposalInput {
            page_title,
            page_content: raw_content,
            search_term: state.search_term.as_deref().unwrap_or_default(),
            request,
        };
        let proposal = generate_proposal(self.model, &input);

        let tokens_used = proposal.usage.map(|usage| usage.total()).unwrap_or(0);
        state.cumulative_tokens += tokens_used;
        state.proposed_content = Some(proposal.text);
        state.step = Step::Review;
        Ok(GenerationReport {
            failed: proposal.failed,
            tokens_used,
        })
    }

    /// Display form of the proposal under review.
    pub fn review(&self, session: &Session) -> Result<ReviewView, SessionError> {
        let state = &session.state;
        require_step(state, Step::Review, "review")?;
        let format = state
            .request
            .as_ref()
            .map(|request| request.output_format)
            .unwrap_or_default();
        Ok(review_view(
            state.proposed_content.as_deref().unwrap_or_default(),
            format,
        ))
    }

    /// End the cycle, handing back the text to copy. Nothing is written to
    /// the store.
    pub fn finalize(&self, session: &mut Session) -> Result<String, SessionError> {
        let view = self.review(session)?;
        let raw = session.state.proposed_content.clone().unwrap_or_default();
        let text = view.copy_text(&raw).to_string();
        session.state.reset();
        Ok(text)
    }

    pub fn discard(&self, session: &mut Session) -> Result<(), SessionError> {
        require_step(&session.state, Step::Review, "discard")?;
        session.state.reset();
        Ok(())
    }

    /// Abandon the current cycle from any step.
    pub fn abandon(&self, session: &mut Session) {
        session.state.reset();
    }
}

fn require_step(
    state: &SessionState,
    expected: Step,
    action: &'static str,
) -> Result<(), SessionError> {
    if state.step == expected {
        Ok(())
    } else {
        Err(SessionError::InvalidStep {
            action,
            step: state.step,
        })
    }
}
