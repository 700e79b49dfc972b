//! Document store boundary.
//!
//! The workflow only sees the typed results defined here; the HTTP details
//! live in [`confluence`].
pub mod confluence;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use confluence::ConfluenceStore;

/// Upper bound on candidates returned by one search.
pub const MAX_RESULTS: usize = 10;

/// Sentinel for a missing or unparseable last-modified time.
pub const UNKNOWN_TIMESTAMP: &str = "N/A";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A search candidate. Identity is the `(id, scope)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub scope: String,
    /// `YYYY-MM-DD HH:MM:SS` or [`UNKNOWN_TIMESTAMP`].
    pub last_modified: String,
}

impl SearchResult {
    pub fn last_modified_at(&self) -> Option<NaiveDateTime> {
        parse_display_timestamp(&self.last_modified)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub query: String,
    pub scope_description: String,
    pub matches: Vec<SearchResult>,
}

impl SearchOutcome {
    pub fn total(&self) -> usize {
        self.matches.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    pub title: String,
    /// Raw body in the store's native markup.
    pub content: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("authentication failed (HTTP 401): the API token is invalid or expired")]
    Unauthorized,
    #[error("authorization failed (HTTP 403): the user lacks site or search permissions")]
    Forbidden,
    #[error("document store returned HTTP {status}")]
    Status { status: u16 },
    #[error("document store call timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("could not reach the document store: {0}")]
    Transport(String),
    #[error("unexpected document store response: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => StoreError::Unauthorized,
            403 => StoreError::Forbidden,
            status => StoreError::Status { status },
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, StoreError::Unauthorized | StoreError::Forbidden)
    }
}

/// Search and fetch operations the workflow needs from a document store.
pub trait DocumentStore {
    /// Up to [`MAX_RESULTS`] pages in `scope` (or every scope) whose title or
    /// body contains `term`, case-insensitively.
    fn search(&self, term: &str, scope: Option<&str>) -> Result<SearchOutcome, StoreError>;

    fn fetch_page(&self, id: &str) -> Result<PageContent, StoreError>;
}

pub fn scope_description(scope: Option<&str>) -> String {
    match scope {
        Some(key) => format!("in Space: {key}"),
        None => "across ALL Spaces".to_string(),
    }
}

/// Case-insensitive containment in title or body. Surrounding double quotes
/// on the term are ignored.
pub fn matches_term(term: &str, title: &str, body: &str) -> bool {
    let needle = term.trim().trim_matches('"').to_lowercase();
    title.to_lowercase().contains(&needle) || body.to_lowercase().contains(&needle)
}

/// Format an RFC 3339 timestamp from the store for display and ranking.
pub fn format_last_modified(raw: Option<&str>) -> String {
    raw.and_then(|value| DateTime::parse_from_rfc3339(value.trim()).ok())
        .map(|parsed| parsed.naive_utc().format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| UNKNOWN_TIMESTAMP.to_string())
}

/// Parse a display timestamp; date-only values count as midnight.
pub fn parse_display_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value == UNKNOWN_TIMESTAMP {
        return None;
    }
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_match_ignores_case_and_quotes() {
        assert!(matches_term("\"Server Setup\"", "Linux server setup guide", ""));
        assert!(matches_term("vpn", "Remote access", "<p>Connect to the VPN first</p>"));
        assert!(!matches_term("vpn", "Remote access", "<p>Use the bastion</p>"));
    }

    #[test]
    fn last_modified_is_reformatted() {
        assert_eq!(
            format_last_modified(Some("2024-06-01T12:30:00.000Z")),
            "2024-06-01 12:30:00"
        );
        assert_eq!(
            format_last_modified(Some("2024-06-01T12:30:00+02:00")),
            "2024-06-01 10:30:00"
        );
    }

    #[test]
    fn unusable_last_modified_becomes_sentinel() {
        assert_eq!(format_last_modified(None), UNKNOWN_TIMESTAMP);
        assert_eq!(format_last_modified(Some("yesterday")), UNKNOWN_TIMESTAMP);
    }

    #[test]
    fn display_timestamps_parse_with_optional_time() {
        assert!(parse_display_timestamp("2024-01-01 08:00:00").is_some());
        assert!(parse_display_timestamp("2024-01-01").is_some());
        assert!(parse_display_timestamp(UNKNOWN_TIMESTAMP).is_none());
        assert!(parse_display_timestamp("01/02/2024").is_none());
    }

    #[test]
    fn auth_statuses_are_distinguished() {
        assert_eq!(StoreError::from_status(401), StoreError::Unauthorized);
        assert_eq!(StoreError::from_status(403), StoreError::Forbidden);
        assert_eq!(
            StoreError::from_status(500),
            StoreError::Status { status: 500 }
        );
        assert!(StoreError::Unauthorized.is_auth());
        assert!(!StoreError::Status { status: 404 }.is_auth());
        assert_ne!(
            StoreError::Unauthorized.to_string(),
            StoreError::Forbidden.to_string()
        );
    }

    #[test]
    fn scope_description_names_scope() {
        assert_eq!(scope_description(Some("IT")), "in Space: IT");
        assert_eq!(scope_description(None), "across ALL Spaces");
    }
}
