//! Blocking REST client for a Confluence-style document store.
//!
//! Search pulls page listings per space and filters locally on title and
//! body, which sidesteps the store's query-language parser. Every operation
//! shares one wall-time ceiling: each request only gets the time left before
//! the deadline, and running out is a communication failure, never a retry.
use super::{
    format_last_modified, matches_term, scope_description, DocumentStore, PageContent,
    SearchOutcome, SearchResult, StoreError, MAX_RESULTS,
};
use crate::config::StoreSettings;
use crate::util::truncate_string;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};

const SPACE_LIMIT: &str = "500";
const PAGE_LIMIT: &str = "1000";
const PROBE_SNIPPET_BYTES: usize = 200;
const MISSING_CONTENT: &str = "Content not found.";

pub struct ConfluenceStore {
    agent: ureq::Agent,
    base_url: String,
    authorization: String,
    timeout: Duration,
}

/// Result of the credential probe behind `steward check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeReport {
    Connected { total_results: Option<u64> },
    Rejected { error: StoreError, body_snippet: Option<String> },
}

#[derive(Deserialize)]
struct SpaceList {
    #[serde(default)]
    results: Vec<SpaceEntry>,
}

#[derive(Deserialize)]
struct SpaceEntry {
    key: String,
}

#[derive(Deserialize)]
struct PageList {
    #[serde(default)]
    results: Vec<PageEntry>,
}

#[derive(Deserialize)]
struct PageEntry {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    history: Option<PageHistory>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageHistory {
    #[serde(default)]
    last_updated: Option<PageVersion>,
}

#[derive(Deserialize)]
struct PageVersion {
    #[serde(default)]
    when: Option<String>,
}

#[derive(Deserialize)]
struct PageDetail {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<PageBody>,
}

#[derive(Deserialize)]
struct PageBody {
    #[serde(default)]
    storage: Option<StorageBody>,
}

#[derive(Deserialize)]
struct StorageBody {
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchProbe {
    #[serde(default)]
    total_size: Option<u64>,
}

impl PageDetail {
    fn storage_value(self) -> Option<String> {
        self.body.and_then(|body| body.storage).map(|s| s.value)
    }
}

impl ConfluenceStore {
    pub fn new(settings: &StoreSettings) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(settings.timeout))
            .build()
            .into();
        let credentials = format!("{}:{}", settings.username, settings.api_token);
        Self {
            agent,
            base_url: settings.base_url.clone(),
            authorization: format!("Basic {}", BASE64_STANDARD.encode(credentials)),
            timeout: settings.timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run a trivial text search and classify the response.
    pub fn probe(&self) -> ProbeReport {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .http_status_as_error(false)
            .build()
            .into();
        let url = format!("{}/rest/api/content/search", self.base_url);
        let response = agent
            .get(&url)
            .header("Authorization", &self.authorization)
            .header("Accept", "application/json")
            .query("cql", "text~server")
            .call();
        let mut response = match response {
            Ok(response) => response,
            Err(err) => {
                return ProbeReport::Rejected {
                    error: self.map_error(err),
                    body_snippet: None,
                }
            }
        };
        let status = response.status().as_u16();
        if status == 200 {
            let total_results = response
                .body_mut()
                .read_json::<SearchProbe>()
                .ok()
                .and_then(|probe| probe.total_size);
            return ProbeReport::Connected { total_results };
        }
        let body_snippet = response
            .body_mut()
            .read_to_string()
            .ok()
            .map(|body| truncate_string(&body, PROBE_SNIPPET_BYTES));
        ProbeReport::Rejected {
            error: StoreError::from_status(status),
            body_snippet,
        }
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.timeout
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        deadline: Instant,
    ) -> Result<T, StoreError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(StoreError::Timeout(self.timeout));
        }
        let url = format!("{}{}", self.base_url, path);
        let start = Instant::now();
        let mut request = self
            .agent
            .get(&url)
            .header("Authorization", &self.authorization)
            .header("Accept", "application/json")
            .config()
            .timeout_global(Some(remaining))
            .build();
        for (key, value) in query {
            request = request.query(*key, *value);
        }
        let mut response = request.call().map_err(|err| self.map_error(err))?;
        let parsed = response
            .body_mut()
            .read_json::<T>()
            .map_err(|err| self.map_error(err))?;
        tracing::debug!(
            path,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "store request complete"
        );
        Ok(parsed)
    }

    fn map_error(&self, err: ureq::Error) -> StoreError {
        match err {
            ureq::Error::StatusCode(status) => StoreError::from_status(status),
            ureq::Error::Timeout(_) => StoreError::Timeout(self.timeout),
            ureq::Error::Json(err) => StoreError::Decode(err.to_string()),
            other => StoreError::Transport(other.to_string()),
        }
    }

    fn list_space_keys(&self, deadline: Instant) -> Result<Vec<String>, StoreError> {
        let spaces: SpaceList =
            self.get_json("/rest/api/space", &[("limit", SPACE_LIMIT)], deadline)?;
        Ok(spaces.results.into_iter().map(|space| space.key).collect())
    }

    fn list_pages(&self, space: &str, deadline: Instant) -> Result<Vec<PageEntry>, StoreError> {
        let pages: PageList = self.get_json(
            "/rest/api/content",
            &[
                ("spaceKey", space),
                ("type", "page"),
                ("start", "0"),
                ("limit", PAGE_LIMIT),
                ("expand", "history.lastUpdated"),
            ],
            deadline,
        )?;
        Ok(pages.results)
    }

    fn page_detail(&self, id: &str, deadline: Instant) -> Result<PageDetail, StoreError> {
        self.get_json(
            &format!("/rest/api/content/{id}"),
            &[("expand", "body.storage")],
            deadline,
        )
    }
}

impl DocumentStore for ConfluenceStore {
    fn search(&self, term: &str, scope: Option<&str>) -> Result<SearchOutcome, StoreError> {
        let deadline = self.deadline();
        let scope_description = scope_description(scope);
        tracing::info!(scope = %scope_description, term, "searching document store");

        let spaces = match scope {
            Some(key) => vec![key.to_string()],
            None => self.list_space_keys(deadline)?,
        };

        let mut matches = Vec::new();
        'spaces: for space in spaces {
            for page in self.list_pages(&space, deadline)? {
                let body = match self.page_detail(&page.id, deadline) {
                    Ok(detail) => detail.storage_value().unwrap_or_default(),
                    // The ceiling covers the whole search.
                    Err(err @ (StoreError::Timeout(_) | StoreError::Transport(_))) => {
                        return Err(err);
                    }
                    Err(err) => {
                        tracing::warn!(page_id = %page.id, error = %err, "could not fetch page body");
                        String::new()
                    }
                };
                if matches_term(term, &page.title, &body) {
                    let when = page
                        .history
                        .as_ref()
                        .and_then(|history| history.last_updated.as_ref())
                        .and_then(|version| version.when.as_deref());
                    matches.push(SearchResult {
                        id: page.id.clone(),
                        title: page.title.clone(),
                        scope: space.clone(),
                        last_modified: format_last_modified(when),
                    });
                }
                if matches.len() >= MAX_RESULTS {
                    break 'spaces;
                }
            }
        }

        tracing::info!(matches = matches.len(), "search complete");
        Ok(SearchOutcome {
            query: term.to_string(),
            scope_description,
            matches,
        })
    }

    fn fetch_page(&self, id: &str) -> Result<PageContent, StoreError> {
        let detail = self.page_detail(id, self.deadline())?;
        let title = detail
            .title
            .clone()
            .unwrap_or_else(|| "Untitled Page".to_string());
        let content = detail
            .storage_value()
            .unwrap_or_else(|| MISSING_CONTENT.to_string());
        tracing::info!(page_id = id, content_bytes = content.len(), "fetched page content");
        Ok(PageContent { title, content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    type Route = (&'static str, u16, &'static str);

    const PAGE_LIST: &str = r#"{"results":[
        {"id":"101","title":"VPN Setup","history":{"lastUpdated":{"when":"2024-06-01T12:30:00.000Z"}}},
        {"id":"102","title":"Remote Access"},
        {"id":"103","title":"Printers"}]}"#;

    /// Serve canned JSON on a local port, waiting `delay` before each reply.
    fn serve(delay: Duration, routes: Vec<Route>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub store");
        let addr = listener.local_addr().expect("stub address");
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let routes = routes.clone();
                thread::spawn(move || respond(stream, delay, &routes));
            }
        });
        format!("http://{addr}")
    }

    fn respond(mut stream: TcpStream, delay: Duration, routes: &[Route]) {
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).is_err() {
            return;
        }
        loop {
            let mut header = String::new();
            match reader.read_line(&mut header) {
                Ok(0) | Err(_) => break,
                Ok(_) if header.trim_end().is_empty() => break,
                Ok(_) => {}
            }
        }
        let target = request_line.split_whitespace().nth(1).unwrap_or("/");
        let path = target.split('?').next().unwrap_or(target);
        let (status, body) = routes
            .iter()
            .find(|(route, _, _)| *route == path)
            .map(|(_, status, body)| (*status, *body))
            .unwrap_or((404, "{}"));
        thread::sleep(delay);
        let response = format!(
            "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).ok();
    }

    fn store_at(base_url: String, timeout: Duration) -> ConfluenceStore {
        ConfluenceStore::new(&StoreSettings {
            base_url,
            username: "ops@example.com".to_string(),
            api_token: "secret".to_string(),
            timeout,
        })
    }

    #[test]
    fn page_listing_decodes_last_updated() {
        let raw = r#"{"results":[{"id":"101","title":"VPN Setup",
            "history":{"lastUpdated":{"when":"2024-06-01T12:30:00.000Z"}}},
            {"id":"102","title":"Old"}]}"#;
        let pages: PageList = serde_json::from_str(raw).expect("page list");
        assert_eq!(pages.results.len(), 2);
        let when = pages.results[0]
            .history
            .as_ref()
            .and_then(|h| h.last_updated.as_ref())
            .and_then(|v| v.when.as_deref());
        assert_eq!(format_last_modified(when), "2024-06-01 12:30:00");
        assert!(pages.results[1].history.is_none());
    }

    #[test]
    fn page_detail_extracts_storage_body() {
        let raw = r#"{"title":"VPN Setup","body":{"storage":{"value":"<p>hi</p>"}}}"#;
        let detail: PageDetail = serde_json::from_str(raw).expect("detail");
        assert_eq!(detail.storage_value().as_deref(), Some("<p>hi</p>"));

        let bare: PageDetail = serde_json::from_str(r#"{"title":"x"}"#).expect("detail");
        assert_eq!(bare.storage_value(), None);
    }

    #[test]
    fn authorization_header_uses_basic_credentials() {
        let settings = StoreSettings {
            base_url: "https://wiki.example.com".to_string(),
            username: "user".to_string(),
            api_token: "token".to_string(),
            timeout: Duration::from_secs(5),
        };
        let store = ConfluenceStore::new(&settings);
        assert_eq!(store.authorization, "Basic dXNlcjp0b2tlbg==");
        assert_eq!(store.base_url(), "https://wiki.example.com");
    }

    #[test]
    fn search_skips_page_whose_body_cannot_be_fetched() {
        let base_url = serve(
            Duration::ZERO,
            vec![
                ("/rest/api/content", 200, PAGE_LIST),
                ("/rest/api/content/101", 500, r#"{"message":"boom"}"#),
                (
                    "/rest/api/content/102",
                    200,
                    r#"{"title":"Remote Access","body":{"storage":{"value":"<p>Install the VPN client</p>"}}}"#,
                ),
                (
                    "/rest/api/content/103",
                    200,
                    r#"{"title":"Printers","body":{"storage":{"value":"<p>Toner</p>"}}}"#,
                ),
            ],
        );
        let store = store_at(base_url, Duration::from_secs(5));

        let outcome = store.search("vpn", Some("IT")).expect("search");
        let ids: Vec<&str> = outcome.matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["101", "102"]);
        assert_eq!(outcome.scope_description, "in Space: IT");
        assert_eq!(outcome.matches[0].last_modified, "2024-06-01 12:30:00");
        assert_eq!(outcome.matches[0].scope, "IT");
    }

    #[test]
    fn search_stops_at_whole_call_deadline() {
        let base_url = serve(
            Duration::from_millis(600),
            vec![
                ("/rest/api/content", 200, PAGE_LIST),
                ("/rest/api/content/101", 200, r#"{"title":"VPN Setup"}"#),
                ("/rest/api/content/102", 200, r#"{"title":"Remote Access"}"#),
                ("/rest/api/content/103", 200, r#"{"title":"Printers"}"#),
            ],
        );
        let timeout = Duration::from_secs(1);
        let store = store_at(base_url, timeout);

        let start = Instant::now();
        let result = store.search("vpn", Some("IT"));
        let elapsed = start.elapsed();
        assert_eq!(result.map(|outcome| outcome.total()), Err(StoreError::Timeout(timeout)));
        assert!(elapsed < Duration::from_millis(1600), "search ran {elapsed:?}");
    }

    #[test]
    fn slow_fetch_maps_to_timeout() {
        let base_url = serve(
            Duration::from_secs(3),
            vec![("/rest/api/content/55", 200, r#"{"title":"Late"}"#)],
        );
        let timeout = Duration::from_secs(1);
        let store = store_at(base_url, timeout);
        assert_eq!(store.fetch_page("55"), Err(StoreError::Timeout(timeout)));
    }

    #[test]
    fn refused_connection_maps_to_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("address");
        drop(listener);
        let store = store_at(format!("http://{addr}"), Duration::from_secs(2));
        assert!(matches!(store.fetch_page("55"), Err(StoreError::Transport(_))));
    }

    #[test]
    fn rejected_credentials_map_to_unauthorized() {
        let base_url = serve(
            Duration::ZERO,
            vec![("/rest/api/content/55", 401, r#"{"message":"no"}"#)],
        );
        let store = store_at(base_url, Duration::from_secs(5));
        assert_eq!(store.fetch_page("55"), Err(StoreError::Unauthorized));
    }

    #[test]
    fn fetch_without_storage_body_uses_placeholder() {
        let base_url = serve(
            Duration::ZERO,
            vec![("/rest/api/content/55", 200, r#"{"title":"Blank"}"#)],
        );
        let store = store_at(base_url, Duration::from_secs(5));
        let page = store.fetch_page("55").expect("fetch");
        assert_eq!(page.title, "Blank");
        assert_eq!(page.content, "Content not found.");
    }
}
