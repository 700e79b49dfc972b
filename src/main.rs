//! Steward: find the right knowledge-base page and review model-proposed edits.
//!
//! Nothing is ever written back to the document store; finalized proposals
//! are copied out for a human to apply.
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod cli;
mod clipboard;
mod config;
mod lm;
mod proposal;
mod query;
mod rank;
mod repl;
mod review;
mod session;
mod store;
mod util;

use crate::cli::{CheckArgs, Command, FetchArgs, RootArgs, SearchArgs, SessionArgs};
use crate::config::{load_all, StoreSettings};
use crate::store::confluence::ProbeReport;
use crate::store::{ConfluenceStore, DocumentStore, StoreError};

const LOG_ENV: &str = "STEWARD_LOG";

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Session(args) => run_session(args),
        Command::Search(args) => run_search(args),
        Command::Fetch(args) => run_fetch(args),
        Command::Check(args) => run_check(args),
    }
}

/// Log to stderr so interactive and JSON output on stdout stay clean.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_session(args: SessionArgs) -> Result<()> {
    let (store_settings, model_settings) =
        load_all(config::env_lookup, args.lm_command.as_deref()).context("load configuration")?;
    let store = ConfluenceStore::new(&store_settings);
    let model = lm::from_settings(&model_settings);
    let controller = session::Controller::new(&store, model.as_ref());
    repl::Repl::new(controller, store.base_url(), args.scope.as_deref())?.run()
}

fn run_search(args: SearchArgs) -> Result<()> {
    let store = ConfluenceStore::new(&StoreSettings::from_env().context("load configuration")?);
    let scope = args.space.map(|key| key.trim().to_uppercase());
    let result = store
        .search(args.term.trim(), scope.as_deref())
        .map(|outcome| {
            let total_matches = outcome.total();
            json!({
                "query": outcome.query,
                "scope_description": outcome.scope_description,
                "total_matches": total_matches,
                "matches": outcome.matches,
            })
        });
    print_result(result)
}

fn run_fetch(args: FetchArgs) -> Result<()> {
    let store = ConfluenceStore::new(&StoreSettings::from_env().context("load configuration")?);
    let result = store.fetch_page(args.id.trim());
    print_result(result)
}

/// Print the payload, or `{"error": ...}` and exit non-zero.
fn print_result<T: Serialize>(result: Result<T, StoreError>) -> Result<()> {
    match result {
        Ok(payload) => {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            println!("{}", serde_json::to_string_pretty(&payload)?);
            std::process::exit(1);
        }
    }
}

fn run_check(_args: CheckArgs) -> Result<()> {
    let settings = StoreSettings::from_env().context("load configuration")?;
    let store = ConfluenceStore::new(&settings);
    println!("Checking {} as {}", store.base_url(), settings.username);
    match store.probe() {
        ProbeReport::Connected { total_results } => {
            match total_results {
                Some(total) => println!("Connected: test search returned {total} result(s)."),
                None => println!("Connected."),
            }
            Ok(())
        }
        ProbeReport::Rejected {
            error,
            body_snippet,
        } => {
            println!("Failed: {error}");
            match &error {
                StoreError::Unauthorized => {
                    println!("Check CONFLUENCE_USERNAME and regenerate CONFLUENCE_API_TOKEN.")
                }
                StoreError::Forbidden => println!(
                    "The credentials are valid but the user cannot search; check space and site permissions."
                ),
                StoreError::Transport(_) | StoreError::Timeout(_) => {
                    println!("Check CONFLUENCE_URL and network access.")
                }
                StoreError::Status { .. } | StoreError::Decode(_) => {}
            }
            if let Some(snippet) = body_snippet.filter(|s| !s.trim().is_empty()) {
                println!("Response: {snippet}");
            }
            std::process::exit(1);
        }
    }
}
