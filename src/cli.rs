//! CLI argument parsing.
//!
//! `session` runs the interactive workflow; the other commands expose the
//! document store directly for scripting and troubleshooting.
use clap::{Parser, Subcommand};

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "steward",
    version,
    about = "Find a knowledge-base page and review model-proposed edits",
    after_help = "Commands:\n  session [--scope KEY]       Interactive search, rank, and proposal workflow\n  search <TERM> [--space KEY] Search pages and print JSON\n  fetch <ID>                  Print a page's title and raw content as JSON\n  check                       Verify document store credentials\n\nExamples:\n  steward session\n  steward session --scope IT --lm-command \"llm -m {model}\"\n  steward search \"vpn setup\" --space IT\n  steward fetch 123456\n  steward check",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Enable debug logging on stderr
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Session(SessionArgs),
    Search(SearchArgs),
    Fetch(FetchArgs),
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Run the interactive page workflow")]
pub struct SessionArgs {
    /// Restrict searches to one space key (uppercased)
    #[arg(long, value_name = "KEY")]
    pub scope: Option<String>,

    /// Local model command; the prompt is written to stdin and `{model}` is
    /// replaced by the tier's model name
    #[arg(long, value_name = "CMD")]
    pub lm_command: Option<String>,
}

#[derive(Parser, Debug)]
#[command(about = "Search pages and print the outcome as JSON")]
pub struct SearchArgs {
    /// Text to look for in page titles and bodies
    #[arg(value_name = "TERM")]
    pub term: String,

    /// Space key to search in (all spaces when omitted)
    #[arg(long, value_name = "KEY")]
    pub space: Option<String>,
}

#[derive(Parser, Debug)]
#[command(about = "Fetch one page's title and raw content as JSON")]
pub struct FetchArgs {
    /// Page id
    #[arg(value_name = "ID")]
    pub id: String,
}

#[derive(Parser, Debug)]
#[command(about = "Check document store connectivity and credentials")]
pub struct CheckArgs {}
