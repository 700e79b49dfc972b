//! Interactive terminal front-end.
//!
//! Each prompt answers one question for the current step and maps the answer
//! onto a single controller transition. Lines starting with `:` are session
//! commands and work at any top-level prompt; any other non-empty line at the
//! page prompt starts a new search. At the review prompt a new search first
//! asks before dropping the pending proposal.
use crate::clipboard::try_copy_to_clipboard;
use crate::proposal::{Action, ActionRequest, OutputFormat};
use crate::rank::latest_updated;
use crate::review::ReviewView;
use crate::session::{Controller, SearchStatus, Session, SessionError, Step, HISTORY_LIMIT};
use crate::util::{page_url, preview};
use anyhow::{Context, Result};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const HELP: &str = "\
Type a search phrase (\"vpn setup in space IT\") to find a page.

Commands:
  :history      list recent searches
  :rerun N      run history entry N again
  :scope KEY    restrict searches to a space (no KEY clears it)
  :tokens       show tokens used this session
  :new          abandon the current page and start over
  :clear        clear state, history, and token total
  :help         show this help
  :quit         exit";

const CONTENT_PREVIEW_BYTES: usize = 240;

/// Session-level commands available at every top-level prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    History,
    Rerun(usize),
    Scope(Option<String>),
    Tokens,
    New,
    Clear,
    Help,
    Quit,
    Invalid(String),
}

/// Answer at the review prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReviewChoice {
    Finalize,
    Discard,
    Stay,
    Command(ReplCommand),
    Search(String),
}

enum Input {
    Line(String),
    /// Ctrl-C: drop the current question.
    Cancel,
    /// Ctrl-D.
    Exit,
}

enum Flow {
    Continue,
    Quit,
}

pub struct Repl<'a> {
    controller: Controller<'a>,
    session: Session,
    editor: DefaultEditor,
    base_url: String,
    scope_override: Option<String>,
}

impl<'a> Repl<'a> {
    pub fn new(
        controller: Controller<'a>,
        base_url: impl Into<String>,
        scope_override: Option<&str>,
    ) -> Result<Self> {
        let editor = DefaultEditor::new().context("initialize line editor")?;
        Ok(Self {
            controller,
            session: Session::default(),
            editor,
            base_url: base_url.into(),
            scope_override: scope_override.map(str::to_uppercase),
        })
    }

    pub fn run(mut self) -> Result<()> {
        println!("{}", "=== Page Steward ===".bright_magenta().bold());
        println!("{}", "Search for a page, or type :help.".bright_black());
        if let Some(scope) = &self.scope_override {
            println!("{}", format!("Searches are limited to space {scope}.").bright_black());
        }
        loop {
            let flow = match self.session.step() {
                Step::Idle | Step::Searching => self.idle()?,
                Step::ChoosePage => self.choose_page()?,
                Step::ChooseAction => self.choose_action()?,
                Step::Generating => {
                    self.generate();
                    Flow::Continue
                }
                Step::Review => self.review()?,
            };
            if let Flow::Quit = flow {
                break;
            }
        }
        println!("{}", "Goodbye!".bright_green());
        Ok(())
    }

    fn read(&mut self, prompt: &str) -> Result<Input> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.editor.add_history_entry(line.as_str()).ok();
                }
                Ok(Input::Line(line.trim().to_string()))
            }
            Err(ReadlineError::Interrupted) => Ok(Input::Cancel),
            Err(ReadlineError::Eof) => Ok(Input::Exit),
            Err(err) => Err(err).context("read input"),
        }
    }

    fn idle(&mut self) -> Result<Flow> {
        match self.read("search> ")? {
            Input::Line(line) if line.is_empty() => Ok(Flow::Continue),
            Input::Line(line) => self.dispatch(&line),
            Input::Cancel => Ok(Flow::Continue),
            Input::Exit => Ok(Flow::Quit),
        }
    }

    /// Run a session command, or treat the line as a new search.
    fn dispatch(&mut self, line: &str) -> Result<Flow> {
        match parse_command(line) {
            Some(command) => Ok(self.command(command)),
            None => {
                self.search(line);
                Ok(Flow::Continue)
            }
        }
    }

    fn command(&mut self, command: ReplCommand) -> Flow {
        match command {
            ReplCommand::History => {
                let history = &self.session.history;
                if history.is_empty() {
                    println!("{}", "No searches yet.".bright_black());
                } else {
                    println!(
                        "{}",
                        format!("Recent searches ({} of {HISTORY_LIMIT}):", history.len()).bold()
                    );
                }
                for (idx, query) in history.newest_first().enumerate() {
                    println!("  [{}] {query}", idx + 1);
                }
            }
            ReplCommand::Rerun(number) => {
                let scope = self.scope_override.clone();
                let result = self
                    .controller
                    .rerun(&mut self.session, number.saturating_sub(1), scope.as_deref());
                self.report_search(result);
            }
            ReplCommand::Scope(scope) => {
                match &scope {
                    Some(key) => println!("{}", format!("Searches limited to space {key}.").cyan()),
                    None => println!("{}", "Searching across all spaces.".cyan()),
                }
                self.scope_override = scope;
            }
            ReplCommand::Tokens => println!(
                "{}",
                format!("Tokens used this session: {}", self.session.state.cumulative_tokens)
                    .cyan()
            ),
            ReplCommand::New => {
                self.controller.abandon(&mut self.session);
                println!("{}", "Started over.".bright_black());
            }
            ReplCommand::Clear => {
                self.session.clear_all();
                println!("{}", "Cleared session state, history, and token total.".bright_black());
            }
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Quit => return Flow::Quit,
            ReplCommand::Invalid(message) => println!("{}", message.yellow()),
        }
        Flow::Continue
    }

    fn search(&mut self, raw: &str) {
        let scope = self.scope_override.clone();
        let result = self
            .controller
            .submit_query(&mut self.session, raw, scope.as_deref());
        self.report_search(result);
    }

    fn report_search(&mut self, result: Result<SearchStatus, SessionError>) {
        match result {
            Ok(SearchStatus::Candidates { count }) => {
                let state = &self.session.state;
                println!(
                    "{}",
                    format!(
                        "Found {count} page(s) {} for '{}'.",
                        state.scope_description.as_deref().unwrap_or_default(),
                        state.search_term.as_deref().unwrap_or_default()
                    )
                    .green()
                );
            }
            Ok(SearchStatus::NoMatches { scope_description }) => println!(
                "{}",
                format!("No pages found {scope_description}.").yellow()
            ),
            Err(err) => report_error(&err),
        }
    }

    fn choose_page(&mut self) -> Result<Flow> {
        let recommendation = match self.controller.recommendation(&mut self.session) {
            Ok(recommendation) => recommendation.clone(),
            Err(err) => {
                report_error(&err);
                self.controller.abandon(&mut self.session);
                return Ok(Flow::Continue);
            }
        };

        let matches = &self.session.state.matches;
        let latest_id = latest_updated(matches).map(|page| page.id.clone());
        println!();
        for (idx, page) in matches.iter().enumerate() {
            let mut markers = Vec::new();
            if Some(&page.id) == latest_id.as_ref() {
                markers.push("LATEST".bright_cyan().to_string());
            }
            if page.id == recommendation.page_id {
                markers.push("RECOMMENDED".bright_green().bold().to_string());
            }
            println!(
                "  [{}] {} (space {}, updated {}) {}",
                idx + 1,
                page.title.bold(),
                page.scope,
                page.last_modified,
                markers.join(" ")
            );
            println!("      {}", page_url(&self.base_url, &page.id).bright_black());
        }
        println!();
        let heading = if recommendation.is_fallback() {
            "Fallback pick:".yellow()
        } else {
            "Recommended:".bright_green()
        };
        println!("{heading} {}", recommendation.justification);

        match self.read("Press Enter to continue with the recommended page, or search again> ")? {
            Input::Line(line) if line.is_empty() => {
                match self.controller.proceed(&mut self.session) {
                    Ok(page) => println!(
                        "{} {} ({})",
                        "Selected:".green(),
                        page.title.bold(),
                        page_url(&self.base_url, &page.id)
                    ),
                    Err(err) => report_error(&err),
                }
                Ok(Flow::Continue)
            }
            Input::Line(line) => self.dispatch(&line),
            Input::Cancel => {
                self.controller.abandon(&mut self.session);
                Ok(Flow::Continue)
            }
            Input::Exit => Ok(Flow::Quit),
        }
    }

    fn choose_action(&mut self) -> Result<Flow> {
        if self.session.state.fetch_failure.is_some() {
            println!(
                "{}",
                "Content retrieval failed for this page. Type a new search to continue.".yellow()
            );
            return match self.read("search> ")? {
                Input::Line(line) if line.is_empty() => Ok(Flow::Continue),
                Input::Line(line) => self.dispatch(&line),
                Input::Cancel => {
                    self.controller.abandon(&mut self.session);
                    Ok(Flow::Continue)
                }
                Input::Exit => Ok(Flow::Quit),
            };
        }

        println!("\n{}", "Choose an action:".bold());
        for (idx, action) in Action::ALL.iter().enumerate() {
            println!("  [{}] {}", idx + 1, action.label());
        }
        let action = match self.read("action [1]> ")? {
            Input::Line(line) if line.starts_with(':') => return self.dispatch(&line),
            Input::Line(line) => match parse_choice(&line, &Action::ALL) {
                Some(action) => action,
                None => {
                    println!("{}", "Pick one of the listed numbers.".yellow());
                    return Ok(Flow::Continue);
                }
            },
            Input::Cancel => return self.cancel_form(),
            Input::Exit => return Ok(Flow::Quit),
        };

        println!("{}", "Output format:".bold());
        for (idx, format) in OutputFormat::ALL.iter().enumerate() {
            println!("  [{}] {}", idx + 1, format.label());
        }
        let format = match self.read("format [1]> ")? {
            Input::Line(line) => match parse_choice(&line, &OutputFormat::ALL) {
                Some(format) => format,
                None => {
                    println!("{}", "Pick one of the listed numbers.".yellow());
                    return Ok(Flow::Continue);
                }
            },
            Input::Cancel => return self.cancel_form(),
            Input::Exit => return Ok(Flow::Quit),
        };

        let mut request = ActionRequest::new(action, format);
        if action == Action::ProposeUpdate {
            match self.read("Integrate your own content into the update? [y/N]> ")? {
                Input::Line(line) if is_yes(&line) => {
                    let Some(notes) = self.read_block()? else {
                        return self.cancel_form();
                    };
                    request = request.with_custom_notes(notes);
                }
                Input::Line(_) => {}
                Input::Cancel => return self.cancel_form(),
                Input::Exit => return Ok(Flow::Quit),
            }
        }
        match self.read("Style instructions (optional)> ")? {
            Input::Line(line) => request = request.with_style_instructions(line),
            Input::Cancel => return self.cancel_form(),
            Input::Exit => return Ok(Flow::Quit),
        }

        match self.controller.confirm_action(&mut self.session, request) {
            Ok(()) => {
                let state = &self.session.state;
                let content = state.raw_content.as_deref().unwrap_or_default();
                println!(
                    "{} {} ({} bytes)",
                    "Retrieved".green(),
                    state.page_title.as_deref().unwrap_or_default().bold(),
                    content.len()
                );
                println!("{}", preview(content, CONTENT_PREVIEW_BYTES).bright_black());
            }
            Err(err) => report_error(&err),
        }
        Ok(Flow::Continue)
    }

    /// Multi-line input ended by a line holding a single `.`.
    fn read_block(&mut self) -> Result<Option<String>> {
        println!(
            "{}",
            "Enter the content to integrate; finish with a line containing only '.'".bright_black()
        );
        let mut lines = Vec::new();
        loop {
            match self.read("... ")? {
                Input::Line(line) if line == "." => break,
                Input::Line(line) => lines.push(line),
                Input::Cancel | Input::Exit => return Ok(None),
            }
        }
        Ok(Some(lines.join("\n")))
    }

    fn cancel_form(&mut self) -> Result<Flow> {
        println!("{}", "Cancelled; pick the action again or type :new.".bright_black());
        Ok(Flow::Continue)
    }

    fn generate(&mut self) {
        let action = self
            .session
            .state
            .request
            .as_ref()
            .map(|request| request.action.label())
            .unwrap_or_default();
        println!("{}", format!("Generating: {action}...").bright_black());
        match self.controller.generate(&mut self.session) {
            Ok(report) if report.failed => {
                println!("{}", "Generation failed; the error is shown below.".red());
            }
            Ok(report) => println!(
                "{}",
                format!(
                    "Used {} tokens ({} this session).",
                    report.tokens_used, self.session.state.cumulative_tokens
                )
                .bright_black()
            ),
            Err(err) => {
                report_error(&err);
                self.controller.abandon(&mut self.session);
            }
        }
    }

    fn review(&mut self) -> Result<Flow> {
        match self.controller.review(&self.session) {
            Ok(view) => print_review(&view),
            Err(err) => {
                report_error(&err);
                self.controller.abandon(&mut self.session);
                return Ok(Flow::Continue);
            }
        }
        println!(
            "{}",
            "Nothing is written back to the page; finalize to copy the proposal.".bright_black()
        );

        let line = match self.read("[f]inalize, [d]iscard, or search again> ")? {
            Input::Line(line) => line,
            Input::Cancel => return Ok(Flow::Continue),
            Input::Exit => return Ok(Flow::Quit),
        };
        match parse_review_choice(&line) {
            ReviewChoice::Finalize => self.finalize(),
            ReviewChoice::Discard => {
                self.discard();
                Ok(Flow::Continue)
            }
            ReviewChoice::Stay => Ok(Flow::Continue),
            ReviewChoice::Command(command) => Ok(self.command(command)),
            ReviewChoice::Search(query) => {
                println!(
                    "{}",
                    "A proposal is still pending; a new search discards it (or type :new).".yellow()
                );
                match self.read(&format!("Discard it and search for '{query}'? [y/N]> "))? {
                    Input::Line(answer) if is_yes(&answer) => {
                        self.discard();
                        self.search(&query);
                        Ok(Flow::Continue)
                    }
                    Input::Line(_) | Input::Cancel => Ok(Flow::Continue),
                    Input::Exit => Ok(Flow::Quit),
                }
            }
        }
    }

    fn finalize(&mut self) -> Result<Flow> {
        let text = match self.controller.finalize(&mut self.session) {
            Ok(text) => text,
            Err(err) => {
                report_error(&err);
                return Ok(Flow::Continue);
            }
        };
        match try_copy_to_clipboard(&text) {
            Ok(true) => println!("{}", "Proposal copied to the clipboard.".green()),
            Ok(false) => {
                println!("{}", "No clipboard tool found; copy the text below.".yellow());
                println!("{text}");
            }
            Err(err) => {
                tracing::warn!(error = %err, "clipboard copy failed");
                println!("{}", "Clipboard copy failed; copy the text below.".yellow());
                println!("{text}");
            }
        }
        Ok(Flow::Continue)
    }

    fn discard(&mut self) {
        match self.controller.discard(&mut self.session) {
            Ok(()) => println!("{}", "Proposal discarded.".bright_black()),
            Err(err) => report_error(&err),
        }
    }
}

fn print_review(view: &ReviewView) {
    println!();
    match view {
        ReviewView::Markdown(text) => {
            println!("{}", "--- Proposed content (Markdown) ---".bold());
            println!("{text}");
        }
        ReviewView::Storage(text) => {
            println!("{}", "--- Proposed content (storage format) ---".bold());
            println!("{}", "No preview is available for storage format.".bright_black());
            println!("{text}");
        }
        ReviewView::Split { markdown, storage } => {
            println!("{}", "--- Proposed Markdown ---".bold());
            println!("{markdown}");
            println!("{}", "--- Proposed HTML/XML ---".bold());
            println!("{storage}");
        }
        ReviewView::Raw(text) => {
            println!(
                "{}",
                "Could not separate the two formats; showing the raw reply.".yellow()
            );
            println!("{text}");
        }
    }
    println!();
}

fn report_error(err: &SessionError) {
    if err.is_validation() {
        println!("{}", err.to_string().yellow());
        return;
    }
    println!("{}", format!("Error: {err}").red());
    if let SessionError::Search(source) | SessionError::Fetch { source, .. } = err {
        if source.is_auth() {
            println!(
                "{}",
                "Check CONFLUENCE_USERNAME and CONFLUENCE_API_TOKEN, or run `steward check`."
                    .yellow()
            );
        }
    }
}

fn parse_command(line: &str) -> Option<ReplCommand> {
    let rest = line.trim().strip_prefix(':')?;
    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();
    let command = match name {
        "history" | "h" => ReplCommand::History,
        "rerun" | "r" => match arg.and_then(|value| value.parse::<usize>().ok()) {
            Some(number) if number > 0 => ReplCommand::Rerun(number),
            _ => ReplCommand::Invalid("usage: :rerun N (see :history)".to_string()),
        },
        "scope" => ReplCommand::Scope(arg.map(str::to_uppercase)),
        "tokens" => ReplCommand::Tokens,
        "new" => ReplCommand::New,
        "clear" => ReplCommand::Clear,
        "help" | "?" => ReplCommand::Help,
        "quit" | "q" | "exit" => ReplCommand::Quit,
        other => ReplCommand::Invalid(format!("unknown command :{other} (try :help)")),
    };
    Some(command)
}

fn parse_review_choice(line: &str) -> ReviewChoice {
    let line = line.trim();
    if line.is_empty() {
        return ReviewChoice::Stay;
    }
    if let Some(command) = parse_command(line) {
        return ReviewChoice::Command(command);
    }
    match line.to_ascii_lowercase().as_str() {
        "f" | "fin" | "finalize" => ReviewChoice::Finalize,
        "d" | "dis" | "discard" => ReviewChoice::Discard,
        _ => ReviewChoice::Search(line.to_string()),
    }
}

/// 1-based menu choice; empty input picks the first entry.
fn parse_choice<T: Copy>(line: &str, options: &[T]) -> Option<T> {
    let line = line.trim();
    if line.is_empty() {
        return options.first().copied();
    }
    let number = line.parse::<usize>().ok()?;
    options.get(number.checked_sub(1)?).copied()
}

fn is_yes(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_with_arguments() {
        assert_eq!(parse_command(":history"), Some(ReplCommand::History));
        assert_eq!(parse_command(" :rerun 2 "), Some(ReplCommand::Rerun(2)));
        assert_eq!(
            parse_command(":scope it"),
            Some(ReplCommand::Scope(Some("IT".to_string())))
        );
        assert_eq!(parse_command(":scope"), Some(ReplCommand::Scope(None)));
        assert_eq!(parse_command(":q"), Some(ReplCommand::Quit));
    }

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse_command("vpn setup in space IT"), None);
    }

    #[test]
    fn bad_rerun_index_is_reported() {
        assert!(matches!(parse_command(":rerun 0"), Some(ReplCommand::Invalid(_))));
        assert!(matches!(parse_command(":rerun x"), Some(ReplCommand::Invalid(_))));
        assert!(matches!(parse_command(":bogus"), Some(ReplCommand::Invalid(_))));
    }

    #[test]
    fn review_answers_accept_short_and_full_words() {
        for answer in ["f", "FIN", "finalize", " Finalize "] {
            assert_eq!(parse_review_choice(answer), ReviewChoice::Finalize, "{answer}");
        }
        for answer in ["d", "dis", "DISCARD"] {
            assert_eq!(parse_review_choice(answer), ReviewChoice::Discard, "{answer}");
        }
        assert_eq!(parse_review_choice("  "), ReviewChoice::Stay);
    }

    #[test]
    fn review_text_is_a_search_request_not_a_discard() {
        assert_eq!(
            parse_review_choice("finalize the vpn page"),
            ReviewChoice::Search("finalize the vpn page".to_string())
        );
        assert_eq!(parse_review_choice(":new"), ReviewChoice::Command(ReplCommand::New));
    }

    #[test]
    fn menu_choice_is_one_based_with_default() {
        assert_eq!(parse_choice("", &Action::ALL), Some(Action::ProposeUpdate));
        assert_eq!(parse_choice("3", &Action::ALL), Some(Action::FixGrammar));
        assert_eq!(parse_choice("0", &Action::ALL), None);
        assert_eq!(parse_choice("9", &OutputFormat::ALL), None);
        assert_eq!(parse_choice("3", &OutputFormat::ALL), Some(OutputFormat::Both));
    }

    #[test]
    fn yes_answers() {
        assert!(is_yes("Y"));
        assert!(is_yes(" yes "));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
    }
}
