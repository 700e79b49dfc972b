//! Proposal generation.
//!
//! One prompt per request: a fixed per-action instruction, optional custom
//! content and style blocks, and an output-encoding directive. The model's
//! reply is returned unmodified; a failed call becomes inline error text so
//! the review step is always reachable.
use crate::lm::{LanguageModel, ModelTier, TokenUsage};
use crate::util::fill_template;
use thiserror::Error;

const PROPOSAL: &str = include_str!("../prompts/proposal.md");

/// Section markers requested for dual-format output.
pub const MARKDOWN_MARKER: &str = "## PROPOSED MARKDOWN";
pub const STORAGE_MARKER: &str = "## PROPOSED HTML/XML";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    FixGrammar,
    ImproveFormatting,
    ProposeUpdate,
    QualityAudit,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::ProposeUpdate,
        Action::ImproveFormatting,
        Action::FixGrammar,
        Action::QualityAudit,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Action::FixGrammar => "Fix Grammar & Spelling",
            Action::ImproveFormatting => "Improve Formatting & Readability",
            Action::ProposeUpdate => "Propose Content Update",
            Action::QualityAudit => "Quality Audit (no changes proposed)",
        }
    }

    /// Full rewrites get the higher-capability model.
    pub fn model_tier(self) -> ModelTier {
        match self {
            Action::ProposeUpdate => ModelTier::Advanced,
            Action::FixGrammar | Action::ImproveFormatting | Action::QualityAudit => {
                ModelTier::Standard
            }
        }
    }

    fn instruction(self, search_term: &str) -> String {
        match self {
            Action::FixGrammar => "Review the page content and correct all grammatical errors, typos, and spelling mistakes. Do NOT change the meaning or structure. Return ONLY the corrected page content.".to_string(),
            Action::ImproveFormatting => "Review the page content (which is in storage format/HTML). Reformat it to be easier to read, using clear headings and lists. Do NOT change the meaning or core text. Return ONLY the improved page content.".to_string(),
            Action::ProposeUpdate => format!("Review the page content and propose a major update focusing on the search term '{search_term}'. Improve clarity, add missing steps, and make the information comprehensive. Include a brief summary of changes at the top. Return ONLY the proposed, fully updated page content."),
            Action::QualityAudit => "You are a Content Quality Analyst. Analyze the page content and create a detailed Markdown report on its clarity, structure, completeness, and relevance to the search term. Do NOT propose a content change.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Markdown,
    /// The store's native markup, for direct paste into the source editor.
    Storage,
    Both,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [
        OutputFormat::Markdown,
        OutputFormat::Storage,
        OutputFormat::Both,
    ];

    pub fn label(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "Markdown (recommended for review)",
            OutputFormat::Storage => "Storage format (HTML/XML, for direct paste)",
            OutputFormat::Both => "Both formats (Markdown & HTML/XML)",
        }
    }

    fn directive(self) -> String {
        match self {
            OutputFormat::Markdown => {
                "The output must be formatted using standard Markdown.".to_string()
            }
            OutputFormat::Storage => "The output must be formatted using storage format (HTML/XML). Do not include any Markdown text.".to_string(),
            OutputFormat::Both => format!(
                "The output must contain TWO DISTINCT SECTIONS.\n\
                 1. MARKDOWN SECTION: The full proposed content in standard Markdown format.\n\
                 2. HTML/XML SECTION: The full proposed content converted into storage format (HTML/XML).\n\
                 Start each section with its heading on its own line: '{MARKDOWN_MARKER}' and then '{STORAGE_MARKER}'."
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateFocus {
    /// Rely on the model's own knowledge.
    #[default]
    ModelKnowledge,
    /// Integrate user-supplied facts.
    CustomInput,
}

/// Everything the user chooses at the action step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub action: Action,
    pub output_format: OutputFormat,
    pub update_focus: UpdateFocus,
    pub custom_notes: String,
    pub style_instructions: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("provide custom content or turn off custom input to proceed")]
pub struct MissingCustomNotes;

impl ActionRequest {
    pub fn new(action: Action, output_format: OutputFormat) -> Self {
        Self {
            action,
            output_format,
            update_focus: UpdateFocus::ModelKnowledge,
            custom_notes: String::new(),
            style_instructions: String::new(),
        }
    }

    pub fn with_custom_notes(mut self, notes: impl Into<String>) -> Self {
        self.update_focus = UpdateFocus::CustomInput;
        self.custom_notes = notes.into();
        self
    }

    pub fn with_style_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.style_instructions = instructions.into();
        self
    }

    /// Custom input only applies to content updates; there it needs notes.
    pub fn validated(mut self) -> Result<Self, MissingCustomNotes> {
        if self.action != Action::ProposeUpdate {
            self.update_focus = UpdateFocus::ModelKnowledge;
            self.custom_notes.clear();
            return Ok(self);
        }
        if self.update_focus == UpdateFocus::CustomInput && self.custom_notes.trim().is_empty() {
            return Err(MissingCustomNotes);
        }
        Ok(self)
    }

    fn custom_block(&self) -> Option<String> {
        let applies = self.action == Action::ProposeUpdate
            && self.update_focus == UpdateFocus::CustomInput
            && !self.custom_notes.trim().is_empty();
        applies.then(|| {
            format!(
                "\nCRITICAL NEW CONTENT INPUT: Integrate the following specific, up-to-date information into the page content:\n---\nCUSTOM CONTENT: {}\n---\n",
                self.custom_notes.trim()
            )
        })
    }

    fn style_block(&self) -> Option<String> {
        let instructions = self.style_instructions.trim();
        (!instructions.is_empty()).then(|| {
            format!(
                "\nADDITIONAL STYLISTIC/STRUCTURAL INSTRUCTIONS: When performing the action, also ensure you follow these specific guidelines:\n---\nGUIDELINES: {instructions}\n---\n"
            )
        })
    }
}

/// Inputs for one generation call.
#[derive(Debug, Clone, Copy)]
pub struct ProposalInput<'a> {
    pub page_title: &'a str,
    pub page_content: &'a str,
    pub search_term: &'a str,
    pub request: &'a ActionRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    /// Model reply, or inline error text when the call failed.
    pub text: String,
    pub usage: Option<TokenUsage>,
    pub failed: bool,
}

pub fn build_proposal_prompt(input: &ProposalInput<'_>) -> String {
    let request = input.request;
    let extra_blocks: String = [request.custom_block(), request.style_block()]
        .into_iter()
        .flatten()
        .collect();
    let action_instruction = request.action.instruction(input.search_term);
    let format_instruction = request.output_format.directive();
    fill_template(
        PROPOSAL,
        &[
            ("format_instruction", format_instruction.as_str()),
            ("action_instruction", action_instruction.as_str()),
            ("page_title", input.page_title),
            ("extra_blocks", extra_blocks.as_str()),
            ("page_content", input.page_content),
        ],
    )
}

pub fn generate_proposal(model: &dyn LanguageModel, input: &ProposalInput<'_>) -> Proposal {
    let prompt = build_proposal_prompt(input);
    let action = input.request.action;
    match model.complete(action.model_tier(), &prompt) {
        Ok(completion) => Proposal {
            text: completion.text,
            usage: completion.usage,
            failed: false,
        },
        Err(err) => {
            tracing::warn!(action = action.label(), error = %err, "proposal generation failed");
            Proposal {
                text: format!("Proposal generation failed: {err:#}"),
                usage: None,
                failed: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lm::Completion;
    use anyhow::{anyhow, Result};
    use std::cell::RefCell;

    struct RecordingModel {
        reply: Result<Completion, String>,
        calls: RefCell<Vec<(ModelTier, String)>>,
    }

    impl LanguageModel for RecordingModel {
        fn complete(&self, tier: ModelTier, prompt: &str) -> Result<Completion> {
            self.calls.borrow_mut().push((tier, prompt.to_string()));
            self.reply.clone().map_err(|msg| anyhow!(msg))
        }
    }

    fn input<'a>(request: &'a ActionRequest) -> ProposalInput<'a> {
        ProposalInput {
            page_title: "VPN Setup",
            page_content: "<p>Conect to vpn-na1.</p>",
            search_term: "vpn setup",
            request,
        }
    }

    #[test]
    fn grammar_prompt_has_instruction_title_and_body() {
        let request = ActionRequest::new(Action::FixGrammar, OutputFormat::Markdown);
        let prompt = build_proposal_prompt(&input(&request));
        assert!(prompt.contains("correct all grammatical errors"));
        assert!(prompt.contains("PAGE TITLE: VPN Setup"));
        assert!(prompt.contains("---\n<p>Conect to vpn-na1.</p>\n---"));
        assert!(prompt.contains("standard Markdown"));
        assert!(!prompt.contains("CUSTOM CONTENT"));
        assert!(!prompt.contains("GUIDELINES"));
    }

    #[test]
    fn update_prompt_names_search_term_and_custom_content() {
        let request = ActionRequest::new(Action::ProposeUpdate, OutputFormat::Storage)
            .with_custom_notes("New servers are vpn-na1 and vpn-eu2.")
            .with_style_instructions("Use H3 headings");
        let prompt = build_proposal_prompt(&input(&request));
        assert!(prompt.contains("focusing on the search term 'vpn setup'"));
        assert!(prompt.contains("CUSTOM CONTENT: New servers are vpn-na1 and vpn-eu2."));
        assert!(prompt.contains("GUIDELINES: Use H3 headings"));
        assert!(prompt.contains("Do not include any Markdown text"));
    }

    #[test]
    fn custom_content_is_ignored_for_other_actions() {
        let request = ActionRequest::new(Action::QualityAudit, OutputFormat::Markdown)
            .with_custom_notes("should not appear");
        let prompt = build_proposal_prompt(&input(&request));
        assert!(!prompt.contains("should not appear"));

        let validated = request.validated().expect("audit never needs notes");
        assert_eq!(validated.update_focus, UpdateFocus::ModelKnowledge);
        assert!(validated.custom_notes.is_empty());
    }

    #[test]
    fn both_formats_directive_names_markers() {
        let request = ActionRequest::new(Action::ImproveFormatting, OutputFormat::Both);
        let prompt = build_proposal_prompt(&input(&request));
        assert!(prompt.contains(MARKDOWN_MARKER));
        assert!(prompt.contains(STORAGE_MARKER));
    }

    #[test]
    fn custom_input_without_notes_is_blocked() {
        let request =
            ActionRequest::new(Action::ProposeUpdate, OutputFormat::Markdown).with_custom_notes("  ");
        assert_eq!(request.validated(), Err(MissingCustomNotes));

        let request = ActionRequest::new(Action::ProposeUpdate, OutputFormat::Markdown);
        assert!(request.validated().is_ok());
    }

    #[test]
    fn model_tier_follows_action() {
        assert_eq!(Action::ProposeUpdate.model_tier(), ModelTier::Advanced);
        assert_eq!(Action::FixGrammar.model_tier(), ModelTier::Standard);
        assert_eq!(Action::ImproveFormatting.model_tier(), ModelTier::Standard);
        assert_eq!(Action::QualityAudit.model_tier(), ModelTier::Standard);
    }

    #[test]
    fn success_returns_text_unmodified_with_usage() {
        let model = RecordingModel {
            reply: Ok(Completion {
                text: "  <p>Connect to vpn-na1.</p>\n".to_string(),
                usage: Some(TokenUsage {
                    prompt_tokens: 40,
                    completion_tokens: 12,
                }),
            }),
            calls: RefCell::new(Vec::new()),
        };
        let request = ActionRequest::new(Action::ProposeUpdate, OutputFormat::Markdown);
        let proposal = generate_proposal(&model, &input(&request));
        assert_eq!(proposal.text, "  <p>Connect to vpn-na1.</p>\n");
        assert_eq!(proposal.usage.map(|u| u.total()), Some(52));
        assert!(!proposal.failed);
        assert_eq!(model.calls.borrow()[0].0, ModelTier::Advanced);
    }

    #[test]
    fn failure_becomes_inline_text() {
        let model = RecordingModel {
            reply: Err("quota exceeded".to_string()),
            calls: RefCell::new(Vec::new()),
        };
        let request = ActionRequest::new(Action::FixGrammar, OutputFormat::Markdown);
        let proposal = generate_proposal(&model, &input(&request));
        assert!(proposal.failed);
        assert_eq!(proposal.usage, None);
        assert_eq!(proposal.text, "Proposal generation failed: quota exceeded");
    }
}
