//! Review-step view of a generated proposal.
//!
//! Dual-format output is split on the section markers the prompt asked for.
//! The model may not comply; anything that does not split cleanly is shown
//! once as raw text.
use crate::proposal::{OutputFormat, MARKDOWN_MARKER, STORAGE_MARKER};
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewView {
    Markdown(String),
    /// Native markup has no preview; only the raw text is shown.
    Storage(String),
    Split { markdown: String, storage: String },
    Raw(String),
}

impl ReviewView {
    /// Text to copy when the proposal is finalized.
    pub fn copy_text<'a>(&'a self, raw: &'a str) -> &'a str {
        match self {
            ReviewView::Markdown(text) | ReviewView::Storage(text) | ReviewView::Raw(text) => {
                text
            }
            ReviewView::Split { .. } => raw,
        }
    }
}

pub fn review_view(proposal: &str, format: OutputFormat) -> ReviewView {
    match format {
        OutputFormat::Markdown => ReviewView::Markdown(proposal.to_string()),
        OutputFormat::Storage => ReviewView::Storage(proposal.to_string()),
        OutputFormat::Both => split_sections(proposal)
            .map(|(markdown, storage)| ReviewView::Split { markdown, storage })
            .unwrap_or_else(|| ReviewView::Raw(proposal.to_string())),
    }
}

/// Split a two-section reply. `None` unless both sections exist, appear in
/// order, and are non-empty.
pub fn split_sections(text: &str) -> Option<(String, String)> {
    let pattern = format!(
        r"(?m)^[ \t]*(?:{}|{})[ \t]*\r?$",
        regex::escape(MARKDOWN_MARKER),
        regex::escape(STORAGE_MARKER)
    );
    let markers = Regex::new(&pattern).expect("regex for section markers");
    let found: Vec<_> = markers.find_iter(text).collect();

    let markdown_at = found
        .iter()
        .position(|m| m.as_str().trim() == MARKDOWN_MARKER)?;
    let storage_at = found
        .iter()
        .position(|m| m.as_str().trim() == STORAGE_MARKER)?;
    if storage_at <= markdown_at {
        return None;
    }

    let markdown_end = found[markdown_at + 1].start();
    let markdown = text[found[markdown_at].end()..markdown_end].trim();
    let storage_end = found
        .get(storage_at + 1)
        .map(|m| m.start())
        .unwrap_or(text.len());
    let storage = strip_code_fences(text[found[storage_at].end()..storage_end].trim());

    if markdown.is_empty() || storage.is_empty() {
        return None;
    }
    Some((markdown.to_string(), storage))
}

fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().collect();
    if let Some(first) = lines.first() {
        if first.trim_start().starts_with("```") {
            lines.remove(0);
        }
    }
    if let Some(last) = lines.last() {
        if last.trim_start().starts_with("```") {
            lines.pop();
        }
    }
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = "## PROPOSED MARKDOWN\n# VPN Setup\n\n- Connect to vpn-na1\n\n## PROPOSED HTML/XML\n```html\n<h1>VPN Setup</h1>\n<ul><li>Connect to vpn-na1</li></ul>\n```\n";

    #[test]
    fn well_formed_reply_splits_into_two_parts() {
        let (markdown, storage) = split_sections(WELL_FORMED).expect("split");
        assert_eq!(markdown, "# VPN Setup\n\n- Connect to vpn-na1");
        assert_eq!(
            storage,
            "<h1>VPN Setup</h1>\n<ul><li>Connect to vpn-na1</li></ul>"
        );
    }

    #[test]
    fn missing_markers_fall_back_to_raw() {
        let text = "Here is the page in Markdown and HTML.";
        assert_eq!(split_sections(text), None);
        assert_eq!(
            review_view(text, OutputFormat::Both),
            ReviewView::Raw(text.to_string())
        );
    }

    #[test]
    fn single_marker_or_empty_section_falls_back() {
        assert_eq!(split_sections("## PROPOSED MARKDOWN\n# Title\n"), None);
        assert_eq!(
            split_sections("## PROPOSED MARKDOWN\n\n## PROPOSED HTML/XML\n<p>x</p>"),
            None
        );
    }

    #[test]
    fn out_of_order_markers_fall_back() {
        let text = "## PROPOSED HTML/XML\n<p>x</p>\n## PROPOSED MARKDOWN\nx\n";
        assert_eq!(split_sections(text), None);
    }

    #[test]
    fn single_format_views_show_text_once() {
        assert_eq!(
            review_view("# T", OutputFormat::Markdown),
            ReviewView::Markdown("# T".to_string())
        );
        assert_eq!(
            review_view("<p>t</p>", OutputFormat::Storage),
            ReviewView::Storage("<p>t</p>".to_string())
        );
    }

    #[test]
    fn split_view_copies_the_raw_reply() {
        let view = review_view(WELL_FORMED, OutputFormat::Both);
        assert!(matches!(view, ReviewView::Split { .. }));
        assert_eq!(view.copy_text(WELL_FORMED), WELL_FORMED);
    }
}
