/// Browser link for a page, used in candidate listings and the action step.
pub fn page_url(base_url: &str, page_id: &str) -> String {
    format!("{base_url}/pages/viewpage.action?pageId={page_id}")
}

/// Fill `{name}` placeholders in one pass, so substituted text is never
/// rescanned for further placeholders. Unknown placeholders are kept.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn truncate_string(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut truncated = String::new();
    for ch in text.chars() {
        if truncated.len() + ch.len_utf8() > max_bytes {
            break;
        }
        truncated.push(ch);
    }
    truncated
}

/// Truncate for display, marking the cut with an ellipsis.
pub fn preview(text: &str, max_bytes: usize) -> String {
    let truncated = truncate_string(text, max_bytes);
    if truncated.len() < text.len() {
        format!("{truncated}...")
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_string("héllo", 2), "h");
        assert_eq!(truncate_string("héllo", 3), "hé");
        assert_eq!(truncate_string("abc", 10), "abc");
    }

    #[test]
    fn preview_marks_cut_text() {
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("abc", 3), "abc");
    }

    #[test]
    fn fill_template_is_single_pass() {
        let filled = fill_template(
            "Title: {title}\nBody: {body} {unknown}",
            &[("title", "{body}"), ("body", "<p>x</p>")],
        );
        assert_eq!(filled, "Title: {body}\nBody: <p>x</p> {unknown}");
    }

    #[test]
    fn page_url_points_at_viewpage_action() {
        assert_eq!(
            page_url("https://wiki.example.com", "42"),
            "https://wiki.example.com/pages/viewpage.action?pageId=42"
        );
    }
}
