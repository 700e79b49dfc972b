//! Best-effort copy of finalized text to the system clipboard.
use anyhow::Result;
use std::io::Write;
use std::process::{Command, Stdio};

const CANDIDATES: [(&str, &[&str]); 4] = [
    ("pbcopy", &[]),
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
    ("xsel", &["--clipboard", "--input"]),
];

/// Copy `text` with the first clipboard tool that accepts it. `Ok(false)`
/// when none is installed or all of them refuse.
pub fn try_copy_to_clipboard(text: &str) -> Result<bool> {
    for (program, args) in CANDIDATES {
        let mut child = match Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(_) => continue,
        };
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).ok();
        }
        let status = child.wait()?;
        if status.success() {
            tracing::debug!(program, bytes = text.len(), "copied to clipboard");
            return Ok(true);
        }
    }
    Ok(false)
}
