//! Local command backend.
//!
//! Runs a user-configured command (`llm`, `ollama run`, a wrapper script)
//! with the prompt on stdin and takes stdout as the completion. A `{model}`
//! argument is replaced with the model name for the requested tier.
use super::{Completion, LanguageModel, ModelNames, ModelTier};
use anyhow::{anyhow, Context, Result};
use std::io::{ErrorKind, Read, Write};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

pub struct CommandModel {
    command: String,
    models: ModelNames,
    timeout: Duration,
}

impl CommandModel {
    pub fn new(command: String, models: ModelNames, timeout: Duration) -> Self {
        Self {
            command,
            models,
            timeout,
        }
    }

    fn argv(&self, tier: ModelTier) -> Result<Vec<String>> {
        let mut args = shell_words::split(&self.command)
            .with_context(|| format!("parse LM command: {}", self.command))?;
        if args.is_empty() {
            return Err(anyhow!("LM command is empty"));
        }
        let model = self.models.for_tier(tier);
        for arg in &mut args {
            if arg == "{model}" {
                *arg = model.to_string();
            }
        }
        Ok(args)
    }
}

/// Drain a child pipe on its own thread so a full pipe never blocks the child.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn join_output(handle: JoinHandle<std::io::Result<Vec<u8>>>, name: &str) -> Result<Vec<u8>> {
    handle
        .join()
        .map_err(|_| anyhow!("LM {name} reader panicked"))?
        .with_context(|| format!("read LM {name}"))
}

impl LanguageModel for CommandModel {
    fn complete(&self, tier: ModelTier, prompt: &str) -> Result<Completion> {
        let args = self.argv(tier)?;
        let start = Instant::now();
        let mut child = Command::new(&args[0])
            .args(&args[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn LM command: {}", args[0]))?;

        let stdin = child.stdin.take();
        let prompt_bytes = prompt.as_bytes().to_vec();
        let writer = thread::spawn(move || match stdin {
            Some(mut stdin) => stdin.write_all(&prompt_bytes),
            None => Ok(()),
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            if let Some(status) = child.try_wait().context("check LM command status")? {
                break status;
            }
            if start.elapsed() > self.timeout {
                child.kill().ok();
                child.wait().ok();
                tracing::warn!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "lm command timed out"
                );
                return Err(anyhow!("LM command timed out after {}s", self.timeout.as_secs()));
            }
            thread::sleep(POLL_INTERVAL);
        };

        match writer.join() {
            Ok(Ok(())) => {}
            // The command may exit without reading all of its input.
            Ok(Err(err)) if err.kind() == ErrorKind::BrokenPipe => {
                tracing::debug!("LM command closed stdin early");
            }
            Ok(Err(err)) => return Err(err).context("write prompt to LM stdin"),
            Err(_) => return Err(anyhow!("LM stdin writer panicked")),
        }
        let stdout = join_output(stdout, "stdout")?;
        let stderr = join_output(stderr, "stderr")?;
        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_bytes = prompt.len(),
            response_bytes = stdout.len(),
            "lm invoke complete"
        );

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(anyhow!(
                "LM command failed with status {}: {}",
                status,
                stderr.trim()
            ));
        }

        let text = String::from_utf8(stdout).context("decode LM stdout as UTF-8")?;
        Ok(Completion { text, usage: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn names() -> ModelNames {
        ModelNames {
            standard: "small".to_string(),
            advanced: "large".to_string(),
        }
    }

    #[test]
    fn model_placeholder_follows_tier() {
        let model = CommandModel::new(
            "llm -m {model} --no-stream".to_string(),
            names(),
            TIMEOUT,
        );
        assert_eq!(
            model.argv(ModelTier::Advanced).expect("argv"),
            vec!["llm", "-m", "large", "--no-stream"]
        );
        assert_eq!(model.argv(ModelTier::Standard).expect("argv")[2], "small");
    }

    #[test]
    fn empty_command_is_rejected() {
        let model = CommandModel::new("   ".to_string(), names(), TIMEOUT);
        assert!(model.argv(ModelTier::Standard).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn stdout_becomes_completion_text() {
        let model = CommandModel::new("cat".to_string(), names(), TIMEOUT);
        let completion = model
            .complete(ModelTier::Standard, "echoed prompt")
            .expect("completion");
        assert_eq!(completion.text, "echoed prompt");
        assert_eq!(completion.usage, None);
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_reports_status() {
        let model = CommandModel::new(
            "sh -c \"cat >/dev/null; exit 3\"".to_string(),
            names(),
            TIMEOUT,
        );
        let err = model
            .complete(ModelTier::Standard, "ignored")
            .expect_err("command fails");
        assert!(err.to_string().contains("LM command failed"));
    }

    #[cfg(unix)]
    #[test]
    fn large_prompt_streams_through_command() {
        let model = CommandModel::new("cat".to_string(), names(), TIMEOUT);
        let prompt = "x".repeat(1024 * 1024);
        let completion = model
            .complete(ModelTier::Standard, &prompt)
            .expect("completion");
        assert_eq!(completion.text.len(), prompt.len());
        assert_eq!(completion.text, prompt);
    }

    #[cfg(unix)]
    #[test]
    fn slow_command_is_killed_at_timeout() {
        let model = CommandModel::new(
            "sh -c \"sleep 30\"".to_string(),
            names(),
            Duration::from_secs(1),
        );
        let start = Instant::now();
        let err = model
            .complete(ModelTier::Standard, "ignored")
            .expect_err("command times out");
        assert!(err.to_string().contains("timed out"), "unexpected error: {err}");
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
