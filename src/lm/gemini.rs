//! Gemini generate-content client over blocking HTTP.
use super::{Completion, LanguageModel, ModelNames, ModelTier, TokenUsage};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiModel {
    agent: ureq::Agent,
    api_key: String,
    models: ModelNames,
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

impl GeminiModel {
    pub fn new(api_key: String, models: ModelNames, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            agent,
            api_key,
            models,
        }
    }
}

impl LanguageModel for GeminiModel {
    fn complete(&self, tier: ModelTier, prompt: &str) -> Result<Completion> {
        let model = self.models.for_tier(tier);
        let url = format!("{BASE_URL}/{model}:generateContent");
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
        };

        let start = Instant::now();
        let mut response = self
            .agent
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .send_json(&request)
            .map_err(|err| match err {
                ureq::Error::StatusCode(status) => {
                    anyhow!("Gemini API returned HTTP {status} for model {model}")
                }
                other => anyhow!("Gemini API request failed: {other}"),
            })?;
        let parsed: GenerateContentResponse = response
            .body_mut()
            .read_json()
            .context("parse Gemini response")?;

        let completion = into_completion(parsed)?;
        tracing::info!(
            model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_bytes = prompt.len(),
            response_bytes = completion.text.len(),
            "lm invoke complete"
        );
        Ok(completion)
    }
}

fn into_completion(response: GenerateContentResponse) -> Result<Completion> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .filter(|text| !text.is_empty())
        .ok_or_else(|| anyhow!("Gemini API returned no text in the response candidates"))?;
    let usage = response.usage_metadata.map(|usage| TokenUsage {
        prompt_tokens: usage.prompt_token_count,
        completion_tokens: usage.candidates_token_count,
    });
    Ok(Completion { text, usage })
}
