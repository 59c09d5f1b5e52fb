//! Gemini client for subtitle segmentation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Separator the model is asked to put between lines.
pub const SEGMENT_SEPARATOR: &str = "|||";

/// AI text segmentation seam.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextSegmentation: Send + Sync {
    /// Split `text` into subtitle lines of at most `max_len` characters.
    async fn segment_text(&self, text: &str, max_len: usize) -> WorkerResult<Vec<String>>;
}

/// Gemini API client.
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> WorkerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WorkerError::config_error(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        })
    }

    /// Point the client at another endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_prompt(text: &str, max_len: usize) -> String {
        format!(
            r#"You are a professional video subtitle editor.
Segment the text below into natural, semantically complete subtitle lines.

Rules:
1. Each line has at most {max_len} characters.
2. Separate lines with "{SEGMENT_SEPARATOR}".
3. Never put line breaks inside a line.
4. Remove all punctuation marks such as ，。？！「」".,?! but keep decimal points and percent signs inside numbers.
5. Merge short phrases that fit within the limit into one line.
6. Output only the lines and separators. No markdown, no explanations.

Example (max 16):
甚至有網友笑說台灣人對Threads的熱情|||已經發展出獨特的社群文化

Text:
{text}
"#
        )
    }

    async fn call_api(&self, prompt: String) -> WorkerResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| WorkerError::ai_failed(format!("Gemini API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WorkerError::ai_failed(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| WorkerError::ai_failed(format!("Failed to parse Gemini response: {}", e)))?;

        let text: String = gemini_response
            .candidates
            .first()
            .map(|c| c.content.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(WorkerError::ai_failed("No content in Gemini response"));
        }
        Ok(text)
    }
}

/// Split a model reply into trimmed non-empty lines.
pub fn parse_segments(reply: &str) -> Vec<String> {
    let reply = reply.trim();
    let reply = reply.strip_prefix("```text").or_else(|| reply.strip_prefix("```")).unwrap_or(reply);
    let reply = reply.strip_suffix("```").unwrap_or(reply);

    reply
        .split(SEGMENT_SEPARATOR)
        .map(|s| s.replace(['\r', '\n'], " ").trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[async_trait]
impl TextSegmentation for GeminiClient {
    async fn segment_text(&self, text: &str, max_len: usize) -> WorkerResult<Vec<String>> {
        let reply = self.call_api(Self::build_prompt(text, max_len)).await?;
        let segments = parse_segments(&reply);
        if segments.is_empty() {
            return Err(WorkerError::ai_failed("Gemini returned no segments"));
        }
        debug!("Gemini produced {} segments", segments.len());
        Ok(segments)
    }
}
