//! Gemini API client
//!
//! Uses a long-lived reqwest::Client for connection pooling.
//! `complete` calls `generateContent`; `stream` calls
//! `streamGenerateContent?alt=sse` and yields the text of every event.

use super::{ChatTurn, ChunkStream, GenerationRequest, GenerativeModel, TurnRole};
use crate::error::AssistantError;
use crate::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, error, info};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    fn endpoint(&self, method: &str, extra_query: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(AssistantError::LlmError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        Ok(format!(
            "{}/models/{}:{}?{}key={}",
            self.base_url, self.model, method, extra_query, self.api_key
        ))
    }

    async fn post(&self, url: &str, request: &GenerationRequest) -> Result<reqwest::Response> {
        let body = build_request(request);

        let response = self.client.post(url).json(&body).send().await.map_err(|e| {
            error!("Gemini API request failed: {}", e);
            AssistantError::LlmError(format!("Gemini API error: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response ({}): {}", status, error_text);
            return Err(AssistantError::LlmError(format!(
                "Gemini API error {}: {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let url = self.endpoint("generateContent", "")?;

        debug!(model = %self.model, "Calling Gemini generateContent");
        let response = self.post(&url, request).await?;

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AssistantError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        if gemini_response.candidates.is_empty() {
            return Err(AssistantError::LlmError(
                "No response from Gemini API".to_string(),
            ));
        }

        Ok(gemini_response.text())
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<ChunkStream> {
        let url = self.endpoint("streamGenerateContent", "alt=sse&")?;

        info!(model = %self.model, "Opening Gemini response stream");
        let response = self.post(&url, request).await?;

        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map(|bytes| bytes.to_vec()).map_err(|e| {
                    AssistantError::StreamError(format!("Gemini stream interrupted: {}", e))
                })
            })
            .boxed();

        Ok(sse_chunks(body))
    }
}

//
// ================= Wire Types =================
//

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GeminiResponse {
    /// Text of the first candidate, all parts joined
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

fn role_name(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "user",
        TurnRole::Model => "model",
    }
}

fn turn_content(turn: &ChatTurn) -> Content {
    Content {
        role: Some(role_name(turn.role).to_string()),
        parts: vec![Part {
            text: turn.text.clone(),
        }],
    }
}

fn build_request(request: &GenerationRequest) -> GeminiRequest {
    let mut contents: Vec<Content> = request.history.iter().map(turn_content).collect();
    contents.push(turn_content(&ChatTurn::user(request.prompt.clone())));

    GeminiRequest {
        contents,
        generation_config: GenerationConfig {
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 2048,
        },
        system_instruction: request.system_instruction.as_ref().map(|text| SystemInstruction {
            parts: vec![Part { text: text.clone() }],
        }),
    }
}

//
// ================= SSE Decoding =================
//

/// Extract the chunk text from one `data:` payload
fn parse_stream_payload(data: &str) -> Result<String> {
    let response: GeminiResponse = serde_json::from_str(data)
        .map_err(|e| AssistantError::StreamError(format!("malformed stream event: {}", e)))?;
    Ok(response.text())
}

struct SseState {
    body: BoxStream<'static, Result<Vec<u8>>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

impl SseState {
    fn drain_lines(&mut self, flush: bool) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if !self.accept_line(&line) {
                return;
            }
        }

        if flush && !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.accept_line(&rest);
        }
    }

    /// Returns false once an error was queued
    fn accept_line(&mut self, raw: &[u8]) -> bool {
        let line = String::from_utf8_lossy(raw);
        let Some(data) = line.trim().strip_prefix("data:") else {
            return true;
        };

        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            return true;
        }

        match parse_stream_payload(data) {
            Ok(text) => {
                if !text.is_empty() {
                    self.pending.push_back(Ok(text));
                }
                true
            }
            Err(e) => {
                self.pending.push_back(Err(e));
                self.finished = true;
                false
            }
        }
    }
}

/// Turn a raw SSE byte stream into text chunks, stopping after the first error
fn sse_chunks(body: BoxStream<'static, Result<Vec<u8>>>) -> ChunkStream {
    let state = SseState {
        body,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                    state.finished = true;
                }
                return Some((item, state));
            }

            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.extend_from_slice(&bytes);
                    state.drain_lines(false);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    state.pending.push_back(Err(e));
                }
                None => {
                    state.drain_lines(true);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}
