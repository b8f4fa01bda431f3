//! Generative text capability
//!
//! The classifier, the translator and the conversation orchestrator all talk
//! to the model through this trait. Every call carries its full context, so
//! no chat session outlives a single request.

use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;

pub mod gemini;
pub use gemini::GeminiClient;

/// Incremental answer text. Ends on completion or right after the first error.
pub type ChunkStream = BoxStream<'static, Result<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            text: text.into(),
        }
    }
}

/// Everything the model sees for one call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system_instruction: Option<String>,
    pub history: Vec<ChatTurn>,
    pub prompt: String,
}

impl GenerationRequest {
    pub fn with_instruction(
        system_instruction: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            system_instruction: Some(system_instruction.into()),
            history: Vec::new(),
            prompt: prompt.into(),
        }
    }
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// One-shot completion, returns the full response text
    async fn complete(&self, request: &GenerationRequest) -> Result<String>;

    /// Open a streamed completion over a single connection
    async fn stream(&self, request: &GenerationRequest) -> Result<ChunkStream>;
}
