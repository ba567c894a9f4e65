//! Hosted generative-AI access.
//!
//! Handlers talk to the vendor only through the [`AiProvider`] trait so tests
//! can swap in a scripted provider.  [`OpenAiClient`] is the production
//! implementation against an OpenAI-compatible REST API.

mod openai;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use openai::OpenAiClient;

/// Errors from the AI vendor.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("No API key configured for the AI provider")]
    MissingApiKey,

    #[error("Cannot connect to AI provider at {0}")]
    Connection(String),

    #[error("AI request timed out after {0}s")]
    Timeout(u64),

    #[error("AI provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse AI response: {0}")]
    ResponseParsing(String),

    #[error("AI provider returned no content")]
    EmptyResponse,

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// One system + user exchange with a chat model.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    /// `WIDTHxHEIGHT`, one of the sizes the image model accepts.
    pub size: String,
}

#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub model: String,
    pub language: String,
    pub temperature: f32,
    pub file_name: String,
    pub content_type: Option<String>,
    pub audio: Bytes,
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Return the assistant's reply text.
    async fn chat(&self, request: ChatRequest) -> Result<String, AiError>;

    /// Return the URL of the generated image.
    async fn generate_image(&self, request: ImageRequest) -> Result<String, AiError>;

    /// Return the transcribed text.
    async fn transcribe(&self, request: TranscriptionRequest) -> Result<String, AiError>;
}
