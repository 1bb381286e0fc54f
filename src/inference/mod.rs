//! Inference Client (C1) — streams tokens from the local chat backend,
//! embeds text, and enumerates installed models.
//!
//! Grounded in `advisory/provider.rs` (the provider trait + per-backend
//! request building) and `advisory/streaming.rs` (the NDJSON/SSE line
//! splitter loop), generalized to the single abstract local backend named in
//! the external-interfaces contract instead of one struct per cloud vendor.

mod client;
mod ndjson;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::OllamaShapedClient;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A message role in a chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Installed-model summary, as returned by `list_models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(rename = "sizeBytes")]
    pub size_bytes: u64,
    #[serde(rename = "modifiedAt")]
    pub modified_at: chrono::DateTime<chrono::Utc>,
}

/// Failure taxonomy for every C1 operation (spec.md §4.1).
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("inference call exceeded its deadline")]
    Timeout,
    #[error("inference backend unreachable: {0}")]
    BackendUnreachable(String),
    #[error("model not installed: {0}")]
    ModelMissing(String),
    #[error("inference backend error: {0}")]
    BackendError(String),
}

impl InferenceError {
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceError::Timeout => "timeout",
            InferenceError::BackendUnreachable(_) => "backend_unreachable",
            InferenceError::ModelMissing(_) => "model_missing",
            InferenceError::BackendError(_) => "backend_error",
        }
    }
}

/// A lazy sequence of UTF-8 text deltas; concatenating every item in arrival
/// order reconstructs the model's full reply (P2).
pub type DeltaStream = BoxStream<'static, Result<String, InferenceError>>;

/// Abstract streaming-chat contract every inference backend must satisfy.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Stream a chat completion. Suspends per-delta while the backend
    /// produces output; never retries once a delta has been observed.
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        deadline: Duration,
    ) -> Result<DeltaStream, InferenceError>;

    /// Embed `text` with `model`, returning a fixed-dimension vector.
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, InferenceError>;

    /// Enumerate installed models.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, InferenceError>;
}
