//! An in-process `InferenceClient` test double, loosely grounded in the
//! fixed-response mock provider style under `backend/src/testing/mock_llm/`
//! (a scripted responder standing in for a real model during tests).

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;

use super::{ChatMessage, DeltaStream, InferenceClient, InferenceError, ModelInfo};

/// One scripted reply: either a sequence of text deltas, or an error to
/// surface from `stream_chat`.
pub enum ScriptedReply {
    Deltas(Vec<String>),
    Error(InferenceError),
    /// Emits the given deltas successfully, then fails mid-stream — for
    /// exercising "no retry once a delta has been observed" (P8).
    DeltasThenError(Vec<String>, InferenceError),
}

/// Replies are consumed in call order; `embed` always returns a fixed
/// deterministic vector derived from the input length so similarity
/// ordering in tests is reproducible without a real embedding model.
pub struct FakeInferenceClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
}

impl FakeInferenceClient {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self { replies: Mutex::new(replies.into()) }
    }
}

#[async_trait]
impl InferenceClient for FakeInferenceClient {
    async fn stream_chat(
        &self,
        _model: &str,
        _messages: &[ChatMessage],
        _temperature: f32,
        _deadline: Duration,
    ) -> Result<DeltaStream, InferenceError> {
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScriptedReply::Deltas(vec!["ok".to_string()]));
        match reply {
            ScriptedReply::Deltas(deltas) => {
                Ok(Box::pin(stream::iter(deltas.into_iter().map(Ok))))
            }
            ScriptedReply::Error(e) => Ok(Box::pin(stream::iter(vec![Err(e)]))),
            ScriptedReply::DeltasThenError(deltas, e) => {
                let mut items: Vec<Result<String, InferenceError>> =
                    deltas.into_iter().map(Ok).collect();
                items.push(Err(e));
                Ok(Box::pin(stream::iter(items)))
            }
        }
    }

    async fn embed(&self, _model: &str, text: &str) -> Result<Vec<f32>, InferenceError> {
        let seed = text.len() as f32;
        Ok(vec![seed.sin(), seed.cos(), (seed / 2.0).sin()])
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, InferenceError> {
        Ok(vec![ModelInfo {
            name: "fake-model".to_string(),
            size_bytes: 0,
            modified_at: chrono::Utc::now(),
        }])
    }
}
