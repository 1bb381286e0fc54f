//! Concrete `InferenceClient` over a single local HTTP backend, grounded in
//! `advisory/provider.rs`'s per-provider `reqwest::Client` + JSON request
//! structs, collapsed to one backend since the abstract contract names only
//! one (spec §6 / §1 Non-goals).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::ndjson::LineSplitter;
use super::{ChatMessage, DeltaStream, InferenceClient, InferenceError, ModelInfo};

const UNREACHABLE_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Run `attempt` once; if it fails with `BackendUnreachable` (never got a
/// response), wait `UNREACHABLE_RETRY_BACKOFF` and try exactly once more.
/// Any other error, or a failure on the retry itself, is returned as-is.
/// This is the only retry the client performs, and only for the
/// "never got a response" case — once a response starts streaming, a
/// dropped connection surfaces as a plain stream error and is never
/// retried (P8).
async fn retry_once_if_unreachable<T, F, Fut>(mut attempt: F) -> Result<T, InferenceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, InferenceError>>,
{
    match attempt().await {
        Err(InferenceError::BackendUnreachable(msg)) => {
            warn!(error = %msg, "backend unreachable before first delta, retrying once");
            tokio::time::sleep(UNREACHABLE_RETRY_BACKOFF).await;
            attempt().await
        }
        other => other,
    }
}

pub struct OllamaShapedClient {
    client: Client,
    base_url: String,
    hard_ceiling: Duration,
}

impl OllamaShapedClient {
    pub fn new(base_url: impl Into<String>, hard_ceiling: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            hard_ceiling,
        }
    }

    fn classify_transport_error(err: &reqwest::Error) -> InferenceError {
        if err.is_timeout() {
            InferenceError::Timeout
        } else if err.is_connect() {
            InferenceError::BackendUnreachable(err.to_string())
        } else {
            InferenceError::BackendError(err.to_string())
        }
    }

    /// Attempt to open the streaming POST once. Distinguishes "never got a
    /// response" (retryable as `backend_unreachable`) from any failure that
    /// happens after bytes start flowing.
    async fn open_stream(
        &self,
        body: &ChatRequestBody<'_>,
    ) -> Result<reqwest::Response, InferenceError> {
        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| Self::classify_transport_error(&e))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(InferenceError::ModelMissing(body.model.to_string()));
        }
        if !resp.status().is_success() {
            return Err(InferenceError::BackendError(format!(
                "backend returned {}",
                resp.status()
            )));
        }
        Ok(resp)
    }
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    options: ChatOptions,
    stream: bool,
}

#[derive(Serialize)]
struct EmbedRequestBody<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(serde::Deserialize)]
struct EmbedResponseBody {
    embedding: Vec<f32>,
}

#[derive(serde::Deserialize)]
struct ListModelsResponseBody {
    models: Vec<ModelInfo>,
}

#[async_trait]
impl InferenceClient for OllamaShapedClient {
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        deadline: Duration,
    ) -> Result<DeltaStream, InferenceError> {
        let body = ChatRequestBody {
            model,
            messages,
            options: ChatOptions { temperature },
            stream: true,
        };

        let mut resp = retry_once_if_unreachable(|| self.open_stream(&body)).await?;

        let hard_ceiling = self.hard_ceiling;
        let stream = async_stream::stream! {
            let start = Instant::now();
            let mut splitter = LineSplitter::new();
            loop {
                if start.elapsed() > hard_ceiling {
                    yield Err(InferenceError::Timeout);
                    return;
                }
                let next = timeout(deadline, resp.chunk()).await;
                let chunk = match next {
                    Ok(Ok(Some(chunk))) => chunk,
                    Ok(Ok(None)) => {
                        for record in splitter.finish() {
                            if let Some(delta) = record.delta {
                                if !delta.is_empty() {
                                    yield Ok(delta);
                                }
                            }
                        }
                        return;
                    }
                    Ok(Err(e)) => {
                        yield Err(OllamaShapedClient::classify_transport_error(&e));
                        return;
                    }
                    Err(_elapsed) => {
                        yield Err(InferenceError::Timeout);
                        return;
                    }
                };

                for record in splitter.push(&chunk) {
                    if let Some(delta) = record.delta {
                        if !delta.is_empty() {
                            debug!(len = delta.len(), "inference delta");
                            yield Ok(delta);
                        }
                    }
                    if record.done {
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, InferenceError> {
        let body = EmbedRequestBody { model, prompt: text };
        let resp = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::classify_transport_error(&e))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(InferenceError::ModelMissing(model.to_string()));
        }
        if !resp.status().is_success() {
            return Err(InferenceError::BackendError(format!(
                "backend returned {}",
                resp.status()
            )));
        }

        let parsed: EmbedResponseBody = resp
            .json()
            .await
            .map_err(|e| InferenceError::BackendError(e.to_string()))?;
        Ok(parsed.embedding)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, InferenceError> {
        let resp = self
            .client
            .get(format!("{}/api/models", self.base_url))
            .send()
            .await
            .map_err(|e| Self::classify_transport_error(&e))?;

        if !resp.status().is_success() {
            return Err(InferenceError::BackendError(format!(
                "backend returned {}",
                resp.status()
            )));
        }

        let parsed: ListModelsResponseBody = resp
            .json()
            .await
            .map_err(|e| InferenceError::BackendError(e.to_string()))?;
        Ok(parsed.models)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn unreachable_then_success_retries_exactly_once() {
        let attempts = AtomicU32::new(0);
        let result = retry_once_if_unreachable(|| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(InferenceError::BackendUnreachable("refused".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2, "exactly one retry");
    }

    #[tokio::test]
    async fn unreachable_twice_surfaces_the_second_failure_without_a_third_attempt() {
        let attempts = AtomicU32::new(0);
        let result = retry_once_if_unreachable(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err::<(), _>(InferenceError::BackendUnreachable("refused again".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(InferenceError::BackendUnreachable(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 2, "never retries a second time");
    }

    #[tokio::test]
    async fn a_non_unreachable_failure_is_never_retried() {
        let attempts = AtomicU32::new(0);
        let result = retry_once_if_unreachable(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err::<(), _>(InferenceError::Timeout) }
        })
        .await;

        assert!(matches!(result, Err(InferenceError::Timeout)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1, "a timeout is not a connection failure");
    }

    #[tokio::test]
    async fn success_on_the_first_attempt_never_retries() {
        let attempts = AtomicU32::new(0);
        let result = retry_once_if_unreachable(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, InferenceError>("ok") }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
