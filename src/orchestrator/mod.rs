//! Debate Orchestrator (C5) — the core. Drives RAG → N×(Proposer, Skeptic)
//! → Synthesizer → Score → Persist as a lazy, single-consumer event
//! sequence, matching the `async_stream::stream!` idiom used for the
//! per-connection event channel in `mira-chat/src/server.rs`.

pub mod events;
mod score;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::inference::{ChatMessage, InferenceClient};
use crate::prompt::{self, PromptSource, CRITICAL_SEVERITY_SENTINEL, READINESS_SENTINEL};
use crate::templates::TemplateStore;
use crate::trace::{DebateTrace, ModelsUsed, Round, Timing, TraceStore};

pub use events::DebateEvent;

/// Immutable for the life of one debate (spec.md §3 `DebateConfig`).
#[derive(Debug, Clone)]
pub struct DebateConfig {
    pub min_rounds: u8,
    pub max_rounds: u8,
    pub early_stop_score: u8,
    pub proposer_model: String,
    pub skeptic_model: String,
    pub synthesizer_model: String,
    pub proposer_temp: f32,
    pub skeptic_temp: f32,
    pub synthesizer_temp: f32,
    pub rag_top_k: usize,
    pub similarity_floor: f32,
    pub per_call_timeout: Duration,
}

pub struct DebateDeps {
    pub inference: Arc<dyn InferenceClient>,
    pub templates: Arc<TemplateStore>,
    pub traces: Arc<TraceStore>,
    pub prompts: Arc<dyn PromptSource>,
    pub embedding_model: String,
}

/// Outcome of evaluating the termination predicate after a round.
enum Termination {
    Continue,
    Stop { early_stopped: bool },
}

/// After round R with Skeptic text S (spec.md §4.5).
fn termination_predicate(skeptic_text: &str, round: u32, config: &DebateConfig) -> Termination {
    if skeptic_text.contains(READINESS_SENTINEL) {
        return Termination::Stop { early_stopped: true };
    }
    if round == config.max_rounds as u32 {
        return Termination::Stop { early_stopped: false };
    }
    if round >= config.min_rounds as u32 && !skeptic_text.contains(CRITICAL_SEVERITY_SENTINEL) {
        return Termination::Stop { early_stopped: true };
    }
    Termination::Continue
}

async fn drain_role_stream(
    mut stream: crate::inference::DeltaStream,
) -> Result<String, crate::inference::InferenceError> {
    let mut text = String::new();
    while let Some(delta) = stream.next().await {
        text.push_str(&delta?);
    }
    Ok(text)
}

/// Run one debate to completion, yielding the full typed event sequence.
/// `trace_id` is assigned by the caller (C6 registers it before the
/// orchestrator starts) so the id is known before the first event.
pub fn run(
    trace_id: String,
    query: String,
    config: DebateConfig,
    deps: DebateDeps,
    cancel: CancellationToken,
) -> BoxStream<'static, DebateEvent> {
    let stream = async_stream::stream! {
        let debate_start = Instant::now();
        let created_at = chrono::Utc::now();

        yield DebateEvent::RagStarted;
        let rag_start = Instant::now();
        let templates = match deps
            .templates
            .search(&query, &deps.embedding_model, config.rag_top_k, config.similarity_floor)
            .await
        {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "template retrieval failed");
                yield DebateEvent::Failed { message: e.to_string(), round: None };
                return;
            }
        };
        let rag_ms = rag_start.elapsed().as_millis() as u64;
        let templates_used: Vec<String> = templates.iter().map(|t| t.id.clone()).collect();
        yield DebateEvent::RagCompleted { templates: templates.clone() };

        let mut rounds: Vec<Round> = Vec::new();
        let mut rounds_ms: Vec<u64> = Vec::new();
        let mut early_stopped = false;

        'rounds: for round in 1..=config.max_rounds as u32 {
            if cancel.is_cancelled() {
                yield DebateEvent::Failed { message: "cancelled".to_string(), round: Some(round) };
                return;
            }

            yield DebateEvent::RoundStarted { round };
            let round_start = Instant::now();

            let proposer_input = if round == 1 {
                prompt::proposer_round_one(deps.prompts.proposer(), &templates, &query)
            } else {
                let latest_critique = &rounds.last().unwrap().skeptic_text;
                prompt::proposer_round_n(deps.prompts.proposer(), &rounds, latest_critique)
            };

            yield DebateEvent::ProposerStarted { round };
            let proposer_start = Instant::now();
            let proposer_messages = vec![
                ChatMessage::system(proposer_input.system),
                ChatMessage::user(proposer_input.user),
            ];
            let proposer_stream = match deps
                .inference
                .stream_chat(&config.proposer_model, &proposer_messages, config.proposer_temp, config.per_call_timeout)
                .await
            {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, round, "proposer call failed to start");
                    yield DebateEvent::Failed { message: e.to_string(), round: Some(round) };
                    return;
                }
            };

            let mut proposer_text = String::new();
            let mut proposer_stream = proposer_stream;
            let proposer_failed = loop {
                match proposer_stream.next().await {
                    Some(Ok(delta)) => {
                        proposer_text.push_str(&delta);
                        yield DebateEvent::ProposerDelta { round, text: delta };
                    }
                    Some(Err(e)) => break Some(e),
                    None => break None,
                }
            };
            if let Some(e) = proposer_failed {
                yield DebateEvent::Failed { message: e.to_string(), round: Some(round) };
                return;
            }
            let proposer_duration_ms = proposer_start.elapsed().as_millis() as u64;
            yield DebateEvent::ProposerCompleted {
                round,
                text: proposer_text.clone(),
                duration_ms: proposer_duration_ms,
            };

            if cancel.is_cancelled() {
                yield DebateEvent::Failed { message: "cancelled".to_string(), round: Some(round) };
                return;
            }

            let skeptic_input = prompt::skeptic_round(
                deps.prompts.skeptic(),
                &proposer_text,
                &rounds,
                round,
                config.max_rounds as u32,
            );
            yield DebateEvent::SkepticStarted { round };
            let skeptic_start = Instant::now();
            let skeptic_messages = vec![
                ChatMessage::system(skeptic_input.system),
                ChatMessage::user(skeptic_input.user),
            ];
            let skeptic_stream = match deps
                .inference
                .stream_chat(&config.skeptic_model, &skeptic_messages, config.skeptic_temp, config.per_call_timeout)
                .await
            {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, round, "skeptic call failed to start");
                    yield DebateEvent::Failed { message: e.to_string(), round: Some(round) };
                    return;
                }
            };

            let mut skeptic_text = String::new();
            let mut skeptic_stream = skeptic_stream;
            let skeptic_failed = loop {
                match skeptic_stream.next().await {
                    Some(Ok(delta)) => {
                        skeptic_text.push_str(&delta);
                        yield DebateEvent::SkepticDelta { round, text: delta };
                    }
                    Some(Err(e)) => break Some(e),
                    None => break None,
                }
            };
            if let Some(e) = skeptic_failed {
                yield DebateEvent::Failed { message: e.to_string(), round: Some(round) };
                return;
            }
            let skeptic_duration_ms = skeptic_start.elapsed().as_millis() as u64;
            yield DebateEvent::SkepticCompleted {
                round,
                text: skeptic_text.clone(),
                duration_ms: skeptic_duration_ms,
            };

            rounds.push(Round {
                round,
                proposer_text,
                skeptic_text: skeptic_text.clone(),
                proposer_duration_ms,
                skeptic_duration_ms,
            });
            rounds_ms.push(round_start.elapsed().as_millis() as u64);

            match termination_predicate(&skeptic_text, round, &config) {
                Termination::Stop { early_stopped: stopped } => {
                    early_stopped = stopped;
                    if stopped {
                        yield DebateEvent::EarlyStop { round };
                    }
                    break 'rounds;
                }
                Termination::Continue => continue,
            }
        }

        if cancel.is_cancelled() {
            yield DebateEvent::Failed { message: "cancelled".to_string(), round: None };
            return;
        }

        yield DebateEvent::SynthesisStarted;
        let synthesis_start = Instant::now();
        let synth_input = prompt::synthesizer(deps.prompts.synthesizer(), &query, &rounds);
        let synth_messages = vec![
            ChatMessage::system(synth_input.system),
            ChatMessage::user(synth_input.user),
        ];
        let synth_stream = match deps
            .inference
            .stream_chat(&config.synthesizer_model, &synth_messages, config.synthesizer_temp, config.per_call_timeout)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "synthesizer call failed to start");
                yield DebateEvent::Failed { message: e.to_string(), round: None };
                return;
            }
        };

        let mut final_answer = String::new();
        let mut synth_stream = synth_stream;
        let synth_failed = loop {
            match synth_stream.next().await {
                Some(Ok(delta)) => {
                    final_answer.push_str(&delta);
                    yield DebateEvent::SynthesisDelta { text: delta };
                }
                Some(Err(e)) => break Some(e),
                None => break None,
            }
        };
        if let Some(e) = synth_failed {
            yield DebateEvent::Failed { message: e.to_string(), round: None };
            return;
        }
        let synthesis_ms = synthesis_start.elapsed().as_millis() as u64;
        yield DebateEvent::SynthesisCompleted { text: final_answer.clone(), duration_ms: synthesis_ms };

        // Auto-score failure is non-fatal (spec.md §4.5(d), §9).
        let auto_score = {
            let scorer_input = prompt::auto_scorer(deps.prompts.scorer(), &query, &final_answer);
            let scorer_messages = vec![
                ChatMessage::system(scorer_input.system),
                ChatMessage::user(scorer_input.user),
            ];
            match deps
                .inference
                .stream_chat(&config.synthesizer_model, &scorer_messages, 0.0, config.per_call_timeout)
                .await
            {
                Ok(stream) => match drain_role_stream(stream).await {
                    Ok(raw) => Some(score::parse_auto_score(&raw)),
                    Err(e) => {
                        warn!(error = %e, "auto-score call failed mid-stream");
                        None
                    }
                },
                Err(e) => {
                    warn!(error = %e, "auto-score call failed to start");
                    None
                }
            }
        };

        let total_ms = debate_start.elapsed().as_millis() as u64;
        let trace = DebateTrace {
            id: trace_id,
            created_at,
            query,
            templates_used,
            rounds,
            final_answer,
            early_stopped,
            auto_score,
            user_rating: None,
            models: ModelsUsed {
                proposer: config.proposer_model,
                skeptic: config.skeptic_model,
                synthesizer: config.synthesizer_model,
                embedding: deps.embedding_model,
            },
            timing: Timing { total_ms, rag_ms, rounds_ms, synthesis_ms },
        };

        match deps.traces.save(&trace).await {
            Ok(()) => {
                info!(trace_id = %trace.id, rounds = trace.rounds.len(), "debate completed");
                yield DebateEvent::Completed { trace: Box::new(trace) };
            }
            Err(e) => {
                error!(error = %e, trace_id = %trace.id, "trace save failed");
                yield DebateEvent::Failed { message: e.to_string(), round: None };
            }
        }
    };

    Box::pin(stream)
}

/// Assign a fresh debate/trace id. Trace ids are UUIDv4 strings, matching the
/// teacher's session-id convention throughout `advisory/session.rs`.
pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}
