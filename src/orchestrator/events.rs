//! The tagged event sequence a debate emits (spec.md §4.5), mirroring the
//! `#[serde(tag = "type")]` shape of `mira-chat/src/server.rs::ChatEvent`.

use serde::Serialize;

use crate::templates::TemplateRef;
use crate::trace::DebateTrace;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DebateEvent {
    RagStarted,
    RagCompleted { templates: Vec<TemplateRef> },
    RoundStarted { round: u32 },
    ProposerStarted { round: u32 },
    ProposerDelta { round: u32, text: String },
    ProposerCompleted { round: u32, text: String, duration_ms: u64 },
    SkepticStarted { round: u32 },
    SkepticDelta { round: u32, text: String },
    SkepticCompleted { round: u32, text: String, duration_ms: u64 },
    EarlyStop { round: u32 },
    SynthesisStarted,
    SynthesisDelta { text: String },
    SynthesisCompleted { text: String, duration_ms: u64 },
    Completed { trace: Box<DebateTrace> },
    Failed { message: String, round: Option<u32> },
}

impl DebateEvent {
    /// Terminal events close the stream and must never be dropped by the
    /// broker's back-pressure policy (spec.md §5).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DebateEvent::Completed { .. } | DebateEvent::Failed { .. } | DebateEvent::EarlyStop { .. }
        )
    }
}
