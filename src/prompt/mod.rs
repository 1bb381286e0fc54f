//! Prompt Assembler (C4) — pure functions that build role inputs for the
//! inference client from debate state. Grounded in the preference for small
//! pure formatting helpers (`synthesis::to_markdown`-style functions in
//! `advisory/synthesis.rs`) rather than a templating engine.

mod source;
mod sentinels;

pub use sentinels::{CRITICAL_SEVERITY_SENTINEL, READINESS_SENTINEL};
pub use source::{FilesystemPromptSource, PromptSource, PromptSourceError};

use crate::templates::TemplateRef;
use crate::trace::Round;

/// A `{system, user}` message pair for one role call.
#[derive(Debug, Clone)]
pub struct RoleInput {
    pub system: String,
    pub user: String,
}

/// Format one retrieved template as a single block: name, score,
/// description, body.
pub fn format_template_block(t: &TemplateRef) -> String {
    format!(
        "### {} (score {:.2})\n{}\n\n{}",
        t.name, t.score, t.description, t.body
    )
}

pub fn format_templates(templates: &[TemplateRef]) -> String {
    templates.iter().map(format_template_block).collect::<Vec<_>>().join("\n\n")
}

/// Digest prior rounds into a compact numbered transcript.
pub fn format_prior_rounds(rounds: &[Round]) -> String {
    rounds
        .iter()
        .map(|r| {
            format!(
                "Round {}:\nProposer: {}\nSkeptic: {}",
                r.round, r.proposer_text, r.skeptic_text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Format the full round-by-round transcript for the Synthesizer.
pub fn format_transcript(rounds: &[Round]) -> String {
    format_prior_rounds(rounds)
}

pub fn proposer_round_one(system: &str, templates: &[TemplateRef], query: &str) -> RoleInput {
    let user = format!(
        "Retrieved reasoning templates:\n\n{}\n\nQuery:\n{}",
        format_templates(templates),
        query
    );
    RoleInput { system: system.to_string(), user }
}

pub fn proposer_round_n(system: &str, prior_rounds: &[Round], latest_critique: &str) -> RoleInput {
    let user = format!(
        "Prior rounds:\n{}\n\nThe Skeptic's most recent critique:\n{}\n\nAddress each point raised.",
        format_prior_rounds(prior_rounds),
        latest_critique
    );
    RoleInput { system: system.to_string(), user }
}

/// Skeptic wording escalates: full critique (round 1), focus on unresolved
/// items (middle rounds), final-round framing (round == max).
pub fn skeptic_round(
    system: &str,
    proposer_text: &str,
    prior_rounds: &[Round],
    round: u32,
    max_rounds: u32,
) -> RoleInput {
    let framing = if round == 1 {
        "Give a full critique of this proposal."
    } else if round == max_rounds {
        "This is the final round. Either declare readiness or flag any remaining critical issue."
    } else {
        "Focus only on points from prior rounds that remain unresolved."
    };

    let user = format!(
        "Round {round} of {max_rounds}.\n{framing}\n\nPrior rounds:\n{}\n\nProposer's round {round} text:\n{}",
        format_prior_rounds(prior_rounds),
        proposer_text
    );
    RoleInput { system: system.to_string(), user }
}

pub fn synthesizer(system: &str, query: &str, rounds: &[Round]) -> RoleInput {
    let user = format!("Query:\n{}\n\nFull transcript:\n{}", query, format_transcript(rounds));
    RoleInput { system: system.to_string(), user }
}

pub fn auto_scorer(system: &str, query: &str, final_answer: &str) -> RoleInput {
    let user = format!("Query:\n{query}\n\nFinal answer:\n{final_answer}");
    RoleInput { system: system.to_string(), user }
}
