//! Stable wire-level sentinel strings (spec §6). Changing either requires
//! updating both `prompts/skeptic.txt` and the orchestrator's termination
//! predicate in the same change.

/// Literal string the Skeptic emits to signal the proposal is ready.
pub const READINESS_SENTINEL: &str = "READY_FOR_SYNTHESIS";

/// Literal string the Skeptic emits to flag a critical, unresolved issue.
pub const CRITICAL_SEVERITY_SENTINEL: &str = "CRITICAL_ISSUE";
