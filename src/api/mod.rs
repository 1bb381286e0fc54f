//! HTTP Surface (C7) — thin adapter over the orchestrator, broker, and trace
//! store. See `router.rs` for the route table and `handlers.rs` for request
//! handling.

pub mod error;
mod handlers;
pub mod router;
mod types;

pub use router::build_router;
