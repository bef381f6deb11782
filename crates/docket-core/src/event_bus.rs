//! EventBus - broadcast-based progress events for analysis runs.
//!
//! The orchestrator publishes one event per phase, step outcome, replan
//! and run completion, in the order they happen, so a web layer can turn
//! them into an SSE or WebSocket feed.

/// Broadcast channel wrapper.
pub mod bus;
/// Run event definitions.
pub mod types;

pub use bus::EventBus;
pub use types::RunEvent;
