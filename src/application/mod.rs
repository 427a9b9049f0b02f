//! Application layer - per-connection session orchestration.
//!
//! Coordinates the gateway domain with the dialogue and event-sink ports.

mod session;

pub use session::{ConnectionSession, PendingTurn, TurnOutcome};
