//! Gateway domain - authentication, session lifecycle and wire protocol.

pub mod credential;
mod errors;
mod protocol;
mod state;

pub use credential::CredentialValidator;
pub use errors::{GatewayError, CLOSE_GOING_AWAY, CLOSE_NORMAL, CLOSE_POLICY_VIOLATION};
pub use protocol::{ConnectionStatus, InboundTurn, OutboundEvent, TypingStatus};
pub use state::SessionState;
