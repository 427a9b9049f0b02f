//! Lifecycle of a connection session.

use serde::Serialize;
use std::fmt;

use crate::domain::foundation::StateMachine;

/// Where a connection session is in its lifecycle.
///
/// ```text
/// Unauthenticated ──► Ready ◄──► Processing
///        │              │            │
///        └──────────────┴────────────┴──► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Connection accepted, credential not yet checked.
    #[default]
    Unauthenticated,
    /// Authenticated and holding a dialogue context; idle.
    Ready,
    /// A turn is streaming.
    Processing,
    /// Terminal.
    Closed,
}

impl SessionState {
    /// Returns true once the session has been closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

impl StateMachine for SessionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            (Unauthenticated, Ready)
                | (Unauthenticated, Closed)
                | (Ready, Processing)
                | (Ready, Closed)
                | (Processing, Ready)
                | (Processing, Closed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SessionState::*;
        match self {
            Unauthenticated => vec![Ready, Closed],
            Ready => vec![Processing, Closed],
            Processing => vec![Ready, Closed],
            Closed => vec![],
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Ready => "ready",
            SessionState::Processing => "processing",
            SessionState::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}
