//! Registry of live connection sessions.
//!
//! The endpoint registers a session once it is authenticated and ready, and
//! removes it when the connection closes. Reads (health checks, lookups)
//! vastly outnumber writes, so the map sits behind an `RwLock`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::application::ConnectionSession;
use crate::domain::foundation::ConnectionId;

/// Tracks every live [`ConnectionSession`] by connection id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ConnectionId, Arc<ConnectionSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session, replacing any previous entry with the same id.
    pub async fn register(&self, session: Arc<ConnectionSession>) {
        let id = session.id();
        self.sessions.write().await.insert(id, session);
        tracing::debug!(connection_id = %id, "Session registered");
    }

    /// Removes and returns the session for `id`, if present.
    pub async fn remove(&self, id: &ConnectionId) -> Option<Arc<ConnectionSession>> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            tracing::debug!(connection_id = %id, "Session removed");
        }
        removed
    }

    /// Number of live sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Sends a close frame to every live session and returns how many were
    /// asked to close. Sessions unregister themselves as their connections end.
    pub async fn close_all(&self, code: u16, reason: &str) -> usize {
        let sessions: Vec<Arc<ConnectionSession>> =
            self.sessions.read().await.values().cloned().collect();

        for session in &sessions {
            session.shutdown(code, reason).await;
        }
        sessions.len()
    }

    /// Waits until every session has unregistered or `grace` elapses.
    ///
    /// Returns the number of sessions still registered.
    pub async fn wait_until_empty(&self, grace: Duration) -> usize {
        let deadline = Instant::now() + grace;
        loop {
            let remaining = self.count().await;
            if remaining == 0 || Instant::now() >= deadline {
                return remaining;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}
