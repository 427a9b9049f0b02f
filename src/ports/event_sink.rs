//! EventSink port - the outbound half of one client connection.
//!
//! A connection session writes every [`OutboundEvent`] through this port and
//! asks it whether the connection is still open before forwarding each
//! fragment. Implementations must refuse to deliver anything once the
//! connection has closed.

use async_trait::async_trait;

use crate::domain::gateway::OutboundEvent;

/// Port for delivering events to a single connected client.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Queues an event for delivery, in call order.
    ///
    /// Returns `false` without delivering if the connection is closed.
    async fn send(&self, event: OutboundEvent) -> bool;

    /// Closes the connection with a WebSocket close code and reason.
    ///
    /// Events queued before the call are still delivered first. Idempotent.
    async fn close(&self, code: u16, reason: &str);

    /// Returns true while the connection can still deliver events.
    fn is_open(&self) -> bool;
}
