//! Per-connection outbound channel.
//!
//! Every connection gets one writer task that owns the socket's send half.
//! Sessions never touch the socket; they push events into a bounded channel
//! through [`ConnectionHandle`], which implements the `EventSink` port.
//!
//! The handle flips to closed the moment a close is requested or the peer
//! goes away, so nothing is queued for a connection that can no longer
//! receive it.
//!
//! The writer also pings the peer on a fixed interval. A live client answers
//! with a pong, which the reader counts as activity for the idle timer.

use std::borrow::Cow;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message};
use futures::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::domain::foundation::ConnectionId;
use crate::domain::gateway::OutboundEvent;
use crate::ports::EventSink;

/// Commands consumed by the writer task.
#[derive(Debug)]
enum WriterCommand {
    Text(String),
    Close { code: u16, reason: String },
}

/// Sending half of one client connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<WriterCommand>,
    open: Arc<AtomicBool>,
}

impl ConnectionHandle {
    /// Spawns the writer task for `sink` and returns a handle to it.
    ///
    /// When `ping_interval` is set the writer sends a ping frame every
    /// interval. The task ends after sending a close frame, on the first
    /// write error, or once every handle has been dropped.
    pub fn spawn<S, E>(
        id: ConnectionId,
        sink: S,
        buffer: usize,
        ping_interval: Option<Duration>,
    ) -> (Self, JoinHandle<()>)
    where
        S: Sink<Message, Error = E> + Unpin + Send + 'static,
        E: Display + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let open = Arc::new(AtomicBool::new(true));
        let heartbeat = ping_interval.filter(|p| !p.is_zero()).map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let writer = tokio::spawn(write_loop(id, sink, rx, heartbeat, open.clone()));

        (Self { id, tx, open }, writer)
    }

    /// Marks the connection closed without sending a close frame.
    ///
    /// Used when the peer has already gone away.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }
}

async fn write_loop<S, E>(
    id: ConnectionId,
    mut sink: S,
    mut rx: mpsc::Receiver<WriterCommand>,
    mut heartbeat: Option<Interval>,
    open: Arc<AtomicBool>,
) where
    S: Sink<Message, Error = E> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    loop {
        let (message, last) = tokio::select! {
            command = rx.recv() => match command {
                Some(WriterCommand::Text(text)) => (Message::Text(text), false),
                Some(WriterCommand::Close { code, reason }) => (
                    Message::Close(Some(CloseFrame {
                        code,
                        reason: Cow::Owned(reason),
                    })),
                    true,
                ),
                None => break,
            },
            _ = tick(&mut heartbeat) => (Message::Ping(Vec::new()), false),
        };

        if let Err(e) = sink.send(message).await {
            tracing::debug!(connection_id = %id, "Send error, closing connection: {}", e);
            open.store(false, Ordering::Release);
            break;
        }
        if last {
            break;
        }
    }

    open.store(false, Ordering::Release);
    if let Err(e) = sink.close().await {
        tracing::trace!(connection_id = %id, "Error closing socket: {}", e);
    }
}

/// Next heartbeat tick; never completes when heartbeats are off.
async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[async_trait]
impl EventSink for ConnectionHandle {
    async fn send(&self, event: OutboundEvent) -> bool {
        if !self.is_open() {
            return false;
        }

        let text = match event.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.id,
                    kind = event.kind(),
                    "Dropping unserializable event: {}",
                    e
                );
                return false;
            }
        };

        self.tx.send(WriterCommand::Text(text)).await.is_ok()
    }

    async fn close(&self, code: u16, reason: &str) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        let command = WriterCommand::Close {
            code,
            reason: reason.to_string(),
        };
        if self.tx.send(command).await.is_err() {
            tracing::trace!(connection_id = %self.id, "Writer already gone");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;
    use futures::StreamExt;

    fn spawn_handle() -> (ConnectionHandle, JoinHandle<()>, fmpsc::UnboundedReceiver<Message>) {
        let (sink, received) = fmpsc::unbounded::<Message>();
        let (handle, writer) = ConnectionHandle::spawn(ConnectionId::new(), sink, 8, None);
        (handle, writer, received)
    }

    #[tokio::test]
    async fn events_are_written_as_json_text_in_order() {
        let (handle, writer, received) = spawn_handle();

        assert!(handle.send(OutboundEvent::typing_start()).await);
        assert!(handle.send(OutboundEvent::chunk("Hi")).await);
        drop(handle);
        writer.await.unwrap();

        let frames: Vec<Message> = received.collect().await;
        assert_eq!(
            frames,
            vec![
                Message::Text(r#"{"type":"typing","status":"start"}"#.to_string()),
                Message::Text(r#"{"type":"chunk","content":"Hi"}"#.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn close_sends_frame_after_queued_events() {
        let (handle, writer, received) = spawn_handle();

        handle.send(OutboundEvent::error("Failed to create chat session")).await;
        handle.close(1008, "Failed to create chat session").await;
        writer.await.unwrap();

        let frames: Vec<Message> = received.collect().await;
        assert_eq!(frames.len(), 2);
        match &frames[1] {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, 1008);
                assert_eq!(frame.reason, "Failed to create chat session");
            }
            other => panic!("expected close frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn nothing_is_sent_after_close() {
        let (handle, writer, received) = spawn_handle();

        handle.close(1000, "bye").await;
        handle.close(1000, "bye again").await;
        assert!(!handle.is_open());
        assert!(!handle.send(OutboundEvent::chunk("late")).await);
        drop(handle);
        writer.await.unwrap();

        let frames: Vec<Message> = received.collect().await;
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], Message::Close(_)));
    }

    #[tokio::test]
    async fn mark_closed_refuses_further_events() {
        let (handle, _writer, _received) = spawn_handle();

        handle.mark_closed();

        assert!(!handle.is_open());
        assert!(!handle.send(OutboundEvent::connected()).await);
    }

    #[tokio::test]
    async fn write_failure_marks_handle_closed() {
        let (sink, received) = fmpsc::unbounded::<Message>();
        drop(received);
        let (handle, writer) = ConnectionHandle::spawn(ConnectionId::new(), sink, 8, None);

        handle.send(OutboundEvent::connected()).await;
        writer.await.unwrap();

        assert!(!handle.is_open());
    }

    #[tokio::test]
    async fn heartbeat_pings_until_closed() {
        let (sink, mut received) = fmpsc::unbounded::<Message>();
        let (handle, writer) = ConnectionHandle::spawn(
            ConnectionId::new(),
            sink,
            8,
            Some(Duration::from_millis(20)),
        );

        assert_eq!(received.next().await, Some(Message::Ping(Vec::new())));
        assert_eq!(received.next().await, Some(Message::Ping(Vec::new())));

        handle.close(1000, "bye").await;
        writer.await.unwrap();
        let rest: Vec<Message> = received.collect().await;
        assert!(matches!(rest.last(), Some(Message::Close(_))));
    }

    #[tokio::test]
    async fn zero_interval_disables_heartbeat() {
        let (sink, received) = fmpsc::unbounded::<Message>();
        let (handle, writer) =
            ConnectionHandle::spawn(ConnectionId::new(), sink, 8, Some(Duration::ZERO));

        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(handle);
        writer.await.unwrap();

        let frames: Vec<Message> = received.collect().await;
        assert!(frames.is_empty());
    }
}
