//! Session transport
//!
//! Thin client over `tokio-tungstenite`, carrying the three-message collector
//! protocol: one `start-session` out, one `session-created` back, then
//! periodic `events` batches. The state machine is
//! Disconnected → Connecting → Connected → SessionActive; batches submitted
//! before the session acknowledgement are buffered in order and drained the
//! moment it arrives, so nothing is ever sent out of protocol or silently
//! reordered. Batches submitted after the connection dropped are lost by
//! design; delivery guarantees are a non-goal.

use std::collections::VecDeque;

use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::TrackError;
use crate::event::TrackEvent;
use crate::types::Session;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
/// Read half of the collector connection, consumed by the run loop
pub type FrameStream = SplitStream<WsStream>;
/// Transport over a live collector connection
pub type WsTransport = SessionTransport<SplitSink<WsStream, Message>>;

/// Messages the client sends to the collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    StartSession { session: Session },
    Events { events: Vec<TrackEvent> },
}

/// Messages the collector sends back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    SessionCreated { identifier: String },
}

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    /// Connected, session handshake not yet acknowledged
    Connected,
    /// Handshake acknowledged, batches flow
    SessionActive,
}

/// Collector connection with the session handshake state machine.
///
/// Generic over the sink so the protocol logic is testable without a socket.
pub struct SessionTransport<S> {
    sink: S,
    state: TransportState,
    /// Batches accumulated between connect and the session acknowledgement
    pending: VecDeque<Vec<TrackEvent>>,
}

impl WsTransport {
    /// Dial the collector and split the connection.
    ///
    /// Returns the transport (write half + state machine) and the frame
    /// stream the run loop reads server messages from.
    pub async fn connect(url: &str) -> Result<(Self, FrameStream), TrackError> {
        tracing::debug!(url, "connecting to collector");
        let (ws, _response) = connect_async(url).await?;
        let (sink, stream) = ws.split();
        tracing::info!(url, "collector connection established");

        Ok((SessionTransport::new(sink), stream))
    }
}

impl<S> SessionTransport<S>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    /// Wrap an established connection; the transport starts pre-session.
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            state: TransportState::Connected,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Batches waiting for the session acknowledgement
    pub fn pending_batches(&self) -> usize {
        self.pending.len()
    }

    /// Send the single session handshake.
    ///
    /// Only valid in the pre-session `Connected` state; the session record
    /// is composed once and never re-sent.
    pub async fn start_session(&mut self, session: &Session) -> Result<(), TrackError> {
        if self.state != TransportState::Connected {
            return Err(TrackError::Protocol(format!(
                "session handshake attempted in {:?} state",
                self.state
            )));
        }

        self.send(&ClientMessage::StartSession {
            session: session.clone(),
        })
        .await
    }

    /// Relay one batch.
    ///
    /// Before the session is active the batch is buffered in submission
    /// order; after a disconnect it is dropped (lost batch, by design).
    pub async fn submit(&mut self, events: Vec<TrackEvent>) -> Result<(), TrackError> {
        match self.state {
            TransportState::SessionActive => self.send(&ClientMessage::Events { events }).await,
            TransportState::Connected | TransportState::Connecting => {
                tracing::debug!(count = events.len(), "buffering batch until session is active");
                self.pending.push_back(events);
                Ok(())
            }
            TransportState::Disconnected => {
                tracing::debug!(count = events.len(), "connection lost, batch dropped");
                Ok(())
            }
        }
    }

    /// Process one inbound frame.
    ///
    /// The session acknowledgement activates the session and drains any
    /// buffered batches in order. Unrecognized frames are logged and
    /// ignored rather than failing the connection.
    pub async fn accept_frame(
        &mut self,
        message: Message,
    ) -> Result<Option<ServerMessage>, TrackError> {
        match message {
            Message::Text(text) => match serde_json::from_str::<ServerMessage>(text.as_str()) {
                Ok(ServerMessage::SessionCreated { identifier }) => {
                    if self.state == TransportState::SessionActive {
                        tracing::warn!("duplicate session acknowledgement");
                    } else {
                        self.state = TransportState::SessionActive;
                        tracing::info!(%identifier, "session active");
                        self.drain_pending().await?;
                    }
                    Ok(Some(ServerMessage::SessionCreated { identifier }))
                }
                Err(error) => {
                    tracing::warn!(%error, "ignoring unrecognized collector frame");
                    Ok(None)
                }
            },
            Message::Close(_) => {
                self.state = TransportState::Disconnected;
                Ok(None)
            }
            // Ping/pong and binary frames carry nothing for us
            _ => Ok(None),
        }
    }

    async fn drain_pending(&mut self) -> Result<(), TrackError> {
        while let Some(events) = self.pending.pop_front() {
            self.send(&ClientMessage::Events { events }).await?;
        }
        Ok(())
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), TrackError> {
        let json = serde_json::to_string(message)?;
        if let Err(error) = self.sink.send(Message::text(json)).await {
            self.state = TransportState::Disconnected;
            return Err(error.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventPayload, TrackEvent};
    use crate::types::{EnvironmentSnapshot, ScrollPosition, Session};
    use pretty_assertions::assert_eq;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Sink that records every frame, standing in for the socket
    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<Message>,
    }

    impl Sink<Message> for RecordingSink {
        type Error = tungstenite::Error;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
            self.get_mut().frames.push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Sink whose sends always fail, standing in for a dead socket
    struct DeadSink;

    impl Sink<Message> for DeadSink {
        type Error = tungstenite::Error;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, _: Message) -> Result<(), Self::Error> {
            Err(tungstenite::Error::ConnectionClosed)
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    fn frame_json(frame: &Message) -> serde_json::Value {
        match frame {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    fn scroll_event(y: f64) -> TrackEvent {
        TrackEvent::new(EventPayload::Scroll {
            position: ScrollPosition { x: 0.0, y },
        })
    }

    fn session() -> Session {
        Session::compose(&EnvironmentSnapshot::default(), None, None)
    }

    fn ack_frame(identifier: &str) -> Message {
        Message::text(format!(
            r#"{{"type":"session-created","identifier":"{identifier}"}}"#
        ))
    }

    #[tokio::test]
    async fn test_handshake_then_batches() {
        let mut transport = SessionTransport::new(RecordingSink::default());
        assert_eq!(transport.state(), TransportState::Connected);

        transport.start_session(&session()).await.unwrap();
        let ack = transport.accept_frame(ack_frame("visitor-9")).await.unwrap();
        assert_eq!(
            ack,
            Some(ServerMessage::SessionCreated {
                identifier: "visitor-9".to_string()
            })
        );
        assert_eq!(transport.state(), TransportState::SessionActive);

        transport.submit(vec![scroll_event(10.0)]).await.unwrap();

        let frames = &transport.sink.frames;
        assert_eq!(frames.len(), 2);
        assert_eq!(frame_json(&frames[0])["type"], "start-session");
        assert_eq!(frame_json(&frames[1])["type"], "events");
        assert_eq!(frame_json(&frames[1])["events"][0]["type"], "scroll");
    }

    #[tokio::test]
    async fn test_batches_buffer_until_session_active() {
        let mut transport = SessionTransport::new(RecordingSink::default());
        transport.start_session(&session()).await.unwrap();

        transport.submit(vec![scroll_event(1.0)]).await.unwrap();
        transport
            .submit(vec![scroll_event(2.0), scroll_event(3.0)])
            .await
            .unwrap();
        assert_eq!(transport.pending_batches(), 2);
        // Only the handshake has hit the wire so far
        assert_eq!(transport.sink.frames.len(), 1);

        transport.accept_frame(ack_frame("visitor-1")).await.unwrap();
        assert_eq!(transport.pending_batches(), 0);

        let frames = &transport.sink.frames;
        assert_eq!(frames.len(), 3);
        // Buffered batches drain in submission order
        assert_eq!(frame_json(&frames[1])["events"][0]["position"]["y"], 1.0);
        assert_eq!(frame_json(&frames[2])["events"].as_array().unwrap().len(), 2);
        assert_eq!(frame_json(&frames[2])["events"][0]["position"]["y"], 2.0);
    }

    #[tokio::test]
    async fn test_handshake_outside_pre_session_state_is_rejected() {
        let mut transport = SessionTransport::new(RecordingSink::default());
        transport.start_session(&session()).await.unwrap();
        transport.accept_frame(ack_frame("visitor-1")).await.unwrap();

        let error = transport.start_session(&session()).await.unwrap_err();
        assert!(matches!(error, TrackError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_close_frame_disconnects_and_batches_drop() {
        let mut transport = SessionTransport::new(RecordingSink::default());
        transport.accept_frame(Message::Close(None)).await.unwrap();
        assert_eq!(transport.state(), TransportState::Disconnected);

        // Lost silently, not an error and not buffered
        transport.submit(vec![scroll_event(5.0)]).await.unwrap();
        assert_eq!(transport.pending_batches(), 0);
        assert!(transport.sink.frames.is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_frames_are_ignored() {
        let mut transport = SessionTransport::new(RecordingSink::default());

        let result = transport
            .accept_frame(Message::text(r#"{"type":"totally-new"}"#))
            .await
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(transport.state(), TransportState::Connected);

        let result = transport
            .accept_frame(Message::Ping(Default::default()))
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_send_failure_marks_disconnected() {
        let mut transport = SessionTransport::new(DeadSink);
        let error = transport.start_session(&session()).await.unwrap_err();
        assert!(matches!(error, TrackError::Transport(_)));
        assert_eq!(transport.state(), TransportState::Disconnected);
    }

    #[test]
    fn test_duplicate_ack_does_not_reorder() {
        // A second acknowledgement must not touch the pending buffer
        let mut transport = SessionTransport::new(RecordingSink::default());
        futures::executor::block_on(async {
            transport.accept_frame(ack_frame("a")).await.unwrap();
            transport.accept_frame(ack_frame("b")).await.unwrap();
        });
        assert_eq!(transport.state(), TransportState::SessionActive);
    }
}
