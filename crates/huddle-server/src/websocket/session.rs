//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use huddle_core::constants::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_FRAMES_REJECTED_TOTAL,
};
use huddle_core::{ChatMessage, FrameError};
use huddle_hub::{Frame, JoinOutcome, LeaveOutcome, Room, RoomRegistry, Session};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::config::ServerConfig;

/// How long teardown waits for the writer to flush its close frame.
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client sent a close frame or the stream ended.
    ClientClosed,
    /// Reading from the transport failed.
    TransportError,
    /// The writer could not send and stopped.
    WriterClosed,
    /// No activity within the heartbeat window.
    HeartbeatTimeout,
    /// The hub closed the session (lagging eviction or `close_all`).
    ClosedByHub,
    /// The server is shutting down.
    ServerShutdown,
}

impl DisconnectReason {
    /// Metric label value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::TransportError => "transport_error",
            Self::WriterClosed => "writer_closed",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::ClosedByHub => "closed_by_hub",
            Self::ServerShutdown => "server_shutdown",
        }
    }
}

/// An inbound WebSocket message, sorted by what the read loop does with it.
#[derive(Debug)]
enum Inbound {
    /// A data frame, decoded or not.
    Chat(Result<ChatMessage, FrameError>),
    /// Ping or pong; only counts as activity.
    Control,
    /// The peer is closing.
    Close,
}

fn classify(msg: &Message) -> Inbound {
    match msg {
        Message::Text(text) => Inbound::Chat(ChatMessage::decode(text.as_str())),
        Message::Binary(data) => Inbound::Chat(ChatMessage::decode_bytes(data)),
        Message::Ping(_) | Message::Pong(_) => Inbound::Control,
        Message::Close(_) => Inbound::Close,
    }
}

/// Hand one decoded frame to the room, or drop it if it did not decode.
fn relay(session: &Session, room: &Room, decoded: Result<ChatMessage, FrameError>) {
    if session.is_closing() {
        debug!("discarding frame received while closing");
        return;
    }
    match decoded {
        Ok(message) => {
            let _ = room.broadcast(session.id(), &message);
        }
        Err(e) => {
            counter!(WS_FRAMES_REJECTED_TOTAL, "kind" => e.kind()).increment(1);
            warn!(error = %e, "dropping malformed frame");
        }
    }
}

/// Copy a shared frame into a transport message.
fn text_message(frame: &Frame) -> Message {
    Message::Text(frame.as_ref().to_owned().into())
}

/// Drain the outbound queue onto `sink` and ping on `ping_every`.
///
/// Stops when `stop` fires, the queue closes, or a send fails. On `stop`,
/// frames already queued are flushed before the close frame.
async fn write_outbound<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Frame>,
    ping_every: Duration,
    stop: CancellationToken,
) where
    S: Sink<Message> + Unpin,
{
    let mut ping_interval = tokio::time::interval(ping_every);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => {
                while let Ok(frame) = outbound.try_recv() {
                    if sink.send(text_message(&frame)).await.is_err() {
                        return;
                    }
                }
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if sink.send(text_message(&frame)).await.is_err() {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = sink.close().await;
}

/// Run a WebSocket session for a connected client.
///
/// 1. Joins the room named by the session
/// 2. Spawns the writer, which drains the outbound queue and pings
/// 3. Relays inbound frames to the room until the client goes away, the
///    heartbeat expires, the hub closes the session, or the server stops
/// 4. Leaves the room exactly once and releases the transport
#[instrument(skip_all, fields(session_id = %session.id(), room = %session.room()))]
pub async fn run_session(
    socket: WebSocket,
    session: Arc<Session>,
    outbound: mpsc::Receiver<Frame>,
    registry: RoomRegistry,
    config: Arc<ServerConfig>,
    server_shutdown: CancellationToken,
) {
    let (room, outcome) = registry.join(&session);
    if outcome != JoinOutcome::Joined {
        warn!(?outcome, "join refused, dropping connection");
        let _ = session.begin_closing();
        session.mark_closed();
        return;
    }

    info!(members = room.member_count(), "session joined");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let (ws_tx, mut ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_outbound(
        ws_tx,
        outbound,
        config.heartbeat_interval,
        session.shutdown_token(),
    ));
    let mut writer_done = false;

    let heartbeat = run_heartbeat(
        Arc::clone(&session),
        config.heartbeat_interval,
        config.heartbeat_timeout,
        session.shutdown_token(),
    );
    tokio::pin!(heartbeat);

    let reason = loop {
        tokio::select! {
            () = session.closed() => break DisconnectReason::ClosedByHub,
            () = server_shutdown.cancelled() => break DisconnectReason::ServerShutdown,
            result = &mut heartbeat => match result {
                HeartbeatResult::TimedOut => {
                    let idle_ms =
                        u64::try_from(session.idle_for().as_millis()).unwrap_or(u64::MAX);
                    warn!(idle_ms, "heartbeat timed out");
                    break DisconnectReason::HeartbeatTimeout;
                }
                HeartbeatResult::Cancelled => break DisconnectReason::ClosedByHub,
            },
            _ = &mut writer => {
                writer_done = true;
                break DisconnectReason::WriterClosed;
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(msg)) => {
                    session.mark_alive();
                    match classify(&msg) {
                        Inbound::Chat(decoded) => relay(&session, &room, decoded),
                        Inbound::Control => {}
                        Inbound::Close => break DisconnectReason::ClientClosed,
                    }
                }
                Some(Err(e)) => {
                    debug!(error = %e, "websocket read failed");
                    break DisconnectReason::TransportError;
                }
                None => break DisconnectReason::ClientClosed,
            },
        }
    };

    // Closing: later frames are discarded and the writer is told to stop.
    let _ = session.begin_closing();
    let remaining = match room.leave(&session) {
        LeaveOutcome::Left { remaining } => remaining,
        LeaveOutcome::NotMember => room.member_count(),
    };

    if !writer_done && tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    session.mark_closed();

    info!(reason = reason.as_str(), remaining, "session closed");
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(session.age().as_secs_f64());
}
