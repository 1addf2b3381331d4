//! `GET /ws/{room_name}`: admit or refuse a WebSocket upgrade.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use huddle_core::constants::WS_CONNECTIONS_REJECTED_TOTAL;
use huddle_hub::Session;
use metrics::counter;
use tracing::{debug, warn};

use super::session::run_session;
use crate::server::AppState;

/// Why an upgrade was refused before the handshake completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Refusal {
    /// The room segment was blank.
    EmptyRoomName,
    /// Shutdown has begun.
    ShuttingDown,
    /// `max_connections` sessions are already joined.
    AtCapacity,
}

impl Refusal {
    fn status(self) -> StatusCode {
        match self {
            Self::EmptyRoomName => StatusCode::BAD_REQUEST,
            Self::ShuttingDown | Self::AtCapacity => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn message(self) -> &'static str {
        match self {
            Self::EmptyRoomName => "room name must not be empty",
            Self::ShuttingDown => "server is shutting down",
            Self::AtCapacity => "too many connections",
        }
    }
}

impl IntoResponse for Refusal {
    fn into_response(self) -> Response {
        (self.status(), self.message()).into_response()
    }
}

/// Decide whether a connection for `room_name` may be admitted.
pub fn admit(state: &AppState, room_name: &str) -> Result<(), Refusal> {
    if room_name.trim().is_empty() {
        return Err(Refusal::EmptyRoomName);
    }
    if state.shutdown.is_shutting_down() {
        return Err(Refusal::ShuttingDown);
    }
    if state.registry.session_count() >= state.config.max_connections {
        return Err(Refusal::AtCapacity);
    }
    Ok(())
}

/// Upgrade the request and hand the socket to a new session.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Path(room_name): Path<String>,
    State(state): State<AppState>,
) -> Response {
    if let Err(refusal) = admit(&state, &room_name) {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(room = %room_name, ?refusal, "refusing websocket upgrade");
        return refusal.into_response();
    }

    debug!(room = %room_name, "accepting websocket upgrade");
    let config = state.config.clone();
    let registry = state.registry.clone();
    let shutdown = state.shutdown.token();
    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| async move {
            let (session, outbound) = Session::new(room_name, config.send_queue_capacity);
            run_session(socket, session, outbound, registry, config, shutdown).await;
        })
}
