//! Control-channel gateway.
//!
//! The widget connects to `/buildover/ws`, binds a session with `init` (or
//! implicitly with its first `chat`) and receives each turn as a stream of
//! [`ServerMessage`]s. Closing the socket stops the bound session's agent
//! but leaves the session and its branch alone.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use buildover_core::{AgentOutput, SessionId};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::protocol::{new_message_id, ClientMessage, ServerMessage, TurnRelay};
use crate::state::AppState;

type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// Which session, if any, this connection speaks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionBinding {
    Unbound,
    Bound(String),
}

impl ConnectionBinding {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Unbound => None,
            Self::Bound(id) => Some(id),
        }
    }
}

/// Handler for GET /buildover/ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    log::info!("Control client connected");
    let (mut sender, mut receiver) = socket.split();

    // Every producer (this loop and each turn's relay) goes through one writer
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    log::error!("Failed to encode control message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break; // Client disconnected
            }
        }
    });

    let mut binding = ConnectionBinding::Unbound;
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => handle_text(&state, &mut binding, text.as_str(), &out_tx).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    if let Some(id) = binding.session_id() {
        if state.agents.remove(id) {
            log::info!("Stopped agent for session {} on disconnect", id);
        }
    }
    send_task.abort();
    log::info!("Control client disconnected");
}

async fn handle_text(
    state: &AppState,
    binding: &mut ConnectionBinding,
    raw: &str,
    out: &Outbound,
) {
    let message = match serde_json::from_str::<ClientMessage>(raw) {
        Ok(message) => message,
        Err(e) => {
            log::warn!("Dropping malformed control message: {}", e);
            return;
        }
    };

    match message {
        ClientMessage::Init { session_id } => bind(state, binding, session_id),
        ClientMessage::Chat {
            content,
            create_branch,
        } => handle_chat(state, binding, &content, create_branch, out).await,
    }
}

/// Bind the connection to `session_id`. A previously bound session's agent is stopped.
fn bind(state: &AppState, binding: &mut ConnectionBinding, session_id: String) {
    if let Some(previous) = binding.session_id() {
        if previous != session_id {
            state.agents.remove(previous);
        }
    }
    state.sessions.touch(&SessionId(session_id.clone()));
    log::info!("Control connection bound to session {}", session_id);
    *binding = ConnectionBinding::Bound(session_id);
}

async fn handle_chat(
    state: &AppState,
    binding: &mut ConnectionBinding,
    content: &str,
    create_branch: bool,
    out: &Outbound,
) {
    let session_id = match binding.session_id().map(str::to_string) {
        Some(id) => {
            state.sessions.touch(&SessionId(id.clone()));
            id
        }
        None => {
            let Some(id) = open_session(state, content, create_branch, out).await else {
                return;
            };
            log::info!("Auto-created session {}", id);
            *binding = ConnectionBinding::Bound(id.clone());
            id
        }
    };

    let adapter = state.agents.get_or_create(&session_id);
    let message_id = new_message_id();

    let Some(outputs) = adapter.send_message(content) else {
        log::info!("Session {} is busy; chat dropped", session_id);
        return;
    };

    // Queued before the relay exists, so it is always the turn's first event
    let _ = out.send(ServerMessage::analyzing());

    tokio::spawn(relay_turn(outputs, TurnRelay::new(message_id), out.clone()));
}

/// Session id for a connection's first chat.
///
/// With `create_branch` a full session (branch included) is created from the
/// chat text; otherwise a branchless id is synthesized.
async fn open_session(
    state: &AppState,
    content: &str,
    create_branch: bool,
    out: &Outbound,
) -> Option<String> {
    if !create_branch {
        return Some(format!("session-{}", uuid::Uuid::new_v4()));
    }

    match state.sessions.create(content).await {
        Ok(session) => Some(session.id.0),
        Err(e) => {
            log::error!("Failed to create session branch: {}", e);
            let _ = out.send(ServerMessage::error(format!("Failed to create session: {e}")));
            None
        }
    }
}

/// Forward one turn's output until its terminal event.
async fn relay_turn(
    mut outputs: mpsc::UnboundedReceiver<AgentOutput>,
    mut relay: TurnRelay,
    out: Outbound,
) {
    while let Some(output) = outputs.recv().await {
        for message in relay.handle(output) {
            if out.send(message).is_err() {
                return;
            }
        }
        if relay.is_finished() {
            break;
        }
    }
    log::debug!("Turn {} finished", relay.message_id());
}
