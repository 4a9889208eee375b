// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub Client Server: the client-facing WebSocket endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use gateway_wire::agent::HubEnvelope;
use gateway_wire::client::{
    AckPayload, ClientEnvelope, PromptPayload, ServerFrame, SessionCreatePayload, SyncBatchPayload,
    SyncPayload,
};
use gateway_wire::validate_session_id;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::agents::AgentReply;
use crate::error::HubError;
use crate::state::HubState;
use crate::transport::auth;

/// Maximum inbound message size.
const MAX_MESSAGE_BYTES: usize = 1024 * 1024;
const PONG_WAIT: Duration = Duration::from_secs(60);
const PING_PERIOD: Duration = Duration::from_secs(54);
const WRITE_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct ClientWsQuery {
    pub token: Option<String>,
}

/// `GET /ws/client` — WebSocket upgrade for an end-user client.
pub async fn ws_handler(
    State(state): State<Arc<HubState>>,
    Query(query): Query<ClientWsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if auth::validate_ws_query(query.token.as_deref(), state.config.client_token.as_deref())
        .is_err()
    {
        return (axum::http::StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    ws.on_upgrade(move |socket| handle_client(socket, state)).into_response()
}

/// Per-connection bookkeeping: the client's high-water ack mark.
#[derive(Default)]
struct ConnectionState {
    last_ack_id: AtomicU64,
}

async fn handle_client(socket: WebSocket, state: Arc<HubState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) =
        mpsc::channel::<ServerFrame>(state.config.outbound_queue_capacity);
    let conn_state = Arc::new(ConnectionState::default());

    let writer_shutdown = state.shutdown.clone();
    let writer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PING_PERIOD);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = writer_shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if tokio::time::timeout(WRITE_DEADLINE, ws_tx.send(Message::Ping(Vec::new().into()))).await.is_err() {
                        break;
                    }
                }
                frame = outbound_rx.recv() => {
                    match frame {
                        Some(frame) => {
                            let Ok(text) = serde_json::to_string(&frame) else { continue };
                            if tokio::time::timeout(WRITE_DEADLINE, ws_tx.send(Message::Text(text.into()))).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        let next = tokio::time::timeout(PONG_WAIT, ws_rx.next()).await;
        let message = match next {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(_))) | Ok(None) | Err(_) => break,
        };

        match message {
            Message::Text(text) => {
                if text.len() > MAX_MESSAGE_BYTES {
                    continue;
                }
                dispatch(text.to_string(), &outbound_tx, &state, &conn_state);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    drop(outbound_tx);
    let _ = writer.await;
}

fn send(tx: &mpsc::Sender<ServerFrame>, frame: ServerFrame) {
    if tx.try_send(frame).is_err() {
        tracing::warn!("client outbound queue full, dropping newest frame");
    }
}

fn next_request_id(id: &Option<String>) -> String {
    id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Per-action cancellation deadline. `None` means unbounded (only `prompt`).
fn action_deadline(action: &str) -> Option<Duration> {
    match action {
        "project.list" | "project.start" | "project.stop" => Some(Duration::from_secs(30)),
        "prompt" => None,
        _ => Some(Duration::from_secs(10)),
    }
}

fn dispatch(
    text: String,
    outbound_tx: &mpsc::Sender<ServerFrame>,
    state: &Arc<HubState>,
    conn_state: &Arc<ConnectionState>,
) {
    let envelope: ClientEnvelope = match serde_json::from_str(&text) {
        Ok(e) => e,
        Err(_) => {
            send(outbound_tx, ServerFrame::error(None, HubError::InvalidFrame.default_message()));
            return;
        }
    };

    match envelope.kind.as_str() {
        "ping" => send(outbound_tx, ServerFrame::pong(envelope.id)),
        "session.list" => spawn_forward_simple(state, outbound_tx, envelope, "session.list", None),
        "session.create" => {
            let directory = serde_json::from_value::<SessionCreatePayload>(envelope.payload.clone())
                .ok()
                .map(|p| p.directory);
            spawn_forward_simple(state, outbound_tx, envelope, "session.create", directory)
        }
        "session.messages" => {
            spawn_forward_simple(state, outbound_tx, envelope, "session.messages", None)
        }
        "session.delete" => {
            spawn_forward_simple(state, outbound_tx, envelope, "session.delete", None)
        }
        "project.list" => spawn_forward_simple(state, outbound_tx, envelope, "project.list", None),
        "project.start" => {
            spawn_forward_simple(state, outbound_tx, envelope, "project.start", None)
        }
        "project.stop" => spawn_forward_simple(state, outbound_tx, envelope, "project.stop", None),
        "prompt" => spawn_forward_prompt(state, outbound_tx, envelope),
        "sync" => handle_sync(state, outbound_tx, envelope),
        "ack" => {
            if let Ok(ack) = serde_json::from_value::<AckPayload>(envelope.payload) {
                conn_state.last_ack_id.fetch_max(ack.msg_id, Ordering::Relaxed);
            }
        }
        _ => send(outbound_tx, ServerFrame::error(envelope.id, "unknown frame type")),
    }
}

fn spawn_forward_simple(
    state: &Arc<HubState>,
    outbound_tx: &mpsc::Sender<ServerFrame>,
    envelope: ClientEnvelope,
    action: &'static str,
    project_path: Option<String>,
) {
    let state = Arc::clone(state);
    let outbound_tx = outbound_tx.clone();
    tokio::spawn(async move {
        let id = envelope.id;
        let request_id = next_request_id(&id);
        let session_id = envelope
            .payload
            .get("sessionId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_owned();

        let Some(agent) = state.agents.any().await else {
            send(&outbound_tx, ServerFrame::error(id, HubError::NoAgentAvailable.default_message()));
            return;
        };

        let frame = HubEnvelope::Request {
            request_id: request_id.clone(),
            session_id,
            action: action.to_owned(),
            data: envelope.payload,
            project_path,
        };

        // Only the first reply off the channel is used; later Agent replies
        // for the same request (if any) are left undrained and dropped when
        // the pending entry is cleaned up.
        let deadline = action_deadline(action);
        let wait = async {
            match state.agents.forward(&agent.agent_id, request_id.clone(), frame).await {
                Ok(mut rx) => match rx.recv().await {
                    Some(AgentReply::Response(payload) | AgentReply::Stream { payload, .. }) => {
                        send(&outbound_tx, ServerFrame::response(id.clone(), payload));
                    }
                    Some(AgentReply::Error(message)) => {
                        send(&outbound_tx, ServerFrame::error(id.clone(), message));
                    }
                    Some(AgentReply::StreamEnd) | None => {
                        send(
                            &outbound_tx,
                            ServerFrame::error(id.clone(), "agent closed without replying"),
                        );
                    }
                },
                Err(e) => send(&outbound_tx, ServerFrame::error(id.clone(), e.default_message())),
            }
        };

        match deadline {
            Some(deadline) => {
                if tokio::time::timeout(deadline, wait).await.is_err() {
                    state.agents.cancel_pending(&agent.agent_id, &request_id).await;
                    send(&outbound_tx, ServerFrame::error(id, HubError::Timeout.default_message()));
                }
            }
            None => wait.await,
        }
    });
}

fn spawn_forward_prompt(
    state: &Arc<HubState>,
    outbound_tx: &mpsc::Sender<ServerFrame>,
    envelope: ClientEnvelope,
) {
    let state = Arc::clone(state);
    let outbound_tx = outbound_tx.clone();
    tokio::spawn(async move {
        let id = envelope.id;
        let session_id = match serde_json::from_value::<PromptPayload>(envelope.payload.clone()) {
            Ok(prompt) if validate_session_id(&prompt.session_id) => prompt.session_id,
            _ => {
                send(&outbound_tx, ServerFrame::error(id, "invalid or missing sessionId"));
                return;
            }
        };

        let Some(agent) = state.agents.any().await else {
            send(&outbound_tx, ServerFrame::error(id, HubError::NoAgentAvailable.default_message()));
            return;
        };

        let request_id = next_request_id(&id);
        let frame = HubEnvelope::Request {
            request_id: request_id.clone(),
            session_id: session_id.clone(),
            action: "prompt".to_owned(),
            data: envelope.payload,
            project_path: None,
        };

        let mut rx = match state.agents.forward(&agent.agent_id, request_id.clone(), frame).await {
            Ok(rx) => rx,
            Err(e) => {
                send(&outbound_tx, ServerFrame::error(id, e.default_message()));
                return;
            }
        };

        loop {
            match rx.recv().await {
                Some(AgentReply::Stream { payload, .. } | AgentReply::Response(payload)) => {
                    let msg_id = state.replay.push(&session_id, "stream", &request_id, payload.clone());
                    send(&outbound_tx, ServerFrame::stream(id.clone(), msg_id, payload));
                }
                Some(AgentReply::StreamEnd) => {
                    let msg_id =
                        state.replay.push(&session_id, "stream.end", &request_id, serde_json::Value::Null);
                    send(&outbound_tx, ServerFrame::stream_end(id.clone(), msg_id));
                    break;
                }
                Some(AgentReply::Error(message)) => {
                    send(&outbound_tx, ServerFrame::error(id, message));
                    break;
                }
                None => break,
            }
        }
    });
}

fn handle_sync(state: &Arc<HubState>, outbound_tx: &mpsc::Sender<ServerFrame>, envelope: ClientEnvelope) {
    let sync = match serde_json::from_value::<SyncPayload>(envelope.payload) {
        Ok(sync) => sync,
        Err(_) => {
            send(outbound_tx, ServerFrame::error(envelope.id, "invalid sync payload"));
            return;
        }
    };

    let messages = state.replay.get_since(&sync.session_id, sync.last_ack_id);
    let latest_id = state.replay.get_latest_id(&sync.session_id);
    let batch = SyncBatchPayload { messages, latest_id };
    send(outbound_tx, ServerFrame::sync_batch(envelope.id, &batch));
}
