// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub Tunnel Manager: the Agent-facing WebSocket endpoint.
//!
//! Each Agent transport must send exactly one registration frame first.
//! Anything else arriving as the first frame closes the connection.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use gateway_wire::agent::AgentEnvelope;

use crate::agents::AgentReply;
use crate::state::HubState;
use crate::transport::auth;

const PING_PERIOD: Duration = Duration::from_secs(30);
const REGISTRATION_DEADLINE: Duration = Duration::from_secs(10);

/// `GET /ws/tunnel` — WebSocket upgrade for an Agent's reverse tunnel.
pub async fn tunnel_handler(
    State(state): State<Arc<HubState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_tunnel(socket, state)).into_response()
}

async fn handle_tunnel(socket: WebSocket, state: Arc<HubState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let first = match tokio::time::timeout(REGISTRATION_DEADLINE, ws_rx.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text.to_string(),
        _ => return,
    };

    let Ok(AgentEnvelope::Register { agent_id, token, capabilities, version }) =
        serde_json::from_str::<AgentEnvelope>(&first)
    else {
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    };

    if auth::validate_ws_query(Some(token.as_str()), state.config.agent_token.as_deref()).is_err()
    {
        let _ = ws_tx
            .send(Message::Text(
                serde_json::json!({"type":"agent.registered","success":false,"error":"unauthorized"})
                    .to_string()
                    .into(),
            ))
            .await;
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }

    let (registration, displaced, mut outbound_rx) =
        state.agents.register(agent_id.clone(), capabilities, version).await;

    if let Some(displaced) = displaced {
        tracing::info!(agent_id = %agent_id, "displacing previous agent transport");
        drop(displaced);
    }

    let _ = ws_tx
        .send(Message::Text(
            serde_json::json!({"type":"agent.registered","agentId":agent_id,"success":true})
                .to_string()
                .into(),
        ))
        .await;

    tracing::info!(agent_id = %agent_id, generation = registration.generation, "agent registered");

    let cancel = registration.cancel.clone();
    let writer_agent_id = agent_id.clone();
    let writer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PING_PERIOD);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let frame = serde_json::json!({"type":"agent.ping"}).to_string();
                    if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                frame = outbound_rx.recv() => {
                    match frame {
                        Some(frame) => {
                            let Ok(text) = serde_json::to_string(&frame) else { continue };
                            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        tracing::info!(agent_id = %writer_agent_id, "agent tunnel writer exiting");
        let _ = ws_tx.close().await;
    });

    loop {
        tokio::select! {
            _ = registration.cancel.cancelled() => break,
            message = ws_rx.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        dispatch_inbound(&state, &agent_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.agents.deregister(&agent_id, registration.generation).await;
    registration.cancel.cancel();
    let _ = writer.await;
    tracing::info!(agent_id = %agent_id, "agent tunnel closed");
}

async fn dispatch_inbound(state: &Arc<HubState>, agent_id: &str, text: &str) {
    let Ok(frame) = serde_json::from_str::<AgentEnvelope>(text) else {
        tracing::debug!(agent_id, "ignoring malformed agent frame");
        return;
    };

    match frame {
        AgentEnvelope::Pong => {
            if let Some(agent) = state.agents.get(agent_id).await {
                agent.touch().await;
            }
        }
        AgentEnvelope::Response { request_id, payload } => {
            state.agents.dispatch_reply(agent_id, &request_id, AgentReply::Response(payload)).await;
        }
        AgentEnvelope::Stream { request_id, seq, payload } => {
            state
                .agents
                .dispatch_reply(agent_id, &request_id, AgentReply::Stream { seq, payload })
                .await;
        }
        AgentEnvelope::StreamEnd { request_id } => {
            state.agents.dispatch_reply(agent_id, &request_id, AgentReply::StreamEnd).await;
        }
        AgentEnvelope::Error { request_id, message } => {
            state.agents.dispatch_reply(agent_id, &request_id, AgentReply::Error(message)).await;
        }
        AgentEnvelope::Register { .. } => {
            tracing::warn!(agent_id, "ignoring duplicate registration frame after handshake");
        }
    }
}
