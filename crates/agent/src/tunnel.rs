// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent Tunnel Client: the single outbound transport to the Hub.
//!
//! State machine: `idle -> dialing -> registering -> ready -> closing`.
//! Backoff doubles from 1s to a 30s cap on every failed connection attempt
//! and resets to 1s as soon as `ready` is reached.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gateway_wire::agent::{AgentEnvelope, HubEnvelope};
use gateway_wire::client::ProjectPathPayload;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::supervisor::WorkerSupervisor;
use crate::worker_client;

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const REGISTER_DEADLINE: Duration = Duration::from_secs(10);
const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Ad hoc shape of the Hub's confirmation reply: not every field
/// `HubEnvelope::Registered` models is present on the failure path, so
/// this is parsed independently of the wire enum.
#[derive(Debug, Deserialize)]
struct RegisterAck {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Run the tunnel client until `shutdown` fires, reconnecting with backoff
/// on every disconnect.
pub async fn run(config: Arc<AgentConfig>, supervisor: Arc<WorkerSupervisor>, shutdown: CancellationToken) {
    let mut backoff = MIN_BACKOFF;

    loop {
        if shutdown.is_cancelled() {
            return;
        }

        tracing::debug!(agent_id = %config.agent_id, "tunnel: dialing");
        match dial_and_register(&config).await {
            Ok((ws_tx, ws_rx)) => {
                backoff = MIN_BACKOFF;
                tracing::info!(agent_id = %config.agent_id, "tunnel: ready");
                serve(ws_tx, ws_rx, &config, &supervisor, &shutdown).await;
                tracing::info!(agent_id = %config.agent_id, "tunnel: closing");
            }
            Err(e) => {
                tracing::warn!(agent_id = %config.agent_id, error = %e, "tunnel: registration failed");
            }
        }

        if shutdown.is_cancelled() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown.cancelled() => return,
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

type WsTx = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;
type WsRx = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

async fn dial_and_register(config: &AgentConfig) -> anyhow::Result<(WsTx, WsRx)> {
    let (stream, _) = tokio_tungstenite::connect_async(&config.hub_url).await?;
    let (mut ws_tx, mut ws_rx) = stream.split();

    let register = AgentEnvelope::Register {
        agent_id: config.agent_id.clone(),
        token: config.token.clone().unwrap_or_default(),
        capabilities: config.capabilities.clone(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
    };
    let text = serde_json::to_string(&register)?;
    ws_tx.send(Message::Text(text.into())).await?;

    let reply = tokio::time::timeout(REGISTER_DEADLINE, ws_rx.next())
        .await
        .map_err(|_| anyhow::anyhow!("registration timed out"))?
        .ok_or_else(|| anyhow::anyhow!("transport closed before registration confirmed"))??;

    let Message::Text(text) = reply else {
        anyhow::bail!("expected a text frame for the registration reply");
    };
    let ack: RegisterAck = serde_json::from_str(&text)?;
    if !ack.success {
        anyhow::bail!("registration rejected: {}", ack.error.unwrap_or_default());
    }

    Ok((ws_tx, ws_rx))
}

async fn serve(
    mut ws_tx: WsTx,
    mut ws_rx: WsRx,
    config: &Arc<AgentConfig>,
    supervisor: &Arc<WorkerSupervisor>,
    shutdown: &CancellationToken,
) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<AgentEnvelope>(OUTBOUND_QUEUE_CAPACITY);

    let writer_shutdown = shutdown.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_shutdown.cancelled() => break,
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
        let _ = ws_tx.close().await;
    });

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            message = ws_rx.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(&text, config, supervisor, &outbound_tx);
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    drop(outbound_tx);
    let _ = writer.await;
}

fn handle_inbound(
    text: &str,
    config: &Arc<AgentConfig>,
    supervisor: &Arc<WorkerSupervisor>,
    outbound_tx: &mpsc::Sender<AgentEnvelope>,
) {
    let frame: HubEnvelope = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(_) => return,
    };

    match frame {
        HubEnvelope::Ping => {
            let tx = outbound_tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(AgentEnvelope::Pong).await;
            });
        }
        HubEnvelope::Registered { .. } => {
            tracing::warn!("ignoring unexpected duplicate registration confirmation");
        }
        HubEnvelope::Request { request_id, session_id, action, data, project_path } => {
            let config = Arc::clone(config);
            let supervisor = Arc::clone(supervisor);
            let outbound_tx = outbound_tx.clone();
            tokio::spawn(async move {
                dispatch_request(
                    &config,
                    &supervisor,
                    &outbound_tx,
                    request_id,
                    session_id,
                    action,
                    data,
                    project_path,
                )
                .await;
            });
        }
    }
}

async fn emit(tx: &mpsc::Sender<AgentEnvelope>, frame: AgentEnvelope) {
    // Blocking send: the Agent side must not drop stream chunks, unlike the
    // Hub's client-facing queue.
    let _ = tx.send(frame).await;
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_request(
    config: &AgentConfig,
    supervisor: &WorkerSupervisor,
    outbound_tx: &mpsc::Sender<AgentEnvelope>,
    request_id: String,
    session_id: String,
    action: String,
    data: serde_json::Value,
    project_path: Option<String>,
) {
    if matches!(action.as_str(), "project.list" | "project.start" | "project.stop") {
        return dispatch_supervisor_action(supervisor, outbound_tx, request_id, action, data).await;
    }

    let resolved_path = match project_path {
        Some(p) => Some(PathBuf::from(p)),
        None => supervisor.resolve_session_path(&session_id).await,
    };
    let Some(path) = resolved_path else {
        emit(
            outbound_tx,
            AgentEnvelope::Error {
                request_id,
                message: AgentError::BadRequest.to_message("missing projectPath and no session binding"),
            },
        )
        .await;
        return;
    };

    let base_url = match supervisor.get_or_start_worker_url(&path).await {
        Ok(url) => url,
        Err(e) => {
            emit(
                outbound_tx,
                AgentEnvelope::Error { request_id, message: e.to_message("") },
            )
            .await;
            return;
        }
    };

    let client = reqwest::Client::new();

    if action == "prompt" {
        let stream = match worker_client::stream_prompt(&client, &base_url, &data).await {
            Ok(stream) => stream,
            Err(e) => {
                emit(outbound_tx, AgentEnvelope::Error { request_id, message: e.to_message("") }).await;
                return;
            }
        };
        futures_util::pin_mut!(stream);
        let mut seq = 0u64;
        while let Some(payload) = stream.next().await {
            emit(
                outbound_tx,
                AgentEnvelope::Stream { request_id: request_id.clone(), seq, payload },
            )
            .await;
            seq += 1;
        }
        emit(outbound_tx, AgentEnvelope::StreamEnd { request_id }).await;
        return;
    }

    match worker_client::call(&client, &base_url, &action, &data).await {
        Ok(payload) => {
            if action == "session.create" {
                if let Some(new_session_id) = payload.get("id").and_then(|v| v.as_str()) {
                    supervisor.bind_session(new_session_id, &path).await;
                }
            }
            emit(outbound_tx, AgentEnvelope::Response { request_id, payload }).await;
        }
        Err(e) => {
            emit(outbound_tx, AgentEnvelope::Error { request_id, message: e.to_message("") }).await;
        }
    }
}

async fn dispatch_supervisor_action(
    supervisor: &WorkerSupervisor,
    outbound_tx: &mpsc::Sender<AgentEnvelope>,
    request_id: String,
    action: String,
    data: serde_json::Value,
) {
    let path = serde_json::from_value::<ProjectPathPayload>(data).ok().map(|p| PathBuf::from(p.path));

    let result = match action.as_str() {
        "project.list" => {
            let summaries = supervisor.list_instances().await;
            let payload = serde_json::json!(summaries
                .iter()
                .map(|s| serde_json::json!({
                    "path": s.path.display().to_string(),
                    "status": s.status.as_str(),
                    "port": s.port,
                }))
                .collect::<Vec<_>>());
            Ok(payload)
        }
        "project.start" => match path {
            Some(path) => supervisor.start(&path).await.map(|port| serde_json::json!({"port": port})),
            None => Err(AgentError::BadRequest),
        },
        "project.stop" => match path {
            Some(path) => supervisor.stop(&path).await.map(|()| serde_json::Value::Null),
            None => Err(AgentError::BadRequest),
        },
        _ => Err(AgentError::BadRequest),
    };

    match result {
        Ok(payload) => emit(outbound_tx, AgentEnvelope::Response { request_id, payload }).await,
        Err(e) => emit(outbound_tx, AgentEnvelope::Error { request_id, message: e.to_message("") }).await,
    }
}
