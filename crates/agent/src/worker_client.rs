// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Forwards an opaque request to a running worker's HTTP surface.
//!
//! Only the shape of four actions (create, list, send-message, delete) is
//! fixed; endpoint paths are an implementation choice. This binding:
//! `session.create` → `POST /sessions`,
//! `session.list` → `GET /sessions`, `session.messages` → `GET
//! /sessions/{id}/messages`, `session.delete` → `DELETE /sessions/{id}`,
//! `prompt` → `POST /sessions/{id}/messages` with a newline-delimited JSON
//! streaming response, one `{"text": "..."}` object per source chunk.

use bytes::Bytes;
use futures_util::{stream, Stream, StreamExt};

use crate::error::AgentError;

fn session_id_from(data: &serde_json::Value) -> Option<&str> {
    data.get("sessionId").and_then(|v| v.as_str())
}

/// Issue a single request/response action against the worker and return
/// its JSON payload. Covers every action except `prompt`.
pub async fn call(
    client: &reqwest::Client,
    base_url: &str,
    action: &str,
    data: &serde_json::Value,
) -> Result<serde_json::Value, AgentError> {
    let response = match action {
        "session.create" => client.post(format!("{base_url}/sessions")).json(data).send().await,
        "session.list" => client.get(format!("{base_url}/sessions")).send().await,
        "session.messages" => {
            let Some(id) = session_id_from(data) else { return Err(AgentError::BadRequest) };
            client.get(format!("{base_url}/sessions/{id}/messages")).send().await
        }
        "session.delete" => {
            let Some(id) = session_id_from(data) else { return Err(AgentError::BadRequest) };
            client.delete(format!("{base_url}/sessions/{id}")).send().await
        }
        "project.list" | "project.start" | "project.stop" => {
            return Err(AgentError::BadRequest); // handled by the Worker Supervisor directly.
        }
        _ => return Err(AgentError::BadRequest),
    };

    let response = response.map_err(|_| AgentError::Internal)?;
    if !response.status().is_success() {
        return Err(AgentError::Internal);
    }
    response.json::<serde_json::Value>().await.map_err(|_| AgentError::Internal)
}

/// Issue `prompt` and return a stream of incremental text chunks, each
/// already unwrapped to its `payload` value.
pub async fn stream_prompt(
    client: &reqwest::Client,
    base_url: &str,
    data: &serde_json::Value,
) -> Result<impl Stream<Item = serde_json::Value>, AgentError> {
    let Some(id) = session_id_from(data) else { return Err(AgentError::BadRequest) };
    let response = client
        .post(format!("{base_url}/sessions/{id}/messages"))
        .json(data)
        .send()
        .await
        .map_err(|_| AgentError::Internal)?;

    if !response.status().is_success() {
        return Err(AgentError::Internal);
    }

    let byte_stream = response.bytes_stream();
    Ok(ndjson_values(byte_stream))
}

/// State threaded through [`ndjson_values`]'s `unfold`: the upstream byte
/// stream, a carry-over buffer for a line split across chunks, and a
/// small queue of already-decoded values waiting to be yielded one by one.
struct NdjsonState<S> {
    byte_stream: S,
    buf: Vec<u8>,
    pending: std::collections::VecDeque<serde_json::Value>,
    done: bool,
}

/// Splits a byte stream on newlines and parses each complete line as JSON,
/// silently skipping blank lines and parse failures (a worker emitting a
/// malformed line drops that chunk rather than aborting the whole reply).
fn ndjson_values(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>> + Unpin,
) -> impl Stream<Item = serde_json::Value> {
    let state = NdjsonState {
        byte_stream,
        buf: Vec::new(),
        pending: std::collections::VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(value) = state.pending.pop_front() {
                return Some((value, state));
            }
            if state.done {
                return None;
            }

            match state.byte_stream.next().await {
                Some(Ok(chunk)) => {
                    state.buf.extend_from_slice(&chunk);
                    while let Some(pos) = state.buf.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = state.buf.drain(..=pos).collect();
                        let line = &line[..line.len() - 1];
                        if line.is_empty() {
                            continue;
                        }
                        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(line) {
                            state.pending.push_back(value);
                        }
                    }
                }
                Some(Err(_)) | None => {
                    state.done = true;
                    if !state.buf.is_empty() {
                        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&state.buf)
                        {
                            state.pending.push_back(value);
                        }
                        state.buf.clear();
                    }
                }
            }
        }
    })
}
