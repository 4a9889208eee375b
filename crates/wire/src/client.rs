// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client ⇄ Hub frame types.

use serde::{Deserialize, Serialize};

/// The generic envelope every inbound client frame is first decoded into.
///
/// `payload` stays an untyped [`serde_json::Value`] at this layer; the
/// dispatcher re-parses it into the variant-specific struct once `type` is
/// known, matching how the rest of this codebase handles polymorphic WS
/// frames (match on a string tag, then `serde_json::from_value`).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// `session.create` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionCreatePayload {
    pub title: String,
    pub directory: String,
}

/// `prompt` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptPayload {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

/// `project.start` / `project.stop` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectPathPayload {
    pub path: String,
}

/// `sync` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncPayload {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "lastAckId", default)]
    pub last_ack_id: u64,
}

/// `ack` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct AckPayload {
    #[serde(rename = "msgId")]
    pub msg_id: u64,
}

/// A single replay-buffer entry as seen by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayMessage {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub payload: serde_json::Value,
    #[serde(rename = "timestampMs")]
    pub timestamp_ms: u64,
}

/// `sync.batch` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncBatchPayload {
    pub messages: Vec<ReplayMessage>,
    #[serde(rename = "latestId")]
    pub latest_id: u64,
}

/// Outbound Hub→client frame. Always serializes to `{"type":...,"id":...,"payload":...}`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "msgId", skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,
    pub payload: serde_json::Value,
}

impl ServerFrame {
    pub fn new(kind: &'static str, id: Option<String>, payload: serde_json::Value) -> Self {
        Self { kind, id, msg_id: None, payload }
    }

    pub fn with_msg_id(mut self, msg_id: u64) -> Self {
        self.msg_id = Some(msg_id);
        self
    }

    pub fn pong(id: Option<String>) -> Self {
        Self::new("pong", id, serde_json::Value::Null)
    }

    pub fn error(id: Option<String>, message: impl Into<String>) -> Self {
        Self::new("error", id, serde_json::json!({ "error": message.into() }))
    }

    pub fn response(id: Option<String>, payload: serde_json::Value) -> Self {
        Self::new("response", id, payload)
    }

    pub fn stream(id: Option<String>, msg_id: u64, payload: serde_json::Value) -> Self {
        Self::new("stream", id, payload).with_msg_id(msg_id)
    }

    pub fn stream_end(id: Option<String>, msg_id: u64) -> Self {
        Self::new("stream.end", id, serde_json::Value::Null).with_msg_id(msg_id)
    }

    pub fn sync_batch(id: Option<String>, batch: &SyncBatchPayload) -> Self {
        let payload = serde_json::to_value(batch).unwrap_or(serde_json::Value::Null);
        Self::new("sync.batch", id, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_decodes_unknown_type_without_error() {
        let raw = r#"{"type":"bogus","id":"x1","payload":{"a":1}}"#;
        let env: ClientEnvelope = serde_json::from_str(raw).expect("valid json");
        assert_eq!(env.kind, "bogus");
        assert_eq!(env.id.as_deref(), Some("x1"));
    }

    #[test]
    fn envelope_allows_missing_id_and_payload() {
        let raw = r#"{"type":"ping"}"#;
        let env: ClientEnvelope = serde_json::from_str(raw).expect("valid json");
        assert_eq!(env.kind, "ping");
        assert!(env.id.is_none());
        assert!(env.payload.is_null());
    }

    #[test]
    fn server_frame_serializes_expected_shape() {
        let frame = ServerFrame::stream(Some("pr1".to_owned()), 1, serde_json::json!({"text":"H"}));
        let v = serde_json::to_value(&frame).expect("serializable");
        assert_eq!(v["type"], "stream");
        assert_eq!(v["id"], "pr1");
        assert_eq!(v["msgId"], 1);
    }
}
