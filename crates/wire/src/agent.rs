// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub ⇄ Agent tunnel frame types.
//!
//! The Agent always dials out; the first frame it sends after the
//! connection opens must be [`AgentEnvelope::Register`]. Everything the Hub
//! forwards downstream afterward is a `request`/`response`/`stream` pair
//! keyed by `requestId`, so the Hub can multiplex many in-flight client
//! requests over one Agent transport.

use serde::{Deserialize, Serialize};

/// Frames the Agent sends to the Hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEnvelope {
    #[serde(rename = "agent.register")]
    Register {
        #[serde(rename = "agentId")]
        agent_id: String,
        token: String,
        #[serde(default)]
        capabilities: Vec<String>,
        version: String,
    },
    #[serde(rename = "agent.pong")]
    Pong,
    #[serde(rename = "agent.response")]
    Response {
        #[serde(rename = "requestId")]
        request_id: String,
        payload: serde_json::Value,
    },
    #[serde(rename = "agent.stream")]
    Stream {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "seq")]
        seq: u64,
        payload: serde_json::Value,
    },
    #[serde(rename = "agent.stream.end")]
    StreamEnd {
        #[serde(rename = "requestId")]
        request_id: String,
    },
    #[serde(rename = "agent.error")]
    Error {
        #[serde(rename = "requestId")]
        request_id: String,
        message: String,
    },
}

/// Frames the Hub sends to the Agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEnvelope {
    #[serde(rename = "agent.registered")]
    Registered {
        #[serde(rename = "agentId")]
        agent_id: String,
    },
    #[serde(rename = "agent.ping")]
    Ping,
    #[serde(rename = "agent.request")]
    Request {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "sessionId")]
        session_id: String,
        action: String,
        #[serde(default)]
        data: serde_json::Value,
        #[serde(rename = "projectPath", default, skip_serializing_if = "Option::is_none")]
        project_path: Option<String>,
    },
}

/// Why the Hub closed or refused an Agent's transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplacementReason {
    /// A newer registration for the same `agentId` replaced this transport.
    Superseded,
    /// The registration frame carried an invalid or stale token.
    AuthRejected,
}

impl DisplacementReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Superseded => "superseded",
            Self::AuthRejected => "auth_rejected",
        }
    }
}
