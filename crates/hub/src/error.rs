// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of error codes the Hub can surface to a client or report about
/// an Agent-forward attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubError {
    Unauthorized,
    InvalidFrame,
    NoAgentAvailable,
    AgentNotFound,
    AgentBusy,
    Timeout,
    Internal,
}

impl HubError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::InvalidFrame => 400,
            Self::NoAgentAvailable | Self::AgentNotFound => 404,
            Self::AgentBusy => 503,
            Self::Timeout => 504,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidFrame => "INVALID_FRAME",
            Self::NoAgentAvailable => "NO_AGENT_AVAILABLE",
            Self::AgentNotFound => "AGENT_NOT_FOUND",
            Self::AgentBusy => "AGENT_BUSY",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL",
        }
    }

    /// Human-readable message used when no more specific message is available.
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::InvalidFrame => "invalid frame",
            Self::NoAgentAvailable => "No agent connected for this request",
            Self::AgentNotFound => "named agent is no longer registered",
            Self::AgentBusy => "agent outbound queue is full",
            Self::Timeout => "request timed out",
            Self::Internal => "internal error",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for HubError {}

/// Top-level error response envelope (mirrors the `error` frame payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
