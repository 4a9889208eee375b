// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of error codes the Agent can report back to the Hub, either in
/// an `agent.error` reply or as an internal `Result` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentError {
    /// `project.start`/`project.stop` named a path outside the allow-list.
    PathNotWhitelisted,
    /// The worker port pool has no free port.
    NoAvailablePort,
    /// Every candidate port is either reserved or externally occupied, as
    /// reported by the pool's liveness probe.
    AllPortsInUse,
    /// `max_instances` concurrently running workers already hold every slot.
    MaxInstancesReached,
    /// No worker is running for the requested project path.
    WorkerNotRunning,
    /// The worker process exited before it became healthy.
    WorkerExited,
    /// The worker did not pass its health probe within the configured deadline.
    HealthTimeout,
    /// The configured launcher backend is unavailable on this host (e.g. no
    /// `tmux` binary, or the container runtime CLI is missing).
    LauncherUnavailable,
    /// The Hub rejected this Agent's registration token.
    Unauthorized,
    /// A request frame from the Hub was malformed or missing required fields.
    BadRequest,
    Internal,
}

impl AgentError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PathNotWhitelisted => "PATH_NOT_WHITELISTED",
            Self::NoAvailablePort => "NO_AVAILABLE_PORT",
            Self::AllPortsInUse => "ALL_PORTS_IN_USE",
            Self::MaxInstancesReached => "MAX_INSTANCES_REACHED",
            Self::WorkerNotRunning => "WORKER_NOT_RUNNING",
            Self::WorkerExited => "WORKER_EXITED",
            Self::HealthTimeout => "HEALTH_TIMEOUT",
            Self::LauncherUnavailable => "LAUNCHER_UNAVAILABLE",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::Internal => "INTERNAL",
        }
    }

    /// Human-readable message used when no more specific message is available.
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::PathNotWhitelisted => "project path is not in the allowed list",
            Self::NoAvailablePort => "no free port in the worker port pool",
            Self::AllPortsInUse => "every candidate port is reserved or externally occupied",
            Self::MaxInstancesReached => "maximum number of worker instances already running",
            Self::WorkerNotRunning => "no worker is running for this project",
            Self::WorkerExited => "worker process exited before becoming healthy",
            Self::HealthTimeout => "worker did not become healthy in time",
            Self::LauncherUnavailable => "configured worker launcher is unavailable",
            Self::Unauthorized => "registration token rejected",
            Self::BadRequest => "malformed request",
            Self::Internal => "internal error",
        }
    }

    /// Render as the plain-string `message` field of `AgentEnvelope::Error`.
    pub fn to_message(&self, detail: impl Into<String>) -> String {
        let detail = detail.into();
        if detail.is_empty() {
            format!("{}: {}", self.as_str(), self.default_message())
        } else {
            format!("{}: {}", self.as_str(), detail)
        }
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for AgentError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_as_str() {
        assert_eq!(AgentError::HealthTimeout.to_string(), "HEALTH_TIMEOUT");
    }

    #[test]
    fn to_message_falls_back_to_default() {
        let msg = AgentError::NoAvailablePort.to_message("");
        assert_eq!(msg, "NO_AVAILABLE_PORT: no free port in the worker port pool");
    }

    #[test]
    fn to_message_includes_detail() {
        let msg = AgentError::PathNotWhitelisted.to_message("/etc");
        assert_eq!(msg, "PATH_NOT_WHITELISTED: /etc");
    }
}
