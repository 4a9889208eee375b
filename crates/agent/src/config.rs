// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

/// Configuration for the gateway Agent.
#[derive(Debug, Clone, Parser)]
#[command(name = "gateway-agent", version, about)]
pub struct AgentConfig {
    /// WebSocket URL of the Hub's Agent tunnel endpoint.
    #[arg(long, env = "AGENT_HUB_URL", default_value = "ws://127.0.0.1:8800/ws/tunnel")]
    pub hub_url: String,

    /// Unique identifier for this Agent. Displaces any prior live
    /// registration under the same id.
    #[arg(long, env = "AGENT_ID")]
    pub agent_id: String,

    /// Bearer token sent on `agent.register`. Empty disables auth.
    #[arg(long, env = "AGENT_TOKEN")]
    pub token: Option<String>,

    /// Capability tags advertised at registration.
    #[arg(long, env = "AGENT_CAPABILITIES", value_delimiter = ',', default_value = "worker")]
    pub capabilities: Vec<String>,

    /// Minimum port (inclusive) of the worker port pool.
    #[arg(long, env = "AGENT_PORT_MIN", default_value_t = 4096)]
    pub port_min: u16,

    /// Maximum port (inclusive) of the worker port pool.
    #[arg(long, env = "AGENT_PORT_MAX", default_value_t = 4196)]
    pub port_max: u16,

    /// Hard ceiling on concurrently running worker instances.
    #[arg(long, env = "AGENT_MAX_INSTANCES", default_value_t = 8)]
    pub max_instances: usize,

    /// Allow-listed project directories. A `project.start`/`project.stop`
    /// for any other path fails `PathNotWhitelisted`.
    #[arg(long, env = "AGENT_ALLOWED_PATHS", value_delimiter = ',')]
    pub allowed_paths: Vec<String>,

    /// Worker startup health-probe deadline, in seconds.
    #[arg(long, env = "AGENT_HEALTH_TIMEOUT_SECS", default_value_t = 30)]
    pub health_timeout_secs: u64,

    /// Interval between health-probe polls, in milliseconds.
    #[arg(long, env = "AGENT_HEALTH_POLL_MS", default_value_t = 500)]
    pub health_poll_ms: u64,

    /// Grace period before escalating a worker stop to forceful
    /// termination, in seconds.
    #[arg(long, env = "AGENT_STOP_GRACE_SECS", default_value_t = 5)]
    pub stop_grace_secs: u64,

    /// Interval for the crash-recovery sweep (`RefreshStatus`), in seconds.
    /// `0` disables the periodic sweep; `RefreshStatus` can still be
    /// invoked on demand.
    #[arg(long, env = "AGENT_IDLE_TIMEOUT_SECS", default_value_t = 30)]
    pub idle_timeout_secs: u64,

    /// Worker process launch backend.
    #[arg(long, env = "AGENT_LAUNCHER", value_enum, default_value_t = LauncherKind::Child)]
    pub launcher: LauncherKind,

    /// Command used to start a worker process (`ChildProcessLauncher`
    /// and `ContainerLauncher` append it after their own framing args).
    #[arg(long, env = "AGENT_WORKER_COMMAND", default_value = "opencode-worker")]
    pub worker_command: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "AGENT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Which backend the Worker Supervisor uses to launch worker processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LauncherKind {
    /// Direct child process via `tokio::process::Command`.
    Child,
    /// A detached `tmux` session.
    Tmux,
    /// A named container via a container-runtime CLI.
    Container,
}

impl AgentConfig {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_millis(self.health_poll_ms)
    }

    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.agent_id.trim().is_empty() {
            anyhow::bail!("--agent-id must not be empty");
        }
        if self.port_min > self.port_max {
            anyhow::bail!("--port-min must be <= --port-max");
        }
        if self.max_instances == 0 {
            anyhow::bail!("--max-instances must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
