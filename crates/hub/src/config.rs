// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the gateway Hub.
#[derive(Debug, Clone, clap::Args)]
pub struct HubConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "HUB_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8800, env = "HUB_PORT")]
    pub port: u16,

    /// Bearer token required on the client endpoint. Empty disables auth.
    #[arg(long, env = "HUB_CLIENT_TOKEN")]
    pub client_token: Option<String>,

    /// Bearer token required on Agent registration. Empty disables auth.
    #[arg(long, env = "HUB_AGENT_TOKEN")]
    pub agent_token: Option<String>,

    /// Replay buffer retention, per session, in seconds.
    #[arg(long, default_value_t = 300, env = "HUB_REPLAY_TTL_SECS")]
    pub replay_ttl_secs: u64,

    /// Replay buffer retention, per session, as an entry count.
    #[arg(long, default_value_t = 100, env = "HUB_REPLAY_MAX_COUNT")]
    pub replay_max_count: usize,

    /// Disable the replay buffer entirely, degrading to the no-op store.
    #[arg(long, default_value_t = false, env = "HUB_REPLAY_DISABLED")]
    pub replay_disabled: bool,

    /// Capacity of each connection's outbound frame queue.
    #[arg(long, default_value_t = 256, env = "HUB_OUTBOUND_QUEUE_CAPACITY")]
    pub outbound_queue_capacity: usize,

    /// Capacity of each forwarded request's response channel.
    #[arg(long, default_value_t = 100, env = "HUB_RESPONSE_QUEUE_CAPACITY")]
    pub response_queue_capacity: usize,
}

impl HubConfig {
    pub fn replay_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.replay_ttl_secs)
    }
}
