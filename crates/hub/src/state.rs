// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agents::AgentRegistry;
use crate::config::HubConfig;
use crate::replay::ReplayStore;

/// Process-wide Hub root: owns the agent registry and the replay buffer,
/// and outlives every client/agent connection.
pub struct HubState {
    pub config: HubConfig,
    pub agents: AgentRegistry,
    pub replay: Arc<ReplayStore>,
    pub shutdown: CancellationToken,
}

impl HubState {
    pub fn new(config: HubConfig, shutdown: CancellationToken) -> Self {
        let replay = if config.replay_disabled {
            ReplayStore::disabled()
        } else {
            ReplayStore::new(config.replay_max_count, config.replay_ttl())
        };
        let agents =
            AgentRegistry::new(config.outbound_queue_capacity, config.response_queue_capacity);
        Self { config, agents, replay: Arc::new(replay), shutdown }
    }
}

/// Current epoch millis, used to timestamp replay entries.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
