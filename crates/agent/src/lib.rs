// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway Agent: outbound reverse-tunnel client plus the per-project
//! Worker Supervisor that brokers requests to local worker processes.

pub mod config;
pub mod error;
pub mod supervisor;
pub mod tunnel;
pub mod worker_client;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{AgentConfig, LauncherKind};
use crate::supervisor::launcher::{ChildProcessLauncher, ContainerLauncher, TmuxLauncher, WorkerLauncher};
use crate::supervisor::{SupervisorConfig, WorkerSupervisor};

fn build_launcher(config: &AgentConfig) -> Box<dyn WorkerLauncher> {
    match config.launcher {
        LauncherKind::Child => Box::new(ChildProcessLauncher::new(config.worker_command.clone())),
        LauncherKind::Tmux => Box::new(TmuxLauncher::new(config.worker_command.clone())),
        LauncherKind::Container => Box::new(ContainerLauncher::new(config.worker_command.clone())),
    }
}

/// Run the Agent until `shutdown` fires: reconnect the tunnel client with
/// backoff, and periodically sweep worker instances for crash recovery.
pub async fn run(config: AgentConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    config.validate()?;
    let config = Arc::new(config);

    let supervisor = Arc::new(WorkerSupervisor::new(
        SupervisorConfig {
            allowed_paths: config.allowed_paths.iter().map(PathBuf::from).collect(),
            max_instances: config.max_instances,
            health_timeout: config.health_timeout(),
            health_poll_interval: config.health_poll_interval(),
            stop_grace: config.stop_grace_period(),
            port_min: config.port_min,
            port_max: config.port_max,
        },
        build_launcher(&config),
    ));

    if config.idle_timeout_secs > 0 {
        spawn_refresh_sweeper(
            Arc::clone(&supervisor),
            Duration::from_secs(config.idle_timeout_secs),
            shutdown.clone(),
        );
    }

    tunnel::run(Arc::clone(&config), supervisor, shutdown).await;
    Ok(())
}

fn spawn_refresh_sweeper(
    supervisor: Arc<WorkerSupervisor>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => supervisor.refresh_status().await,
            }
        }
    });
}
