// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway Hub: the client-facing and Agent-facing WebSocket server.
//!
//! The Hub multiplexes end-user client requests onto a reverse tunnel held
//! open by an Agent process, and streams the Agent's incremental replies
//! back to the originating client, durably logging every client-visible
//! stream frame in a per-session replay buffer so a reconnecting client can
//! resume without re-issuing its request.

pub mod agents;
pub mod config;
pub mod error;
pub mod replay;
pub mod state;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::replay::spawn_sweeper;
use crate::state::HubState;
use crate::transport::build_router;

/// Run the Hub until its listener fails or `shutdown` is cancelled.
pub async fn run(config: HubConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let state = Arc::new(HubState::new(config, shutdown.clone()));
    spawn_sweeper(Arc::clone(&state.replay), shutdown.clone());

    let router = build_router(Arc::clone(&state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "gateway hub listening");
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
