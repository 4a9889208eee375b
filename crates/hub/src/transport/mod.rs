// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket transport for the Hub: client endpoint and Agent
//! reverse-tunnel endpoint, mounted on one axum `Router`.
//!
//! Unlike an HTTP API, both endpoints authenticate inside their own upgrade
//! handler (the bearer token arrives as a WS query parameter, not a header),
//! so there is no shared auth middleware layer here — see [`auth`].

pub mod auth;
pub mod tunnel;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::HubState;

/// Build the axum `Router` serving both Hub endpoints.
pub fn build_router(state: Arc<HubState>) -> Router {
    Router::new()
        .route("/ws/client", get(ws::ws_handler))
        .route("/ws/tunnel", get(tunnel::tunnel_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
