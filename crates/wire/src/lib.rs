// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared wire types for the client↔Hub and Hub↔Agent WebSocket protocols.
//!
//! Both processes speak JSON text frames. Inbound frames are decoded into a
//! loosely-typed envelope first (`type`/`id`/`payload`) and only the payload
//! of a recognized type is parsed into a strict struct — this mirrors how
//! the rest of this codebase handles polymorphic WS event dispatch. Outbound
//! frames are strict `#[serde(tag = "type")]` enums so producers can't
//! accidentally omit a required field.

pub mod agent;
pub mod client;
pub mod session;

pub use session::{validate_session_id, SESSION_ID_PATTERN};
