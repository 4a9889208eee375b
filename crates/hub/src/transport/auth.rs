// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::error::HubError;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a token carried on a WebSocket upgrade query string (`?token=...`).
/// `expected = None` disables auth entirely.
pub fn validate_ws_query(token: Option<&str>, expected: Option<&str>) -> Result<(), HubError> {
    let expected = match expected {
        Some(tok) if !tok.is_empty() => tok,
        _ => return Ok(()),
    };
    match token {
        Some(token) if constant_time_eq(token, expected) => Ok(()),
        _ => Err(HubError::Unauthorized),
    }
}
