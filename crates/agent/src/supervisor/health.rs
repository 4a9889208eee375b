// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker startup health probe.
//!
//! Polls `GET /global/health` with an async HTTP client rather than
//! shelling out to `curl` per probe.

use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Poll `http://127.0.0.1:{port}/global/health` until it returns 2xx, the
/// deadline elapses, or `cancel` fires. Returns `true` on success.
pub async fn wait_until_healthy(
    client: &reqwest::Client,
    port: u16,
    timeout: Duration,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> bool {
    let url = format!("http://127.0.0.1:{port}/global/health");
    let deadline = Instant::now() + timeout;

    loop {
        if probe_once(client, &url).await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = sleep(poll_interval) => {}
        }
    }
}

async fn probe_once(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_port_never_reports_healthy() {
        let client = reqwest::Client::new();
        let cancel = CancellationToken::new();
        let healthy = wait_until_healthy(
            &client,
            1, // privileged/unused port, connection refused
            Duration::from_millis(300),
            Duration::from_millis(50),
            &cancel,
        )
        .await;
        assert!(!healthy);
    }

    #[tokio::test]
    async fn cancellation_stops_the_poll_loop_promptly() {
        let client = reqwest::Client::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let healthy = wait_until_healthy(
            &client,
            1,
            Duration::from_secs(30),
            Duration::from_millis(50),
            &cancel,
        )
        .await;
        assert!(!healthy);
    }
}
