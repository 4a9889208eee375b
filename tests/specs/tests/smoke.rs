// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `gateway-hub` and
//! `gateway-agent` binaries and drive the full client -> Hub -> Agent ->
//! supervisor path over real WebSocket connections.

use std::time::Duration;

use gateway_specs::{recv, send, send_until_agent_available, AgentProcess, HubProcess};

const READY_TIMEOUT: Duration = Duration::from_secs(5);
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn hub_answers_ping_with_no_agent_connected() -> anyhow::Result<()> {
    let hub = HubProcess::start(&[])?;
    hub.wait_ready(READY_TIMEOUT).await?;

    let mut client = hub.connect_client().await?;
    send(&mut client, serde_json::json!({"type": "ping", "id": "p1"})).await?;
    let reply = recv(&mut client, RECV_TIMEOUT).await?;

    assert_eq!(reply["type"], "pong");
    assert_eq!(reply["id"], "p1");
    Ok(())
}

#[tokio::test]
async fn session_list_errors_without_any_agent_registered() -> anyhow::Result<()> {
    let hub = HubProcess::start(&[])?;
    hub.wait_ready(READY_TIMEOUT).await?;

    let mut client = hub.connect_client().await?;
    send(&mut client, serde_json::json!({"type": "session.list", "id": "l1", "payload": {}}))
        .await?;
    let reply = recv(&mut client, RECV_TIMEOUT).await?;

    assert_eq!(reply["type"], "error");
    assert!(reply["payload"]["error"].as_str().unwrap().contains("agent"));
    Ok(())
}

#[tokio::test]
async fn project_start_on_a_non_whitelisted_path_is_rejected_end_to_end() -> anyhow::Result<()> {
    let hub = HubProcess::start(&[])?;
    hub.wait_ready(READY_TIMEOUT).await?;

    let allowed = tempfile::tempdir()?;
    let _agent = AgentProcess::start(
        &hub,
        "dev1",
        &[
            "--allowed-paths",
            allowed.path().to_str().unwrap(),
            "--launcher",
            "child",
            "--worker-command",
            "sleep",
        ],
    )?;

    let mut client = hub.connect_client().await?;
    let reply = send_until_agent_available(
        &mut client,
        serde_json::json!({
            "type": "project.start",
            "id": "ps1",
            "payload": {"path": "/not/on/the/allow/list"},
        }),
        Duration::from_secs(10),
    )
    .await?;

    assert_eq!(reply["type"], "error");
    assert!(reply["payload"]["error"].as_str().unwrap().contains("PATH_NOT_WHITELISTED"));
    Ok(())
}

#[tokio::test]
async fn project_start_against_an_unhealthy_worker_reports_health_timeout() -> anyhow::Result<()>
{
    let hub = HubProcess::start(&[])?;
    hub.wait_ready(READY_TIMEOUT).await?;

    let allowed = tempfile::tempdir()?;
    let _agent = AgentProcess::start(
        &hub,
        "dev1",
        &[
            "--allowed-paths",
            allowed.path().to_str().unwrap(),
            "--launcher",
            "child",
            // `sleep` with no args exits immediately and never serves
            // /global/health, so the supervisor's health probe always
            // times out -- exercising the real launch -> probe -> teardown
            // path without needing a fake worker binary.
            "--worker-command",
            "sleep",
            "--health-timeout-secs",
            "1",
            "--health-poll-ms",
            "50",
        ],
    )?;

    let mut client = hub.connect_client().await?;
    let path = allowed.path().to_str().unwrap().to_owned();
    let reply = send_until_agent_available(
        &mut client,
        serde_json::json!({
            "type": "project.start",
            "id": "ps2",
            "payload": {"path": path},
        }),
        Duration::from_secs(10),
    )
    .await?;

    assert_eq!(reply["type"], "error");
    assert!(reply["payload"]["error"].as_str().unwrap().contains("HEALTH_TIMEOUT"));
    Ok(())
}
