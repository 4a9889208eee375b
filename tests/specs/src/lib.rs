// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `gateway-hub` and `gateway-agent` binaries as
//! subprocesses, connects to the Hub as a plain WebSocket client, and
//! drives the three-process flow (client -> Hub -> Agent -> supervisor)
//! the way a real mobile client would.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

fn workspace_root() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs -> tests -> workspace root
    manifest.parent().and_then(|p| p.parent()).map(Path::to_path_buf).unwrap_or(manifest.to_path_buf())
}

fn target_binary(name: &str) -> PathBuf {
    workspace_root().join("target").join("debug").join(name)
}

async fn wait_for_tcp(port: u16, timeout: Duration) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return Ok(());
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("127.0.0.1:{port} never accepted a connection within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// A running `gateway-hub` process, killed on drop.
pub struct HubProcess {
    child: Child,
    port: u16,
}

impl HubProcess {
    /// Spawn `gateway-hub` with the given extra CLI args, auto-assigning a
    /// free `--port`.
    pub fn start(extra_args: &[&str]) -> anyhow::Result<Self> {
        let binary = target_binary("gateway-hub");
        anyhow::ensure!(binary.exists(), "gateway-hub binary not found at {}", binary.display());
        let port = free_port()?;

        let mut args: Vec<String> =
            vec!["--host".into(), "127.0.0.1".into(), "--port".into(), port.to_string()];
        args.extend(extra_args.iter().map(|s| s.to_string()));

        let child = Command::new(&binary)
            .args(&args)
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn wait_ready(&self, timeout: Duration) -> anyhow::Result<()> {
        wait_for_tcp(self.port, timeout).await
    }

    /// Connect a plain WebSocket client to `/ws/client`.
    pub async fn connect_client(&self) -> anyhow::Result<WsStream> {
        let url = format!("ws://127.0.0.1:{}/ws/client", self.port);
        let (stream, _) = tokio_tungstenite::connect_async(&url).await?;
        Ok(stream)
    }

    pub fn tunnel_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws/tunnel", self.port)
    }
}

impl Drop for HubProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A running `gateway-agent` process, killed on drop.
pub struct AgentProcess {
    child: Child,
}

impl AgentProcess {
    /// Spawn `gateway-agent` pointed at `hub.tunnel_url()`.
    pub fn start(hub: &HubProcess, agent_id: &str, extra_args: &[&str]) -> anyhow::Result<Self> {
        let binary = target_binary("gateway-agent");
        anyhow::ensure!(binary.exists(), "gateway-agent binary not found at {}", binary.display());

        let mut args: Vec<String> =
            vec!["--hub-url".into(), hub.tunnel_url(), "--agent-id".into(), agent_id.to_string()];
        args.extend(extra_args.iter().map(|s| s.to_string()));

        let child = Command::new(&binary)
            .args(&args)
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child })
    }
}

impl Drop for AgentProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub async fn send(stream: &mut WsStream, value: serde_json::Value) -> anyhow::Result<()> {
    stream.send(WsMessage::Text(value.to_string().into())).await?;
    Ok(())
}

pub async fn recv(stream: &mut WsStream, timeout: Duration) -> anyhow::Result<serde_json::Value> {
    loop {
        let msg = tokio::time::timeout(timeout, stream.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("stream closed"))??;
        match msg {
            WsMessage::Text(text) => return Ok(serde_json::from_str(&text)?),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => anyhow::bail!("unexpected message: {other:?}"),
        }
    }
}

/// Send `value` and retry until the reply's `type` is not `"error"` with an
/// agent-availability message, or `timeout` elapses. Used to ride out the
/// Agent's own reconnect backoff after the Hub process comes up first.
pub async fn send_until_agent_available(
    stream: &mut WsStream,
    value: serde_json::Value,
    timeout: Duration,
) -> anyhow::Result<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        send(stream, value.clone()).await?;
        let reply = recv(stream, Duration::from_secs(5)).await?;
        let is_no_agent = reply["type"] == "error"
            && reply["payload"]["error"].as_str().unwrap_or("").contains("agent connected");
        if !is_no_agent {
            return Ok(reply);
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("no agent became available within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
