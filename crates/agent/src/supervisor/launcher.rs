// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable worker-process launch backends.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::time::{sleep, Duration};

/// A running worker process handle, opaque to the supervisor beyond
/// `stop`/`is_alive`.
pub enum WorkerHandle {
    Child(Child),
    Named { name: String },
}

/// Launches, stops, and probes the liveness of a worker process. Three
/// backends share this trait so the supervisor is agnostic to which is
/// configured. Object-safe via boxed futures, matching this codebase's
/// `Backend`/`Detector` trait shape.
pub trait WorkerLauncher: Send + Sync {
    fn launch(
        &self,
        name: &str,
        path: &Path,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<WorkerHandle>> + Send + '_>>;

    fn stop(
        &self,
        handle: &mut WorkerHandle,
        grace: Duration,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    fn is_alive<'a>(
        &'a self,
        handle: &'a WorkerHandle,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

/// Checks whether a process with the given PID is alive.
fn is_process_alive(pid: u32) -> bool {
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };
    signal::kill(Pid::from_raw(pid_i32), None).is_ok()
}

/// Default launcher: spawns the worker as a direct child process.
pub struct ChildProcessLauncher {
    command: String,
}

impl ChildProcessLauncher {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }
}

impl WorkerLauncher for ChildProcessLauncher {
    fn launch(
        &self,
        _name: &str,
        path: &Path,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<WorkerHandle>> + Send + '_>> {
        let path = path.to_path_buf();
        Box::pin(async move {
            let child = Command::new(&self.command)
                .current_dir(&path)
                .env("PORT", port.to_string())
                .env("HOST", "127.0.0.1")
                .kill_on_drop(false)
                .spawn()?;
            Ok(WorkerHandle::Child(child))
        })
    }

    fn stop(
        &self,
        handle: &mut WorkerHandle,
        grace: Duration,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let WorkerHandle::Child(child) = handle else {
                anyhow::bail!("ChildProcessLauncher received a non-child handle");
            };
            let Some(pid) = child.id() else {
                return Ok(());
            };
            if signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_err() {
                return Ok(());
            }

            let deadline = tokio::time::Instant::now() + grace;
            loop {
                if !is_process_alive(pid) {
                    break;
                }
                if tokio::time::Instant::now() >= deadline {
                    let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
                    break;
                }
                sleep(Duration::from_millis(100)).await;
            }
            let _ = child.wait().await;
            Ok(())
        })
    }

    fn is_alive<'a>(
        &'a self,
        handle: &'a WorkerHandle,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            match handle {
                WorkerHandle::Child(child) => child.id().map(is_process_alive).unwrap_or(false),
                WorkerHandle::Named { .. } => false,
            }
        })
    }
}

/// Shells out to `tmux` to run the worker in a detached session.
/// Best-effort: liveness is checked via `tmux has-session`.
pub struct TmuxLauncher {
    command: String,
    socket: Option<String>,
}

impl TmuxLauncher {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), socket: None }
    }

    fn tmux_cmd(&self) -> Command {
        let mut cmd = Command::new("tmux");
        if let Some(ref s) = self.socket {
            cmd.arg("-S").arg(s);
        }
        cmd
    }
}

impl WorkerLauncher for TmuxLauncher {
    fn launch(
        &self,
        name: &str,
        path: &Path,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<WorkerHandle>> + Send + '_>> {
        let name = name.to_owned();
        let path = path.to_path_buf();
        Box::pin(async move {
            let status = self
                .tmux_cmd()
                .args(["new-session", "-d", "-s", &name, "-c"])
                .arg(&path)
                .arg(format!("PORT={port} {}", self.command))
                .status()
                .await?;
            if !status.success() {
                anyhow::bail!("tmux new-session failed for '{name}'");
            }
            Ok(WorkerHandle::Named { name })
        })
    }

    fn stop(
        &self,
        handle: &mut WorkerHandle,
        _grace: Duration,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let WorkerHandle::Named { name } = handle else {
                anyhow::bail!("TmuxLauncher received a non-tmux handle");
            };
            // Tolerate "session already gone".
            let _ = self.tmux_cmd().args(["kill-session", "-t", name]).status().await;
            Ok(())
        })
    }

    fn is_alive<'a>(
        &'a self,
        handle: &'a WorkerHandle,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            let WorkerHandle::Named { name } = handle else { return false };
            self.tmux_cmd()
                .args(["has-session", "-t", name])
                .status()
                .await
                .map(|s| s.success())
                .unwrap_or(false)
        })
    }
}

/// Shells out to a container runtime CLI to run the worker by name.
/// Liveness via `docker inspect`.
pub struct ContainerLauncher {
    image: String,
    runtime: String,
}

impl ContainerLauncher {
    pub fn new(image: impl Into<String>) -> Self {
        Self { image: image.into(), runtime: "docker".to_owned() }
    }
}

impl WorkerLauncher for ContainerLauncher {
    fn launch(
        &self,
        name: &str,
        path: &Path,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<WorkerHandle>> + Send + '_>> {
        let name = name.to_owned();
        let path = path.to_path_buf();
        Box::pin(async move {
            let status = Command::new(&self.runtime)
                .args(["run", "-d", "--name", &name])
                .arg("-v")
                .arg(format!("{}:/workspace", path.display()))
                .args(["-p", &format!("{port}:{port}")])
                .args(["-e", &format!("PORT={port}")])
                .arg(&self.image)
                .status()
                .await?;
            if !status.success() {
                anyhow::bail!("container run failed for '{name}'");
            }
            Ok(WorkerHandle::Named { name })
        })
    }

    fn stop(
        &self,
        handle: &mut WorkerHandle,
        _grace: Duration,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let WorkerHandle::Named { name } = handle else {
                anyhow::bail!("ContainerLauncher received a non-container handle");
            };
            let _ = Command::new(&self.runtime).args(["stop", name]).status().await;
            let _ = Command::new(&self.runtime).args(["rm", "-f", name]).status().await;
            Ok(())
        })
    }

    fn is_alive<'a>(
        &'a self,
        handle: &'a WorkerHandle,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            let WorkerHandle::Named { name } = handle else { return false };
            Command::new(&self.runtime)
                .args(["inspect", "-f", "{{.State.Running}}", name])
                .output()
                .await
                .map(|out| {
                    out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true"
                })
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn child_process_launcher_spawns_and_stops_sleep() {
        let launcher = ChildProcessLauncher::new("sleep");
        let dir = tempfile::tempdir().unwrap();
        let mut handle = launcher
            .launch("test", dir.path(), 0)
            .await
            .expect("sleep should spawn even with no args (exits immediately)");
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = launcher.stop(&mut handle, Duration::from_millis(200)).await;
    }

    #[test]
    fn process_liveness_check_does_not_panic_on_real_pid() {
        let _ = is_process_alive(1);
    }
}
