// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker Supervisor: per-project worker-process manager.
//!
//! One supervisor lock guards both the instance map and the port pool's
//! externally visible invariants: the instance map and the port pool are
//! updated atomically with respect to each other.

pub mod health;
pub mod launcher;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use launcher::{WorkerHandle, WorkerLauncher};

/// Lifecycle status of a worker instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Error(String),
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error(_) => "error",
        }
    }
}

/// Read-only snapshot of a worker instance, for `project.list`.
#[derive(Debug, Clone)]
pub struct InstanceSummary {
    pub path: PathBuf,
    pub status: InstanceStatus,
    pub port: u16,
    pub started_at: Option<SystemTime>,
}

struct Instance {
    port: u16,
    status: InstanceStatus,
    started_at: Option<SystemTime>,
    handle: Option<WorkerHandle>,
}

/// Numeric port-pool reservation, keyed by project path.
struct PortPool {
    min: u16,
    max: u16,
    reserved: HashMap<u16, PathBuf>,
}

impl PortPool {
    fn new(min: u16, max: u16) -> Self {
        Self { min, max, reserved: HashMap::new() }
    }

    fn reservation_for(&self, path: &Path) -> Option<u16> {
        self.reserved.iter().find(|(_, p)| p.as_path() == path).map(|(port, _)| *port)
    }

    /// First free port numerically; fails if every port in range is reserved.
    fn acquire(&mut self, path: &Path) -> Result<u16, AgentError> {
        if let Some(port) = self.reservation_for(path) {
            return Ok(port);
        }
        for port in self.min..=self.max {
            if !self.reserved.contains_key(&port) {
                self.reserved.insert(port, path.to_path_buf());
                return Ok(port);
            }
        }
        Err(AgentError::NoAvailablePort)
    }

    /// Like [`acquire`](Self::acquire), but skips any unreserved port that
    /// `checker` reports as externally occupied by some other process.
    /// Fails `AllPortsInUse` only when every candidate is either reserved
    /// or externally occupied.
    fn acquire_available(
        &mut self,
        path: &Path,
        checker: &dyn Fn(u16) -> bool,
    ) -> Result<u16, AgentError> {
        if let Some(port) = self.reservation_for(path) {
            return Ok(port);
        }
        for port in self.min..=self.max {
            if self.reserved.contains_key(&port) {
                continue;
            }
            if checker(port) {
                continue;
            }
            self.reserved.insert(port, path.to_path_buf());
            return Ok(port);
        }
        Err(AgentError::AllPortsInUse)
    }

    fn release(&mut self, path: &Path) {
        self.reserved.retain(|_, p| p.as_path() != path);
    }
}

/// Default liveness check for [`PortPool::acquire_available`]: a port is
/// externally occupied if something is already listening on it locally.
fn port_externally_occupied(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_err()
}

/// Per-project process manager. Brokers all worker-directed requests
/// through a single running instance per allow-listed path.
pub struct WorkerSupervisor {
    allowed_paths: Vec<PathBuf>,
    max_instances: usize,
    health_timeout: tokio::time::Duration,
    health_poll_interval: tokio::time::Duration,
    stop_grace: tokio::time::Duration,
    launcher: Box<dyn WorkerLauncher>,
    http: reqwest::Client,
    instances: RwLock<HashMap<PathBuf, Instance>>,
    pool: RwLock<PortPool>,
    /// `session_id -> project_path`, persisted at `session.create`.
    session_index: RwLock<HashMap<String, PathBuf>>,
}

pub struct SupervisorConfig {
    pub allowed_paths: Vec<PathBuf>,
    pub max_instances: usize,
    pub health_timeout: tokio::time::Duration,
    pub health_poll_interval: tokio::time::Duration,
    pub stop_grace: tokio::time::Duration,
    pub port_min: u16,
    pub port_max: u16,
}

impl WorkerSupervisor {
    pub fn new(config: SupervisorConfig, launcher: Box<dyn WorkerLauncher>) -> Self {
        let pool = PortPool::new(config.port_min, config.port_max);
        Self {
            allowed_paths: config.allowed_paths,
            max_instances: config.max_instances,
            health_timeout: config.health_timeout,
            health_poll_interval: config.health_poll_interval,
            stop_grace: config.stop_grace,
            launcher,
            http: reqwest::Client::new(),
            instances: RwLock::new(HashMap::new()),
            session_index: RwLock::new(HashMap::new()),
            pool: RwLock::new(pool),
        }
    }

    fn is_allowed(&self, path: &Path) -> bool {
        self.allowed_paths.iter().any(|p| p.as_path() == path)
    }

    fn launch_name(path: &Path) -> String {
        path.file_name().and_then(|n| n.to_str()).unwrap_or("worker").to_owned()
    }

    /// Persist `session_id -> project_path`. Called from `session.create`
    /// handling.
    pub async fn bind_session(&self, session_id: &str, path: &Path) {
        self.session_index.write().await.insert(session_id.to_owned(), path.to_path_buf());
    }

    /// Resolve a project path for a session that did not carry one
    /// explicitly on this request.
    pub async fn resolve_session_path(&self, session_id: &str) -> Option<PathBuf> {
        self.session_index.read().await.get(session_id).cloned()
    }

    /// Start the worker for `path`, or return the existing instance if
    /// already running.
    pub async fn start(&self, path: &Path) -> Result<u16, AgentError> {
        if !self.is_allowed(path) {
            return Err(AgentError::PathNotWhitelisted);
        }

        {
            let instances = self.instances.read().await;
            if let Some(instance) = instances.get(path) {
                if instance.status == InstanceStatus::Running {
                    return Ok(instance.port);
                }
            }
            let running = instances.values().filter(|i| i.status == InstanceStatus::Running).count();
            if running >= self.max_instances {
                return Err(AgentError::MaxInstancesReached);
            }
        }

        let port = {
            let mut pool = self.pool.write().await;
            pool.acquire_available(path, &port_externally_occupied)?
        };

        {
            let mut instances = self.instances.write().await;
            instances.insert(
                path.to_path_buf(),
                Instance { port, status: InstanceStatus::Starting, started_at: None, handle: None },
            );
        }

        let name = Self::launch_name(path);
        let handle = match self.launcher.launch(&name, path, port).await {
            Ok(handle) => handle,
            Err(e) => {
                self.fail(path, &e.to_string()).await;
                return Err(AgentError::Internal);
            }
        };

        let cancel = CancellationToken::new();
        let healthy = health::wait_until_healthy(
            &self.http,
            port,
            self.health_timeout,
            self.health_poll_interval,
            &cancel,
        )
        .await;

        if !healthy {
            let mut handle = handle;
            let _ = self.launcher.stop(&mut handle, self.stop_grace).await;
            self.fail(path, "worker did not become healthy in time").await;
            self.pool.write().await.release(path);
            return Err(AgentError::HealthTimeout);
        }

        let mut instances = self.instances.write().await;
        if let Some(instance) = instances.get_mut(path) {
            instance.status = InstanceStatus::Running;
            instance.started_at = Some(SystemTime::now());
            instance.handle = Some(handle);
        }
        Ok(port)
    }

    async fn fail(&self, path: &Path, message: &str) {
        let mut instances = self.instances.write().await;
        if let Some(instance) = instances.get_mut(path) {
            instance.status = InstanceStatus::Error(message.to_owned());
            instance.port = 0;
            instance.handle = None;
        }
    }

    /// Idempotent stop.
    pub async fn stop(&self, path: &Path) -> Result<(), AgentError> {
        if !self.is_allowed(path) {
            return Err(AgentError::PathNotWhitelisted);
        }

        let handle = {
            let mut instances = self.instances.write().await;
            let Some(instance) = instances.get_mut(path) else { return Ok(()) };
            if instance.status == InstanceStatus::Stopped {
                return Ok(());
            }
            instance.status = InstanceStatus::Stopping;
            instance.handle.take()
        };

        if let Some(mut handle) = handle {
            let _ = self.launcher.stop(&mut handle, self.stop_grace).await;
        }
        self.pool.write().await.release(path);

        let mut instances = self.instances.write().await;
        if let Some(instance) = instances.get_mut(path) {
            instance.status = InstanceStatus::Stopped;
            instance.started_at = None;
            instance.port = 0;
        }
        Ok(())
    }

    /// Probe every supposedly-running instance and mark it `stopped` if
    /// its process has gone away.
    pub async fn refresh_status(&self) {
        let paths: Vec<PathBuf> = {
            let instances = self.instances.read().await;
            instances
                .iter()
                .filter(|(_, i)| i.status == InstanceStatus::Running)
                .map(|(p, _)| p.clone())
                .collect()
        };

        for path in paths {
            let alive = {
                let instances = self.instances.read().await;
                match instances.get(&path).and_then(|i| i.handle.as_ref()) {
                    Some(handle) => self.launcher.is_alive(handle).await,
                    None => false,
                }
            };
            if !alive {
                let mut instances = self.instances.write().await;
                if let Some(instance) = instances.get_mut(&path) {
                    instance.status = InstanceStatus::Stopped;
                    instance.started_at = None;
                    instance.port = 0;
                    instance.handle = None;
                }
                self.pool.write().await.release(&path);
            }
        }
    }

    /// Snapshot every known worker instance, for `project.list`.
    pub async fn list_instances(&self) -> Vec<InstanceSummary> {
        self.instances
            .read()
            .await
            .iter()
            .map(|(path, instance)| InstanceSummary {
                path: path.clone(),
                status: instance.status.clone(),
                port: instance.port,
                started_at: instance.started_at,
            })
            .collect()
    }

    /// Returns the base URL for a running worker, or an error naming its
    /// current status.
    pub async fn get_worker_url(&self, path: &Path) -> Result<String, AgentError> {
        if !self.is_allowed(path) {
            return Err(AgentError::PathNotWhitelisted);
        }
        let instances = self.instances.read().await;
        match instances.get(path) {
            Some(instance) if instance.status == InstanceStatus::Running => {
                Ok(format!("http://127.0.0.1:{}", instance.port))
            }
            Some(_) | None => Err(AgentError::WorkerNotRunning),
        }
    }

    /// Read-only lookup first; on miss, starts the worker under the lock.
    pub async fn get_or_start_worker_url(&self, path: &Path) -> Result<String, AgentError> {
        if let Ok(url) = self.get_worker_url(path).await {
            return Ok(url);
        }
        let port = self.start(path).await?;
        Ok(format!("http://127.0.0.1:{port}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launcher::ChildProcessLauncher;
    use std::time::Duration;

    fn supervisor(allowed: Vec<PathBuf>, max_instances: usize) -> WorkerSupervisor {
        let config = SupervisorConfig {
            allowed_paths: allowed,
            max_instances,
            health_timeout: Duration::from_millis(200),
            health_poll_interval: Duration::from_millis(20),
            stop_grace: Duration::from_millis(100),
            port_min: 44440,
            port_max: 44442,
        };
        WorkerSupervisor::new(config, Box::new(ChildProcessLauncher::new("sleep")))
    }

    #[tokio::test]
    async fn start_rejects_paths_outside_the_allow_list() {
        let sup = supervisor(vec![PathBuf::from("/p")], 2);
        let err = sup.start(Path::new("/r")).await.unwrap_err();
        assert_eq!(err, AgentError::PathNotWhitelisted);
    }

    #[tokio::test]
    async fn start_times_out_when_the_worker_never_answers_health() {
        let sup = supervisor(vec![PathBuf::from("/p")], 2);
        let err = sup.start(Path::new("/p")).await.unwrap_err();
        assert_eq!(err, AgentError::HealthTimeout);

        // The port should have been released on failure, so a fresh
        // attempt reuses the same lowest-numbered port rather than
        // exhausting the pool.
        let summaries = sup.list_instances().await;
        assert_eq!(summaries[0].status, InstanceStatus::Error("worker did not become healthy in time".to_owned()));
    }

    #[tokio::test]
    async fn stop_on_a_never_started_path_is_a_noop() {
        let sup = supervisor(vec![PathBuf::from("/p")], 2);
        sup.stop(Path::new("/p")).await.expect("stop should be idempotent");
    }

    #[test]
    fn port_pool_fails_when_every_port_is_reserved() {
        let mut pool = PortPool::new(44440, 44441);
        pool.acquire(Path::new("/a")).unwrap();
        pool.acquire(Path::new("/b")).unwrap();
        let err = pool.acquire(Path::new("/c")).unwrap_err();
        assert_eq!(err, AgentError::NoAvailablePort);
    }

    #[test]
    fn port_pool_reuses_released_ports() {
        let mut pool = PortPool::new(9000, 9001);
        let a = pool.acquire(Path::new("/a")).unwrap();
        let b = pool.acquire(Path::new("/b")).unwrap();
        assert_ne!(a, b);
        assert!(pool.acquire(Path::new("/c")).is_err());

        pool.release(Path::new("/a"));
        let c = pool.acquire(Path::new("/c")).unwrap();
        assert_eq!(c, a, "freed port should be the first reused");
    }

    #[test]
    fn port_pool_acquire_is_idempotent_per_path() {
        let mut pool = PortPool::new(9000, 9005);
        let first = pool.acquire(Path::new("/a")).unwrap();
        let second = pool.acquire(Path::new("/a")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn acquire_available_skips_externally_occupied_ports() {
        let mut pool = PortPool::new(9100, 9101);
        let port = pool.acquire_available(Path::new("/a"), &|p| p == 9100).unwrap();
        assert_eq!(port, 9101, "9100 reported occupied, so the pool should skip to 9101");
    }

    #[test]
    fn acquire_available_fails_when_every_candidate_is_reserved_or_occupied() {
        let mut pool = PortPool::new(9200, 9201);
        pool.acquire(Path::new("/a")).unwrap();
        let err = pool.acquire_available(Path::new("/b"), &|p| p == 9201).unwrap_err();
        assert_eq!(err, AgentError::AllPortsInUse);
    }

    #[test]
    fn acquire_available_is_idempotent_per_path() {
        let mut pool = PortPool::new(9300, 9305);
        let first = pool.acquire_available(Path::new("/a"), &|_| false).unwrap();
        let second = pool.acquire_available(Path::new("/a"), &|_| false).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn session_index_round_trips() {
        let sup = supervisor(vec![PathBuf::from("/p")], 2);
        sup.bind_session("ses_abc", Path::new("/p")).await;
        let resolved = sup.resolve_session_path("ses_abc").await;
        assert_eq!(resolved, Some(PathBuf::from("/p")));
        assert_eq!(sup.resolve_session_path("ses_missing").await, None);
    }
}
