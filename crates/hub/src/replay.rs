// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session ordered, bounded, TTL'd log of outbound client frames.
//!
//! Two implementations share one interface: an in-memory store backed by
//! `dashmap` (the production default), and a no-op store the system
//! degrades to when replay is disabled. This is an enum match rather than
//! a trait object, since neither variant needs independent ownership.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use gateway_wire::client::ReplayMessage;

struct SessionLog {
    entries: VecDeque<ReplayMessage>,
    next_id: u64,
    last_touched: Instant,
}

impl SessionLog {
    fn new() -> Self {
        Self { entries: VecDeque::new(), next_id: 1, last_touched: Instant::now() }
    }
}

/// In-memory per-session replay log, size-capped and TTL-swept.
pub struct InMemoryReplayStore {
    sessions: DashMap<String, SessionLog>,
    max_count: usize,
    ttl: Duration,
}

impl InMemoryReplayStore {
    pub fn new(max_count: usize, ttl: Duration) -> Self {
        Self { sessions: DashMap::new(), max_count, ttl }
    }

    fn push(&self, session: &str, kind: &str, request_id: &str, payload: serde_json::Value) -> u64 {
        let mut log = self.sessions.entry(session.to_owned()).or_insert_with(SessionLog::new);
        let id = log.next_id;
        log.next_id += 1;
        log.last_touched = Instant::now();
        log.entries.push_back(ReplayMessage {
            id,
            kind: kind.to_owned(),
            request_id: request_id.to_owned(),
            payload,
            timestamp_ms: crate::state::epoch_ms(),
        });
        while log.entries.len() > self.max_count {
            log.entries.pop_front();
        }
        id
    }

    fn get_since(&self, session: &str, after_id: u64) -> Vec<ReplayMessage> {
        match self.sessions.get(session) {
            Some(log) => log.entries.iter().filter(|m| m.id > after_id).cloned().collect(),
            None => Vec::new(),
        }
    }

    fn get_latest_id(&self, session: &str) -> u64 {
        self.sessions.get(session).map(|log| log.next_id.saturating_sub(1)).unwrap_or(0)
    }

    fn trim(&self, session: &str) {
        if let Some(mut log) = self.sessions.get_mut(session) {
            while log.entries.len() > self.max_count {
                log.entries.pop_front();
            }
        }
    }

    /// Remove sessions whose last activity exceeds the configured TTL.
    fn sweep_expired(&self) {
        let ttl = self.ttl;
        self.sessions.retain(|_, log| log.last_touched.elapsed() < ttl);
    }
}

/// Replay buffer backend, selected once at startup from [`crate::config::HubConfig`].
///
/// The no-op variant degrades the whole system gracefully: callers never
/// need to branch on which backend is active.
pub enum ReplayStore {
    Memory(InMemoryReplayStore),
    Noop,
}

impl ReplayStore {
    pub fn new(max_count: usize, ttl: Duration) -> Self {
        Self::Memory(InMemoryReplayStore::new(max_count, ttl))
    }

    pub fn disabled() -> Self {
        Self::Noop
    }

    /// Assign the next id for `session`, record the frame, refresh the
    /// session's TTL. Returns the assigned id (0 for the no-op store).
    pub fn push(
        &self,
        session: &str,
        kind: &str,
        request_id: &str,
        payload: serde_json::Value,
    ) -> u64 {
        match self {
            Self::Memory(store) => store.push(session, kind, request_id, payload),
            Self::Noop => 0,
        }
    }

    /// Entries with id strictly greater than `after_id`, in id order.
    pub fn get_since(&self, session: &str, after_id: u64) -> Vec<ReplayMessage> {
        match self {
            Self::Memory(store) => store.get_since(session, after_id),
            Self::Noop => Vec::new(),
        }
    }

    /// Highest id ever assigned to `session` (0 if none).
    pub fn get_latest_id(&self, session: &str) -> u64 {
        match self {
            Self::Memory(store) => store.get_latest_id(session),
            Self::Noop => 0,
        }
    }

    /// Drop entries beyond the size cap, keeping only the newest N.
    pub fn trim(&self, session: &str) {
        if let Self::Memory(store) = self {
            store.trim(session);
        }
    }

    /// Periodic TTL sweep; a no-op on the degraded backend.
    pub fn sweep_expired(&self) {
        if let Self::Memory(store) = self {
            store.sweep_expired();
        }
    }
}

/// Spawn the background TTL sweeper. Runs until `shutdown` fires.
pub fn spawn_sweeper(
    replay: std::sync::Arc<ReplayStore>,
    shutdown: tokio_util::sync::CancellationToken,
) {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(Duration::from_secs(30));
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => replay.sweep_expired(),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ReplayStore {
        ReplayStore::new(100, Duration::from_secs(300))
    }

    #[test]
    fn ids_are_strictly_monotonic_per_session() {
        let store = store();
        let a = store.push("ses_1", "stream", "pr1", serde_json::json!({"text": "a"}));
        let b = store.push("ses_1", "stream", "pr1", serde_json::json!({"text": "b"}));
        assert!(b > a);
    }

    #[test]
    fn get_since_returns_exact_tail() {
        let store = store();
        let id1 = store.push("ses_1", "stream", "pr1", serde_json::json!({"n": 1}));
        let _id2 = store.push("ses_1", "stream", "pr1", serde_json::json!({"n": 2}));
        let id3 = store.push("ses_1", "stream", "pr1", serde_json::json!({"n": 3}));

        let tail = store.get_since("ses_1", id1);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].payload["n"], 2);
        assert_eq!(tail.last().map(|m| m.id), Some(id3));
    }

    #[test]
    fn get_since_latest_is_empty() {
        let store = store();
        let id = store.push("ses_1", "stream", "pr1", serde_json::json!({}));
        assert!(store.get_since("ses_1", id).is_empty());
    }

    #[test]
    fn trim_caps_to_max_count() {
        let store = ReplayStore::new(2, Duration::from_secs(300));
        for n in 0..5 {
            store.push("ses_1", "stream", "pr1", serde_json::json!({ "n": n }));
        }
        store.trim("ses_1");
        let tail = store.get_since("ses_1", 0);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].payload["n"], 3);
    }

    #[test]
    fn unknown_session_reports_zero_latest() {
        let store = store();
        assert_eq!(store.get_latest_id("ses_missing"), 0);
    }

    #[test]
    fn noop_store_remembers_nothing() {
        let store = ReplayStore::disabled();
        let id = store.push("ses_1", "stream", "pr1", serde_json::json!({}));
        assert_eq!(id, 0);
        assert!(store.get_since("ses_1", 0).is_empty());
        assert_eq!(store.get_latest_id("ses_1"), 0);
    }
}
