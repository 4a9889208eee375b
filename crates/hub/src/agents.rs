// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registry: registration/displacement, pending-request bookkeeping,
//! and the `Forward` operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use gateway_wire::agent::HubEnvelope;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::HubError;

/// A reply frame routed back from an Agent for one pending request.
#[derive(Debug, Clone)]
pub enum AgentReply {
    Response(serde_json::Value),
    Stream { seq: u64, payload: serde_json::Value },
    StreamEnd,
    Error(String),
}

/// One registered Agent transport.
pub struct AgentRegistration {
    pub agent_id: String,
    pub capabilities: Vec<String>,
    pub version: String,
    /// Bumped on every registration for this `agentId`; lets a displaced
    /// transport's writer recognize supersession and exit without racing
    /// the new transport for the registry slot.
    pub generation: u64,
    pub last_seen: RwLock<Instant>,
    pub outbound_tx: mpsc::Sender<HubEnvelope>,
    pending: RwLock<HashMap<String, mpsc::Sender<AgentReply>>>,
    /// Cancelled when this registration is displaced or its transport closes.
    pub cancel: CancellationToken,
}

impl AgentRegistration {
    pub async fn touch(&self) {
        *self.last_seen.write().await = Instant::now();
    }
}

/// The Hub's live Agent registry.
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<AgentRegistration>>>,
    generation: AtomicU64,
    outbound_queue_capacity: usize,
    response_queue_capacity: usize,
}

impl AgentRegistry {
    pub fn new(outbound_queue_capacity: usize, response_queue_capacity: usize) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            outbound_queue_capacity,
            response_queue_capacity,
        }
    }

    /// Register `agent_id`, displacing any existing live registration for
    /// the same id. Returns the new registration, the displaced one (if
    /// any — the caller is responsible for closing its transport), and the
    /// receiving half of the outbound queue for the connection's writer task.
    pub async fn register(
        &self,
        agent_id: String,
        capabilities: Vec<String>,
        version: String,
    ) -> (Arc<AgentRegistration>, Option<Arc<AgentRegistration>>, mpsc::Receiver<HubEnvelope>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_queue_capacity);
        let registration = Arc::new(AgentRegistration {
            agent_id: agent_id.clone(),
            capabilities,
            version,
            generation,
            last_seen: RwLock::new(Instant::now()),
            outbound_tx,
            pending: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
        });

        let mut agents = self.agents.write().await;
        let displaced = agents.insert(agent_id, Arc::clone(&registration));
        if let Some(ref old) = displaced {
            old.cancel.cancel();
        }
        (registration, displaced, outbound_rx)
    }

    pub async fn get(&self, agent_id: &str) -> Option<Arc<AgentRegistration>> {
        self.agents.read().await.get(agent_id).cloned()
    }

    pub async fn any(&self) -> Option<Arc<AgentRegistration>> {
        self.agents.read().await.values().next().cloned()
    }

    /// Remove `agent_id` from the registry, but only if `generation` still
    /// matches the live entry (a newer registration may already hold the slot).
    pub async fn deregister(&self, agent_id: &str, generation: u64) {
        let mut agents = self.agents.write().await;
        if let Some(current) = agents.get(agent_id) {
            if current.generation == generation {
                agents.remove(agent_id);
            }
        }
    }

    /// Forward a request to `agent_id` and return the response channel's
    /// receiving half.
    pub async fn forward(
        &self,
        agent_id: &str,
        request_id: String,
        frame: HubEnvelope,
    ) -> Result<mpsc::Receiver<AgentReply>, HubError> {
        let agent = self.get(agent_id).await.ok_or(HubError::AgentNotFound)?;
        let (tx, rx) = mpsc::channel(self.response_queue_capacity);
        agent.pending.write().await.insert(request_id.clone(), tx);

        if agent.outbound_tx.try_send(frame).is_err() {
            agent.pending.write().await.remove(&request_id);
            return Err(HubError::AgentBusy);
        }

        Ok(rx)
    }

    /// Deregister a pending request, e.g. because the caller cancelled.
    pub async fn cancel_pending(&self, agent_id: &str, request_id: &str) {
        if let Some(agent) = self.get(agent_id).await {
            agent.pending.write().await.remove(request_id);
        }
    }

    /// Route an inbound Agent reply frame to its pending request, if still open.
    pub async fn dispatch_reply(&self, agent_id: &str, request_id: &str, reply: AgentReply) {
        let Some(agent) = self.get(agent_id).await else { return };
        agent.touch().await;
        let sender = agent.pending.read().await.get(request_id).cloned();
        if let Some(sender) = sender {
            let _ = sender.try_send(reply);
        }
    }
}
