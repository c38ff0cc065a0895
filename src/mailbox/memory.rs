//! In-memory mailbox — a per-key actor, for single-process use and tests.
//!
//! Each key gets its own owned task serializing all operations on a
//! single channel, so linearizability holds without per-operation locks.
//! Cross-key operations require no coordination. An actor lives for the
//! process's lifetime unless `Remove` drops its registry entry.

use super::Mailbox;
use crate::error::{BrokerError, Result};
use crate::types::ClientEvent;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

type NextReply = oneshot::Sender<u64>;
type InsertReply = oneshot::Sender<Result<()>>;
type RetrieveReply = oneshot::Sender<(u64, Vec<ClientEvent>)>;
type DiscardReply = oneshot::Sender<()>;

enum Op {
    Next(NextReply),
    Insert(u64, ClientEvent, InsertReply),
    Retrieve(u64, u32, RetrieveReply),
    Discard(u64, DiscardReply),
}

/// Handle to a spawned per-key actor.
#[derive(Clone)]
struct ActorHandle {
    tx: mpsc::UnboundedSender<Op>,
}

/// In-memory mailbox backing.
///
/// Configuration is intentionally empty today — present so the config
/// loader has a uniform shape across providers (mirrors the nested
/// `mem` block described in the broker's provider configuration).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct MemoryConfig;

/// In-memory implementation of `Mailbox`.
#[derive(Default)]
pub struct MemoryMailbox {
    actors: Arc<RwLock<HashMap<String, ActorHandle>>>,
}

impl MemoryMailbox {
    pub fn new(_config: MemoryConfig) -> Self {
        Self::default()
    }

    async fn handle_for(&self, key: &str) -> ActorHandle {
        if let Some(handle) = self.actors.read().await.get(key).cloned() {
            return handle;
        }

        let mut actors = self.actors.write().await;
        // Re-check: another task may have spawned the actor while we waited
        // for the write lock.
        if let Some(handle) = actors.get(key).cloned() {
            return handle;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_actor(rx));
        let handle = ActorHandle { tx };
        actors.insert(key.to_string(), handle.clone());
        handle
    }
}

async fn run_actor(mut rx: mpsc::UnboundedReceiver<Op>) {
    let mut offset: u64 = 0;
    let mut next: u64 = 0;
    let mut window: BTreeMap<u64, ClientEvent> = BTreeMap::new();

    while let Some(op) = rx.recv().await {
        match op {
            Op::Next(reply) => {
                let id = next;
                next += 1;
                let _ = reply.send(id);
            }
            Op::Insert(id, event, reply) => {
                let result = if id < offset || id >= next {
                    Err(BrokerError::InvalidOffset(format!(
                        "id {} outside [{}, {})",
                        id, offset, next
                    )))
                } else if window.contains_key(&id) {
                    Err(BrokerError::AlreadyPresent(id))
                } else {
                    window.insert(id, event);
                    Ok(())
                };
                let _ = reply.send(result);
            }
            Op::Retrieve(requested_offset, count, reply) => {
                let mut events = Vec::new();
                let mut cursor = requested_offset.max(offset);
                let limit = count as usize;
                while events.len() < limit {
                    match window.get(&cursor) {
                        Some(event) => {
                            events.push(event.clone());
                            cursor += 1;
                        }
                        None => break,
                    }
                }
                let _ = reply.send((requested_offset, events));
            }
            Op::Discard(up_to, reply) => {
                let new_offset = offset.max(up_to.min(next));
                if new_offset > offset {
                    offset = new_offset;
                    window.retain(|id, _| *id >= offset);
                }
                let _ = reply.send(());
            }
        }
    }
}

#[async_trait]
impl Mailbox for MemoryMailbox {
    async fn next(&self, key: &str) -> Result<u64> {
        let handle = self.handle_for(key).await;
        let (tx, rx) = oneshot::channel();
        handle
            .tx
            .send(Op::Next(tx))
            .map_err(|_| BrokerError::BackendUnavailable("mailbox actor gone".into()))?;
        rx.await
            .map_err(|_| BrokerError::BackendUnavailable("mailbox actor gone".into()))
    }

    async fn insert(&self, key: &str, id: u64, event: ClientEvent) -> Result<()> {
        let handle = self.handle_for(key).await;
        let (tx, rx) = oneshot::channel();
        handle
            .tx
            .send(Op::Insert(id, event, tx))
            .map_err(|_| BrokerError::BackendUnavailable("mailbox actor gone".into()))?;
        rx.await
            .map_err(|_| BrokerError::BackendUnavailable("mailbox actor gone".into()))?
    }

    async fn retrieve(&self, key: &str, offset: u64, count: u32) -> Result<(u64, Vec<ClientEvent>)> {
        let handle = self.handle_for(key).await;
        let (tx, rx) = oneshot::channel();
        handle
            .tx
            .send(Op::Retrieve(offset, count, tx))
            .map_err(|_| BrokerError::BackendUnavailable("mailbox actor gone".into()))?;
        rx.await
            .map_err(|_| BrokerError::BackendUnavailable("mailbox actor gone".into()))
    }

    async fn discard(&self, key: &str, up_to: u64) -> Result<()> {
        let handle = self.handle_for(key).await;
        let (tx, rx) = oneshot::channel();
        handle
            .tx
            .send(Op::Discard(up_to, tx))
            .map_err(|_| BrokerError::BackendUnavailable("mailbox actor gone".into()))?;
        rx.await
            .map_err(|_| BrokerError::BackendUnavailable("mailbox actor gone".into()))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.actors.write().await.remove(key);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
