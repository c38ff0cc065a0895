//! `RequestManager` — drives one mailbox key through submit, execute, and poll.
//!
//! Submitting a request allocates an id and returns immediately; the
//! backend call itself runs on a detached `tokio::spawn` so a client that
//! never polls again doesn't leave the task waiting on its `JoinHandle`.
//! Delivery is at-most-once: if the insert after a successful backend
//! call fails (e.g. the mailbox is unavailable), the result is logged and
//! dropped rather than retried, per the mailbox's own gap-tolerant
//! contract — a missing id is a permanent, visible hole, not silently
//! filled in later.
//!
//! `poll` itself never retries: it blocks for exactly one
//! `Mailbox::retrieve` call and returns whatever that call sees, empty
//! page included. A caller that wants to ride out the race between
//! submitting a request and its backend completion reaches for
//! `retry::poll_until` itself around its own poll calls — that harness is
//! a client-side (and integration-test) tool, not part of this method.

use crate::backend::{Backend, BackendError};
use crate::error::{BrokerError, Result};
use crate::mailbox::Mailbox;
use crate::types::{Cause, ClientEvent, RequestKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// `count` substituted when a poll request supplies zero.
pub const DEFAULT_POLL_COUNT: u32 = 10;

/// Upper bound a requested `count` is clamped to.
pub const MAX_POLL_COUNT: u32 = 128;

/// Tracks in-flight requests so duplicate submissions and completion
/// bookkeeping have somewhere to live; the mailbox itself has no notion
/// of "pending" versus "delivered", only "present" versus "absent".
pub struct RequestManager<B: Backend + 'static> {
    mailbox: Arc<dyn Mailbox>,
    backend: Arc<B>,
    outstanding: Arc<RwLock<HashMap<(String, u64), RequestKind>>>,
    poll_count_default: u32,
    poll_count_max: u32,
}

impl<B: Backend + 'static> RequestManager<B> {
    pub fn new(mailbox: Arc<dyn Mailbox>, backend: Arc<B>) -> Self {
        Self {
            mailbox,
            backend,
            outstanding: Arc::new(RwLock::new(HashMap::new())),
            poll_count_default: DEFAULT_POLL_COUNT,
            poll_count_max: MAX_POLL_COUNT,
        }
    }

    /// Override the default/max poll counts, e.g. from a `BrokerConfig`.
    pub fn with_poll_limits(mut self, default: u32, max: u32) -> Self {
        self.poll_count_default = default;
        self.poll_count_max = max;
        self
    }

    /// Allocate an id under `key`, spawn the deploy call detached, and
    /// return the id immediately.
    pub async fn submit_deploy(&self, key: &str, data: String) -> Result<u64> {
        let id = self.mailbox.next(key).await?;
        self.track(key, id, RequestKind::Deploy).await;

        let mailbox = self.mailbox.clone();
        let backend = self.backend.clone();
        let outstanding = self.outstanding.clone();
        let key = key.to_string();

        tokio::spawn(async move {
            let span = tracing::info_span!("deploy", key = %key, id = id);
            let _guard = span.enter();

            let event = match backend.deploy(&data).await {
                Ok(address) => {
                    tracing::debug!(address = %address, "deploy completed");
                    ClientEvent::DeployServiceEvent { id, address }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "deploy failed");
                    ClientEvent::ErrorEvent { id, cause: backend_error_cause(&err) }
                }
            };
            drop(_guard);

            complete(&mailbox, &outstanding, &key, id, event).await;
        });

        Ok(id)
    }

    /// Allocate an id under `key`, spawn the execute call detached, and
    /// return the id immediately.
    pub async fn submit_execute(&self, key: &str, address: String, data: String) -> Result<u64> {
        let id = self.mailbox.next(key).await?;
        self.track(key, id, RequestKind::Execute).await;

        let mailbox = self.mailbox.clone();
        let backend = self.backend.clone();
        let outstanding = self.outstanding.clone();
        let key = key.to_string();

        tokio::spawn(async move {
            let span = tracing::info_span!("execute", key = %key, id = id, address = %address);
            let _guard = span.enter();

            let event = match backend.execute(&address, &data).await {
                Ok(output) => {
                    tracing::debug!("execute completed");
                    ClientEvent::ExecuteServiceEvent { id, address: address.clone(), output }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "execute failed");
                    ClientEvent::ErrorEvent { id, cause: backend_error_cause(&err) }
                }
            };
            drop(_guard);

            complete(&mailbox, &outstanding, &key, id, event).await;
        });

        Ok(id)
    }

    /// Poll `key` from `offset`. Blocks only for the duration of a single
    /// `Mailbox::retrieve` call — an offset ahead of the current tail, or
    /// one that lands in the gap before a backend call completes, comes
    /// back with an empty (not erroneous) event list.
    pub async fn poll(&self, key: &str, offset: u64, count: u32, discard_previous: bool) -> Result<(u64, Vec<ClientEvent>)> {
        if discard_previous {
            self.mailbox.discard(key, offset).await?;
        }

        let count = if count == 0 {
            self.poll_count_default
        } else {
            count.min(self.poll_count_max)
        };

        self.mailbox.retrieve(key, offset, count).await
    }

    /// Drop a subscription key entirely: its mailbox state and any
    /// bookkeeping for requests still outstanding under it.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.mailbox.remove(key).await?;
        self.outstanding.write().await.retain(|(k, _), _| k != key);
        Ok(())
    }

    async fn track(&self, key: &str, id: u64, kind: RequestKind) {
        self.outstanding.write().await.insert((key.to_string(), id), kind);
    }
}

async fn complete(
    mailbox: &Arc<dyn Mailbox>,
    outstanding: &Arc<RwLock<HashMap<(String, u64), RequestKind>>>,
    key: &str,
    id: u64,
    event: ClientEvent,
) {
    if let Err(err) = mailbox.insert(key, id, event).await {
        match err {
            BrokerError::AlreadyPresent(_) => {
                // Another completion already claimed this id — should be
                // unreachable since each id is only ever completed once,
                // but isn't worth crashing the task over.
                tracing::warn!(key, id, "id already present at completion time");
            }
            other => {
                tracing::warn!(key, id, error = %other, "failed to record completion, leaving a permanent gap");
            }
        }
    }
    outstanding.write().await.remove(&(key.to_string(), id));
}

fn backend_error_cause(err: &BackendError) -> Cause {
    let code = match err {
        BackendError::UnknownAddress(_) => "UNKNOWN_ADDRESS",
        BackendError::DeployFailed(_) => "DEPLOY_FAILED",
        BackendError::ExecutionFailed(_) => "EXECUTION_FAILED",
        BackendError::Unreachable(_) => "BACKEND_UNREACHABLE",
    };
    Cause::new(code, err.to_string())
}
