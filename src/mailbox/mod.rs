//! Mailbox — the core abstraction for per-subscription ordered event logs.
//!
//! All backends (in-memory, Redis single-node, Redis cluster) implement
//! `Mailbox` to provide a uniform API for allocating sequence numbers and
//! inserting, retrieving, and discarding events. The `RequestManager`
//! drives a `Mailbox` through the full lifecycle of an async request.

use crate::error::Result;
use crate::types::ClientEvent;
use async_trait::async_trait;

pub mod memory;
pub mod redis;

/// Core trait for mailbox backends.
///
/// Every operation is scoped to a subscription `key` (session key +
/// topic). Operations on distinct keys never interfere; operations on
/// the same key are linearizable.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Allocate and return the next sequence number for `key`.
    ///
    /// Strictly increasing per key, with no duplicates under concurrency.
    /// Fails with `BackendUnavailable` if the backing store is unreachable.
    async fn next(&self, key: &str) -> Result<u64>;

    /// Insert `event` at `id` under `key`.
    ///
    /// Precondition: `offset <= id < next`. Fails with `InvalidOffset`
    /// otherwise, and with `AlreadyPresent` if `id` is already populated.
    async fn insert(&self, key: &str, id: u64, event: ClientEvent) -> Result<()>;

    /// Return up to `count` events with ids >= `offset`, in strictly
    /// increasing id order, stopping at the first gap.
    ///
    /// The returned `base` always equals `offset`. Events below the
    /// mailbox's retained floor are silently absent, never an error.
    async fn retrieve(&self, key: &str, offset: u64, count: u32) -> Result<(u64, Vec<ClientEvent>)>;

    /// Raise the retained floor for `key` to `max(current offset, up_to)`.
    ///
    /// Idempotent. Events newly below the new floor are deleted.
    async fn discard(&self, key: &str, up_to: u64) -> Result<()>;

    /// Drop all state for `key`. Idempotent.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Backend name, for logging (`"memory"`, `"redis-single"`, `"redis-cluster"`).
    fn name(&self) -> &str;
}
