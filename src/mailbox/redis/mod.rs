//! Redis-backed mailbox — single-node and cluster variants.
//!
//! Sequence allocation, event storage, and floor tracking are mapped onto
//! plain Redis primitives so both a single `ConnectionManager` and a
//! `cluster_async::ClusterConnection` can back the same `Mailbox` trait:
//!
//! - `next`    -> `INCR {key}:next` (pre-increment, so the first id is 0)
//! - `insert`  -> `SET {key}:evt:{id} <json> NX`
//! - `retrieve`-> sequential `GET {key}:evt:{id}` starting at `offset`, until a miss
//! - `discard` -> `SET {key}:offset <up_to>` (floor only moves forward) + best-effort `DEL`
//!
//! Keys are brace-tagged on the subscription key (`{key}:next`, not
//! `key:next`), so every key belonging to the same subscription hashes to
//! the same cluster slot — required for cluster mode, harmless on a
//! single node.

mod single;
mod cluster;

pub use cluster::{RedisClusterConfig, RedisClusterMailbox};
pub use single::{RedisConfig, RedisMailbox};

use crate::error::{BrokerError, Result};
use std::time::Duration;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(5);
const RETRY_BASE: u32 = 2;
const RETRY_MAX_DELAY: Duration = Duration::from_millis(100);

/// Retry a fallible Redis round-trip with capped exponential backoff.
///
/// Only `BackendUnavailable` (a connection-level failure) is treated as
/// transient; `InvalidOffset`/`AlreadyPresent`/`Serialization` are
/// programmer- or data-visible outcomes and are returned on the first
/// attempt, never retried.
pub(super) async fn with_backoff<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = RETRY_INITIAL_DELAY;
    for attempt in 0..RETRY_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < RETRY_ATTEMPTS && is_retryable(&err) => {
                tokio::time::sleep(delay).await;
                delay = (delay * RETRY_BASE).min(RETRY_MAX_DELAY);
            }
            Err(err) => return Err(err),
        }
    }
    unreachable!("loop always returns on its last attempt")
}

fn is_retryable(err: &BrokerError) -> bool {
    matches!(err, BrokerError::BackendUnavailable(_))
}

fn next_key(key: &str) -> String {
    format!("{{{key}}}:next")
}

fn offset_key(key: &str) -> String {
    format!("{{{key}}}:offset")
}

fn event_key(key: &str, id: u64) -> String {
    format!("{{{key}}}:evt:{id}")
}

fn map_redis_err(err: redis::RedisError) -> BrokerError {
    BrokerError::BackendUnavailable(err.to_string())
}

/// Shared retrieve-loop logic: given a way to `GET` a single event key,
/// walk forward from `max(offset, floor)` until the count limit or the
/// first miss.
///
/// `floor` is the mailbox's current retained `offset` (the stored
/// `offset_key` value); events below it were deleted by `discard` and
/// must be silently skipped rather than treated as the first gap, per
/// spec §4.1 ("events below `mailbox.offset` are silently absent, not
/// errors") — the returned `base` still echoes the originally requested
/// `offset`, matching the in-memory actor's `retrieve` behavior.
///
/// Generic over the per-event getter so both the single-node and cluster
/// clients reuse identical gap-stop semantics without duplicating it.
async fn retrieve_sequential<F, Fut>(
    key: &str,
    offset: u64,
    count: u32,
    floor: u64,
    mut get_one: F,
) -> Result<(u64, Vec<crate::types::ClientEvent>)>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = Result<Option<String>>>,
{
    let mut events = Vec::new();
    let mut cursor = offset.max(floor);
    let limit = count as usize;

    while events.len() < limit {
        match get_one(event_key(key, cursor)).await? {
            Some(raw) => {
                let event: crate::types::ClientEvent = serde_json::from_str(&raw)?;
                events.push(event);
                cursor += 1;
            }
            None => break,
        }
    }

    Ok((offset, events))
}

#[cfg(test)]
mod key_tests {
    use super::*;
    use crate::types::ClientEvent;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn deploy_json(id: u64) -> String {
        serde_json::to_string(&ClientEvent::DeployServiceEvent { id, address: format!("0x{id}") }).unwrap()
    }

    #[tokio::test]
    async fn test_retrieve_sequential_starts_at_floor_when_requested_offset_is_below_it() {
        // ids 0 and 1 were discarded (their event keys are gone); only
        // 2 and 3 remain, modeling the post-discard state the Redis
        // backends see after `discard(key, 2)`.
        let data: Arc<HashMap<String, String>> =
            Arc::new(HashMap::from([(event_key("k", 2), deploy_json(2)), (event_key("k", 3), deploy_json(3))]));

        let (base, events) = retrieve_sequential("k", 0, 10, 2, {
            let data = data.clone();
            move |redis_key| {
                let data = data.clone();
                async move { Ok(data.get(&redis_key).cloned()) }
            }
        })
        .await
        .unwrap();

        assert_eq!(base, 0, "base must echo the requested offset, not the floor");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id(), 2);
        assert_eq!(events[1].id(), 3);
    }

    #[tokio::test]
    async fn test_retrieve_sequential_still_stops_at_gap_above_floor() {
        let data: Arc<HashMap<String, String>> = Arc::new(HashMap::from([(event_key("k", 0), deploy_json(0))]));
        // id 1 is simply missing (never inserted), not discarded — floor stays 0.

        let (base, events) = retrieve_sequential("k", 0, 10, 0, {
            let data = data.clone();
            move |redis_key| {
                let data = data.clone();
                async move { Ok(data.get(&redis_key).cloned()) }
            }
        })
        .await
        .unwrap();

        assert_eq!(base, 0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id(), 0);
    }

    #[test]
    fn test_keys_are_brace_tagged_for_cluster_affinity() {
        assert_eq!(next_key("sess:topic"), "{sess:topic}:next");
        assert_eq!(offset_key("sess:topic"), "{sess:topic}:offset");
        assert_eq!(event_key("sess:topic", 5), "{sess:topic}:evt:5");
    }

    #[tokio::test]
    async fn test_with_backoff_retries_backend_unavailable_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(|| async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(BrokerError::BackendUnavailable("transient".into()))
            } else {
                Ok(42)
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_backoff_gives_up_after_retry_budget() {
        let calls = AtomicU32::new(0);
        let err = with_backoff::<(), _, _>(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BrokerError::BackendUnavailable("still down".into()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, BrokerError::BackendUnavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), RETRY_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_with_backoff_does_not_retry_invalid_offset() {
        let calls = AtomicU32::new(0);
        let err = with_backoff::<(), _, _>(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BrokerError::InvalidOffset("bad".into()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, BrokerError::InvalidOffset(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "non-transient errors must not be retried");
    }
}
