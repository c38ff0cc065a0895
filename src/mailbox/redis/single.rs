use super::{event_key, map_redis_err, next_key, offset_key, retrieve_sequential, with_backoff};
use crate::error::{BrokerError, Result};
use crate::mailbox::Mailbox;
use crate::types::ClientEvent;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Connection parameters for a single-node Redis mailbox.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Single-node Redis implementation of `Mailbox`.
///
/// Holds one `ConnectionManager`, which reconnects and pipelines
/// transparently; callers never see a connection error, only
/// `BrokerError::BackendUnavailable` once its own retry budget is spent.
pub struct RedisMailbox {
    conn: ConnectionManager,
}

impl RedisMailbox {
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| BrokerError::Config(e.to_string()))?;
        let conn = client.get_connection_manager().await.map_err(map_redis_err)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Mailbox for RedisMailbox {
    async fn next(&self, key: &str) -> Result<u64> {
        with_backoff(|| async {
            let mut conn = self.conn.clone();
            let value: i64 = conn.incr(next_key(key), 1).await.map_err(map_redis_err)?;
            Ok((value - 1) as u64)
        })
        .await
    }

    async fn insert(&self, key: &str, id: u64, event: ClientEvent) -> Result<()> {
        with_backoff(|| async {
            let mut conn = self.conn.clone();

            let next: Option<i64> = conn.get(next_key(key)).await.map_err(map_redis_err)?;
            let next = next.unwrap_or(0) as u64;
            let offset: Option<u64> = conn.get(offset_key(key)).await.map_err(map_redis_err)?;
            let offset = offset.unwrap_or(0);

            if id < offset || id >= next {
                return Err(BrokerError::InvalidOffset(format!(
                    "id {} outside [{}, {})",
                    id, offset, next
                )));
            }

            let payload = serde_json::to_string(&event)?;
            let set: bool = conn
                .set_nx(event_key(key, id), payload)
                .await
                .map_err(map_redis_err)?;
            if !set {
                return Err(BrokerError::AlreadyPresent(id));
            }
            Ok(())
        })
        .await
    }

    async fn retrieve(&self, key: &str, offset: u64, count: u32) -> Result<(u64, Vec<ClientEvent>)> {
        with_backoff(|| async {
            let mut floor_conn = self.conn.clone();
            let floor: Option<u64> = floor_conn.get(offset_key(key)).await.map_err(map_redis_err)?;
            let floor = floor.unwrap_or(0);

            let conn = self.conn.clone();
            retrieve_sequential(key, offset, count, floor, move |redis_key| {
                let mut conn = conn.clone();
                async move { conn.get(redis_key).await.map_err(map_redis_err) }
            })
            .await
        })
        .await
    }

    async fn discard(&self, key: &str, up_to: u64) -> Result<()> {
        with_backoff(|| async {
            let mut conn = self.conn.clone();

            let current: Option<u64> = conn.get(offset_key(key)).await.map_err(map_redis_err)?;
            let current = current.unwrap_or(0);
            let next: Option<i64> = conn.get(next_key(key)).await.map_err(map_redis_err)?;
            let next = next.unwrap_or(0) as u64;
            let new_offset = current.max(up_to.min(next));

            if new_offset <= current {
                return Ok(());
            }

            conn.set(offset_key(key), new_offset).await.map_err(map_redis_err)?;

            for id in current..new_offset {
                let _: std::result::Result<i64, redis::RedisError> = conn.del(event_key(key, id)).await;
            }
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let next: Option<i64> = conn.get(next_key(key)).await.map_err(map_redis_err)?;
        let next = next.unwrap_or(0) as u64;

        for id in 0..next {
            let _: std::result::Result<i64, redis::RedisError> = conn.del(event_key(key, id)).await;
        }
        let _: std::result::Result<i64, redis::RedisError> = conn.del(next_key(key)).await;
        let _: std::result::Result<i64, redis::RedisError> = conn.del(offset_key(key)).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "redis-single"
    }
}
