//! Broker configuration.
//!
//! A single `Provider` selector picks which mailbox backend gets built;
//! the nested `mem`/`redis_single`/`redis_cluster` blocks are all
//! optional in the source document, but exactly one must be present and
//! it must match `provider` — mismatches are a `BackendConfigConflict`,
//! not a silent fallback.

use crate::error::{BrokerError, Result};
use crate::mailbox::memory::{MemoryConfig, MemoryMailbox};
use crate::mailbox::redis::{RedisClusterConfig, RedisClusterMailbox, RedisConfig, RedisMailbox};
use crate::mailbox::Mailbox;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which mailbox backend the broker should construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Mem,
    RedisSingle,
    RedisCluster,
}

/// Top-level broker configuration.
///
/// Deserializes from whatever format the host process chooses (JSON,
/// TOML, environment-derived) as long as it maps onto this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub provider: Provider,

    #[serde(default)]
    pub mem: Option<MemoryConfig>,

    #[serde(default)]
    pub redis_single: Option<RedisSettings>,

    #[serde(default)]
    pub redis_cluster: Option<RedisClusterSettings>,

    /// `count` to use for a poll request that doesn't specify one.
    pub poll_count_default: u32,

    /// Upper bound a caller's requested `count` is clamped to.
    pub poll_count_max: u32,
}

/// `redis_single` block: connection string for a single-node deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

impl From<RedisSettings> for RedisConfig {
    fn from(settings: RedisSettings) -> Self {
        RedisConfig::new(settings.url)
    }
}

/// `redis_cluster` block: seed node addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisClusterSettings {
    pub nodes: Vec<String>,
}

impl From<RedisClusterSettings> for RedisClusterConfig {
    fn from(settings: RedisClusterSettings) -> Self {
        RedisClusterConfig::new(settings.nodes)
    }
}

impl BrokerConfig {
    /// Check that exactly the block matching `provider` is populated and
    /// that the poll count bounds are sane.
    pub fn validate(&self) -> Result<()> {
        if self.poll_count_default == 0 || self.poll_count_default > self.poll_count_max {
            return Err(BrokerError::Config(format!(
                "poll_count_default ({}) must be nonzero and <= poll_count_max ({})",
                self.poll_count_default, self.poll_count_max
            )));
        }

        match self.provider {
            Provider::Mem if self.redis_single.is_some() || self.redis_cluster.is_some() => {
                Err(BrokerError::BackendConfigConflict(
                    "provider is mem but a redis block is also configured".into(),
                ))
            }
            Provider::RedisSingle if self.redis_single.is_none() => Err(BrokerError::BackendConfigConflict(
                "provider is redis_single but no redis_single block is configured".into(),
            )),
            Provider::RedisSingle if self.redis_cluster.is_some() => Err(BrokerError::BackendConfigConflict(
                "provider is redis_single but a redis_cluster block is also configured".into(),
            )),
            Provider::RedisCluster if self.redis_cluster.is_none() => {
                Err(BrokerError::BackendConfigConflict(
                    "provider is redis_cluster but no redis_cluster block is configured".into(),
                ))
            }
            Provider::RedisCluster if self.redis_single.is_some() => Err(BrokerError::BackendConfigConflict(
                "provider is redis_cluster but a redis_single block is also configured".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Validate, then build the `Mailbox` the configuration selects.
    pub async fn build_mailbox(&self) -> Result<Arc<dyn Mailbox>> {
        self.validate()?;

        match self.provider {
            Provider::Mem => {
                let config = self.mem.clone().unwrap_or_default();
                Ok(Arc::new(MemoryMailbox::new(config)))
            }
            Provider::RedisSingle => {
                let settings = self
                    .redis_single
                    .clone()
                    .expect("validate() guarantees redis_single is present");
                let mailbox = RedisMailbox::connect(settings.into()).await?;
                Ok(Arc::new(mailbox))
            }
            Provider::RedisCluster => {
                let settings = self
                    .redis_cluster
                    .clone()
                    .expect("validate() guarantees redis_cluster is present");
                let mailbox = RedisClusterMailbox::connect(settings.into()).await?;
                Ok(Arc::new(mailbox))
            }
        }
    }

    /// Clamp a caller-supplied poll `count`, substituting the default
    /// when zero.
    ///
    /// `RequestManager::poll` applies this exact rule internally once
    /// wired with [`RequestManager::with_poll_limits`] — this method
    /// exists so a caller fronting the manager (an HTTP layer validating
    /// a request before it reaches the manager, say) can apply the same
    /// clamp without duplicating the arithmetic.
    pub fn resolve_poll_count(&self, requested: u32) -> u32 {
        if requested == 0 {
            self.poll_count_default
        } else {
            requested.min(self.poll_count_max)
        }
    }
}
