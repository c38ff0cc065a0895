//! # gateway-broker
//!
//! Asynchronous request/response broker fronting a long-running backend.
//!
//! ## Overview
//!
//! A client submits a deploy or execute request and gets a monotonic id
//! back immediately; the backend call itself runs detached, and the
//! client later polls an ordered, gap-tolerant mailbox for the result
//! using that id as a cursor. Swap mailbox backends (in-memory, Redis,
//! Redis Cluster) without changing the handler or manager code above it.
//!
//! ## Quick Start
//!
//! ```rust
//! use gateway_broker::backend::MockBackend;
//! use gateway_broker::handler::ServiceHandler;
//! use gateway_broker::mailbox::memory::MemoryMailbox;
//! use gateway_broker::mailbox::Mailbox;
//! use gateway_broker::manager::RequestManager;
//! use gateway_broker::retry::poll_until;
//! use gateway_broker::types::ClientEvent;
//! use gateway_broker::verifier::AllowAllVerifier;
//! use std::sync::Arc;
//!
//! # async fn example() -> gateway_broker::Result<()> {
//! let mailbox: Arc<dyn Mailbox> = Arc::new(MemoryMailbox::default());
//! let backend = Arc::new(MockBackend::default());
//! let manager = RequestManager::new(mailbox, backend.clone());
//! let handler = ServiceHandler::new(manager, backend, AllowAllVerifier);
//!
//! let submitted = handler.deploy("session-1", "bytecode".into()).await?;
//!
//! // `poll` blocks for a single retrieve and never retries on its own —
//! // the deploy itself resolves on a detached task, so a caller rides
//! // out that race with the same backoff a real client would use.
//! let (_, events) = poll_until(
//!     || async { handler.poll("session-1", 0, 10, false).await },
//!     |result: &gateway_broker::Result<(u64, Vec<ClientEvent>)>| {
//!         matches!(result, Ok((_, events)) if !events.is_empty())
//!     },
//! )
//! .await?;
//! assert_eq!(events[0].id(), submitted.id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`Mailbox`** trait — core abstraction every backend implements
//! - **`RequestManager`** — submits to a `Backend` and completes into a `Mailbox`
//! - **`ServiceHandler`** — validates, verifies, and dispatches requests
//! - **`ClientEvent`** — the tagged wire envelope returned from a poll

pub mod backend;
pub mod config;
pub mod error;
pub mod handler;
pub mod mailbox;
pub mod manager;
pub mod retry;
pub mod types;
pub mod verifier;

pub use backend::{Backend, BackendError, MockBackend, PublicKeyBundle};
pub use config::{BrokerConfig, Provider, RedisClusterSettings, RedisSettings};
pub use error::{BrokerError, Result};
pub use handler::ServiceHandler;
pub use mailbox::Mailbox;
pub use manager::{RequestManager, DEFAULT_POLL_COUNT, MAX_POLL_COUNT};
pub use types::{
    AsyncResponse, Cause, ClientEvent, DeployRequest, ExecuteRequest, GetCodeResponse,
    GetExpiryResponse, GetPublicKeyResponse, PollRequest, PollResponse, RequestKind,
};
pub use verifier::{AllowAllVerifier, DenyAllVerifier, Verifier};
