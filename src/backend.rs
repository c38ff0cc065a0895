//! `Backend` — the long-running system the broker fronts.
//!
//! A `RequestManager` drives these calls on a detached task after handing
//! the caller its allocated id; none of these are expected to return
//! quickly, and none of them are retried here — retry/backoff belongs to
//! the poll side, not the submit side.

use async_trait::async_trait;
use serde_json::Value;

/// Errors a backend call can fail with. Distinct from `BrokerError`
/// because a backend is a pluggable collaborator, not part of the
/// broker's own plumbing — its failures get wrapped into an `ErrorEvent`
/// by the request manager, never surfaced as a `BrokerError` directly.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("unknown address: {0}")]
    UnknownAddress(String),

    #[error("deploy failed: {0}")]
    DeployFailed(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("backend unreachable: {0}")]
    Unreachable(String),
}

/// The long-running system behind the broker: deploys and executes
/// services, and answers address-scoped lookups.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Deploy a service from `data`, returning its assigned address.
    async fn deploy(&self, data: &str) -> Result<String, BackendError>;

    /// Execute against an already-deployed `address`, returning its output.
    async fn execute(&self, address: &str, data: &str) -> Result<Value, BackendError>;

    /// Fetch the deployed code at `address`.
    async fn get_code(&self, address: &str) -> Result<String, BackendError>;

    /// Fetch the session expiry (Unix millis) for `address`.
    async fn get_expiry(&self, address: &str) -> Result<u64, BackendError>;

    /// Fetch the signed public key bundle for `address`.
    async fn get_public_key(&self, address: &str) -> Result<PublicKeyBundle, BackendError>;
}

/// Result of a `get_public_key` call.
#[derive(Debug, Clone)]
pub struct PublicKeyBundle {
    pub timestamp: u64,
    pub public_key: String,
    pub signature: String,
}

/// In-memory stand-in `Backend`, for unit and integration tests.
///
/// Deploys allocate a deterministic address (`"0x"` + a zero-padded
/// counter); execute, and the lookup calls, only succeed against
/// addresses this instance itself deployed.
pub struct MockBackend {
    deployed: tokio::sync::Mutex<std::collections::HashMap<String, String>>,
    counter: std::sync::atomic::AtomicU64,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            deployed: tokio::sync::Mutex::new(std::collections::HashMap::new()),
            counter: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn deploy(&self, data: &str) -> Result<String, BackendError> {
        let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let address = format!("0x{n:064x}");
        self.deployed.lock().await.insert(address.clone(), data.to_string());
        Ok(address)
    }

    async fn execute(&self, address: &str, data: &str) -> Result<Value, BackendError> {
        let deployed = self.deployed.lock().await;
        if !deployed.contains_key(address) {
            return Err(BackendError::UnknownAddress(address.to_string()));
        }
        Ok(serde_json::json!({ "echo": data }))
    }

    async fn get_code(&self, address: &str) -> Result<String, BackendError> {
        self.deployed
            .lock()
            .await
            .get(address)
            .cloned()
            .ok_or_else(|| BackendError::UnknownAddress(address.to_string()))
    }

    async fn get_expiry(&self, address: &str) -> Result<u64, BackendError> {
        if !self.deployed.lock().await.contains_key(address) {
            return Err(BackendError::UnknownAddress(address.to_string()));
        }
        Ok(crate::types::now_millis() + 86_400_000)
    }

    async fn get_public_key(&self, address: &str) -> Result<PublicKeyBundle, BackendError> {
        if !self.deployed.lock().await.contains_key(address) {
            return Err(BackendError::UnknownAddress(address.to_string()));
        }
        Ok(PublicKeyBundle {
            timestamp: crate::types::now_millis(),
            public_key: format!("pk-{address}"),
            signature: format!("sig-{address}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deploy_then_execute() {
        let backend = MockBackend::default();
        let address = backend.deploy("contract-bytes").await.unwrap();
        let output = backend.execute(&address, "call").await.unwrap();
        assert_eq!(output, serde_json::json!({ "echo": "call" }));
    }

    #[tokio::test]
    async fn test_execute_unknown_address_fails() {
        let backend = MockBackend::default();
        let err = backend.execute("0xnope", "call").await.unwrap_err();
        assert!(matches!(err, BackendError::UnknownAddress(_)));
    }

    #[tokio::test]
    async fn test_get_code_returns_deployed_payload() {
        let backend = MockBackend::default();
        let address = backend.deploy("source").await.unwrap();
        assert_eq!(backend.get_code(&address).await.unwrap(), "source");
    }

    #[tokio::test]
    async fn test_deployed_addresses_are_distinct() {
        let backend = MockBackend::default();
        let a = backend.deploy("one").await.unwrap();
        let b = backend.deploy("two").await.unwrap();
        assert_ne!(a, b);
    }
}
