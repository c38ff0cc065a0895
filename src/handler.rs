//! `ServiceHandler` — the façade an HTTP layer calls into.
//!
//! Validates requests, runs them past a `Verifier`, and dispatches to a
//! `RequestManager`. Generic and statically dispatched over its backend
//! and verifier so a binary wiring a concrete `Backend` pays no vtable
//! cost on the hot submit/poll path.

use crate::backend::Backend;
use crate::error::{BrokerError, Result};
use crate::manager::RequestManager;
use crate::types::{AsyncResponse, ClientEvent, GetCodeResponse, GetExpiryResponse, GetPublicKeyResponse};
use crate::verifier::Verifier;
use std::sync::Arc;

/// Request/response façade in front of a `RequestManager`.
///
/// `key` is the subscription key under which a caller's async requests
/// and polls are scoped — typically a session id, left to the caller to
/// generate and supply consistently across submit and poll calls.
pub struct ServiceHandler<B: Backend + 'static, V: Verifier> {
    manager: RequestManager<B>,
    backend: Arc<B>,
    verifier: V,
}

impl<B: Backend + 'static, V: Verifier> ServiceHandler<B, V> {
    pub fn new(manager: RequestManager<B>, backend: Arc<B>, verifier: V) -> Self {
        Self { manager, backend, verifier }
    }

    /// `POST /v0/api/service/deploy`
    ///
    /// Deploy carries no `address` (one is assigned by the backend on
    /// success), so it sits outside the non-empty-address precondition
    /// list in spec §4.3 step 3 — only the AAD gate in step 2 applies here.
    pub async fn deploy(&self, key: &str, data: String) -> Result<AsyncResponse> {
        if !self.verifier.verify("", &data).await {
            return Err(BrokerError::FailedAadVerification);
        }
        let id = self.manager.submit_deploy(key, data).await?;
        Ok(AsyncResponse { id })
    }

    /// `POST /v0/api/service/execute`
    pub async fn execute(&self, key: &str, address: String, data: String) -> Result<AsyncResponse> {
        if address.is_empty() {
            return Err(BrokerError::InvalidAddress);
        }
        if !self.verifier.verify(&address, &data).await {
            return Err(BrokerError::FailedAadVerification);
        }
        let id = self.manager.submit_execute(key, address, data).await?;
        Ok(AsyncResponse { id })
    }

    /// `POST /v0/api/service/poll`
    pub async fn poll(&self, key: &str, offset: u64, count: u32, discard_previous: bool) -> Result<(u64, Vec<ClientEvent>)> {
        self.manager.poll(key, offset, count, discard_previous).await
    }

    /// `GET /v0/api/service/getCode`
    pub async fn get_code(&self, address: &str) -> Result<GetCodeResponse> {
        if address.is_empty() {
            return Err(BrokerError::InvalidAddress);
        }
        let code = self
            .backend
            .get_code(address)
            .await
            .map_err(|e| BrokerError::BackendUnavailable(e.to_string()))?;
        Ok(GetCodeResponse { address: address.to_string(), code })
    }

    /// `GET /v0/api/service/getExpiry`
    pub async fn get_expiry(&self, address: &str) -> Result<GetExpiryResponse> {
        if address.is_empty() {
            return Err(BrokerError::InvalidAddress);
        }
        let expiry = self
            .backend
            .get_expiry(address)
            .await
            .map_err(|e| BrokerError::BackendUnavailable(e.to_string()))?;
        Ok(GetExpiryResponse { address: address.to_string(), expiry })
    }

    /// `GET /v0/api/service/getPublicKey`
    pub async fn get_public_key(&self, address: &str) -> Result<GetPublicKeyResponse> {
        if address.is_empty() {
            return Err(BrokerError::InvalidAddress);
        }
        let bundle = self
            .backend
            .get_public_key(address)
            .await
            .map_err(|e| BrokerError::BackendUnavailable(e.to_string()))?;
        Ok(GetPublicKeyResponse {
            timestamp: bundle.timestamp,
            address: address.to_string(),
            public_key: bundle.public_key,
            signature: bundle.signature,
        })
    }

    /// Drop everything tracked under `key`.
    pub async fn remove_subscription(&self, key: &str) -> Result<()> {
        self.manager.remove(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::mailbox::memory::MemoryMailbox;
    use crate::mailbox::Mailbox;
    use crate::retry::poll_until;
    use crate::verifier::{AllowAllVerifier, DenyAllVerifier};

    fn handler<V: Verifier + 'static>(verifier: V) -> ServiceHandler<MockBackend, V> {
        let mailbox: Arc<dyn Mailbox> = Arc::new(MemoryMailbox::default());
        let backend = Arc::new(MockBackend::default());
        let manager = RequestManager::new(mailbox, backend.clone());
        ServiceHandler::new(manager, backend, verifier)
    }

    /// `ServiceHandler::poll` forwards straight to `RequestManager::poll`,
    /// which never retries (see that module's docs) — a test polling for
    /// a result still in flight on a detached task rides out the race
    /// the same way a real client would, with `retry::poll_until`.
    async fn poll_eventually<V: Verifier + 'static>(
        handler: &ServiceHandler<MockBackend, V>,
        key: &str,
        offset: u64,
        count: u32,
        discard_previous: bool,
    ) -> Result<(u64, Vec<ClientEvent>)> {
        poll_until(
            || async { handler.poll(key, offset, count, discard_previous).await },
            |result: &Result<(u64, Vec<ClientEvent>)>| {
                matches!(result, Ok((_, events)) if !events.is_empty())
            },
        )
        .await
    }

    #[tokio::test]
    async fn test_deploy_allows_empty_data_since_only_address_is_preconditioned() {
        let handler = handler(AllowAllVerifier);
        handler.deploy("sess", String::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_deploy_rejects_failed_verification() {
        let handler = handler(DenyAllVerifier);
        let err = handler.deploy("sess", "bytecode".into()).await.unwrap_err();
        assert!(matches!(err, BrokerError::FailedAadVerification));
    }

    #[tokio::test]
    async fn test_execute_rejects_empty_address() {
        let handler = handler(AllowAllVerifier);
        let err = handler.execute("sess", String::new(), "data".into()).await.unwrap_err();
        assert!(matches!(err, BrokerError::InvalidAddress));
    }

    #[tokio::test]
    async fn test_execute_rejects_failed_verification() {
        let handler = handler(DenyAllVerifier);
        let err = handler.execute("sess", "0xabc".into(), "data".into()).await.unwrap_err();
        assert!(matches!(err, BrokerError::FailedAadVerification));
    }

    #[tokio::test]
    async fn test_full_deploy_poll_get_code_round_trip() {
        let handler = handler(AllowAllVerifier);
        let response = handler.deploy("sess", "bytecode".into()).await.unwrap();

        let (_, events) = poll_eventually(&handler, "sess", 0, 10, false).await.unwrap();
        assert_eq!(events.len(), 1);
        let address = match &events[0] {
            ClientEvent::DeployServiceEvent { address, .. } => address.clone(),
            other => panic!("expected deploy event, got {other:?}"),
        };

        let code = handler.get_code(&address).await.unwrap();
        assert_eq!(code.address, address);
        assert_eq!(code.code, "bytecode");
        assert_eq!(response.id, events[0].id());
    }

    #[tokio::test]
    async fn test_get_code_rejects_empty_address() {
        let handler = handler(AllowAllVerifier);
        let err = handler.get_code("").await.unwrap_err();
        assert!(matches!(err, BrokerError::InvalidAddress));
    }

    #[tokio::test]
    async fn test_get_code_unknown_address_is_backend_unavailable() {
        let handler = handler(AllowAllVerifier);
        let err = handler.get_code("0xnope").await.unwrap_err();
        assert!(matches!(err, BrokerError::BackendUnavailable(_)));
    }
}
