//! AAD verification — a pluggable gate in front of execute requests.
//!
//! Kept as a separate collaborator rather than folded into `Backend`
//! because verification is a gateway-side concern (checking that a
//! caller is entitled to act on `address`), independent of whatever the
//! backend itself ends up doing with the request.

use async_trait::async_trait;

/// Verifies that a request carries valid additional authenticated data
/// for the address it targets.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, address: &str, data: &str) -> bool;
}

/// Accepts every request. Default for handlers that don't configure a
/// verifier, and useful in tests that aren't exercising the AAD path.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllVerifier;

#[async_trait]
impl Verifier for AllowAllVerifier {
    async fn verify(&self, _address: &str, _data: &str) -> bool {
        true
    }
}

/// Rejects every request. Used to exercise the `FailedAadVerification`
/// error path in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAllVerifier;

#[async_trait]
impl Verifier for DenyAllVerifier {
    async fn verify(&self, _address: &str, _data: &str) -> bool {
        false
    }
}
