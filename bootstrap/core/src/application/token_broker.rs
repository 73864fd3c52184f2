// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Identity Token Broker Application Service
//!
//! Turns the workspace user's identity into a storage credential:
//!
//! 1. wait for the identity provider to become ready (bounded attempts)
//! 2. wait for the object store the same way
//! 3. resource-owner password grant → access token
//! 4. `AssumeRoleWithWebIdentity` → delegated storage credential
//! 5. any failure degrades to the configured fallback credential
//!
//! [`TokenBroker::resolve_credential`] never fails: the boot sequence must
//! come up even when no credential can be obtained.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::bootstrap_config::RetryConfig;
use crate::domain::credential::{
    BrokerError, CredentialVariant, DelegatedCredential, FallbackCredential, SessionCredential,
    StorageCredential,
};
use crate::domain::identity::{CredentialExchange, IdentityProvider, ResourceOwner};

/// Attempt-count bounded polling.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            delay: config.delay,
        }
    }
}

/// Outcome of credential resolution.
#[derive(Debug)]
pub struct CredentialResolution {
    pub credential: Option<StorageCredential>,
    /// Why the delegated credential could not be obtained, if it could not
    pub degraded: Option<BrokerError>,
}

impl CredentialResolution {
    pub fn variant(&self) -> Option<CredentialVariant> {
        self.credential.as_ref().map(|c| c.variant())
    }
}

pub struct TokenBroker {
    identity: Arc<dyn IdentityProvider>,
    exchange: Arc<dyn CredentialExchange>,
    owner: Option<ResourceOwner>,
    fallback: Option<FallbackCredential>,
    retry: RetryPolicy,
}

impl TokenBroker {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        exchange: Arc<dyn CredentialExchange>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            identity,
            exchange,
            owner: None,
            fallback: None,
            retry,
        }
    }

    pub fn with_owner(mut self, owner: Option<ResourceOwner>) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_fallback(mut self, fallback: Option<FallbackCredential>) -> Self {
        self.fallback = fallback.filter(|f| !f.is_empty());
        self
    }

    /// Steps 1–4: readiness of both services, password grant, exchange.
    pub async fn delegated_credential(&self) -> Result<DelegatedCredential, BrokerError> {
        let owner = self.owner.as_ref().ok_or_else(|| {
            BrokerError::AuthenticationFailure(
                "no workspace username/password configured".to_string(),
            )
        })?;

        let identity = self.identity.clone();
        self.wait_until_ready(identity.name(), || identity.probe_ready())
            .await?;

        let exchange = self.exchange.clone();
        self.wait_until_ready(exchange.name(), || exchange.probe_ready())
            .await?;

        let session = self.identity.password_grant(owner).await?;
        info!(subject = ?session.subject, expires_at = %session.expires_at, "Obtained identity token");

        self.exchange_session(&session).await
    }

    /// Step 4 on its own, for callers that already hold a session.
    pub async fn exchange_session(
        &self,
        session: &SessionCredential,
    ) -> Result<DelegatedCredential, BrokerError> {
        let credential = self.exchange.assume_role_with_web_identity(session).await?;
        if credential.access_key.is_empty() {
            return Err(BrokerError::EmptyCredential);
        }
        info!(
            access_key = %credential.access_key,
            expires_at = ?credential.expires_at,
            "Obtained delegated storage credential"
        );
        Ok(credential)
    }

    /// Resolve the credential for this mount attempt, degrading instead of failing.
    pub async fn resolve_credential(&self) -> CredentialResolution {
        let error = match self.delegated_credential().await {
            Ok(credential) => {
                return CredentialResolution {
                    credential: Some(StorageCredential::Delegated(credential)),
                    degraded: None,
                };
            }
            Err(e) => e,
        };

        match &self.fallback {
            Some(fallback) => {
                warn!(
                    reason = %error,
                    access_key = %fallback.access_key,
                    "Delegated credentials unavailable; using static fallback credential. \
                     Storage access is NOT scoped to the workspace user"
                );
                CredentialResolution {
                    credential: Some(StorageCredential::Fallback(fallback.clone())),
                    degraded: Some(error),
                }
            }
            None => {
                warn!(reason = %error, "Delegated credentials unavailable and no fallback configured");
                CredentialResolution {
                    credential: None,
                    degraded: Some(error),
                }
            }
        }
    }

    async fn wait_until_ready<F, Fut>(&self, service: &str, mut probe: F) -> Result<(), BrokerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), BrokerError>>,
    {
        for attempt in 1..=self.retry.attempts {
            match probe().await {
                Ok(()) => {
                    info!("{} ready after {} attempt(s)", service, attempt);
                    return Ok(());
                }
                Err(e) => {
                    debug!(attempt, max = self.retry.attempts, "{} not ready: {}", service, e);
                }
            }
            if attempt < self.retry.attempts {
                tokio::time::sleep(self.retry.delay).await;
            }
        }

        warn!("{} not ready after {} attempts, giving up", service, self.retry.attempts);
        Err(BrokerError::Unavailable {
            service: service.to_string(),
            attempts: self.retry.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct MockIdentity {
        failures_before_ready: u32,
        probes: AtomicU32,
        grant: Mutex<Option<Result<SessionCredential, BrokerError>>>,
    }

    impl MockIdentity {
        fn ready_with(grant: Result<SessionCredential, BrokerError>) -> Self {
            Self {
                failures_before_ready: 0,
                probes: AtomicU32::new(0),
                grant: Mutex::new(Some(grant)),
            }
        }

        fn unreachable() -> Self {
            Self {
                failures_before_ready: u32::MAX,
                probes: AtomicU32::new(0),
                grant: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for MockIdentity {
        fn name(&self) -> &str {
            "identity provider"
        }

        async fn probe_ready(&self) -> Result<(), BrokerError> {
            let n = self.probes.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_ready {
                Err(BrokerError::Http("connection refused".to_string()))
            } else {
                Ok(())
            }
        }

        async fn password_grant(&self, _owner: &ResourceOwner) -> Result<SessionCredential, BrokerError> {
            self.grant
                .lock()
                .unwrap()
                .take()
                .expect("password_grant called more than once")
        }
    }

    struct MockExchange {
        access_key: String,
        calls: AtomicU32,
    }

    impl MockExchange {
        fn issuing(access_key: &str) -> Self {
            Self {
                access_key: access_key.to_string(),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CredentialExchange for MockExchange {
        fn name(&self) -> &str {
            "object store"
        }

        async fn probe_ready(&self) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn assume_role_with_web_identity(
            &self,
            _session: &SessionCredential,
        ) -> Result<DelegatedCredential, BrokerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DelegatedCredential {
                access_key: self.access_key.clone(),
                secret_key: "secret".to_string(),
                session_token: "token".to_string(),
                expires_at: None,
            })
        }
    }

    fn session(token: &str) -> SessionCredential {
        SessionCredential {
            access_token: token.to_string(),
            expires_at: Utc::now() + chrono::Duration::minutes(5),
            subject: Some("user1".to_string()),
        }
    }

    fn owner() -> Option<ResourceOwner> {
        Some(ResourceOwner {
            username: "user1".to_string(),
            password: "user1password".to_string(),
        })
    }

    fn fallback() -> Option<FallbackCredential> {
        Some(FallbackCredential {
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin123".to_string(),
        })
    }

    fn retry(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_delegated_credential_on_success() {
        let broker = TokenBroker::new(
            Arc::new(MockIdentity::ready_with(Ok(session("jwt")))),
            Arc::new(MockExchange::issuing("DELEGATEDKEY")),
            retry(3),
        )
        .with_owner(owner())
        .with_fallback(fallback());

        let resolution = broker.resolve_credential().await;
        assert_eq!(resolution.variant(), Some(CredentialVariant::Delegated));
        assert!(resolution.degraded.is_none());
        assert_eq!(resolution.credential.unwrap().access_key(), "DELEGATEDKEY");
    }

    #[tokio::test]
    async fn test_unreachable_identity_provider_is_bounded() {
        let identity = Arc::new(MockIdentity::unreachable());
        let exchange = Arc::new(MockExchange::issuing("unused"));
        let broker = TokenBroker::new(identity.clone(), exchange.clone(), retry(4))
            .with_owner(owner())
            .with_fallback(fallback());

        let resolution = broker.resolve_credential().await;
        assert_eq!(identity.probes.load(Ordering::SeqCst), 4);
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            resolution.degraded,
            Some(BrokerError::Unavailable { attempts: 4, .. })
        ));
        assert_eq!(resolution.variant(), Some(CredentialVariant::Fallback));
    }

    #[tokio::test]
    async fn test_readiness_recovers_within_budget() {
        let identity = Arc::new(MockIdentity {
            failures_before_ready: 2,
            probes: AtomicU32::new(0),
            grant: Mutex::new(Some(Ok(session("jwt")))),
        });
        let broker = TokenBroker::new(
            identity.clone(),
            Arc::new(MockExchange::issuing("KEY")),
            retry(5),
        )
        .with_owner(owner());

        assert!(broker.delegated_credential().await.is_ok());
        assert_eq!(identity.probes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_authentication_failure_falls_back() {
        let broker = TokenBroker::new(
            Arc::new(MockIdentity::ready_with(Err(BrokerError::AuthenticationFailure(
                "token response did not contain an access_token".to_string(),
            )))),
            Arc::new(MockExchange::issuing("unused")),
            retry(1),
        )
        .with_owner(owner())
        .with_fallback(fallback());

        let resolution = broker.resolve_credential().await;
        assert!(matches!(
            resolution.degraded,
            Some(BrokerError::AuthenticationFailure(_))
        ));
        let credential = resolution.credential.unwrap();
        assert_eq!(credential.variant(), CredentialVariant::Fallback);
        assert_eq!(credential.access_key(), "minioadmin");
        assert!(credential.session_token().is_none());
    }

    #[tokio::test]
    async fn test_empty_access_key_falls_back() {
        let broker = TokenBroker::new(
            Arc::new(MockIdentity::ready_with(Ok(session("jwt")))),
            Arc::new(MockExchange::issuing("")),
            retry(1),
        )
        .with_owner(owner())
        .with_fallback(fallback());

        let resolution = broker.resolve_credential().await;
        assert!(matches!(resolution.degraded, Some(BrokerError::EmptyCredential)));
        assert_eq!(resolution.variant(), Some(CredentialVariant::Fallback));
    }

    #[tokio::test]
    async fn test_no_fallback_yields_no_credential() {
        let broker = TokenBroker::new(
            Arc::new(MockIdentity::unreachable()),
            Arc::new(MockExchange::issuing("unused")),
            retry(2),
        )
        .with_owner(owner());

        let resolution = broker.resolve_credential().await;
        assert!(resolution.credential.is_none());
        assert!(resolution.degraded.is_some());
    }

    #[tokio::test]
    async fn test_missing_owner_skips_network() {
        let identity = Arc::new(MockIdentity::unreachable());
        let broker = TokenBroker::new(identity.clone(), Arc::new(MockExchange::issuing("x")), retry(3))
            .with_fallback(fallback());

        let resolution = broker.resolve_credential().await;
        assert_eq!(identity.probes.load(Ordering::SeqCst), 0);
        assert_eq!(resolution.variant(), Some(CredentialVariant::Fallback));
    }

    #[test]
    fn test_empty_fallback_is_ignored() {
        let broker = TokenBroker::new(
            Arc::new(MockIdentity::unreachable()),
            Arc::new(MockExchange::issuing("x")),
            retry(1),
        )
        .with_fallback(Some(FallbackCredential {
            access_key: String::new(),
            secret_key: "secret".to_string(),
        }));
        assert!(broker.fallback.is_none());
    }
}
