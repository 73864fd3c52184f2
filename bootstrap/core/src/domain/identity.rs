// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Identity and credential-exchange seams
//!
//! Anti-Corruption Layer between the token broker and the external identity
//! provider (OIDC) and object store (STS-style exchange). The broker only
//! talks to these traits; the HTTP adapters live in `infrastructure`.

use crate::domain::credential::{BrokerError, DelegatedCredential, SessionCredential};
use async_trait::async_trait;
use std::fmt;

/// Resource-owner credentials forwarded to the identity provider.
#[derive(Clone)]
pub struct ResourceOwner {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ResourceOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceOwner")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// OIDC identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Human-readable name used in logs and `Unavailable` errors
    fn name(&self) -> &str;

    /// Single readiness probe. Retrying is the caller's job.
    async fn probe_ready(&self) -> Result<(), BrokerError>;

    /// Resource-owner password grant.
    ///
    /// A response without a non-empty `access_token` is an
    /// [`BrokerError::AuthenticationFailure`].
    async fn password_grant(&self, owner: &ResourceOwner) -> Result<SessionCredential, BrokerError>;
}

/// Object store issuing delegated credentials for a verified identity token.
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    fn name(&self) -> &str;

    async fn probe_ready(&self) -> Result<(), BrokerError>;

    /// Exchange a bearer token for scoped storage credentials.
    ///
    /// Returns the parsed credential as-is; an empty access key is reported by
    /// the broker, not here.
    async fn assume_role_with_web_identity(
        &self,
        session: &SessionCredential,
    ) -> Result<DelegatedCredential, BrokerError>;
}
