// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Credential Types
//!
//! Models the two credential stages of the boot sequence:
//!
//! - [`SessionCredential`]: the bearer token issued by the identity provider
//! - [`StorageCredential`]: what the mount bridge actually receives, either a
//!   short-lived [`DelegatedCredential`] from the web-identity exchange or the
//!   statically configured [`FallbackCredential`]
//!
//! None of these are ever written to disk. `Debug` implementations redact
//! every secret so credentials can be passed to `tracing` fields safely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Bearer token obtained through the resource-owner password grant.
#[derive(Clone)]
pub struct SessionCredential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    /// `preferred_username` (or `sub`) from the token payload, when decodable
    pub subject: Option<String>,
}

impl SessionCredential {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("subject", &self.subject)
            .finish()
    }
}

/// Short-lived storage credential issued by `AssumeRoleWithWebIdentity`.
#[derive(Clone)]
pub struct DelegatedCredential {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for DelegatedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedCredential")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Static admin credential from configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct FallbackCredential {
    pub access_key: String,
    pub secret_key: String,
}

impl FallbackCredential {
    pub fn is_empty(&self) -> bool {
        self.access_key.is_empty() || self.secret_key.is_empty()
    }
}

impl fmt::Debug for FallbackCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackCredential")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// The credential handed to the mount bridge. Exactly one variant is active
/// per mount attempt.
#[derive(Debug, Clone)]
pub enum StorageCredential {
    Delegated(DelegatedCredential),
    Fallback(FallbackCredential),
}

/// Which [`StorageCredential`] variant was used, without the secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialVariant {
    Delegated,
    Fallback,
}

impl fmt::Display for CredentialVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialVariant::Delegated => write!(f, "delegated"),
            CredentialVariant::Fallback => write!(f, "fallback"),
        }
    }
}

impl StorageCredential {
    pub fn variant(&self) -> CredentialVariant {
        match self {
            StorageCredential::Delegated(_) => CredentialVariant::Delegated,
            StorageCredential::Fallback(_) => CredentialVariant::Fallback,
        }
    }

    pub fn access_key(&self) -> &str {
        match self {
            StorageCredential::Delegated(c) => &c.access_key,
            StorageCredential::Fallback(c) => &c.access_key,
        }
    }

    pub fn secret_key(&self) -> &str {
        match self {
            StorageCredential::Delegated(c) => &c.secret_key,
            StorageCredential::Fallback(c) => &c.secret_key,
        }
    }

    /// Only delegated credentials carry a session token.
    pub fn session_token(&self) -> Option<&str> {
        match self {
            StorageCredential::Delegated(c) => Some(&c.session_token),
            StorageCredential::Fallback(_) => None,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            StorageCredential::Delegated(c) => c.expires_at,
            StorageCredential::Fallback(_) => None,
        }
    }

    /// Environment handed to the mount bridge child process.
    pub fn to_env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![
            ("AWS_ACCESS_KEY_ID", self.access_key().to_string()),
            ("AWS_SECRET_ACCESS_KEY", self.secret_key().to_string()),
        ];
        if let Some(token) = self.session_token() {
            env.push(("AWS_SESSION_TOKEN", token.to_string()));
        }
        env
    }
}

/// Errors raised while obtaining credentials.
///
/// None of these are fatal to the boot sequence; the broker converts them into
/// a degraded [`StorageCredential::Fallback`] or no credential at all.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("{service} unavailable after {attempts} attempts")]
    Unavailable { service: String, attempts: u32 },

    #[error("Authentication failure: {0}")]
    AuthenticationFailure(String),

    #[error("Credential exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("Credential exchange returned an empty access key")]
    EmptyCredential,

    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for BrokerError {
    fn from(err: reqwest::Error) -> Self {
        BrokerError::Http(err.to_string())
    }
}
