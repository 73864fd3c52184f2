// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! MinIO STS Adapter
//!
//! Implements [`CredentialExchange`] using MinIO's
//! `AssumeRoleWithWebIdentity` API. MinIO validates the bearer token against
//! the identity provider and scopes the issued credential with the policy
//! claim carried in the token.
//!
//! # API Endpoints
//!
//! - `GET /minio/health/live` - Readiness
//! - `POST /` (`Action=AssumeRoleWithWebIdentity`) - Credential exchange

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::bootstrap_config::StorageConfig;
use crate::domain::credential::{BrokerError, DelegatedCredential, SessionCredential};
use crate::domain::identity::CredentialExchange;

const STS_API_VERSION: &str = "2011-06-15";

/// `<Name>text</Name>` with no nested elements. Open and close names are
/// compared by the caller.
static LEAF_ELEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<([A-Za-z]+)>\s*([^<]*?)\s*</([A-Za-z]+)>").expect("leaf element pattern is valid")
});

pub struct MinioStsClient {
    client: Client,
    endpoint: String,
    readiness_path: String,
    duration_seconds: u64,
}

impl MinioStsClient {
    pub fn new(config: &StorageConfig, request_timeout: Duration) -> Result<Self, BrokerError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            readiness_path: config.readiness_path.clone(),
            duration_seconds: config.duration_seconds,
        })
    }
}

#[async_trait]
impl CredentialExchange for MinioStsClient {
    fn name(&self) -> &str {
        "object store"
    }

    async fn probe_ready(&self) -> Result<(), BrokerError> {
        let url = format!("{}{}", self.endpoint, self.readiness_path);
        let response = self.client.get(&url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(BrokerError::Http(format!("GET {} returned {}", url, response.status())))
        }
    }

    async fn assume_role_with_web_identity(
        &self,
        session: &SessionCredential,
    ) -> Result<DelegatedCredential, BrokerError> {
        let duration = self.duration_seconds.to_string();
        let form = [
            ("Action", "AssumeRoleWithWebIdentity"),
            ("Version", STS_API_VERSION),
            ("DurationSeconds", duration.as_str()),
            ("WebIdentityToken", session.access_token.as_str()),
        ];

        let response = self
            .client
            .post(format!("{}/", self.endpoint))
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = leaf_elements(&body)
                .get("Message")
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(BrokerError::ExchangeFailed(message));
        }

        parse_credentials(&body)
    }
}

/// Parse the `<Credentials>` block of an STS response.
///
/// Missing fields become empty strings so the broker can decide how to treat
/// an empty access key.
pub fn parse_credentials(body: &str) -> Result<DelegatedCredential, BrokerError> {
    if !body.contains("<Credentials>") {
        return Err(BrokerError::ExchangeFailed(
            "response did not contain a Credentials element".to_string(),
        ));
    }

    let elements = leaf_elements(body);
    let field = |name: &str| elements.get(name).map(|v| v.to_string()).unwrap_or_default();

    let expires_at = elements
        .get("Expiration")
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(DelegatedCredential {
        access_key: field("AccessKeyId"),
        secret_key: field("SecretAccessKey"),
        session_token: field("SessionToken"),
        expires_at,
    })
}

/// Text of every leaf element, first occurrence wins.
fn leaf_elements(body: &str) -> HashMap<&str, &str> {
    let mut elements = HashMap::new();
    for caps in LEAF_ELEMENT.captures_iter(body) {
        let (Some(open), Some(text), Some(close)) = (caps.get(1), caps.get(2), caps.get(3)) else {
            continue;
        };
        if open.as_str() == close.as_str() {
            elements.entry(open.as_str()).or_insert(text.as_str());
        }
    }
    elements
}
