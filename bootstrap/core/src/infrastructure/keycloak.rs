// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Keycloak Identity Provider Adapter
//!
//! Implements [`IdentityProvider`] against a Keycloak realm.
//!
//! # API Endpoints
//!
//! - `GET /realms/{realm}/.well-known/openid-configuration` - Readiness
//! - `POST /realms/{realm}/protocol/openid-connect/token` - Password grant

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::dangerous::insecure_decode;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::domain::bootstrap_config::{resolve_secret, IdentityConfig};
use crate::domain::credential::{BrokerError, SessionCredential};
use crate::domain::identity::{IdentityProvider, ResourceOwner};

/// Token lifetime assumed when the response omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 300;

pub struct KeycloakClient {
    client: Client,
    issuer_url: String,
    realm: String,
    client_id: String,
    client_secret: Option<String>,
    scope: String,
    readiness_path: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Claims read from the access token for logging.
#[derive(Debug, Deserialize)]
struct SubjectClaims {
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    sub: Option<String>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl KeycloakClient {
    pub fn new(config: &IdentityConfig, request_timeout: Duration) -> Result<Self, BrokerError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        let readiness_path = config.readiness_path.clone().unwrap_or_else(|| {
            format!("/realms/{}/.well-known/openid-configuration", config.realm)
        });

        Ok(Self {
            client,
            issuer_url: config.issuer_url.trim_end_matches('/').to_string(),
            realm: config.realm.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.as_deref().and_then(resolve_secret),
            scope: config.scope.clone(),
            readiness_path,
        })
    }

    fn token_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.issuer_url, self.realm
        )
    }
}

#[async_trait]
impl IdentityProvider for KeycloakClient {
    fn name(&self) -> &str {
        "identity provider"
    }

    async fn probe_ready(&self) -> Result<(), BrokerError> {
        let url = format!("{}{}", self.issuer_url, self.readiness_path);
        let response = self.client.get(&url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(BrokerError::Http(format!("GET {} returned {}", url, response.status())))
        }
    }

    async fn password_grant(&self, owner: &ResourceOwner) -> Result<SessionCredential, BrokerError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "password"),
            ("client_id", self.client_id.as_str()),
            ("username", owner.username.as_str()),
            ("password", owner.password.as_str()),
            ("scope", self.scope.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self.client.post(self.token_url()).form(&form).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => format!("HTTP {}", status),
            };
            return Err(if status.is_server_error() {
                BrokerError::Http(reason)
            } else {
                BrokerError::AuthenticationFailure(reason)
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            BrokerError::AuthenticationFailure(format!("Failed to parse token response: {}", e))
        })?;

        let access_token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                BrokerError::AuthenticationFailure(
                    "token response did not contain an access_token".to_string(),
                )
            })?;

        let lifetime = token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let subject = decode_subject(&access_token);
        debug!(subject = ?subject, expires_in = lifetime, "Obtained access token");

        Ok(SessionCredential {
            access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(lifetime),
            subject,
        })
    }
}

/// Read `preferred_username` (else `sub`) from an unverified JWT payload.
///
/// The token is only inspected for logging; verification belongs to the
/// object store that consumes it.
pub fn decode_subject(token: &str) -> Option<String> {
    let claims = insecure_decode::<SubjectClaims>(token).ok()?.claims;
    claims.preferred_username.or(claims.sub)
}
