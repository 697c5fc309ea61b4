//! Collaborator seams for the credential subsystem.
//!
//! The recovery manager does not know how tokens are minted or how the
//! Analytics client is built; it talks to these traits. The concrete
//! [`GaMetadataProbe`] performs the one network call in the validation path:
//! a metadata fetch, chosen because it does not count against report quota.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::types::{ProbeConfig, PropertyId, Result};

/// Probe failure, already classified by transport/status.
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    /// The property itself is unknown; no retry can fix a wrong id.
    #[error("property not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("{0}")]
    Other(String),
}

/// Lightweight reachability/permission probe against the external API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalyticsProbe: Send + Sync + fmt::Debug {
    /// Fetch property metadata. Success means the credential can see the
    /// property; failures arrive pre-classified as [`ProbeError`].
    async fn fetch_metadata(&self, property: &PropertyId) -> std::result::Result<(), ProbeError>;
}

/// Health snapshot reported by the token manager collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Token lifecycle collaborator. Implementations own refresh scheduling and
/// key rotation; the recovery manager only drives them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenManager: Send + Sync + fmt::Debug {
    async fn credential_health(&self) -> CredentialHealth;

    async fn refresh_token(&self) -> Result<()>;

    /// Check for an expired token and refresh if needed. Returns whether a
    /// refresh was performed.
    async fn detect_and_recover_from_expiration(&self) -> Result<bool>;

    async fn handle_credential_rotation(&self) -> Result<()>;
}

/// Metadata probe against the GA4 Analytics Data API.
#[derive(Debug)]
pub struct GaMetadataProbe {
    http: reqwest::Client,
    endpoint: String,
}

impl GaMetadataProbe {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                crate::types::BridgeError::initialization(format!(
                    "failed to build probe http client: {e}"
                ))
            })?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn classify_transport(err: &reqwest::Error) -> ProbeError {
        if err.is_timeout() || err.is_connect() {
            ProbeError::Network(err.to_string())
        } else {
            ProbeError::Other(err.to_string())
        }
    }
}

#[async_trait]
impl AnalyticsProbe for GaMetadataProbe {
    async fn fetch_metadata(&self, property: &PropertyId) -> std::result::Result<(), ProbeError> {
        let url = format!(
            "{}/v1beta/{}/metadata",
            self.endpoint,
            property.resource_path()
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::classify_transport(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let detail = if body.is_empty() {
            status.to_string()
        } else {
            let snippet: String = body.chars().take(200).collect();
            format!("{status}: {snippet}")
        };

        Err(match status.as_u16() {
            404 => ProbeError::NotFound(detail),
            401 | 403 => ProbeError::AccessDenied(detail),
            429 => ProbeError::QuotaExhausted(detail),
            500..=599 => ProbeError::Network(detail),
            _ => ProbeError::Other(detail),
        })
    }
}

/// Bound used by callers that need a probe deadline independent of the
/// underlying client configuration.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
