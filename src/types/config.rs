//! Configuration structures.
//!
//! Configuration is loaded from environment variables (the binary maps
//! `GA4_BRIDGE_*` and the standard Google credential variables onto these
//! structs via clap).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Global bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Health endpoint server configuration.
    #[serde(default)]
    pub health: HealthServerConfig,

    /// Credential recovery tunables.
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Outbound metadata probe configuration.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Credential material sources.
    #[serde(default)]
    pub credentials: CredentialConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Health endpoint server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthServerConfig {
    /// Bind address for the HTTP health surface.
    pub bind_addr: String,

    /// Serve `/metrics` (404 when disabled).
    pub enable_metrics: bool,

    /// Serve `/diagnostics` (404 when disabled).
    pub enable_diagnostics: bool,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
            enable_metrics: true,
            enable_diagnostics: true,
        }
    }
}

/// Credential recovery tunables.
///
/// `cooldown` is the minimum delay between consecutive recovery attempts;
/// `max_attempts` is the ceiling after which recovery refuses to run until
/// an explicit reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,

    pub max_attempts: u32,

    /// UTC hour (0-23) at which the external API usage quota resets.
    pub quota_reset_hour: u32,

    /// Retry hint handed back after a network-classified failure.
    #[serde(with = "humantime_serde")]
    pub network_retry_backoff: Duration,

    /// Retry hint handed back after a generic recovery attempt.
    #[serde(with = "humantime_serde")]
    pub generic_retry_backoff: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(30),
            max_attempts: 3,
            quota_reset_hour: 0,
            network_retry_backoff: Duration::from_secs(5),
            generic_retry_backoff: Duration::from_secs(10),
        }
    }
}

/// Outbound metadata probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Analytics Data API base URL (overridable for tests).
    pub endpoint: String,

    /// Hard timeout on the probe call. A hung peer must not block health
    /// checks; timeout is reported as a network error.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://analyticsdata.googleapis.com".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Credential material sources.
///
/// Either a service-account key file or an inline client-email/private-key
/// pair from the environment. Both may be absent, in which case the bridge
/// runs but reports itself unhealthy.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CredentialConfig {
    pub service_account_file: Option<PathBuf>,

    pub client_email: Option<String>,

    /// Base64-encoded private key material carried in an env var.
    #[serde(skip_serializing)]
    pub private_key_base64: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
