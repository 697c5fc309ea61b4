//! ga4-bridge health sidecar - main entry point.
//!
//! Wires the long-lived singletons (recovery manager, aggregator, health
//! server) once at startup and serves the HTTP health surface until a
//! shutdown signal arrives.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use ga4_bridge::credentials::{CredentialRecoveryManager, GaMetadataProbe};
use ga4_bridge::health::server::HealthServer;
use ga4_bridge::health::HealthAggregator;
use ga4_bridge::lifecycle::ProcessLifecycle;
use ga4_bridge::metrics::BridgeMetrics;
use ga4_bridge::types::{
    BridgeError, Config, CredentialConfig, HealthServerConfig, ProbeConfig, PropertyId,
    RecoveryConfig, SystemClock,
};

#[derive(Parser, Debug)]
#[command(name = "ga4-bridge", version, about = "GA4 bridge credential/health sidecar")]
struct Cli {
    /// Bind address for the health HTTP surface.
    #[arg(long, env = "GA4_BRIDGE_HEALTH_ADDR", default_value = "127.0.0.1:8787")]
    health_addr: String,

    /// Numeric GA4 property id the bridge serves.
    #[arg(long, env = "GA4_BRIDGE_PROPERTY_ID")]
    property_id: String,

    /// Service-account key file (standard Google credential path).
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    service_account_file: Option<PathBuf>,

    /// Inline service-account client email.
    #[arg(long, env = "GA4_CLIENT_EMAIL")]
    client_email: Option<String>,

    /// Inline base64-encoded private key.
    #[arg(long, env = "GA4_PRIVATE_KEY_BASE64", hide_env_values = true)]
    private_key_base64: Option<String>,

    #[arg(
        long,
        env = "GA4_BRIDGE_ENABLE_METRICS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    enable_metrics: bool,

    #[arg(
        long,
        env = "GA4_BRIDGE_ENABLE_DIAGNOSTICS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    enable_diagnostics: bool,

    /// Minimum delay between recovery attempts, in seconds.
    #[arg(long, env = "GA4_BRIDGE_RECOVERY_COOLDOWN_SECS", default_value_t = 30)]
    recovery_cooldown_secs: u64,

    /// Recovery attempt ceiling before an operator reset is required.
    #[arg(long, env = "GA4_BRIDGE_MAX_RECOVERY_ATTEMPTS", default_value_t = 3)]
    max_recovery_attempts: u32,

    /// UTC hour at which the API usage quota resets.
    #[arg(long, env = "GA4_BRIDGE_QUOTA_RESET_HOUR", default_value_t = 0)]
    quota_reset_hour: u32,

    /// Metadata probe timeout, in seconds.
    #[arg(long, env = "GA4_BRIDGE_PROBE_TIMEOUT_SECS", default_value_t = 5)]
    probe_timeout_secs: u64,

    /// Analytics Data API base URL.
    #[arg(
        long,
        env = "GA4_BRIDGE_PROBE_ENDPOINT",
        default_value = "https://analyticsdata.googleapis.com"
    )]
    probe_endpoint: String,
}

impl Cli {
    fn into_config(self) -> (Config, String) {
        let config = Config {
            health: HealthServerConfig {
                bind_addr: self.health_addr,
                enable_metrics: self.enable_metrics,
                enable_diagnostics: self.enable_diagnostics,
            },
            recovery: RecoveryConfig {
                cooldown: Duration::from_secs(self.recovery_cooldown_secs),
                max_attempts: self.max_recovery_attempts,
                quota_reset_hour: self.quota_reset_hour,
                ..RecoveryConfig::default()
            },
            probe: ProbeConfig {
                endpoint: self.probe_endpoint,
                timeout: Duration::from_secs(self.probe_timeout_secs),
            },
            credentials: CredentialConfig {
                service_account_file: self.service_account_file,
                client_email: self.client_email,
                private_key_base64: self.private_key_base64,
            },
            observability: Default::default(),
        };
        (config, self.property_id)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let (config, property_id) = cli.into_config();

    ga4_bridge::observability::init_tracing();
    ga4_bridge::observability::install_failsafe_hook(Duration::from_millis(200));

    let property = PropertyId::from_string(property_id)
        .map_err(|e| BridgeError::initialization(format!("invalid property id: {e}")))?;

    let clock = Arc::new(SystemClock);
    let metrics = Arc::new(BridgeMetrics::default());
    let lifecycle = Arc::new(ProcessLifecycle::new());
    let probe = Arc::new(GaMetadataProbe::new(&config.probe)?);

    // Token management is provided by the embedding bridge; the sidecar runs
    // without it and reports the feature as unavailable.
    let recovery = Arc::new(Mutex::new(CredentialRecoveryManager::new(
        property,
        config.recovery.clone(),
        config.credentials.clone(),
        Some(probe),
        None,
        clock.clone(),
    )));

    let aggregator = Arc::new(HealthAggregator::new(
        recovery.clone(),
        None,
        lifecycle.clone(),
        config.credentials.clone(),
        clock,
    ));

    let server = Arc::new(HealthServer::new(
        aggregator,
        recovery,
        metrics,
        config.health.clone(),
        config.credentials.clone(),
    ));

    lifecycle.mark_started();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "ga4-bridge sidecar starting on {}",
        config.health.bind_addr,
    );

    // Flip lifecycle and drain the server on SIGINT/SIGTERM.
    let signal_server = server.clone();
    let signal_lifecycle = lifecycle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received, draining");
        signal_lifecycle.mark_shutting_down();
        signal_server.shutdown();
    });

    server.serve().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
