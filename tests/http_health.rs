//! HTTP health surface integration tests — full server round-trips.

use async_trait::async_trait;
use ga4_bridge::credentials::{
    AnalyticsProbe, CredentialRecoveryManager, GaMetadataProbe, ProbeError,
};
use ga4_bridge::health::server::HealthServer;
use ga4_bridge::health::HealthAggregator;
use ga4_bridge::lifecycle::ProcessLifecycle;
use ga4_bridge::metrics::BridgeMetrics;
use ga4_bridge::types::{
    CredentialConfig, HealthServerConfig, ProbeConfig, PropertyId, RecoveryConfig, SystemClock,
};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Probe stub with a canned response; integration tests never hit the network.
#[derive(Debug)]
struct StubProbe {
    error: Option<ProbeError>,
}

#[async_trait]
impl AnalyticsProbe for StubProbe {
    async fn fetch_metadata(&self, _property: &PropertyId) -> Result<(), ProbeError> {
        match &self.error {
            None => Ok(()),
            Some(e) => Err(e.clone()),
        }
    }
}

struct Harness {
    addr: SocketAddr,
    server: Arc<HealthServer>,
    handle: tokio::task::JoinHandle<()>,
    // Held so the service-account file outlives the test.
    _credential_file: Option<tempfile::NamedTempFile>,
}

impl Harness {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

async fn start_server(
    probe_error: Option<ProbeError>,
    with_credentials: bool,
    enable_metrics: bool,
    enable_diagnostics: bool,
) -> Harness {
    let credential_file = if with_credentials {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{}}").unwrap();
        Some(file)
    } else {
        None
    };

    let credential_config = CredentialConfig {
        service_account_file: credential_file.as_ref().map(|f| f.path().to_path_buf()),
        client_email: None,
        private_key_base64: None,
    };

    let clock = Arc::new(SystemClock);
    let probe: Arc<dyn AnalyticsProbe> = Arc::new(StubProbe { error: probe_error });
    let recovery = Arc::new(Mutex::new(CredentialRecoveryManager::new(
        PropertyId::from_string("123456".to_string()).unwrap(),
        RecoveryConfig::default(),
        credential_config.clone(),
        Some(probe),
        None,
        clock.clone(),
    )));

    let lifecycle = Arc::new(ProcessLifecycle::new());
    lifecycle.mark_started();

    let aggregator = Arc::new(HealthAggregator::new(
        recovery.clone(),
        None,
        lifecycle,
        credential_config.clone(),
        clock,
    ));

    let server = Arc::new(HealthServer::new(
        aggregator,
        recovery,
        Arc::new(BridgeMetrics::default()),
        HealthServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            enable_metrics,
            enable_diagnostics,
        },
        credential_config,
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let serve_server = server.clone();
    let handle = tokio::spawn(async move {
        serve_server.serve_on(listener).await.unwrap();
    });

    // Give the accept loop a moment.
    tokio::time::sleep(Duration::from_millis(50)).await;

    Harness {
        addr,
        server,
        handle,
        _credential_file: credential_file,
    }
}

#[tokio::test]
async fn test_health_round_trip() {
    let harness = start_server(None, true, true, true).await;

    let response = reqwest::get(harness.url("/health")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    // No token manager wired: degraded, not unhealthy.
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"].as_object().unwrap().len(), 5);
    assert_eq!(body["checks"]["analytics_api"]["status"], "pass");
    assert_eq!(body["checks"]["token_manager"]["status"], "warn");
    assert_eq!(body["phase3Features"]["token_management"], false);
    assert!(body["uptime"].is_u64());
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_health_unhealthy_returns_503() {
    let harness = start_server(
        Some(ProbeError::AccessDenied("403 forbidden".to_string())),
        true,
        true,
        true,
    )
    .await;

    let response = reqwest::get(harness.url("/health")).await.unwrap();
    assert_eq!(response.status(), 503);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["checks"]["analytics_api"]["status"], "fail");
}

#[tokio::test]
async fn test_status_is_cheap_and_ok() {
    let harness = start_server(None, true, true, true).await;

    let response = reqwest::get(harness.url("/status")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["server"], "ga4-bridge");
    assert!(body["uptime"].is_u64());
}

#[tokio::test]
async fn test_ping_and_root() {
    let harness = start_server(None, true, true, true).await;

    let ping: serde_json::Value = reqwest::get(harness.url("/ping"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ping["pong"], true);

    let root: serde_json::Value = reqwest::get(harness.url("/"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(root["service"], "ga4-bridge");
    assert!(root["endpoints"].as_array().unwrap().len() >= 5);
}

#[tokio::test]
async fn test_metrics_counts_requests() {
    let harness = start_server(None, true, true, true).await;

    reqwest::get(harness.url("/health")).await.unwrap();
    reqwest::get(harness.url("/status")).await.unwrap();

    let response = reqwest::get(harness.url("/metrics")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["http"]["requests"].as_u64().unwrap() >= 2);
    assert_eq!(body["auth"]["credential_kind"], "service_account_file");
    assert_eq!(body["runtime"]["service"], "ga4-bridge");
    assert!(body["runtime"]["pid"].is_u64());
}

#[tokio::test]
async fn test_metrics_disabled_is_404() {
    let harness = start_server(None, true, false, true).await;

    let response = reqwest::get(harness.url("/metrics")).await.unwrap();
    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Not found");
}

#[tokio::test]
async fn test_diagnostics_payload() {
    let harness = start_server(None, true, true, true).await;

    // Prime the cached snapshot.
    reqwest::get(harness.url("/health")).await.unwrap();

    let response = reqwest::get(harness.url("/diagnostics")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["credentials"]["has_credentials"], true);
    assert_eq!(body["credentials"]["credential_kind"], "service_account_file");
    assert_eq!(body["credentials"]["property_access"], true);
    assert_eq!(body["last_health"]["status"], "degraded");
}

#[tokio::test]
async fn test_diagnostics_disabled_is_404() {
    let harness = start_server(None, true, true, false).await;

    let response = reqwest::get(harness.url("/diagnostics")).await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_unknown_path_is_404_json() {
    let harness = start_server(None, true, true, true).await;

    let response = reqwest::get(harness.url("/nope")).await.unwrap();
    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Not found");
}

#[tokio::test]
async fn test_uniform_response_headers() {
    let harness = start_server(None, true, true, true).await;

    for path in ["/health", "/status", "/nope"] {
        let response = reqwest::get(harness.url(path)).await.unwrap();
        let headers = response.headers();
        assert!(
            headers.get("x-correlation-id").is_some(),
            "missing correlation id on {path}"
        );
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    }
}

#[tokio::test]
async fn test_graceful_shutdown() {
    let harness = start_server(None, true, true, true).await;

    // Server responds, then drains on shutdown.
    reqwest::get(harness.url("/ping")).await.unwrap();
    harness.server.shutdown();

    tokio::time::timeout(Duration::from_secs(5), harness.handle)
        .await
        .expect("server did not stop after shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_probe_classifies_statuses_via_stub_endpoint() {
    // Real probe against a local server returning 403: classification only,
    // no Google dependency.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let app = axum::Router::new().fallback(|| async {
            (axum::http::StatusCode::FORBIDDEN, "permission denied")
        });
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let probe = GaMetadataProbe::new(&ProbeConfig {
        endpoint: format!("http://{addr}"),
        timeout: Duration::from_secs(2),
    })
    .unwrap();

    let property = PropertyId::from_string("123".to_string()).unwrap();
    let err = probe.fetch_metadata(&property).await.unwrap_err();
    assert!(matches!(err, ProbeError::AccessDenied(_)));
}
