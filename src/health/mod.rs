//! Composite service health.
//!
//! A fixed set of named sub-checks folded into one tri-state status. Every
//! sub-check runs isolated: a panic or error inside one is reported as `Fail`
//! for that check and never aborts the rest.

pub mod server;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::credentials::{material, CredentialRecoveryManager, TokenManager};
use crate::lifecycle::ServerLifecycle;
use crate::types::{Clock, CredentialConfig};

/// Outcome of one sub-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Uniform result shape for every sub-check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CheckResult {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Pass,
            message: message.into(),
            details: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Warn,
            message: message.into(),
            details: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Fail,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Aggregated tri-state service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Full composite snapshot. Derived on demand, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct CompositeHealth {
    pub status: ServiceStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_ms: u64,
    pub checks: BTreeMap<String, CheckResult>,
    pub feature_availability: BTreeMap<String, bool>,
}

/// Cheap boolean-only status for high-frequency polling.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SimpleStatus {
    pub ok: bool,
    pub uptime_ms: u64,
}

/// Folds credential, token, and lifecycle signals into one status.
#[derive(Debug)]
pub struct HealthAggregator {
    clock: Arc<dyn Clock>,
    started_at: DateTime<Utc>,
    recovery: Arc<Mutex<CredentialRecoveryManager>>,
    tokens: Option<Arc<dyn TokenManager>>,
    lifecycle: Arc<dyn ServerLifecycle>,
    credential_config: CredentialConfig,
    last_snapshot: std::sync::Mutex<Option<CompositeHealth>>,
}

impl HealthAggregator {
    pub fn new(
        recovery: Arc<Mutex<CredentialRecoveryManager>>,
        tokens: Option<Arc<dyn TokenManager>>,
        lifecycle: Arc<dyn ServerLifecycle>,
        credential_config: CredentialConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let started_at = clock.now_utc();
        Self {
            clock,
            started_at,
            recovery,
            tokens,
            lifecycle,
            credential_config,
            last_snapshot: std::sync::Mutex::new(None),
        }
    }

    /// Run every sub-check and fold the results.
    ///
    /// `Healthy` iff all checks pass, `Unhealthy` iff any check fails,
    /// `Degraded` otherwise.
    pub async fn perform_health_check(&self) -> CompositeHealth {
        let mut checks = BTreeMap::new();

        checks.insert(
            "authentication".to_string(),
            run_check("authentication", self.check_authentication()).await,
        );
        checks.insert(
            "analytics_api".to_string(),
            run_check("analytics_api", self.check_analytics_api()).await,
        );
        checks.insert(
            "lifecycle".to_string(),
            run_check("lifecycle", self.check_lifecycle()).await,
        );
        checks.insert(
            "token_manager".to_string(),
            run_check("token_manager", self.check_token_manager()).await,
        );
        checks.insert(
            "credential_recovery".to_string(),
            run_check("credential_recovery", self.check_credential_recovery()).await,
        );

        let status = fold_status(checks.values());
        let now = self.clock.now_utc();
        let snapshot = CompositeHealth {
            status,
            timestamp: now,
            uptime_ms: (now - self.started_at).num_milliseconds().max(0) as u64,
            checks,
            feature_availability: self.feature_availability().await,
        };

        if status != ServiceStatus::Healthy {
            tracing::warn!(status = ?status, "health check not fully green");
        }

        if let Ok(mut cached) = self.last_snapshot.lock() {
            *cached = Some(snapshot.clone());
        }
        snapshot
    }

    /// Boolean-only status from lifecycle flags and the last cached
    /// snapshot; performs no sub-check fan-out.
    pub fn simple_status(&self) -> SimpleStatus {
        let alive =
            self.lifecycle.is_server_started() && !self.lifecycle.is_server_shutting_down();
        let last_unhealthy = self
            .last_snapshot
            .lock()
            .ok()
            .and_then(|cached| (*cached).as_ref().map(|s| s.status == ServiceStatus::Unhealthy))
            .unwrap_or(false);
        let now = self.clock.now_utc();
        SimpleStatus {
            ok: alive && !last_unhealthy,
            uptime_ms: (now - self.started_at).num_milliseconds().max(0) as u64,
        }
    }

    /// Last composite snapshot, if a full check has run.
    pub fn last_snapshot(&self) -> Option<CompositeHealth> {
        self.last_snapshot
            .lock()
            .ok()
            .and_then(|cached| (*cached).clone())
    }

    /// Which optional subsystems are wired up at all, independent of their
    /// current health. Distinguishes "not installed" from "installed but
    /// failing".
    pub async fn feature_availability(&self) -> BTreeMap<String, bool> {
        let recovery = self.recovery.lock().await;
        let mut features = BTreeMap::new();
        features.insert("token_management".to_string(), self.tokens.is_some());
        features.insert("credential_recovery".to_string(), recovery.has_probe());
        features.insert("automatic_refresh".to_string(), self.tokens.is_some());
        features
    }

    async fn check_authentication(&self) -> CheckResult {
        let found = material::discover(&self.credential_config);
        if !found.is_present() {
            let mut result = CheckResult::fail("no credential material configured");
            if !found.problems.is_empty() {
                result = result.with_details(json!({ "problems": found.problems }));
            }
            return result;
        }
        if found.problems.is_empty() {
            CheckResult::pass(format!("credentials configured ({:?})", found.kind))
        } else {
            CheckResult::warn("credentials configured with problems")
                .with_details(json!({ "problems": found.problems }))
        }
    }

    async fn check_analytics_api(&self) -> CheckResult {
        let recovery = self.recovery.lock().await;
        if !recovery.has_probe() {
            return CheckResult::fail("analytics client not initialized");
        }
        let diag = recovery.diagnostics().await;
        if diag.property_access {
            CheckResult::pass(format!("property {} reachable", recovery.property()))
        } else {
            CheckResult::fail("property probe failed")
                .with_details(json!({ "errors": diag.errors }))
        }
    }

    async fn check_lifecycle(&self) -> CheckResult {
        if self.lifecycle.is_server_shutting_down() {
            CheckResult::warn("server is draining")
        } else if self.lifecycle.is_server_started() {
            CheckResult::pass("server started")
        } else {
            CheckResult::fail("server not started")
        }
    }

    async fn check_token_manager(&self) -> CheckResult {
        match &self.tokens {
            None => CheckResult::warn("token manager not configured"),
            Some(tokens) => {
                let health = tokens.credential_health().await;
                if health.healthy {
                    CheckResult::pass("token manager healthy")
                } else {
                    CheckResult::fail(
                        health
                            .detail
                            .unwrap_or_else(|| "token manager reports unhealthy".to_string()),
                    )
                }
            }
        }
    }

    async fn check_credential_recovery(&self) -> CheckResult {
        let recovery = self.recovery.lock().await;
        let attempts = recovery.recovery_attempts();
        if attempts == 0 {
            CheckResult::pass("no recovery attempts outstanding")
        } else {
            CheckResult::warn(format!("{attempts} recovery attempts used"))
                .with_details(json!({ "attempts": attempts }))
        }
    }
}

/// Run a sub-check, converting a panic into a `Fail` result.
async fn run_check<F>(name: &str, check: F) -> CheckResult
where
    F: std::future::Future<Output = CheckResult>,
{
    match AssertUnwindSafe(check).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(&payload);
            tracing::error!("health sub-check {name} panicked: {message}");
            CheckResult::fail(format!("{name} check panicked: {message}"))
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic (no message)".to_string()
    }
}

fn fold_status<'a>(results: impl Iterator<Item = &'a CheckResult>) -> ServiceStatus {
    let mut status = ServiceStatus::Healthy;
    for result in results {
        match result.status {
            CheckStatus::Fail => return ServiceStatus::Unhealthy,
            CheckStatus::Warn => status = ServiceStatus::Degraded,
            CheckStatus::Pass => {}
        }
    }
    status
}
