//! Credential validation and bounded recovery.
//!
//! One long-lived manager per process, keyed by the GA4 property being
//! accessed. The read path (`validate_credentials`) probes the external API
//! and classifies failures; the write path (`attempt_recovery`) executes a
//! bounded recovery strategy gated by a cooldown and an attempt ceiling.
//! Outcomes are returned as values so callers can branch on them; nothing in
//! this module throws for an expected failure.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::material::{self, CredentialKind};
use super::probe::{AnalyticsProbe, ProbeError, TokenManager};
use crate::types::{Clock, CredentialConfig, PropertyId, RecoveryConfig, Result};

/// Pause inserted before handing back a network retry hint.
const BRIEF_NETWORK_DELAY: Duration = Duration::from_millis(200);

/// Classified credential failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CredentialsInvalid,
    PermissionDenied,
    NetworkError,
    QuotaExceeded,
    Unknown,
}

/// Local usage-quota state. Accounting is not tracked yet; the check exists
/// as its own gate so recovery policy can depend on it independently of the
/// API probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaStatus {
    Ok,
    NearLimit,
    Exceeded,
    Unknown,
}

/// Result of one credential validation. Produced fresh on every call.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub can_recover: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
            error_kind: None,
            can_recover: false,
            recovery_action: None,
            retry_after_ms: None,
        }
    }

    pub fn invalid(kind: ErrorKind, error: impl Into<String>, can_recover: bool) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
            error_kind: Some(kind),
            can_recover,
            recovery_action: None,
            retry_after_ms: None,
        }
    }

    pub fn with_recovery_action(mut self, action: impl Into<String>) -> Self {
        self.recovery_action = Some(action.into());
        self
    }

    pub fn with_retry_after_ms(mut self, ms: u64) -> Self {
        self.retry_after_ms = Some(ms);
        self
    }
}

/// Result of exactly one recovery attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryOutcome {
    pub success: bool,
    pub recovery_action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub should_retry: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl RecoveryOutcome {
    fn recovered(action: &str) -> Self {
        Self {
            success: true,
            recovery_action: action.to_string(),
            error: None,
            should_retry: false,
            retry_after_ms: None,
        }
    }

    fn failed(
        action: &str,
        error: impl Into<String>,
        should_retry: bool,
        retry_after_ms: Option<u64>,
    ) -> Self {
        Self {
            success: false,
            recovery_action: action.to_string(),
            error: Some(error.into()),
            should_retry,
            retry_after_ms,
        }
    }
}

/// Point-in-time credential snapshot for health checks and operator tooling.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialDiagnostics {
    pub has_credentials: bool,
    pub credential_kind: CredentialKind,
    pub property_access: bool,
    pub network_connectivity: bool,
    pub quota_status: QuotaStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_validation_at: Option<DateTime<Utc>>,
    pub validation_count: u64,
    pub errors: Vec<String>,
}

/// Classify a failure message into an [`ErrorKind`].
///
/// Substring heuristic, checked in a fixed family order (credential, then
/// permission, then network, then quota). Isolated here so call sites keep
/// working if the external client ever grows structured error codes.
pub fn categorize_error(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    const CREDENTIAL: &[&str] = &["credential", "auth", "token", "unauthenticated"];
    const PERMISSION: &[&str] = &["permission", "access", "forbidden", "denied"];
    const NETWORK: &[&str] = &["network", "connection", "timeout", "dns", "unreachable"];
    const QUOTA: &[&str] = &["quota", "rate", "limit", "exhausted"];

    if CREDENTIAL.iter().any(|n| lower.contains(n)) {
        ErrorKind::CredentialsInvalid
    } else if PERMISSION.iter().any(|n| lower.contains(n)) {
        ErrorKind::PermissionDenied
    } else if NETWORK.iter().any(|n| lower.contains(n)) {
        ErrorKind::NetworkError
    } else if QUOTA.iter().any(|n| lower.contains(n)) {
        ErrorKind::QuotaExceeded
    } else {
        ErrorKind::Unknown
    }
}

/// Milliseconds until the next daily quota reset at `reset_hour` UTC.
///
/// Always in `1..86_400_000` so a `retry_after_ms` derived from it is a
/// usable, finite wait.
pub fn quota_reset_horizon_ms(now: DateTime<Utc>, reset_hour: u32) -> u64 {
    let hour = reset_hour.min(23);
    let Some(reset_time) = now.date_naive().and_hms_opt(hour, 0, 0) else {
        return 1; // unreachable with a clamped hour
    };
    let today_reset = reset_time.and_utc();
    let next_reset = if today_reset > now {
        today_reset
    } else {
        today_reset + ChronoDuration::days(1)
    };
    let ms = (next_reset - now).num_milliseconds().max(1) as u64;
    ms.min(86_400_000 - 1)
}

/// Owns credential state for one property.
///
/// Methods take `&mut self`; the process shares one instance behind an async
/// mutex. Cooldown and ceiling checks update state with no await in between,
/// so interleaved recovery attempts serialize correctly.
#[derive(Debug)]
pub struct CredentialRecoveryManager {
    property: PropertyId,
    config: RecoveryConfig,
    credential_config: CredentialConfig,
    probe: Option<Arc<dyn AnalyticsProbe>>,
    tokens: Option<Arc<dyn TokenManager>>,
    clock: Arc<dyn Clock>,

    validation_count: u64,
    last_validation_at: Option<DateTime<Utc>>,
    recovery_attempts: u32,
    last_recovery_attempt_at: Option<DateTime<Utc>>,
}

impl CredentialRecoveryManager {
    pub fn new(
        property: PropertyId,
        config: RecoveryConfig,
        credential_config: CredentialConfig,
        probe: Option<Arc<dyn AnalyticsProbe>>,
        tokens: Option<Arc<dyn TokenManager>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            property,
            config,
            credential_config,
            probe,
            tokens,
            clock,
            validation_count: 0,
            last_validation_at: None,
            recovery_attempts: 0,
            last_recovery_attempt_at: None,
        }
    }

    pub fn property(&self) -> &PropertyId {
        &self.property
    }

    pub fn has_probe(&self) -> bool {
        self.probe.is_some()
    }

    pub fn has_token_manager(&self) -> bool {
        self.tokens.is_some()
    }

    /// Validate that the credential can currently reach the configured
    /// property. The metadata probe is the only network call on this path.
    pub async fn validate_credentials(&mut self) -> ValidationOutcome {
        let Some(probe) = self.probe.clone() else {
            return ValidationOutcome::invalid(
                ErrorKind::CredentialsInvalid,
                "analytics client not initialized",
                true,
            )
            .with_recovery_action("initialize the analytics client");
        };

        if let Some(tokens) = self.tokens.clone() {
            let health = tokens.credential_health().await;
            if !health.healthy {
                let recovered = tokens
                    .detect_and_recover_from_expiration()
                    .await
                    .unwrap_or(false);
                if !recovered {
                    let detail = health
                        .detail
                        .unwrap_or_else(|| "token manager reports unhealthy".to_string());
                    return ValidationOutcome::invalid(ErrorKind::CredentialsInvalid, detail, true)
                        .with_recovery_action("refresh or rotate the access token");
                }
                tracing::info!(property = %self.property, "token refreshed during validation");
            }
        }

        if let Err(probe_err) = probe.fetch_metadata(&self.property).await {
            return self.classify_probe_failure(probe_err);
        }

        // Local quota accounting runs as its own gate after the probe.
        // TODO: feed real usage numbers once report handlers record token counts.
        if self.quota_status() == QuotaStatus::Exceeded {
            let horizon = quota_reset_horizon_ms(self.clock.now_utc(), self.config.quota_reset_hour);
            return ValidationOutcome::invalid(
                ErrorKind::QuotaExceeded,
                "local usage quota exhausted",
                true,
            )
            .with_retry_after_ms(horizon);
        }

        self.validation_count += 1;
        self.last_validation_at = Some(self.clock.now_utc());
        tracing::debug!(
            property = %self.property,
            validation_count = self.validation_count,
            "credentials validated",
        );
        ValidationOutcome::valid()
    }

    fn classify_probe_failure(&self, err: ProbeError) -> ValidationOutcome {
        match err {
            ProbeError::NotFound(detail) => ValidationOutcome::invalid(
                ErrorKind::PermissionDenied,
                format!("property {} not found: {detail}", self.property),
                false,
            )
            .with_recovery_action("verify the configured property id"),
            ProbeError::AccessDenied(detail) => ValidationOutcome::invalid(
                ErrorKind::PermissionDenied,
                format!("access denied: {detail}"),
                false,
            )
            .with_recovery_action("grant the service account access to the property"),
            ProbeError::QuotaExhausted(detail) => {
                let horizon =
                    quota_reset_horizon_ms(self.clock.now_utc(), self.config.quota_reset_hour);
                ValidationOutcome::invalid(
                    ErrorKind::QuotaExceeded,
                    format!("quota exhausted: {detail}"),
                    true,
                )
                .with_retry_after_ms(horizon)
            }
            ProbeError::Network(detail) => ValidationOutcome::invalid(
                ErrorKind::NetworkError,
                format!("network failure: {detail}"),
                true,
            ),
            ProbeError::Other(detail) => {
                let kind = categorize_error(&detail);
                let can_recover = kind != ErrorKind::PermissionDenied;
                let outcome = ValidationOutcome::invalid(kind, detail, can_recover);
                if kind == ErrorKind::QuotaExceeded {
                    let horizon =
                        quota_reset_horizon_ms(self.clock.now_utc(), self.config.quota_reset_hour);
                    outcome.with_retry_after_ms(horizon)
                } else {
                    outcome
                }
            }
        }
    }

    fn quota_status(&self) -> QuotaStatus {
        QuotaStatus::Ok
    }

    /// Execute one bounded recovery attempt for a failed validation.
    ///
    /// Rejected while the cooldown is running (retry hint carries the
    /// remaining wait) and once the attempt ceiling is reached (terminal
    /// until [`reset_recovery_state`](Self::reset_recovery_state)).
    pub async fn attempt_recovery(&mut self, failure: &ValidationOutcome) -> RecoveryOutcome {
        let now = self.clock.now_utc();

        // Check-then-increment with no suspension point in between.
        if let Some(last) = self.last_recovery_attempt_at {
            let cooldown = ChronoDuration::from_std(self.config.cooldown)
                .unwrap_or_else(|_| ChronoDuration::seconds(30));
            let since = now - last;
            if since < cooldown {
                let remaining = (cooldown - since).num_milliseconds().max(0) as u64;
                return RecoveryOutcome::failed(
                    "cooldown",
                    format!("recovery attempted {}s ago; wait {remaining}ms", since.num_seconds()),
                    true,
                    Some(remaining),
                );
            }
        }

        if self.recovery_attempts >= self.config.max_attempts {
            return RecoveryOutcome::failed(
                "attempts_exhausted",
                format!(
                    "{} recovery attempts used; reset required before retrying",
                    self.recovery_attempts
                ),
                false,
                None,
            );
        }

        self.recovery_attempts += 1;
        self.last_recovery_attempt_at = Some(now);

        let kind = failure.error_kind.unwrap_or(ErrorKind::Unknown);
        tracing::info!(
            property = %self.property,
            attempt = self.recovery_attempts,
            kind = ?kind,
            "attempting credential recovery",
        );

        match self.dispatch_recovery(kind, now).await {
            Ok(outcome) => {
                if outcome.success {
                    tracing::info!(
                        property = %self.property,
                        action = %outcome.recovery_action,
                        "credential recovery succeeded",
                    );
                }
                outcome
            }
            Err(err) => {
                tracing::error!(property = %self.property, "recovery attempt errored: {err}");
                let attempts_remain = self.recovery_attempts < self.config.max_attempts;
                RecoveryOutcome::failed("error", err.to_string(), attempts_remain, None)
            }
        }
    }

    async fn dispatch_recovery(
        &self,
        kind: ErrorKind,
        now: DateTime<Utc>,
    ) -> Result<RecoveryOutcome> {
        let attempts_remain = self.recovery_attempts < self.config.max_attempts;

        Ok(match kind {
            ErrorKind::CredentialsInvalid => {
                let Some(tokens) = &self.tokens else {
                    return Ok(RecoveryOutcome::failed(
                        "manual_intervention",
                        "no token manager configured; provision credentials manually",
                        false,
                        None,
                    ));
                };
                match tokens.refresh_token().await {
                    Ok(()) => RecoveryOutcome::recovered("token_refresh"),
                    Err(refresh_err) => match tokens.handle_credential_rotation().await {
                        Ok(()) => RecoveryOutcome::recovered("credential_rotation"),
                        Err(rotate_err) => RecoveryOutcome::failed(
                            "credential_rotation",
                            format!(
                                "refresh failed ({refresh_err}); rotation failed ({rotate_err})"
                            ),
                            attempts_remain,
                            None,
                        ),
                    },
                }
            }
            ErrorKind::PermissionDenied => RecoveryOutcome::failed(
                "manual_intervention",
                "permission denied is not auto-recoverable; grant the service account access",
                false,
                None,
            ),
            ErrorKind::NetworkError => {
                tokio::time::sleep(BRIEF_NETWORK_DELAY).await;
                RecoveryOutcome::failed(
                    "await_network_recovery",
                    "transient network failure; retry after backoff",
                    true,
                    Some(self.config.network_retry_backoff.as_millis() as u64),
                )
            }
            ErrorKind::QuotaExceeded => RecoveryOutcome::failed(
                "await_quota_reset",
                "quota exhausted until the next daily reset",
                true,
                Some(quota_reset_horizon_ms(now, self.config.quota_reset_hour)),
            ),
            ErrorKind::Unknown => {
                if let Some(tokens) = &self.tokens {
                    if tokens.refresh_token().await.is_ok() {
                        return Ok(RecoveryOutcome::recovered("generic_refresh"));
                    }
                }
                RecoveryOutcome::failed(
                    "generic_backoff",
                    "no targeted recovery for this failure; backing off",
                    true,
                    Some(self.config.generic_retry_backoff.as_millis() as u64),
                )
            }
        })
    }

    /// Clear the attempt counter and cooldown marker. Called by operators or
    /// after an unrelated validation succeeds.
    pub fn reset_recovery_state(&mut self) {
        if self.recovery_attempts > 0 {
            tracing::info!(
                property = %self.property,
                cleared_attempts = self.recovery_attempts,
                "recovery state reset",
            );
        }
        self.recovery_attempts = 0;
        self.last_recovery_attempt_at = None;
    }

    pub fn recovery_attempts(&self) -> u32 {
        self.recovery_attempts
    }

    pub fn validation_count(&self) -> u64 {
        self.validation_count
    }

    /// Side-effect-free snapshot of the credential state. Reuses the
    /// validation probe for a live property-access check but never touches
    /// counters or recovery bookkeeping.
    pub async fn diagnostics(&self) -> CredentialDiagnostics {
        let found = material::discover(&self.credential_config);
        let mut errors = found.problems.clone();

        let property_access = match &self.probe {
            Some(probe) => match probe.fetch_metadata(&self.property).await {
                Ok(()) => true,
                Err(e) => {
                    errors.push(format!("property probe failed: {e}"));
                    false
                }
            },
            None => {
                errors.push("analytics client not initialized".to_string());
                false
            }
        };

        CredentialDiagnostics {
            has_credentials: found.is_present(),
            credential_kind: found.kind,
            property_access,
            // Connectivity is not measured separately from the probe.
            network_connectivity: true,
            quota_status: self.quota_status(),
            last_validation_at: self.last_validation_at,
            validation_count: self.validation_count,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::probe::{
        CredentialHealth, MockAnalyticsProbe, MockTokenManager, ProbeError,
    };
    use crate::types::{BridgeError, ManualClock};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn property() -> PropertyId {
        PropertyId::from_string("123456".to_string()).unwrap()
    }

    fn clock_at_noon() -> Arc<ManualClock> {
        Arc::new(ManualClock::at(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ))
    }

    fn manager(
        probe: Option<Arc<dyn AnalyticsProbe>>,
        tokens: Option<Arc<dyn TokenManager>>,
        clock: Arc<ManualClock>,
    ) -> CredentialRecoveryManager {
        CredentialRecoveryManager::new(
            property(),
            RecoveryConfig::default(),
            CredentialConfig::default(),
            probe,
            tokens,
            clock,
        )
    }

    fn probe_returning(
        result: fn() -> std::result::Result<(), ProbeError>,
    ) -> Arc<dyn AnalyticsProbe> {
        let mut probe = MockAnalyticsProbe::new();
        probe.expect_fetch_metadata().returning(move |_| result());
        Arc::new(probe)
    }

    #[tokio::test]
    async fn test_uninitialized_client_fails_fast() {
        let mut mgr = manager(None, None, clock_at_noon());
        let outcome = mgr.validate_credentials().await;
        assert!(!outcome.is_valid);
        assert_eq!(outcome.error_kind, Some(ErrorKind::CredentialsInvalid));
        assert!(outcome.can_recover);
    }

    #[tokio::test]
    async fn test_not_found_is_terminal_permission_denied() {
        let probe = probe_returning(|| Err(ProbeError::NotFound("404".to_string())));
        let mut mgr = manager(Some(probe), None, clock_at_noon());
        let outcome = mgr.validate_credentials().await;
        assert_eq!(outcome.error_kind, Some(ErrorKind::PermissionDenied));
        assert!(!outcome.can_recover);
    }

    #[tokio::test]
    async fn test_access_denied_is_terminal() {
        let probe = probe_returning(|| Err(ProbeError::AccessDenied("403".to_string())));
        let mut mgr = manager(Some(probe), None, clock_at_noon());
        let outcome = mgr.validate_credentials().await;
        assert_eq!(outcome.error_kind, Some(ErrorKind::PermissionDenied));
        assert!(!outcome.can_recover);
    }

    #[tokio::test]
    async fn test_quota_exhausted_carries_reset_horizon() {
        let probe = probe_returning(|| Err(ProbeError::QuotaExhausted("429".to_string())));
        let mut mgr = manager(Some(probe), None, clock_at_noon());
        let outcome = mgr.validate_credentials().await;
        assert_eq!(outcome.error_kind, Some(ErrorKind::QuotaExceeded));
        assert!(outcome.can_recover);
        let ms = outcome.retry_after_ms.unwrap();
        assert!(ms > 0 && ms < 86_400_000);
        // Noon UTC with a midnight reset: 12 hours remain.
        assert_eq!(ms, 12 * 3600 * 1000);
    }

    #[tokio::test]
    async fn test_network_error_is_recoverable() {
        let probe = probe_returning(|| Err(ProbeError::Network("timed out".to_string())));
        let mut mgr = manager(Some(probe), None, clock_at_noon());
        let outcome = mgr.validate_credentials().await;
        assert_eq!(outcome.error_kind, Some(ErrorKind::NetworkError));
        assert!(outcome.can_recover);
    }

    #[tokio::test]
    async fn test_unclassified_probe_error_uses_keyword_heuristic() {
        let probe = probe_returning(|| Err(ProbeError::Other("stale auth token".to_string())));
        let mut mgr = manager(Some(probe), None, clock_at_noon());
        let outcome = mgr.validate_credentials().await;
        assert_eq!(outcome.error_kind, Some(ErrorKind::CredentialsInvalid));
        assert!(outcome.can_recover);
    }

    #[tokio::test]
    async fn test_successful_validation_updates_counters() {
        let probe = probe_returning(|| Ok(()));
        let clock = clock_at_noon();
        let mut mgr = manager(Some(probe), None, clock.clone());

        assert!(mgr.validate_credentials().await.is_valid);
        assert!(mgr.validate_credentials().await.is_valid);

        let diag = mgr.diagnostics().await;
        assert_eq!(diag.validation_count, 2);
        assert_eq!(diag.last_validation_at, Some(clock.now_utc()));
    }

    #[tokio::test]
    async fn test_unhealthy_token_manager_blocks_validation() {
        let probe = probe_returning(|| Ok(()));
        let mut tokens = MockTokenManager::new();
        tokens.expect_credential_health().returning(|| CredentialHealth {
            healthy: false,
            detail: Some("token expired".to_string()),
            expires_at: None,
        });
        tokens
            .expect_detect_and_recover_from_expiration()
            .returning(|| Ok(false));

        let mut mgr = manager(Some(probe), Some(Arc::new(tokens)), clock_at_noon());
        let outcome = mgr.validate_credentials().await;
        assert!(!outcome.is_valid);
        assert_eq!(outcome.error_kind, Some(ErrorKind::CredentialsInvalid));
        assert!(outcome.can_recover);
    }

    #[tokio::test]
    async fn test_token_self_recovery_lets_validation_proceed() {
        let probe = probe_returning(|| Ok(()));
        let mut tokens = MockTokenManager::new();
        tokens.expect_credential_health().returning(|| CredentialHealth {
            healthy: false,
            detail: None,
            expires_at: None,
        });
        tokens
            .expect_detect_and_recover_from_expiration()
            .returning(|| Ok(true));

        let mut mgr = manager(Some(probe), Some(Arc::new(tokens)), clock_at_noon());
        assert!(mgr.validate_credentials().await.is_valid);
    }

    #[tokio::test]
    async fn test_cooldown_rejects_back_to_back_attempts() {
        let clock = clock_at_noon();
        let mut mgr = manager(None, None, clock.clone());
        let failure = ValidationOutcome::invalid(ErrorKind::PermissionDenied, "denied", false);

        let first = mgr.attempt_recovery(&failure).await;
        assert!(!first.success);
        assert_eq!(mgr.recovery_attempts(), 1);

        // Cooldown applies regardless of error kind.
        let quota_failure = ValidationOutcome::invalid(ErrorKind::QuotaExceeded, "quota", true);
        let second = mgr.attempt_recovery(&quota_failure).await;
        assert!(!second.success);
        assert_eq!(second.recovery_action, "cooldown");
        assert!(second.should_retry);
        let remaining = second.retry_after_ms.unwrap();
        assert!(remaining > 0 && remaining <= 30_000);
        assert_eq!(mgr.recovery_attempts(), 1); // counter untouched by a rejected call
    }

    #[tokio::test]
    async fn test_attempt_ceiling_is_terminal_until_reset() {
        let clock = clock_at_noon();
        let mut mgr = manager(None, None, clock.clone());
        let failure = ValidationOutcome::invalid(ErrorKind::PermissionDenied, "denied", false);

        for _ in 0..3 {
            mgr.attempt_recovery(&failure).await;
            clock.advance(ChronoDuration::seconds(31));
        }
        assert_eq!(mgr.recovery_attempts(), 3);

        let exhausted = mgr.attempt_recovery(&failure).await;
        assert!(!exhausted.success);
        assert!(!exhausted.should_retry);
        assert_eq!(exhausted.recovery_action, "attempts_exhausted");

        mgr.reset_recovery_state();
        assert_eq!(mgr.recovery_attempts(), 0);
        let after_reset = mgr.attempt_recovery(&failure).await;
        assert_eq!(after_reset.recovery_action, "manual_intervention");
        assert_eq!(mgr.recovery_attempts(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_never_retries() {
        let mut mgr = manager(None, None, clock_at_noon());
        let failure = ValidationOutcome::invalid(ErrorKind::PermissionDenied, "denied", false);
        let outcome = mgr.attempt_recovery(&failure).await;
        assert!(!outcome.success);
        assert!(!outcome.should_retry);
        assert_eq!(outcome.recovery_action, "manual_intervention");
    }

    #[tokio::test]
    async fn test_credentials_invalid_recovers_via_refresh() {
        let mut tokens = MockTokenManager::new();
        tokens.expect_refresh_token().returning(|| Ok(()));

        let mut mgr = manager(None, Some(Arc::new(tokens)), clock_at_noon());
        let failure = ValidationOutcome::invalid(ErrorKind::CredentialsInvalid, "stale", true);
        let outcome = mgr.attempt_recovery(&failure).await;
        assert!(outcome.success);
        assert_eq!(outcome.recovery_action, "token_refresh");
        assert!(!outcome.should_retry);
    }

    #[tokio::test]
    async fn test_credentials_invalid_falls_back_to_rotation() {
        let mut tokens = MockTokenManager::new();
        tokens
            .expect_refresh_token()
            .returning(|| Err(BridgeError::token_expired("refresh rejected")));
        tokens.expect_handle_credential_rotation().returning(|| Ok(()));

        let mut mgr = manager(None, Some(Arc::new(tokens)), clock_at_noon());
        let failure = ValidationOutcome::invalid(ErrorKind::CredentialsInvalid, "stale", true);
        let outcome = mgr.attempt_recovery(&failure).await;
        assert!(outcome.success);
        assert_eq!(outcome.recovery_action, "credential_rotation");
    }

    #[tokio::test]
    async fn test_credentials_invalid_both_strategies_fail() {
        let mut tokens = MockTokenManager::new();
        tokens
            .expect_refresh_token()
            .returning(|| Err(BridgeError::token_expired("refresh rejected")));
        tokens
            .expect_handle_credential_rotation()
            .returning(|| Err(BridgeError::credentials_invalid("no spare key")));

        let mut mgr = manager(None, Some(Arc::new(tokens)), clock_at_noon());
        let failure = ValidationOutcome::invalid(ErrorKind::CredentialsInvalid, "stale", true);
        let outcome = mgr.attempt_recovery(&failure).await;
        assert!(!outcome.success);
        assert!(outcome.should_retry); // attempts remain
        assert!(outcome.error.unwrap().contains("rotation failed"));
    }

    #[tokio::test]
    async fn test_network_recovery_is_a_retry_hint() {
        let mut mgr = manager(None, None, clock_at_noon());
        let failure = ValidationOutcome::invalid(ErrorKind::NetworkError, "timeout", true);
        let outcome = mgr.attempt_recovery(&failure).await;
        assert!(!outcome.success);
        assert!(outcome.should_retry);
        assert_eq!(outcome.retry_after_ms, Some(5_000));
    }

    #[tokio::test]
    async fn test_quota_recovery_waits_for_reset() {
        let mut mgr = manager(None, None, clock_at_noon());
        let failure = ValidationOutcome::invalid(ErrorKind::QuotaExceeded, "quota", true);
        let outcome = mgr.attempt_recovery(&failure).await;
        assert!(!outcome.success);
        assert!(outcome.should_retry);
        assert_eq!(outcome.retry_after_ms, Some(12 * 3600 * 1000));
    }

    #[tokio::test]
    async fn test_unknown_kind_generic_backoff() {
        let mut mgr = manager(None, None, clock_at_noon());
        let failure = ValidationOutcome::invalid(ErrorKind::Unknown, "???", true);
        let outcome = mgr.attempt_recovery(&failure).await;
        assert!(!outcome.success);
        assert!(outcome.should_retry);
        assert_eq!(outcome.retry_after_ms, Some(10_000));
    }

    #[tokio::test]
    async fn test_horizon_decreases_as_time_advances() {
        let clock = clock_at_noon();
        let first = quota_reset_horizon_ms(clock.now_utc(), 0);
        clock.advance(ChronoDuration::minutes(10));
        let second = quota_reset_horizon_ms(clock.now_utc(), 0);
        assert!(second < first);
        assert_eq!(first - second, 10 * 60 * 1000);
    }

    #[tokio::test]
    async fn test_diagnostics_without_probe() {
        let mgr = manager(None, None, clock_at_noon());
        let diag = mgr.diagnostics().await;
        assert!(!diag.has_credentials);
        assert_eq!(diag.credential_kind, CredentialKind::None);
        assert!(!diag.property_access);
        assert!(diag.errors.iter().any(|e| e.contains("not initialized")));
    }

    #[tokio::test]
    async fn test_diagnostics_is_idempotent_and_side_effect_free() {
        let probe = probe_returning(|| Ok(()));
        let mgr = manager(Some(probe), None, clock_at_noon());

        let first = mgr.diagnostics().await;
        let second = mgr.diagnostics().await;
        assert_eq!(first.credential_kind, second.credential_kind);
        assert_eq!(first.has_credentials, second.has_credentials);
        assert_eq!(second.validation_count, 0); // probing left counters alone
    }

    #[test]
    fn test_categorize_error_families() {
        assert_eq!(categorize_error("invalid auth token"), ErrorKind::CredentialsInvalid);
        assert_eq!(categorize_error("CREDENTIAL rejected"), ErrorKind::CredentialsInvalid);
        assert_eq!(categorize_error("permission missing"), ErrorKind::PermissionDenied);
        assert_eq!(categorize_error("403 Forbidden"), ErrorKind::PermissionDenied);
        assert_eq!(categorize_error("connection reset by peer"), ErrorKind::NetworkError);
        assert_eq!(categorize_error("deadline timeout"), ErrorKind::NetworkError);
        assert_eq!(categorize_error("rate limit hit"), ErrorKind::QuotaExceeded);
        assert_eq!(categorize_error("something odd"), ErrorKind::Unknown);
        // Credential family wins when several families match.
        assert_eq!(categorize_error("access token expired"), ErrorKind::CredentialsInvalid);
    }

    proptest! {
        #[test]
        fn prop_quota_horizon_in_bounds(
            secs_offset in 0i64..86_400,
            reset_hour in 0u32..24,
        ) {
            let base = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
            let now = base + ChronoDuration::seconds(secs_offset);
            let ms = quota_reset_horizon_ms(now, reset_hour);
            prop_assert!(ms > 0);
            prop_assert!(ms < 86_400_000);
        }
    }
}
