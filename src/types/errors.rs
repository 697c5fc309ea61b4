//! Application error taxonomy.
//!
//! A closed, flat set of error codes shared by every subsystem. Validation and
//! recovery failures are returned as values; `BridgeError` is reserved for
//! genuinely exceptional paths and for the wire-facing error shape. All errors
//! use `thiserror` for automatic Error trait derivation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use super::ids::CorrelationId;

/// Application result type.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Closed set of error codes. Every failure surfaced by the bridge carries
/// exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InternalError,
    InitializationFailed,
    ShutdownError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    AuthFailed,
    CredentialsInvalid,
    TokenExpired,
    ExternalApiError,
    ExternalAccessDenied,
    ExternalQuotaExceeded,
    ToolExecutionFailed,
    InvalidToolParams,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::InitializationFailed => "INITIALIZATION_FAILED",
            ErrorCode::ShutdownError => "SHUTDOWN_ERROR",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::MethodNotFound => "METHOD_NOT_FOUND",
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::AuthFailed => "AUTH_FAILED",
            ErrorCode::CredentialsInvalid => "CREDENTIALS_INVALID",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::ExternalApiError => "EXTERNAL_API_ERROR",
            ErrorCode::ExternalAccessDenied => "EXTERNAL_ACCESS_DENIED",
            ErrorCode::ExternalQuotaExceeded => "EXTERNAL_QUOTA_EXCEEDED",
            ErrorCode::ToolExecutionFailed => "TOOL_EXECUTION_FAILED",
            ErrorCode::InvalidToolParams => "INVALID_TOOL_PARAMS",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform error value: code, human-readable message, optional structured
/// details, optional cause description, and a correlation id filled in at
/// normalization time.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct BridgeError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
}

impl BridgeError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            cause: None,
            correlation_id: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Fill the correlation id if the error does not carry one yet.
    pub fn ensure_correlation_id(mut self) -> Self {
        if self.correlation_id.is_none() {
            self.correlation_id = Some(CorrelationId::new());
        }
        self
    }

    /// Normalize an arbitrary error into the taxonomy.
    ///
    /// A `BridgeError` passes through untouched apart from correlation-id
    /// fill-in. Anything else is wrapped as `InternalError`, keeping the
    /// source chain as `cause`, and logged here so call sites don't have to.
    pub fn normalize(err: Box<dyn std::error::Error + Send + Sync>) -> BridgeError {
        match err.downcast::<BridgeError>() {
            Ok(bridge) => bridge.ensure_correlation_id(),
            Err(other) => {
                let cause = other.source().map(|s| s.to_string());
                let normalized = BridgeError::internal(other.to_string());
                let normalized = match cause {
                    Some(c) => normalized.with_cause(c),
                    None => normalized,
                }
                .ensure_correlation_id();
                tracing::error!(
                    code = %normalized.code,
                    correlation_id = ?normalized.correlation_id,
                    "unexpected error normalized: {}",
                    normalized.message,
                );
                normalized
            }
        }
    }

    /// Normalize a raw (non-error) value, e.g. a rejected JSON payload.
    pub fn from_raw(value: Value) -> BridgeError {
        let normalized = BridgeError::internal("unexpected non-error failure value")
            .with_details(value)
            .ensure_correlation_id();
        tracing::error!(
            code = %normalized.code,
            correlation_id = ?normalized.correlation_id,
            "raw failure value normalized",
        );
        normalized
    }
}

// Convenience constructors
impl BridgeError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, msg)
    }

    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InitializationFailed, msg)
    }

    pub fn shutdown(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ShutdownError, msg)
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, msg)
    }

    pub fn method_not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::MethodNotFound, msg)
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, msg)
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthFailed, msg)
    }

    pub fn credentials_invalid(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::CredentialsInvalid, msg)
    }

    pub fn token_expired(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::TokenExpired, msg)
    }

    pub fn external_api(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalApiError, msg)
    }

    pub fn external_access_denied(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalAccessDenied, msg)
    }

    pub fn external_quota_exceeded(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalQuotaExceeded, msg)
    }

    pub fn tool_execution_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ToolExecutionFailed, msg)
    }

    pub fn invalid_tool_params(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToolParams, msg)
    }
}
