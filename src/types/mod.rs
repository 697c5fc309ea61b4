//! Core types for the bridge.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (PropertyId, CorrelationId)
//! - **Errors**: The closed error taxonomy with thiserror derives
//! - **Config**: Configuration structures for the health server, recovery
//!   policy, probe, and credentials
//! - **Clock**: Injectable time source for cooldown/horizon logic

mod clock;
mod config;
mod errors;
mod ids;

pub use clock::{Clock, SystemClock};
pub use config::{
    Config, CredentialConfig, HealthServerConfig, ObservabilityConfig, ProbeConfig, RecoveryConfig,
};
pub use errors::{BridgeError, ErrorCode, Result};
pub use ids::{CorrelationId, PropertyId};

#[cfg(test)]
pub use clock::ManualClock;
