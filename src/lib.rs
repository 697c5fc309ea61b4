//! # GA4 Bridge - Credential Lifecycle & Service Health Core
//!
//! Core of the bridge process that keeps an MCP tool surface authenticated
//! against the Google Analytics Data API, providing:
//! - Credential validation and bounded recovery (cooldown + attempt ceiling)
//! - Multi-component health aggregation (auth, API reachability, lifecycle)
//! - A closed error taxonomy used by every subsystem
//! - Declarative validation and sanitization of inbound tool arguments
//! - An HTTP health surface for external monitors
//!
//! ## Architecture
//!
//! All long-lived components are constructed once at process start and passed
//! down explicitly; there is no lazy global construction:
//! ```text
//!   GET /health ──► HealthServer ──► HealthAggregator
//!                                       │        │
//!                                       ▼        ▼
//!                            RecoveryManager   TokenManager / Lifecycle
//!                                       │
//!                                       ▼  (metadata probe)
//!                                Analytics Data API
//!
//!   tool call ──► RequestValidator ──► handler ──► BridgeError on failure
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod credentials;
pub mod health;
pub mod lifecycle;
pub mod metrics;
pub mod types;
pub mod validation;

// Internal utilities
pub mod observability;

pub use types::{BridgeError, Config, ErrorCode, Result};
