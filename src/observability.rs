//! Observability utilities.

use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::types::BridgeError;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Initialize tracing subscriber once for the process.
///
/// Log format defaults to plain text and can be switched to JSON via
/// `GA4_BRIDGE_LOG_FORMAT=json`. Filter defaults to `info` if `RUST_LOG` is unset.
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let json = std::env::var("GA4_BRIDGE_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let result = if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact())
                .try_init()
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}

/// Exit code used when the failsafe hook terminates the process (EX_SOFTWARE).
pub const FAILSAFE_EXIT_CODE: i32 = 70;

/// Install the last-resort panic hook.
///
/// The bridge is a stateless sidecar restarted by its supervisor: an
/// unmodeled panic is routed through the error taxonomy, logged, and the
/// process terminates after a short flush delay instead of limping on with
/// unknown state. Only the binary installs this; library tests never do.
pub fn install_failsafe_hook(grace: Duration) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let err = BridgeError::internal(format!("unhandled panic: {info}"))
            .ensure_correlation_id();
        tracing::error!(
            code = %err.code,
            correlation_id = ?err.correlation_id,
            "fatal: {}; terminating after {:?} flush window",
            err.message,
            grace,
        );
        previous(info);
        std::thread::spawn(move || {
            std::thread::sleep(grace);
            std::process::exit(FAILSAFE_EXIT_CODE);
        });
    }));
}
