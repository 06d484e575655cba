//! Structured logging bootstrap.
//!
//! The gateway logs to stdout via `tracing-subscriber`, configured from
//! `RUST_LOG` in the standard convention. There is no export to an external
//! collector.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber. Call once from `main`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .json()
        .init();
}
