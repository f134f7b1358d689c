//! Structured logging setup
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG`
//! (default: info). The engine itself only emits events through `tracing`
//! macros; embedding services that already install a subscriber can skip
//! this entirely.
//!
//! Configuration via environment variables:
//! - RUST_LOG: Log level filter (default: info)
//! - XP_LOG_FORMAT: `compact` for single-line output without targets

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging for the current process
///
/// Safe to call more than once; later calls (or a subscriber installed by the
/// host application) leave the existing subscriber in place and return `false`.
pub fn init_tracing() -> bool {
    // Configure log filter (RUST_LOG env var or default to info)
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let compact = std::env::var("XP_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("compact"))
        .unwrap_or(false);

    let installed = if compact {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact().with_target(false))
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            "Experimentation engine logging initialized"
        );
    }
    installed
}
