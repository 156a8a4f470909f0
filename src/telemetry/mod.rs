//! Logging setup.
//!
//! The library itself only emits through the `log` facade and `tracing`
//! spans; installing a subscriber is left to binaries and tests. The
//! subscriber installed here also captures `log` records.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,dcop_actors=debug";

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`.
///
/// Returns `false` if a global subscriber was already installed, which makes
/// repeated calls (one per test, say) harmless.
pub fn init_logging(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok()
}
