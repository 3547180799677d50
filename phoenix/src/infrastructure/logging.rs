//! Structured logging setup.
//!
//! Initializes a `tracing-subscriber` `EnvFilter` layer once at process
//! start. Every `ConfigPatch` application/rejection, safe-mode transition,
//! and policy reload emits an event carrying `patch_id`/`target_processor`/
//! `reason` fields so operators can correlate a decision across the
//! governor, the metrics endpoint, and the decision trace.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Installs the global tracing subscriber. `RUST_LOG` (or `PHX_LOG_LEVEL`
/// as a fallback default) controls verbosity.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .expect("default log filter is always valid");

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("global tracing subscriber already set");
    }
}
