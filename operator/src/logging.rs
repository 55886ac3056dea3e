//! Diagnostics for the operator's remote calls and phase changes.
//!
//! Every API call carries an `instrument` span (method, path, session id,
//! step number), phase changes log at `info`, and retries, failed runs and
//! failed session closes log at `warn`. Events go to stderr so they never mix
//! with the step lines or `--json` report written to stdout.
//!
//! The durable record of a run is its transcript under `.operator/runs/`,
//! which is written regardless of the filter below.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr subscriber.
///
/// The filter comes from `RUST_LOG` and falls back to `warn`, so a normal run
/// only shows retries and failures. Use `RUST_LOG=operator=debug` to see every
/// response status and byte count.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
