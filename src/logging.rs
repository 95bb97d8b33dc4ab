//! Diagnostic logging setup.
//!
//! Diagnostics go to stderr through `tracing`; command results are printed
//! to stdout by the CLI so the two never interleave in a pipe.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. `RUST_LOG` wins when set; otherwise the
/// crate logs at `info`, or `debug` with `verbose`.
///
/// Calling this twice is harmless: the second install is ignored.
pub fn init(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,voltrader={level}")));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
