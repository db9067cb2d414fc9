//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static INIT: Once = Once::new();

/// Install the stderr subscriber.
///
/// Reads `SYNTHPOP_LOG` (e.g. `SYNTHPOP_LOG=synthpop::sample=trace`); falls back
/// to `synthpop=info`, or `synthpop=debug` with `verbose`. Idempotent.
pub fn init(verbose: bool) {
    INIT.call_once(|| {
        let default = if verbose { "synthpop=debug" } else { "synthpop=info" };
        let filter = EnvFilter::try_from_env("SYNTHPOP_LOG").unwrap_or_else(|_| EnvFilter::new(default));

        // `try_init` so an embedding test harness that already set a subscriber is left alone.
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(filter)
            .try_init();
    });
}
