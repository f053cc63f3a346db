//! Tracing subscriber setup.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber. `RUST_LOG` wins when set; otherwise the
/// level is `info`, or `debug` for this crate when `debug` is on. Later calls
/// are no-ops, so a host that installed its own subscriber keeps it.
pub fn init(debug: bool) {
    let default_filter = if debug {
        "info,deathcompass=debug"
    } else {
        "info"
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}
