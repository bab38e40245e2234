//! Log initialisation: journald plus a stdout/stderr `fmt` layer, composed together rather than
//! picked by tty detection, with `--log-format` choosing the stdout layer's rendering.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// `format` is `"json"` or `"pretty"`; anything else falls back to `"pretty"`.
pub fn init(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let journald = tracing_journald::layer()
        .map_err(|e| eprintln!("journald unavailable, logging to stdout only: {e}"))
        .ok();

    let stdout = if format == "json" {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().compact().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(journald)
        .with(stdout)
        .init();
}
