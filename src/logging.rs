//! Structured logging setup.
//!
//! Initializes a `tracing` subscriber that writes to stderr (stdout carries
//! transcription text):
//! - `RUST_LOG` environment filter support
//! - Default level: INFO for this crate, raised by `-v`
//! - JSON output when `RUST_LOG_FORMAT=json`

use tracing_subscriber::EnvFilter;

/// Filter directive for a CLI verbosity level (`-v` count).
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "scribe=info",
        1 => "scribe=debug",
        _ => "scribe=trace",
    }
}

/// Initialize the global tracing subscriber.
///
/// Call once at program startup. Later calls are no-ops.
pub fn init(verbosity: u8, quiet: bool) {
    let fallback = if quiet {
        "scribe=warn"
    } else {
        default_directive(verbosity)
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let is_json = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity >= 2)
        .with_thread_ids(false);

    // try_init fails only when a subscriber is already installed
    if is_json {
        if subscriber.json().try_init().is_err() {
            tracing::debug!("tracing subscriber already installed");
        }
    } else if subscriber.try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
