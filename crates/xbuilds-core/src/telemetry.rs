//! Tracing setup for the `xbuilds` binary.
//!
//! Log lines go to stderr; stdout carries only the end-of-sweep summary.
//! Filtering reads `XBUILDS_LOG`, then `RUST_LOG`. Without either, the
//! xbuilds crates log at the requested level and everything else at `warn`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "XBUILDS_LOG";

/// Install the global subscriber. Only the first call in a process has an
/// effect.
///
/// `json` switches to one JSON object per line, carrying the sweep span's
/// `sweep_id` on every event.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(filter);
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    if json {
        registry
            .with(layer.json().with_current_span(true).with_span_list(false))
            .try_init()
            .ok();
    } else {
        registry.with(layer.with_ansi(false)).try_init().ok();
    }
}

/// `warn` globally, `level` for the library and the binary.
fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    format!("warn,xbuilds_core={level},xbuilds={level}")
}
