//! Logging setup.
//!
//! Events are emitted through `tracing` with an `ev` field naming the event,
//! plus `code` and `dur_us` where they apply. With `log_json` the subscriber
//! writes one JSON object per line.

use tracing::Level;
use tracing_subscriber::EnvFilter;

use super::config::AppCfg;

/// Map the numeric config level onto a tracing level.
pub fn level_for(log_level: u8) -> Level {
    match log_level {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the configured level.
///
/// Calling this twice is harmless; the second install is ignored.
pub fn init(cfg: &AppCfg) {
    let level = level_for(cfg.log_level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // Fails only when a subscriber is already installed; keep that one.
    if cfg.log_json {
        builder.json().with_current_span(false).try_init().ok();
    } else {
        builder.with_target(true).try_init().ok();
    }
}
