//! Tracing setup for the binary.
//!
//! Logs go to stderr so that `--format json` output on stdout stays machine readable.

use std::io::{self, IsTerminal};

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Environment variable overriding the log level.
pub const LOG_LEVEL_ENV: &str = "BATCH_EMBED_LOG";

/// Pick the filter directive: explicit flag, then env var, then `info` (`debug` when verbose).
pub fn resolve_level(explicit: Option<&str>, verbose: bool) -> String {
    if let Some(level) = explicit {
        return level.to_string();
    }
    if let Ok(level) = std::env::var(LOG_LEVEL_ENV)
        && !level.trim().is_empty()
    {
        return level;
    }
    let level = if verbose { "debug" } else { "info" };
    level.to_string()
}

/// Install the global subscriber. A second call is a no-op.
///
/// `RUST_LOG` still wins over `level` when set.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = if json {
        let json_layer = fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        Registry::default().with(env_filter).with(json_layer).try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_target(false)
            .compact();
        Registry::default().with(env_filter).with(fmt_layer).try_init()
    };

    if result.is_ok() {
        tracing::debug!(level, json, "tracing initialized");
    }
}
