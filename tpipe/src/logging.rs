//! Diagnostics logging with `tracing` + `tracing-subscriber`.
//!
//! The level comes from the `TPIPE_LOG` environment variable (`error`, `warn`,
//! `info`, `debug`, `trace`) and defaults to `warn`. Events go to stderr:
//! stdout carries the pipeline report and is shared with the last stage.

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::fmt;

pub const LOG_ENV: &str = "TPIPE_LOG";

/// Installs the global subscriber. Call once, before any stage is forked.
pub fn init_logging() -> Result<()> {
	let level = std::env::var(LOG_ENV)
		.ok()
		.and_then(|s| parse_level_str(&s))
		.unwrap_or(Level::WARN);

	fmt()
		.with_max_level(level)
		.with_writer(std::io::stderr)
		.with_target(false)
		.try_init()
		.map_err(|e| anyhow!(e))
}

fn parse_level_str(s: &str) -> Option<Level> {
	match s.trim().to_lowercase().as_str() {
		"error" => Some(Level::ERROR),
		"warn" | "warning" => Some(Level::WARN),
		"info" => Some(Level::INFO),
		"debug" => Some(Level::DEBUG),
		"trace" => Some(Level::TRACE),
		_ => None,
	}
}
