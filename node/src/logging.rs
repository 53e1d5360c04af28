//! Node logging: a `tracing` subscriber on stderr, filtered per crate.
//!
//! The node's own crates log at the level picked with `--log-level`;
//! HTTP plumbing and sled stay at `warn` unless `RUST_LOG` says otherwise.
//! stdout is left alone for the `challenge` and `status` subcommands.

use anyhow::{anyhow, Result};
use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log line format, selected with `--log-format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

/// Filter directives for a node running at `level`.
pub fn directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    format!("passgate_node={level},passgate_protocol={level},tower_http=warn,sled=warn")
}

/// Installs the global subscriber. `RUST_LOG`, when set, replaces the
/// directives derived from `level`.
pub fn init(level: Level, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(level)));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))?;

    tracing::debug!(?format, %level, "logging initialized");
    Ok(())
}
