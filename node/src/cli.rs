//! # CLI Interface
//!
//! Defines the command-line argument structure for `passgate-node` using
//! `clap` derive. Supports four subcommands: `run`, `challenge`, `status`,
//! and `version`. Every `run` flag has a `PASSGATE_*` environment fallback.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

use crate::logging::LogFormat;

use passgate_protocol::config::{DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT, NETWORK_DEVNET};

/// PASSGATE authorization node.
///
/// Verifies passkey (WebAuthn, P-256) assertions against challenges bound to
/// a specific operation and nonce, consumes the nonce, and relays the
/// authorized operation. Serves an HTTP API and Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "passgate-node",
    about = "PASSGATE passkey authorization node",
    version,
    propagate_version = true
)]
pub struct PassgateCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Compute the challenge for an operation offline.
    ///
    /// Useful when debugging a client integration: the output must match
    /// what the client put in `clientDataJSON.challenge`.
    Challenge(ChallengeArgs),
    /// Query the status of a running node via its HTTP endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the sled database. Created on first run.
    #[arg(long, short = 'd', env = "PASSGATE_DATA_DIR", default_value = ".passgate")]
    pub data_dir: PathBuf,

    /// Network name. Folded into every challenge; the database is stamped
    /// with it on first open.
    #[arg(long, env = "PASSGATE_NETWORK", default_value = NETWORK_DEVNET)]
    pub network: String,

    /// WebAuthn relying party ID. When set, authenticatorData rpIdHash must
    /// equal SHA-256 of it.
    #[arg(long, env = "PASSGATE_RP_ID")]
    pub rp_id: Option<String>,

    /// Origins accepted in clientData (comma separated). Empty accepts any.
    #[arg(long = "allowed-origin", env = "PASSGATE_ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    /// Require the user-verified flag, not just user presence.
    #[arg(long, env = "PASSGATE_REQUIRE_UV")]
    pub require_user_verification: bool,

    /// Port for the HTTP API.
    #[arg(long, env = "PASSGATE_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "PASSGATE_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Level for passgate's own log targets. `RUST_LOG` overrides it.
    #[arg(long, env = "PASSGATE_LOG_LEVEL", default_value = "info")]
    pub log_level: Level,

    /// Log output format.
    #[arg(long, value_enum, env = "PASSGATE_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Arguments for the `challenge` subcommand.
#[derive(Parser, Debug)]
pub struct ChallengeArgs {
    #[arg(long, default_value = NETWORK_DEVNET)]
    pub network: String,

    /// Identity the operation is authorized for.
    #[arg(long)]
    pub identity: String,

    /// Operation as JSON, e.g. `{"type":"transfer","target":"bob","amount":100}`.
    #[arg(long)]
    pub operation: String,

    /// The identity's current nonce.
    #[arg(long, default_value_t = 0)]
    pub nonce: u64,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// HTTP endpoint of the running node.
    #[arg(long, default_value = "http://127.0.0.1:9841")]
    pub rpc_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        PassgateCli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = PassgateCli::try_parse_from(["passgate-node", "run"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.network, "devnet");
                assert_eq!(args.rpc_port, DEFAULT_RPC_PORT);
                assert!(args.rp_id.is_none());
                assert!(!args.require_user_verification);
                assert_eq!(args.log_level, Level::INFO);
                assert_eq!(args.log_format, LogFormat::Pretty);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn origins_split_on_commas() {
        let cli = PassgateCli::try_parse_from([
            "passgate-node",
            "run",
            "--allowed-origin",
            "https://a.example,https://b.example",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(
            args.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn log_flags_parse() {
        let cli = PassgateCli::try_parse_from([
            "passgate-node",
            "run",
            "--log-level",
            "debug",
            "--log-format",
            "json",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.log_level, Level::DEBUG);
        assert_eq!(args.log_format, LogFormat::Json);

        let bad = PassgateCli::try_parse_from(["passgate-node", "run", "--log-format", "yaml"]);
        assert!(bad.is_err());
    }
}
