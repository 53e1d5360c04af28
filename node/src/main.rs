// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # PASSGATE Node
//!
//! Entry point for the `passgate-node` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the authorization ledger, and
//! serves the HTTP API.
//!
//! The binary supports four subcommands:
//!
//! - `run`       — start the node
//! - `challenge` — compute a challenge offline
//! - `status`    — query a running node's status endpoint
//! - `version`   — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use passgate_protocol::challenge::bind;
use passgate_protocol::config::{context_identifier, is_known_network, RelyingPartyPolicy};
use passgate_protocol::{AuthorizationLedger, IdentityId, LedgerDb, Operation};

use cli::{Commands, PassgateCli};
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = PassgateCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Challenge(args) => compute_challenge(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: ledger, API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init(args.log_level, args.log_format)?;

    if !is_known_network(&args.network) {
        tracing::warn!(network = %args.network, "running on a custom network name");
    }

    let policy = RelyingPartyPolicy {
        network: args.network.clone(),
        rp_id: args.rp_id.clone(),
        allowed_origins: args.allowed_origins.clone(),
        require_user_verification: args.require_user_verification,
    };
    if policy.rp_id.is_none() || policy.allowed_origins.is_empty() {
        tracing::warn!("rp id or origin allow-list not configured; only challenge binding is enforced");
    }

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        network = %policy.network,
        "starting passgate-node"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = LedgerDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    let ledger = AuthorizationLedger::open(db.clone(), policy)
        .context("failed to open authorization ledger")?;

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Application state ---
    let app_state = api::AppState::new(
        format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            passgate_protocol::config::PROTOCOL_VERSION,
        ),
        ledger,
        Arc::clone(&node_metrics),
    );

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    db.flush().context("failed to flush database")?;
    tracing::info!("passgate-node stopped");
    Ok(())
}

/// Prints the challenge a client must sign for the given operation.
fn compute_challenge(args: cli::ChallengeArgs) -> Result<()> {
    let identity = IdentityId::new(&args.identity)
        .with_context(|| format!("invalid identity: {}", args.identity))?;
    let operation: Operation =
        serde_json::from_str(&args.operation).context("operation is not valid JSON")?;
    operation
        .validate(&identity)
        .context("operation is not authorizable")?;

    let context = context_identifier(&args.network);
    let challenge = bind(&context, &identity, &operation, args.nonce);

    println!("context    : {}", context);
    println!("nonce      : {}", args.nonce);
    println!("challenge  : {}", challenge.to_base64url());
    println!("hex        : {}", challenge.to_hex());
    Ok(())
}

/// Queries a running node's status endpoint and prints the body.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let body = http_get(&args.rpc_url, "/status").await?;
    println!("{}", body);
    Ok(())
}

/// Plain HTTP/1.1 GET over a tokio TCP stream. Enough for `status`; the
/// node itself never makes outbound requests.
async fn http_get(base_url: &str, path: &str) -> Result<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let authority = base_url
        .trim_end_matches('/')
        .strip_prefix("http://")
        .ok_or_else(|| anyhow::anyhow!("only http:// endpoints are supported: {}", base_url))?;
    let host = authority.split(':').next().unwrap_or(authority);

    let mut stream = tokio::net::TcpStream::connect(authority)
        .await
        .with_context(|| format!("failed to connect to {}", authority))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, host,
    );
    stream.write_all(request.as_bytes()).await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_else(|| response.to_string());
    Ok(body)
}

fn print_version() {
    println!("passgate-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol      {}", passgate_protocol::config::PROTOCOL_VERSION);
    println!(
        "challenge     v{}",
        passgate_protocol::config::CHALLENGE_ENCODING_VERSION
    );
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
