//! # HTTP API
//!
//! Builds the axum router that exposes the node's authorization interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path               | Description                                 |
//! |--------|--------------------|---------------------------------------------|
//! | GET    | `/health`          | Liveness probe                              |
//! | GET    | `/status`          | Version, network, context, counters         |
//! | POST   | `/identities`      | Register a passkey (COSE key or hex x/y)    |
//! | GET    | `/identities/:id`  | Registration state, nonce, key, balance     |
//! | POST   | `/challenges`      | Challenge to sign for an operation          |
//! | POST   | `/authorize`       | Verify an assertion, consume nonce, relay   |
//! | POST   | `/faucet`          | Devnet-only deposit                         |
//!
//! Failures carry only [`AuthError::public_class`] in the body. The precise
//! reason goes to the log and the `rejections_total` metric.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use passgate_protocol::config::NETWORK_DEVNET;
use passgate_protocol::crypto::PublicKey;
use passgate_protocol::{
    Assertion, AuthError, AuthorizationLedger, AuthorizationRequest, AuthorizationService,
    IdentityId, IdentityRecord, LocalExecutor, Operation, SubmissionOutcome,
};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub ledger: Arc<AuthorizationLedger>,
    pub service: AuthorizationService,
    /// Balance queries and the devnet faucet.
    pub executor: LocalExecutor,
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Wires ledger, local executor and service together over one database.
    pub fn new(version: String, ledger: AuthorizationLedger, metrics: SharedMetrics) -> Self {
        let ledger = Arc::new(ledger);
        let executor = LocalExecutor::new(ledger.db().clone());
        let service = AuthorizationService::new(Arc::clone(&ledger), Arc::new(executor.clone()));
        metrics.identities.set(ledger.identity_count() as i64);
        Self {
            version,
            ledger,
            service,
            executor,
            metrics,
        }
    }

    fn faucet_enabled(&self) -> bool {
        self.ledger.policy().network == NETWORK_DEVNET
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/identities", post(register_handler))
        .route("/identities/:id", get(identity_handler))
        .route("/challenges", post(challenge_handler))
        .route("/authorize", post(authorize_handler))
        .route("/faucet", post(faucet_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

/// Body of `POST /identities`. Exactly one key encoding must be present.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub identity: String,
    /// COSE_Key (or SEC1 point), unpadded base64url.
    #[serde(default)]
    pub cose_key: Option<String>,
    /// Affine x, hex.
    #[serde(default)]
    pub x: Option<String>,
    /// Affine y, hex.
    #[serde(default)]
    pub y: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub identity: String,
    pub operation: Operation,
}

/// Body of `POST /authorize`.
#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub identity: String,
    pub operation: Operation,
    pub assertion: Assertion,
    /// Nonce the client signed against. Stale values are refused before any
    /// signature work happens.
    #[serde(default, alias = "expected_nonce")]
    pub nonce: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct FaucetRequest {
    pub account: String,
    pub amount: u64,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    /// Context identifier mixed into every challenge.
    pub context: String,
    pub rp_id: Option<String>,
    pub identities: usize,
    pub used_signatures: usize,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for the identity endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct IdentityResponse {
    pub identity: String,
    pub registered: bool,
    pub nonce: Option<u64>,
    pub public_key: Option<PublicKey>,
    pub key_fingerprint: Option<String>,
    pub key_rotations: Option<u32>,
    pub registered_at: Option<String>,
    pub balance: u64,
}

impl IdentityResponse {
    fn new(identity: &IdentityId, record: Option<IdentityRecord>, balance: u64) -> Self {
        match record {
            Some(record) => Self {
                identity: identity.to_string(),
                registered: true,
                nonce: Some(record.nonce),
                key_fingerprint: Some(record.public_key.fingerprint()),
                public_key: Some(record.public_key),
                key_rotations: Some(record.key_rotations),
                registered_at: Some(record.registered_at.to_rfc3339()),
                balance,
            },
            None => Self {
                identity: identity.to_string(),
                registered: false,
                nonce: None,
                public_key: None,
                key_fingerprint: None,
                key_rotations: None,
                registered_at: None,
                balance,
            },
        }
    }
}

/// Response payload for `POST /challenges`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// Unpadded base64url, exactly as it must appear in clientData.
    pub challenge: String,
    pub challenge_hex: String,
    pub nonce: u64,
    pub context: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetResponse {
    pub account: String,
    pub balance: u64,
}

/// Generic error body returned by every endpoint on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Error Mapping
// ---------------------------------------------------------------------------

/// Handler error. Only the public class leaves the process.
#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    BadRequest(&'static str),
    Forbidden(&'static str),
    Internal,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::Auth(err) => {
                let class = err.public_class();
                let status = match class {
                    "invalid_signature" => StatusCode::UNAUTHORIZED,
                    "challenge_mismatch" | "already_registered" => StatusCode::CONFLICT,
                    "identity_not_registered" => StatusCode::NOT_FOUND,
                    "malformed_key" | "invalid_request" => StatusCode::BAD_REQUEST,
                    _ => {
                        tracing::error!(error = %err, "request failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, class)
            }
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        (
            status,
            Json(ErrorResponse {
                error: error.to_string(),
            }),
        )
            .into_response()
    }
}

fn parse_identity(raw: &str) -> Result<IdentityId, ApiError> {
    IdentityId::new(raw).map_err(ApiError::Auth)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — node status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let policy = state.ledger.policy();
    Json(StatusResponse {
        version: state.version.clone(),
        network: policy.network.clone(),
        context: policy.context_identifier(),
        rp_id: policy.rp_id.clone(),
        identities: state.ledger.identity_count(),
        used_signatures: state.ledger.db().used_signature_count(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /identities` — register a passkey for a new identity.
async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = parse_identity(&req.identity)?;

    // Registration commits and flushes sled; keep it off the runtime workers.
    let ledger = Arc::clone(&state.ledger);
    let registering = identity.clone();
    let record = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let record = match (req.cose_key, req.x, req.y) {
            (Some(encoded), None, None) => {
                let bytes = URL_SAFE_NO_PAD.decode(encoded.as_bytes()).map_err(|e| {
                    AuthError::MalformedKey(format!("cose_key is not base64url: {e}"))
                })?;
                ledger.register_encoded(registering, &bytes)?
            }
            (None, Some(x), Some(y)) => {
                let key = PublicKey::from_hex(&x, &y)
                    .map_err(|e| AuthError::MalformedKey(e.to_string()))?;
                ledger.register(registering, key)?
            }
            _ => return Err(ApiError::BadRequest("provide either cose_key or both x and y")),
        };
        Ok(record)
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "registration task failed");
        ApiError::Internal
    })??;

    state.metrics.registrations_total.inc();
    state
        .metrics
        .identities
        .set(state.ledger.identity_count() as i64);

    let balance = state
        .executor
        .balance_of(&identity)
        .map_err(|_| ApiError::Internal)?;
    Ok((
        StatusCode::CREATED,
        Json(IdentityResponse::new(&identity, Some(record), balance)),
    ))
}

/// `GET /identities/:id` — registration state and balance.
///
/// Unregistered identities are not an error: they can still hold a balance
/// as transfer targets.
async fn identity_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = parse_identity(&id)?;
    let balance = state
        .executor
        .balance_of(&identity)
        .map_err(|_| ApiError::Internal)?;
    let record = state.ledger.snapshot(&identity);
    Ok(Json(IdentityResponse::new(&identity, record, balance)))
}

/// `POST /challenges` — the challenge the client must sign right now.
async fn challenge_handler(
    State(state): State<AppState>,
    Json(req): Json<ChallengeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = parse_identity(&req.identity)?;
    let (challenge, nonce) = state.ledger.challenge_for(&identity, &req.operation)?;
    tracing::debug!(%identity, operation = %req.operation.kind(), nonce, "challenge issued");
    Ok(Json(ChallengeResponse {
        challenge: challenge.to_base64url(),
        challenge_hex: challenge.to_hex(),
        nonce,
        context: state.ledger.binder().context().to_string(),
    }))
}

/// `POST /authorize` — verify, consume the nonce, relay.
///
/// A relay failure still answers 200: the operation was authorized and the
/// nonce is gone. The outcome's `execution` field says what happened next.
async fn authorize_handler(
    State(state): State<AppState>,
    Json(req): Json<AuthorizeRequest>,
) -> Result<Json<SubmissionOutcome>, ApiError> {
    let identity = parse_identity(&req.identity)?;
    let request = AuthorizationRequest {
        identity,
        operation: req.operation,
        assertion: req.assertion,
        expected_nonce: req.nonce,
    };

    let started = Instant::now();
    let result = state.service.submit(&request).await;
    state
        .metrics
        .authorization_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(outcome) => {
            state
                .metrics
                .authorizations_total
                .with_label_values(&[request.operation.kind().as_str()])
                .inc();
            if outcome.execution.is_failure() {
                state.metrics.relay_failures_total.inc();
            }
            Ok(Json(outcome))
        }
        Err(err) => {
            state
                .metrics
                .rejections_total
                .with_label_values(&[err.reason()])
                .inc();
            Err(err.into())
        }
    }
}

/// `POST /faucet` — mint into an account. Devnet only.
async fn faucet_handler(
    State(state): State<AppState>,
    Json(req): Json<FaucetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.faucet_enabled() {
        return Err(ApiError::Forbidden("faucet is only available on devnet"));
    }
    let account = parse_identity(&req.account)?;
    let balance = state.executor.deposit(&account, req.amount).map_err(|e| {
        tracing::warn!(%account, error = %e, "faucet deposit failed");
        ApiError::BadRequest("deposit rejected")
    })?;
    Ok(Json(FaucetResponse {
        account: account.to_string(),
        balance,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
