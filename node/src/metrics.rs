//! # Prometheus Metrics
//!
//! Operational metrics for the authorization node, scraped at `/metrics` on
//! the metrics port. Rejections are labelled with [`AuthError::reason`], the
//! precise internal label that is never returned to API callers.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] with
//! the `passgate` prefix.
//!
//! [`AuthError::reason`]: passgate_protocol::AuthError::reason

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Successful identity registrations.
    pub registrations_total: IntCounter,
    /// Authorized operations, by operation kind.
    pub authorizations_total: IntCounterVec,
    /// Rejected authorization requests, by internal reason.
    pub rejections_total: IntCounterVec,
    /// Authorized operations whose relay failed.
    pub relay_failures_total: IntCounter,
    /// Registered identities.
    pub identities: IntGauge,
    /// Time spent in the authorize + relay path, in seconds.
    pub authorization_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("passgate".into()), None)?;

        let registrations_total = IntCounter::new(
            "registrations_total",
            "Total number of identities registered",
        )?;
        registry.register(Box::new(registrations_total.clone()))?;

        let authorizations_total = IntCounterVec::new(
            Opts::new(
                "authorizations_total",
                "Total number of authorized operations",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(authorizations_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "rejections_total",
                "Total number of rejected authorization requests",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let relay_failures_total = IntCounter::new(
            "relay_failures_total",
            "Authorized operations the relay failed to execute",
        )?;
        registry.register(Box::new(relay_failures_total.clone()))?;

        let identities = IntGauge::new("identities", "Number of registered identities")?;
        registry.register(Box::new(identities.clone()))?;

        let authorization_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "authorization_latency_seconds",
                "Authorize and relay latency in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )?;
        registry.register(Box::new(authorization_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            registrations_total,
            authorizations_total,
            rejections_total,
            relay_failures_total,
            identities,
            authorization_latency_seconds,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_labelled_by_reason() {
        let metrics = NodeMetrics::new().unwrap();
        metrics
            .rejections_total
            .with_label_values(&["challenge_mismatch"])
            .inc();
        metrics.identities.set(3);

        let text = metrics.encode().unwrap();
        assert!(text.contains("passgate_rejections_total{reason=\"challenge_mismatch\"} 1"));
        assert!(text.contains("passgate_identities 3"));
    }
}
