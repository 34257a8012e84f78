//! # Prometheus Metrics
//!
//! Operational metrics for the in-process network, scraped at `/metrics` on
//! the metrics port.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] so they do not
//! collide with any default global registry consumers. Flow metrics carry
//! `node` and `flow` labels.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Prometheus handles shared by every node in the process.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Flows started, by node and flow name.
    pub flows_started_total: IntCounterVec,
    /// Flows that reached `Done`.
    pub flows_completed_total: IntCounterVec,
    /// Flows that ended in `Failed`.
    pub flows_failed_total: IntCounterVec,
    /// Flows currently suspended or running.
    pub flows_in_flight: IntGauge,
    /// Transactions recorded into any vault.
    pub transactions_recorded_total: IntCounter,
    /// Wall-clock duration of finished flows.
    pub flow_duration_seconds: HistogramVec,
}

impl NodeMetrics {
    /// Create and register all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("iou".into()), None)?;

        let flows_started_total = IntCounterVec::new(
            Opts::new("flows_started_total", "Total number of flows started"),
            &["node", "flow"],
        )?;
        registry.register(Box::new(flows_started_total.clone()))?;

        let flows_completed_total = IntCounterVec::new(
            Opts::new("flows_completed_total", "Total number of flows that completed"),
            &["node", "flow"],
        )?;
        registry.register(Box::new(flows_completed_total.clone()))?;

        let flows_failed_total = IntCounterVec::new(
            Opts::new("flows_failed_total", "Total number of flows that failed"),
            &["node", "flow"],
        )?;
        registry.register(Box::new(flows_failed_total.clone()))?;

        let flows_in_flight = IntGauge::new("flows_in_flight", "Number of flows currently running")?;
        registry.register(Box::new(flows_in_flight.clone()))?;

        let transactions_recorded_total = IntCounter::new(
            "transactions_recorded_total",
            "Total number of transactions recorded into node vaults",
        )?;
        registry.register(Box::new(transactions_recorded_total.clone()))?;

        let flow_duration_seconds = HistogramVec::new(
            HistogramOpts::new("flow_duration_seconds", "Flow latency in seconds").buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 30.0,
            ]),
            &["flow"],
        )?;
        registry.register(Box::new(flow_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            flows_started_total,
            flows_completed_total,
            flows_failed_total,
            flows_in_flight,
            transactions_recorded_total,
            flow_duration_seconds,
        })
    }

    pub fn flow_started(&self, node: &str, flow: &str) {
        self.flows_started_total.with_label_values(&[node, flow]).inc();
        self.flows_in_flight.inc();
    }

    pub fn flow_finished(&self, node: &str, flow: &str, ok: bool, elapsed: Duration) {
        let counter = if ok {
            &self.flows_completed_total
        } else {
            &self.flows_failed_total
        };
        counter.with_label_values(&[node, flow]).inc();
        self.flows_in_flight.dec();
        self.flow_duration_seconds
            .with_label_values(&[flow])
            .observe(elapsed.as_secs_f64());
    }

    /// Encode all registered metrics in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
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
