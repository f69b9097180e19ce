// Path: crates/sim-telemetry/src/metrics.rs
//! Prometheus metrics for the Sim, registered once via `OnceCell` and read
//! back by `sim-rpc`'s `/metrics` handler.

use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};

static RPC_REQUESTS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static RPC_REQUEST_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static SUBMISSION_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static CONSENSUS_ROTATIONS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

/// Helper to pull an initialized metric. Panics if `install()` was not
/// called, which indicates a startup-ordering bug, not a runtime condition.
macro_rules! get_metric {
    ($metric:ident) => {
        $metric
            .get()
            .expect("sim-telemetry metrics not initialized; call install() first")
    };
}

#[derive(Debug, Clone, Copy)]
pub struct Metrics;

impl Metrics {
    /// Records one JSON-RPC request, labeled by method and outcome.
    pub fn inc_rpc_request(&self, method: &str, status: &str) {
        get_metric!(RPC_REQUESTS_TOTAL)
            .with_label_values(&[method, status])
            .inc();
    }

    /// Observes end-to-end handler latency for one JSON-RPC method.
    pub fn observe_rpc_latency(&self, method: &str, duration_secs: f64) {
        get_metric!(RPC_REQUEST_DURATION_SECONDS)
            .with_label_values(&[method])
            .observe(duration_secs);
    }

    /// Observes the latency of a full consensus submission (`sim_call`/`sim_deploy`
    /// and their `eth_*` equivalents), from dispatch to finalized/undetermined.
    pub fn observe_submission_latency(&self, kind: &str, duration_secs: f64) {
        get_metric!(SUBMISSION_DURATION_SECONDS)
            .with_label_values(&[kind])
            .observe(duration_secs);
    }

    /// Increments the rotation counter for a consensus run, labeled by outcome
    /// (`finalized`/`undetermined`).
    pub fn inc_consensus_rotation(&self, outcome: &str) {
        get_metric!(CONSENSUS_ROTATIONS_TOTAL)
            .with_label_values(&[outcome])
            .inc();
    }

    /// Records an error surfaced anywhere in the stack, categorized by crate
    /// kind and the `ErrorCode::code()` string.
    pub fn inc_error(&self, kind: &str, code: &str) {
        get_metric!(ERRORS_TOTAL)
            .with_label_values(&[kind, code])
            .inc();
    }
}

/// Registers all Prometheus collectors. Safe to call more than once in the
/// same process (e.g. from several `#[tokio::test]` functions sharing one
/// test binary): the second and later calls are no-ops that return the
/// already-registered statics rather than re-registering into the global
/// default registry, which would otherwise fail with a duplicate-name error.
pub fn install() -> Result<&'static Metrics, prometheus::Error> {
    static METRICS: Metrics = Metrics;
    if RPC_REQUESTS_TOTAL.get().is_some() {
        return Ok(&METRICS);
    }

    RPC_REQUESTS_TOTAL
        .set(register_int_counter_vec!(
            "sim_rpc_requests_total",
            "Total JSON-RPC requests handled, labeled by method and status.",
            &["method", "status"]
        )?)
        .expect("static already initialized");

    RPC_REQUEST_DURATION_SECONDS
        .set(register_histogram_vec!(
            "sim_rpc_request_duration_seconds",
            "Latency of JSON-RPC requests, labeled by method.",
            &["method"],
            exponential_buckets(0.0005, 2.0, 16)?
        )?)
        .expect("static already initialized");

    SUBMISSION_DURATION_SECONDS
        .set(register_histogram_vec!(
            "sim_submission_duration_seconds",
            "Latency of a full consensus submission, labeled by kind (deploy/call).",
            &["kind"],
            exponential_buckets(0.001, 2.0, 16)?
        )?)
        .expect("static already initialized");

    CONSENSUS_ROTATIONS_TOTAL
        .set(register_int_counter_vec!(
            "sim_consensus_rotations_total",
            "Total consensus runs, labeled by outcome (finalized/undetermined).",
            &["outcome"]
        )?)
        .expect("static already initialized");

    ERRORS_TOTAL
        .set(register_int_counter_vec!(
            "sim_errors_total",
            "Total errors, categorized by originating crate and ErrorCode.",
            &["kind", "code"]
        )?)
        .expect("static already initialized");

    Ok(&METRICS)
}

/// Renders the current metric snapshot in the Prometheus text exposition
/// format, for the `/metrics` route.
pub fn metrics_text() -> Result<String, anyhow::Error> {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
