// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Engine process --------
pub static ENGINE_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("engine_runs_total", "engine invocations by outcome"),
        &["outcome"],
    )
    .unwrap()
});

// Wall time of one engine run incl. staging (milliseconds)
pub static ENGINE_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("engine_run_ms", "engine run duration (ms)")
            .buckets(vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 5_000.0]),
    )
    .unwrap()
});

// -------- Report decoding --------
pub static REPORT_ISSUES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("report_issues_total", "skipped/flagged report lines (label: kind)"),
        &["kind"],
    )
    .unwrap()
});

// -------- Session --------
pub static COMMAND_LOG_LEN: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("command_log_len", "commands replayed per run").unwrap());

pub static ORDERS_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("orders_submitted_total", "orders appended to the log"),
        &["side", "variant"],
    )
    .unwrap()
});

pub static SESSION_RESETS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("session_resets_total", "reset-to-seed calls").unwrap());

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(ENGINE_RUNS.clone())),
        REGISTRY.register(Box::new(ENGINE_LATENCY.clone())),
        REGISTRY.register(Box::new(REPORT_ISSUES.clone())),
        REGISTRY.register(Box::new(COMMAND_LOG_LEN.clone())),
        REGISTRY.register(Box::new(ORDERS_SUBMITTED.clone())),
        REGISTRY.register(Box::new(SESSION_RESETS.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}
