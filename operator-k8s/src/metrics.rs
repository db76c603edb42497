#![allow(clippy::expect_used)] // it is safe to unwrap static metrics

use clippy_utilities::NumericCast;
use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::iter::repeat;
use std::ops::Mul;
use tracing::error;

/// Returns a vector of time buckets for a duration histogram.
fn exponential_time_bucket(start: f64, factor: f64, count: usize) -> Vec<f64> {
    repeat(factor)
        .enumerate()
        .take(count)
        .map(|(i, f)| start.mul(f.powi(i.numeric_cast())))
        .collect::<Vec<_>>()
}

lazy_static! {
    pub(crate) static ref REGISTRY: Registry = Registry::new();
    pub(crate) static ref RECONCILE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "horus_operator_reconcile_duration_seconds",
            "Duration of one Backup reconcile pass in seconds",
        )
        .buckets(exponential_time_bucket(0.1, 2.0, 10))
    )
    .expect("failed to create horus_operator_reconcile_duration_seconds histogram");
    pub(crate) static ref RECONCILE_FAILED_COUNT: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "horus_operator_reconcile_failed_count",
            "Number of failed Backup reconcile passes"
        ),
        &["reason"]
    )
    .expect("failed to create horus_operator_reconcile_failed_count counter");
    pub(crate) static ref BACKUP_PASSES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "horus_operator_backup_passes_total",
            "restic backup invocations, partitioned by outcome"
        ),
        &["target_kind", "outcome"]
    )
    .expect("failed to create horus_operator_backup_passes_total counter");
    pub(crate) static ref BACKUP_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "horus_operator_backup_duration_seconds",
            "Duration of a single restic backup invocation, per target kind",
        )
        .buckets(exponential_time_bucket(1.0, 2.0, 10)),
        &["target_kind"]
    )
    .expect("failed to create horus_operator_backup_duration_seconds histogram");
    pub(crate) static ref WORKER_RECONCILE_COUNT: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "horus_operator_worker_deployment_reconciles_total",
            "Worker Deployment apply calls issued by the Worker Pod Manager"
        ),
        &["role"]
    )
    .expect("failed to create horus_operator_worker_deployment_reconciles_total counter");
}

/// init metrics
pub(crate) fn init() {
    REGISTRY
        .register(Box::new(RECONCILE_DURATION.clone()))
        .expect("failed to register horus_operator_reconcile_duration_seconds histogram");
    REGISTRY
        .register(Box::new(RECONCILE_FAILED_COUNT.clone()))
        .expect("failed to register horus_operator_reconcile_failed_count counter");
    REGISTRY
        .register(Box::new(BACKUP_PASSES.clone()))
        .expect("failed to register horus_operator_backup_passes_total counter");
    REGISTRY
        .register(Box::new(BACKUP_DURATION.clone()))
        .expect("failed to register horus_operator_backup_duration_seconds histogram");
    REGISTRY
        .register(Box::new(WORKER_RECONCILE_COUNT.clone()))
        .expect("failed to register horus_operator_worker_deployment_reconciles_total counter");
}

/// metrics handler
#[allow(clippy::unused_async)] // require by axum
pub(crate) async fn metrics() -> String {
    let mut buf = Vec::new();
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    if let Err(err) = encoder.encode(&metric_families, &mut buf) {
        error!("failed to encode custom metrics: {}", err);
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}
