// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the control plane operator.
//!
//! Every metric carries the prefix `ctlplane_openstack_org` and is registered
//! in [`METRICS_REGISTRY`], which the HTTP server exposes on `/metrics`.
//!
//! # Metrics Categories
//!
//! - **Reconciliation** - Outcome, duration and requeues per resource kind
//! - **Steps** - Outcome of each orchestration step
//! - **Child Resources** - Creates, updates, recreations and deletions
//! - **Admission** - Webhook decisions
//! - **Leader Election** - Leadership changes of this replica
//!
//! # Example
//!
//! ```rust,no_run
//! use ctlplane::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("OpenStackControlPlane", std::time::Duration::from_secs(1));
//! ```

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all operator metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "ctlplane_openstack_org";

/// Reconcile duration buckets, in seconds
const DURATION_BUCKETS: [f64; 10] = [0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0];

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Metric names and label sets are static, so construction and registration
// only fail on a programming error.
fn counter_vec(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let counter = CounterVec::new(Opts::new(format!("{METRICS_NAMESPACE}_{name}"), help), labels)
        .expect("valid counter definition");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("counter registered once");
    counter
}

fn gauge_vec(name: &str, help: &str, labels: &[&str]) -> GaugeVec {
    let gauge = GaugeVec::new(Opts::new(format!("{METRICS_NAMESPACE}_{name}"), help), labels)
        .expect("valid gauge definition");
    METRICS_REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("gauge registered once");
    gauge
}

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Reconciliations by `resource_type` and `status` (`success`, `error`, `requeue`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "reconciliations_total",
        "Total number of reconciliations by resource type and status",
        &["resource_type", "status"],
    )
});

/// Reconcile duration in seconds by `resource_type`
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by resource type",
    )
    .buckets(DURATION_BUCKETS.to_vec());
    let histogram =
        HistogramVec::new(opts, &["resource_type"]).expect("valid histogram definition");
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("histogram registered once");
    histogram
});

/// Requeues by `resource_type` and `reason` (`error`, `progressing`, `dependency_wait`, `ready`)
pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "requeues_total",
        "Total number of requeue operations by resource type and reason",
        &["resource_type", "reason"],
    )
});

/// Step evaluations by `step` and `outcome`
/// (`ready`, `progressing`, `waiting`, `disabled`, `blocked`, `error`)
pub static STEP_OUTCOMES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "step_outcomes_total",
        "Total number of orchestration step evaluations by step and outcome",
        &["step", "outcome"],
    )
});

// ============================================================================
// Child Resource Metrics
// ============================================================================

/// Writes to child resources by `resource_type` and `operation`
/// (`created`, `updated`, `recreated`, `deleted`)
pub static RESOURCE_OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "resource_operations_total",
        "Total number of child resource writes by kind and operation",
        &["resource_type", "operation"],
    )
});

// ============================================================================
// Admission and Error Metrics
// ============================================================================

/// Admission decisions by `operation` and `allowed`
pub static ADMISSION_REVIEWS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "admission_reviews_total",
        "Total number of admission reviews by operation and decision",
        &["operation", "allowed"],
    )
});

/// Errors by `resource_type` and `error_type`
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "errors_total",
        "Total number of errors by resource type and error category",
        &["resource_type", "error_type"],
    )
});

// ============================================================================
// Leader Election Metrics
// ============================================================================

/// Leadership changes by `status` (`acquired`, `lost`)
pub static LEADER_ELECTIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "leader_elections_total",
        "Total number of leader election events by status",
        &["status"],
    )
});

/// 1 while `identity` holds the controller lease, 0 otherwise
pub static LEADER_STATUS: LazyLock<GaugeVec> = LazyLock::new(|| {
    gauge_vec(
        "leader_status",
        "Current leader election status (1 = leader, 0 = follower)",
        &["identity"],
    )
});

// ============================================================================
// Recording Functions
// ============================================================================

fn record_reconciliation(resource_type: &str, status: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, status])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a successful reconciliation and its duration
pub fn record_reconciliation_success(resource_type: &str, duration: Duration) {
    record_reconciliation(resource_type, "success", duration);
}

/// Record a failed reconciliation and its duration
pub fn record_reconciliation_error(resource_type: &str, duration: Duration) {
    record_reconciliation(resource_type, "error", duration);
}

/// Record a reconciliation requeue
pub fn record_reconciliation_requeue(resource_type: &str, reason: &str) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "requeue"])
        .inc();
    REQUEUE_TOTAL
        .with_label_values(&[resource_type, reason])
        .inc();
}

/// Record the outcome of one orchestration step
pub fn record_step_outcome(step: &str, outcome: &str) {
    STEP_OUTCOMES_TOTAL
        .with_label_values(&[step, outcome])
        .inc();
}

fn record_resource_operation(resource_type: &str, operation: &str) {
    RESOURCE_OPERATIONS_TOTAL
        .with_label_values(&[resource_type, operation])
        .inc();
}

pub fn record_resource_created(resource_type: &str) {
    record_resource_operation(resource_type, "created");
}

pub fn record_resource_updated(resource_type: &str) {
    record_resource_operation(resource_type, "updated");
}

/// Record a delete issued to clear an immutable field
pub fn record_resource_recreated(resource_type: &str) {
    record_resource_operation(resource_type, "recreated");
}

pub fn record_resource_deleted(resource_type: &str) {
    record_resource_operation(resource_type, "deleted");
}

/// Record an admission decision
pub fn record_admission(operation: &str, allowed: bool) {
    ADMISSION_REVIEWS_TOTAL
        .with_label_values(&[operation, if allowed { "true" } else { "false" }])
        .inc();
}

/// Record an error of category `error_type` (e.g. `reconcile`, `status`)
pub fn record_error(resource_type: &str, error_type: &str) {
    ERRORS_TOTAL
        .with_label_values(&[resource_type, error_type])
        .inc();
}

pub fn record_leader_elected(identity: &str) {
    LEADER_ELECTIONS_TOTAL
        .with_label_values(&["acquired"])
        .inc();
    LEADER_STATUS.with_label_values(&[identity]).set(1.0);
}

pub fn record_leader_lost(identity: &str) {
    LEADER_ELECTIONS_TOTAL.with_label_values(&["lost"]).inc();
    LEADER_STATUS.with_label_values(&[identity]).set(0.0);
}

/// Encode every registered metric in the Prometheus text format.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&METRICS_REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
