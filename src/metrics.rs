//! Prometheus metrics for the fan-out pipeline.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec,
};

static FANOUT_PAGES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "fanout_pages_total",
        "Follower pages fanned out into batch-write jobs"
    )
    .expect("Failed to register fanout pages metric")
});

static FANOUT_CONTINUATIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "fanout_continuations_total",
        "Fan-out continuation messages re-enqueued"
    )
    .expect("Failed to register fanout continuations metric")
});

static BATCH_WRITE_ENTRIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "batch_write_entries_total",
        "Feed cache entries by write outcome (written/dropped)",
        &["outcome"]
    )
    .expect("Failed to register batch write entries metric")
});

static BATCH_WRITE_RETRIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "batch_write_retries_total",
        "Batch write chunk retries after unprocessed entries"
    )
    .expect("Failed to register batch write retries metric")
});

static JOB_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fanout_job_runs_total",
        "Offline job runs by job and status",
        &["job", "status"]
    )
    .expect("Failed to register job runs metric")
});

static RECONCILE_MISMATCHES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "reconcile_count_mismatches_total",
        "Cached edge counters corrected by reconciliation"
    )
    .expect("Failed to register reconcile mismatches metric")
});

pub fn record_fanout_page() {
    FANOUT_PAGES_TOTAL.inc();
}

pub fn record_fanout_continuation() {
    FANOUT_CONTINUATIONS_TOTAL.inc();
}

pub fn record_entries_written(count: u64) {
    BATCH_WRITE_ENTRIES_TOTAL
        .with_label_values(&["written"])
        .inc_by(count);
}

pub fn record_entries_dropped(count: u64) {
    BATCH_WRITE_ENTRIES_TOTAL
        .with_label_values(&["dropped"])
        .inc_by(count);
}

pub fn record_batch_write_retry() {
    BATCH_WRITE_RETRIES_TOTAL.inc();
}

/// Record an offline job run result (job = reconcile/backfill).
pub fn record_job_run(job: &str, status: &str) {
    JOB_RUNS_TOTAL.with_label_values(&[job, status]).inc();
}

pub fn record_count_mismatch() {
    RECONCILE_MISMATCHES_TOTAL.inc();
}
