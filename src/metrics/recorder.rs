//! Metrics recorder for sync runs
//!
//! Records counters and durations through the `metrics` facade. Without an
//! installed recorder every call is a no-op.

use crate::sync::{SyncError, SyncRole, SyncStats};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    // Run counters
    describe_counter!(
        "deltasync_runs_started_total",
        "Total number of sync runs started"
    );
    describe_counter!(
        "deltasync_runs_completed_total",
        "Total number of sync runs completed successfully"
    );
    describe_counter!(
        "deltasync_runs_failed_total",
        "Total number of sync runs that failed"
    );

    // Matching counters
    describe_counter!(
        "deltasync_blocks_matched_total",
        "Blocks reused from the receiver's copy"
    );
    describe_counter!(
        "deltasync_weak_matches_total",
        "Windows whose weak checksum hit a receiver block"
    );
    describe_counter!(
        "deltasync_misses_total",
        "Contiguous runs of windows without a match"
    );
    describe_counter!(
        "deltasync_literal_bytes_total",
        "Literal bytes sent or received"
    );

    describe_histogram!("deltasync_run_duration_seconds", "Duration of a sync run");
}

/// Record a run starting
pub fn record_run_started(role: SyncRole) {
    counter!("deltasync_runs_started_total", "role" => role.as_str()).increment(1);
}

/// Record a run completing successfully
pub fn record_run_complete(stats: &SyncStats, duration: Duration) {
    let role = stats.role.as_str();
    counter!("deltasync_runs_completed_total", "role" => role).increment(1);
    counter!("deltasync_blocks_matched_total", "role" => role).increment(stats.match_count);

    let literal_bytes = match stats.role {
        SyncRole::Sender => {
            counter!("deltasync_weak_matches_total", "role" => role)
                .increment(stats.weak_match_count);
            counter!("deltasync_misses_total", "role" => role).increment(stats.miss_count);
            stats.bytes_transferred
        }
        SyncRole::Receiver => stats.literal_bytes_received,
    };
    counter!("deltasync_literal_bytes_total", "role" => role).increment(literal_bytes);

    histogram!("deltasync_run_duration_seconds", "role" => role).record(duration.as_secs_f64());
}

/// Record a run failing
pub fn record_run_failed(role: SyncRole, reason: &str) {
    counter!(
        "deltasync_runs_failed_total",
        "role" => role.as_str(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Helper struct tying a run's start to its outcome
pub struct RunMetrics {
    role: SyncRole,
    start_time: Instant,
}

impl RunMetrics {
    pub fn start(role: SyncRole) -> Self {
        record_run_started(role);
        Self {
            role,
            start_time: Instant::now(),
        }
    }

    pub fn complete(self, stats: &SyncStats) {
        record_run_complete(stats, self.start_time.elapsed());
    }

    pub fn fail(self, error: &SyncError) {
        record_run_failed(self.role, error.kind());
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}
