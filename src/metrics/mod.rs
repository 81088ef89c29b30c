//! Metrics and observability module
//!
//! Key metrics exposed:
//! - Runs started, completed and failed per role
//! - Blocks matched, weak checksum hits and miss runs
//! - Literal bytes moved and run duration

pub mod recorder;

pub use recorder::{
    init_metrics, record_run_complete, record_run_failed, record_run_started, RunMetrics,
};
