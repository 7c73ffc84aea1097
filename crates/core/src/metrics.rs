//! Prometheus metrics for core components.
//!
//! Counters cover the job lifecycle (created, terminal states), fetch
//! outcomes by kind, and archive assembly timing. The server registers
//! everything returned by [`all_metrics`] into its registry.

use once_cell::sync::Lazy;
use prometheus::{
    core::Collector, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts,
};

/// Jobs created since startup.
pub static JOBS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("papyrus_jobs_created_total", "Total jobs created").unwrap()
});

/// Jobs reaching a terminal status, by status name.
pub static JOBS_TERMINAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "papyrus_jobs_terminal_total",
            "Jobs reaching a terminal status",
        ),
        &["status"], // "completed", "failed", "cancelled"
    )
    .unwrap()
});

/// File fetch outcomes by result.
pub static FETCH_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("papyrus_fetch_results_total", "File fetch outcomes"),
        &["result"], // "done", "network", "timeout", "not_found", "filesystem"
    )
    .unwrap()
});

/// Durable-tier write degradations to the fallback tier.
pub static STORE_DEGRADATIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "papyrus_store_degradations_total",
        "Writes degraded from the durable tier to the fallback tier",
    )
    .unwrap()
});

/// Archive assembly duration in seconds.
pub static ARCHIVE_BUILD_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "papyrus_archive_build_duration_seconds",
            "Duration of archive assembly",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0, 60.0]),
    )
    .unwrap()
});

/// Jobs deleted by the reaper.
pub static JOBS_REAPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("papyrus_jobs_reaped_total", "Jobs deleted by the reaper").unwrap()
});

/// All core metrics for registry registration.
pub fn all_metrics() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(JOBS_CREATED.clone()),
        Box::new(JOBS_TERMINAL.clone()),
        Box::new(FETCH_RESULTS.clone()),
        Box::new(STORE_DEGRADATIONS.clone()),
        Box::new(ARCHIVE_BUILD_DURATION.clone()),
        Box::new(JOBS_REAPED.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register_cleanly() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
    }
}
