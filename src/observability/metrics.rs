use prometheus::{
    Counter, Gauge, Histogram, Registry, histogram_opts, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;

/// Daemon metrics collector.
#[derive(Debug, Clone)]
pub struct Metrics {
    pub requests_claimed: Counter,
    pub requests_completed: Counter,
    pub requests_skipped: Counter,
    pub requests_failed: Counter,
    pub unknown_jobs: Counter,
    pub pool_rejections: Counter,
    pub stale_claims: Counter,
    pub orphans_reclaimed: Counter,

    pub job_duration: Histogram,

    pub busy_workers: Gauge,
}

impl Metrics {
    pub fn new(registry: &Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            requests_claimed: register_counter_with_registry!(
                "dispatch_requests_claimed_total",
                "Total number of requests claimed from the queue",
                registry
            )?,
            requests_completed: register_counter_with_registry!(
                "dispatch_requests_completed_total",
                "Total number of requests finished with status completed",
                registry
            )?,
            requests_skipped: register_counter_with_registry!(
                "dispatch_requests_skipped_total",
                "Total number of requests finished with status skipped (partial failure)",
                registry
            )?,
            requests_failed: register_counter_with_registry!(
                "dispatch_requests_failed_total",
                "Total number of requests finished with status failed",
                registry
            )?,
            unknown_jobs: register_counter_with_registry!(
                "dispatch_unknown_jobs_total",
                "Total number of claimed requests naming a job not in the registry",
                registry
            )?,
            pool_rejections: register_counter_with_registry!(
                "dispatch_pool_rejections_total",
                "Total number of submissions rejected by a saturated worker pool",
                registry
            )?,
            stale_claims: register_counter_with_registry!(
                "dispatch_stale_claims_total",
                "Total number of terminal-status writes rejected for a revoked claim",
                registry
            )?,
            orphans_reclaimed: register_counter_with_registry!(
                "dispatch_orphans_reclaimed_total",
                "Total number of stale running requests returned to pending",
                registry
            )?,
            job_duration: register_histogram_with_registry!(
                histogram_opts!(
                    "dispatch_job_duration_seconds",
                    "Wall-clock duration of dispatched job executions"
                ),
                registry
            )?,
            busy_workers: register_gauge_with_registry!(
                "dispatch_busy_workers",
                "Number of worker slots currently executing a job",
                registry
            )?,
        })
    }
}
