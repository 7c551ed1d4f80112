use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::execution;
use crate::exit_status::ExecutionOutcome;
use crate::observability::metrics::Metrics;
use crate::pool::WorkerPool;
use crate::queue::{QueueError, RequestQueue};
use crate::registry::JobRegistry;

/// The poll-and-dispatch loop.
///
/// Two-phase admission keeps the zero-queue worker pool from rejecting
/// already-claimed work: each tick measures free capacity first and claims
/// at most that many pending requests. Ticks are driven sequentially from
/// one task; a tick that fires while the previous one is still dispatching
/// is skipped, never run concurrently with it.
pub struct Dispatcher {
    queue: Arc<dyn RequestQueue>,
    registry: Arc<JobRegistry>,
    pool: WorkerPool,
    metrics: Arc<Metrics>,
    poll_interval: Duration,
    reclaim_after: Option<Duration>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        queue: Arc<dyn RequestQueue>,
        registry: Arc<JobRegistry>,
        pool: WorkerPool,
        metrics: Arc<Metrics>,
        poll_interval: Duration,
        reclaim_after: Option<Duration>,
    ) -> Self {
        Self {
            queue,
            registry,
            pool,
            metrics,
            poll_interval,
            reclaim_after,
        }
    }

    /// Run the poll loop as a detached task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        info!(
            poll_interval_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            pool_capacity = self.pool.capacity(),
            jobs = self.registry.len(),
            "starting poll-and-dispatch loop"
        );
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One poll cycle. Every per-request error is contained to that
    /// request's handling path.
    pub(crate) async fn tick(&self) {
        if let Some(staleness) = self.reclaim_after {
            match self.queue.reclaim_orphans(staleness).await {
                Ok(0) => {}
                Ok(reclaimed) => {
                    self.metrics.orphans_reclaimed.inc_by(reclaimed as f64);
                    warn!(reclaimed, "returned orphaned running requests to pending");
                }
                Err(error) => error!(%error, "orphan reclaim failed"),
            }
        }

        let slots = self.pool.free_capacity();
        if slots == 0 {
            debug!("no idle workers, skipping poll");
            return;
        }

        let requests = match self.queue.claim_batch(slots).await {
            Ok(requests) => requests,
            Err(error) => {
                error!(%error, "failed to claim pending requests");
                return;
            }
        };
        if requests.is_empty() {
            return;
        }
        debug!(claimed = requests.len(), slots, "claimed pending requests");

        for request in requests {
            self.metrics.requests_claimed.inc();
            let request_id = request.id;

            let job = match self.registry.resolve(&request.job_name) {
                Ok(job) => job,
                Err(_) => {
                    // Failed immediately without consuming a worker slot.
                    self.metrics.unknown_jobs.inc();
                    warn!(
                        request_id,
                        job_name = %request.job_name,
                        "claimed request names a job not in the registry"
                    );
                    let outcome = ExecutionOutcome::fault(
                        Vec::new(),
                        format!("unknown job: {}", request.job_name),
                    );
                    execution::persist_outcome(
                        self.queue.as_ref(),
                        &self.metrics,
                        request_id,
                        &outcome,
                    )
                    .await;
                    continue;
                }
            };

            let task = execution::execute_request(
                Arc::clone(&self.queue),
                Arc::clone(&self.metrics),
                request,
                job,
            );
            if self.pool.try_submit(task).is_err() {
                // Capacity shrank between the measurement and this submit.
                // Undo the claim so a later tick picks the request up again.
                self.metrics.pool_rejections.inc();
                warn!(
                    request_id,
                    "worker pool rejected an already-claimed request, releasing back to pending"
                );
                match self.queue.release(request_id).await {
                    Ok(()) => {}
                    Err(QueueError::StaleClaim(_)) => warn!(
                        request_id,
                        "claim was revoked before the request could be released"
                    ),
                    Err(error) => {
                        error!(request_id, %error, "failed to release rejected request");
                    }
                }
            }
        }
    }
}
