use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::exit_status::{ExecutionOutcome, ExitStatus};
use crate::observability::metrics::Metrics;
use crate::queue::{JobParameters, JobRequest, QueueError, RequestId, RequestQueue, RequestStatus};
use crate::registry::JobDefinition;

fn terminal_status(status: ExitStatus) -> RequestStatus {
    match status {
        ExitStatus::Completed => RequestStatus::Completed,
        ExitStatus::Skipped => RequestStatus::Skipped,
        ExitStatus::Failed => RequestStatus::Failed,
    }
}

/// Execute one claimed request on its assigned worker: run the job body,
/// classify the outcome, and propagate the terminal status to the store.
///
/// The job body runs in its own task so a panic ends only this request, not
/// the worker pool or the daemon.
pub(crate) async fn execute_request(
    queue: Arc<dyn RequestQueue>,
    metrics: Arc<Metrics>,
    request: JobRequest,
    job: Arc<JobDefinition>,
) {
    info!(
        request_id = request.id,
        job_name = %request.job_name,
        steps = job.steps().len(),
        "launching job"
    );
    metrics.busy_workers.inc();
    let started = Instant::now();

    let handle = tokio::spawn({
        let job = Arc::clone(&job);
        let parameters = request.parameters.clone();
        async move { run_steps(&job, &parameters).await }
    });
    let outcome = match handle.await {
        Ok(outcome) => outcome,
        Err(join_error) => {
            error!(
                request_id = request.id,
                job_name = %request.job_name,
                error = %join_error,
                "job body aborted before reaching a terminal step state"
            );
            ExecutionOutcome::fault(Vec::new(), format!("job body aborted: {join_error}"))
        }
    };

    metrics.job_duration.observe(started.elapsed().as_secs_f64());
    metrics.busy_workers.dec();
    info!(
        request_id = request.id,
        job_name = %request.job_name,
        status = outcome.status.as_str(),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "job finished"
    );

    persist_outcome(queue.as_ref(), &metrics, request.id, &outcome).await;
}

/// Run the job's steps in order, stopping at the first unhandled fault.
async fn run_steps(job: &JobDefinition, parameters: &JobParameters) -> ExecutionOutcome {
    let mut executions = Vec::with_capacity(job.steps().len());
    for step in job.steps() {
        match step.runner().run(step.name(), parameters).await {
            Ok(execution) => {
                debug!(
                    job_name = job.name(),
                    step = %execution.step_name,
                    read_count = execution.read_count,
                    write_count = execution.write_count,
                    skip_count = execution.skip_count,
                    "step finished"
                );
                executions.push(execution);
            }
            Err(error) => {
                error!(
                    job_name = job.name(),
                    step = step.name(),
                    error = format!("{error:#}"),
                    "step raised an unhandled fault"
                );
                return ExecutionOutcome::fault(executions, format!("{error:#}"));
            }
        }
    }
    ExecutionOutcome::from_steps(executions)
}

/// Write a terminal status, tolerating a revoked claim: another instance may
/// already own the outcome, so a stale claim is logged and dropped rather
/// than retried.
pub(crate) async fn persist_outcome(
    queue: &dyn RequestQueue,
    metrics: &Metrics,
    id: RequestId,
    outcome: &ExecutionOutcome,
) {
    match outcome.status {
        ExitStatus::Completed => metrics.requests_completed.inc(),
        ExitStatus::Skipped => metrics.requests_skipped.inc(),
        ExitStatus::Failed => metrics.requests_failed.inc(),
    }

    match queue
        .mark_terminal(id, terminal_status(outcome.status), outcome.detail())
        .await
    {
        Ok(()) => {}
        Err(QueueError::StaleClaim(_)) => {
            metrics.stale_claims.inc();
            warn!(
                request_id = id,
                status = outcome.status.as_str(),
                "claim was revoked before the terminal status could be written, dropping outcome"
            );
        }
        Err(error) => {
            error!(request_id = id, %error, "failed to persist terminal status");
        }
    }
}
