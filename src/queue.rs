use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
pub(crate) mod memory;
mod store;
mod types;

pub use store::PgRequestStore;
pub use types::{JobParameters, JobRequest, NewJobRequest, RequestId, RequestStatus};

/// Errors surfaced by the request store.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The row is not `running` under this instance's claim: it was either
    /// already driven to a terminal state or reclaimed by another instance.
    /// Callers log and drop; the stored status is left untouched.
    #[error("request {0} is no longer running under this instance's claim")]
    StaleClaim(RequestId),
    #[error("request {0} has a corrupt stored representation: {1}")]
    CorruptRow(RequestId, String),
    #[error("request store query failed")]
    Database(#[from] sqlx::Error),
}

/// Transactional interface to the durable request queue.
///
/// The claim protocol is the sole mutual-exclusion mechanism between daemon
/// instances polling the same table: `claim_batch` must never hand the same
/// pending row to two concurrent callers, and `mark_terminal` must reject a
/// write for a claim this instance no longer holds.
#[async_trait]
pub trait RequestQueue: Send + Sync {
    /// Atomically select up to `max_n` pending requests (oldest first, ties
    /// broken by id), flip them to running under this instance's claim, and
    /// return them. Returns fewer than `max_n` when fewer are pending.
    async fn claim_batch(&self, max_n: usize) -> Result<Vec<JobRequest>, QueueError>;

    /// Transition a request this instance holds to a terminal status,
    /// persisting diagnostic detail. Fails with [`QueueError::StaleClaim`]
    /// if the row is not currently running under this instance's claim.
    async fn mark_terminal(
        &self,
        id: RequestId,
        status: RequestStatus,
        detail: serde_json::Value,
    ) -> Result<(), QueueError>;

    /// Return a claimed-but-not-launched request to pending. Used as
    /// compensation when the worker pool rejects a submission.
    async fn release(&self, id: RequestId) -> Result<(), QueueError>;

    /// Requeue running rows whose claim is older than `older_than`. Returns
    /// the number of rows flipped back to pending.
    async fn reclaim_orphans(&self, older_than: Duration) -> Result<u64, QueueError>;

    /// Insert a new pending request (producer path).
    async fn enqueue(&self, request: NewJobRequest) -> Result<RequestId, QueueError>;

    /// Fetch a single request by id.
    async fn get(&self, id: RequestId) -> Result<Option<JobRequest>, QueueError>;
}
