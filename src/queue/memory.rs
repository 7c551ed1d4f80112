// In-memory queue double for dispatcher tests, in the spirit of a mock DAO:
// same contract as the Postgres store, no database required.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::{JobRequest, NewJobRequest, RequestId, RequestStatus};
use super::{QueueError, RequestQueue};

#[derive(Debug)]
struct Row {
    request: JobRequest,
    detail: Option<serde_json::Value>,
}

/// Test queue with the same claim/terminal semantics as [`super::PgRequestStore`].
#[derive(Debug)]
pub(crate) struct InMemoryQueue {
    instance_id: String,
    rows: Mutex<Vec<Row>>,
    next_id: Mutex<RequestId>,
}

impl InMemoryQueue {
    pub(crate) fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            rows: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
        }
    }

    pub(crate) fn status_of(&self, id: RequestId) -> Option<RequestStatus> {
        self.rows
            .lock()
            .expect("queue rows")
            .iter()
            .find(|row| row.request.id == id)
            .map(|row| row.request.status)
    }

    pub(crate) fn detail_of(&self, id: RequestId) -> Option<serde_json::Value> {
        self.rows
            .lock()
            .expect("queue rows")
            .iter()
            .find(|row| row.request.id == id)
            .and_then(|row| row.detail.clone())
    }

    /// Simulate another instance reclaiming a running row (claim revoked).
    pub(crate) fn revoke_claim(&self, id: RequestId) {
        let mut rows = self.rows.lock().expect("queue rows");
        if let Some(row) = rows.iter_mut().find(|row| row.request.id == id) {
            row.request.status = RequestStatus::Pending;
            row.request.claimed_by = None;
            row.request.claimed_at = None;
        }
    }

    /// Backdate a running row's claim so the orphan policy picks it up.
    pub(crate) fn age_claim(&self, id: RequestId, age: Duration) {
        let mut rows = self.rows.lock().expect("queue rows");
        if let Some(row) = rows.iter_mut().find(|row| row.request.id == id) {
            row.request.claimed_at =
                Some(Utc::now() - chrono::Duration::from_std(age).expect("claim age"));
        }
    }
}

#[async_trait]
impl RequestQueue for InMemoryQueue {
    async fn claim_batch(&self, max_n: usize) -> Result<Vec<JobRequest>, QueueError> {
        let mut rows = self.rows.lock().expect("queue rows");
        let mut pending: Vec<(DateTime<Utc>, RequestId)> = rows
            .iter()
            .filter(|row| row.request.status == RequestStatus::Pending)
            .map(|row| (row.request.created_at, row.request.id))
            .collect();
        pending.sort();
        pending.truncate(max_n);

        let mut claimed = Vec::with_capacity(pending.len());
        for (_, id) in pending {
            let row = rows
                .iter_mut()
                .find(|row| row.request.id == id)
                .expect("pending row exists");
            row.request.status = RequestStatus::Running;
            row.request.claimed_by = Some(self.instance_id.clone());
            row.request.claimed_at = Some(Utc::now());
            claimed.push(row.request.clone());
        }
        Ok(claimed)
    }

    async fn mark_terminal(
        &self,
        id: RequestId,
        status: RequestStatus,
        detail: serde_json::Value,
    ) -> Result<(), QueueError> {
        let mut rows = self.rows.lock().expect("queue rows");
        let row = rows
            .iter_mut()
            .find(|row| row.request.id == id)
            .ok_or(QueueError::StaleClaim(id))?;
        if row.request.status != RequestStatus::Running
            || row.request.claimed_by.as_deref() != Some(self.instance_id.as_str())
        {
            return Err(QueueError::StaleClaim(id));
        }
        row.request.status = status;
        row.detail = Some(detail);
        Ok(())
    }

    async fn release(&self, id: RequestId) -> Result<(), QueueError> {
        let mut rows = self.rows.lock().expect("queue rows");
        let row = rows
            .iter_mut()
            .find(|row| row.request.id == id)
            .ok_or(QueueError::StaleClaim(id))?;
        if row.request.status != RequestStatus::Running
            || row.request.claimed_by.as_deref() != Some(self.instance_id.as_str())
        {
            return Err(QueueError::StaleClaim(id));
        }
        row.request.status = RequestStatus::Pending;
        row.request.claimed_by = None;
        row.request.claimed_at = None;
        Ok(())
    }

    async fn reclaim_orphans(&self, older_than: Duration) -> Result<u64, QueueError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).expect("staleness");
        let mut rows = self.rows.lock().expect("queue rows");
        let mut reclaimed = 0;
        for row in rows.iter_mut() {
            if row.request.status == RequestStatus::Running
                && row.request.claimed_at.is_some_and(|at| at < cutoff)
            {
                row.request.status = RequestStatus::Pending;
                row.request.claimed_by = None;
                row.request.claimed_at = None;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn enqueue(&self, request: NewJobRequest) -> Result<RequestId, QueueError> {
        let mut next_id = self.next_id.lock().expect("next id");
        let id = *next_id;
        *next_id += 1;
        drop(next_id);

        let mut rows = self.rows.lock().expect("queue rows");
        rows.push(Row {
            request: JobRequest {
                id,
                job_name: request.job_name,
                parameters: request.parameters,
                status: RequestStatus::Pending,
                created_at: Utc::now(),
                claimed_by: None,
                claimed_at: None,
            },
            detail: None,
        });
        Ok(id)
    }

    async fn get(&self, id: RequestId) -> Result<Option<JobRequest>, QueueError> {
        Ok(self
            .rows
            .lock()
            .expect("queue rows")
            .iter()
            .find(|row| row.request.id == id)
            .map(|row| row.request.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::JobParameters;

    fn request(name: &str) -> NewJobRequest {
        NewJobRequest {
            job_name: name.to_string(),
            parameters: JobParameters::new(),
        }
    }

    #[tokio::test]
    async fn claim_is_oldest_first_and_bounded() {
        let queue = InMemoryQueue::new("inst-a");
        let a = queue.enqueue(request("jobA")).await.unwrap();
        let b = queue.enqueue(request("jobB")).await.unwrap();
        let c = queue.enqueue(request("jobC")).await.unwrap();

        let claimed = queue.claim_batch(2).await.unwrap();
        let ids: Vec<_> = claimed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(queue.status_of(c), Some(RequestStatus::Pending));
    }

    #[tokio::test]
    async fn concurrent_claims_never_overlap() {
        let queue = std::sync::Arc::new(InMemoryQueue::new("inst-a"));
        for _ in 0..10 {
            queue.enqueue(request("job")).await.unwrap();
        }

        let (left, right) = tokio::join!(queue.claim_batch(6), queue.claim_batch(6));
        let mut ids: Vec<_> = left
            .unwrap()
            .into_iter()
            .chain(right.unwrap())
            .map(|r| r.id)
            .collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total, "a request was claimed twice");
    }

    #[tokio::test]
    async fn mark_terminal_rejects_rows_not_running() {
        let queue = InMemoryQueue::new("inst-a");
        let id = queue.enqueue(request("job")).await.unwrap();

        // Not yet claimed.
        let err = queue
            .mark_terminal(id, RequestStatus::Completed, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::StaleClaim(got) if got == id));

        queue.claim_batch(1).await.unwrap();
        queue
            .mark_terminal(id, RequestStatus::Completed, serde_json::json!({}))
            .await
            .unwrap();

        // Already terminal: the stored status must not change.
        let err = queue
            .mark_terminal(id, RequestStatus::Failed, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::StaleClaim(_)));
        assert_eq!(queue.status_of(id), Some(RequestStatus::Completed));
    }

    #[tokio::test]
    async fn release_returns_a_held_row_to_pending() {
        let queue = InMemoryQueue::new("inst-a");
        let id = queue.enqueue(request("job")).await.unwrap();

        // Not yet claimed.
        let err = queue.release(id).await.unwrap_err();
        assert!(matches!(err, QueueError::StaleClaim(got) if got == id));

        queue.claim_batch(1).await.unwrap();
        queue.release(id).await.unwrap();

        let row = queue.get(id).await.unwrap().expect("row exists");
        assert_eq!(row.status, RequestStatus::Pending);
        assert!(row.claimed_by.is_none());
        assert!(row.claimed_at.is_none());

        // Already back to pending: a second release has nothing to undo.
        let err = queue.release(id).await.unwrap_err();
        assert!(matches!(err, QueueError::StaleClaim(_)));
    }

    #[tokio::test]
    async fn reclaim_only_touches_stale_running_rows() {
        let queue = InMemoryQueue::new("inst-a");
        let stale = queue.enqueue(request("job")).await.unwrap();
        let fresh = queue.enqueue(request("job")).await.unwrap();
        queue.claim_batch(2).await.unwrap();
        queue.age_claim(stale, Duration::from_secs(3600));

        let reclaimed = queue
            .reclaim_orphans(Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(reclaimed, 1);
        assert_eq!(queue.status_of(stale), Some(RequestStatus::Pending));
        assert_eq!(queue.status_of(fresh), Some(RequestStatus::Running));
    }
}
