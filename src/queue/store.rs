use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::time::Duration;

use super::types::{JobParameters, JobRequest, NewJobRequest, RequestId, RequestStatus};
use super::{QueueError, RequestQueue};

/// Postgres-backed request store.
///
/// Mutual exclusion between concurrent daemon instances relies entirely on
/// the store's row locking (`FOR UPDATE SKIP LOCKED`) and conditional
/// updates; no process-local locking is assumed.
#[derive(Debug, Clone)]
pub struct PgRequestStore {
    pool: PgPool,
    instance_id: String,
}

impl PgRequestStore {
    #[must_use]
    pub fn new(pool: PgPool, instance_id: impl Into<String>) -> Self {
        Self {
            pool,
            instance_id: instance_id.into(),
        }
    }

    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Connectivity probe for the readiness endpoint.
    pub async fn ping(&self) -> Result<(), QueueError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn row_to_request(row: &sqlx::postgres::PgRow) -> Result<JobRequest, QueueError> {
        let id: RequestId = row.try_get("id")?;
        let job_name: String = row.try_get("job_name")?;
        let parameters_json: serde_json::Value = row.try_get("parameters")?;
        let status_str: String = row.try_get("status")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let claimed_by: Option<String> = row.try_get("claimed_by")?;
        let claimed_at: Option<DateTime<Utc>> = row.try_get("claimed_at")?;

        let status = RequestStatus::from_str(&status_str)
            .ok_or_else(|| QueueError::CorruptRow(id, format!("invalid status: {status_str}")))?;
        let parameters: JobParameters = match parameters_json {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => JobParameters::new(),
            other => {
                return Err(QueueError::CorruptRow(
                    id,
                    format!("parameters must be an object, got {other}"),
                ));
            }
        };

        Ok(JobRequest {
            id,
            job_name,
            parameters,
            status,
            created_at,
            claimed_by,
            claimed_at,
        })
    }
}

#[async_trait::async_trait]
impl RequestQueue for PgRequestStore {
    /// Atomically flip up to `max_n` pending requests to running under this
    /// instance's claim. The whole batch is one statement, so two concurrent
    /// claimants never select the same row: locked rows are skipped rather
    /// than waited on.
    async fn claim_batch(&self, max_n: usize) -> Result<Vec<JobRequest>, QueueError> {
        if max_n == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r"
            UPDATE batch_job_request AS r
            SET status = 'running',
                claimed_by = $2,
                claimed_at = NOW()
            FROM (
                SELECT id
                FROM batch_job_request
                WHERE status = 'pending'
                ORDER BY created_at ASC, id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT $1
            ) AS next
            WHERE r.id = next.id
            RETURNING r.id, r.job_name, r.parameters, r.status,
                      r.created_at, r.claimed_by, r.claimed_at
            ",
        )
        .bind(i64::try_from(max_n).unwrap_or(i64::MAX))
        .bind(&self.instance_id)
        .fetch_all(&self.pool)
        .await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in &rows {
            requests.push(Self::row_to_request(row)?);
        }
        // UPDATE ... FROM does not promise row order; restore the
        // oldest-pending-first contract here.
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(requests)
    }

    /// Write a terminal status for a request this instance still holds.
    ///
    /// The conditional `WHERE` is the guard against writing a result for a
    /// revoked claim: zero affected rows means the row is terminal already
    /// or was reclaimed by another instance.
    async fn mark_terminal(
        &self,
        id: RequestId,
        status: RequestStatus,
        detail: serde_json::Value,
    ) -> Result<(), QueueError> {
        debug_assert!(status.is_terminal());

        let result = sqlx::query(
            r"
            UPDATE batch_job_request
            SET status = $2,
                result = $3,
                completed_at = NOW()
            WHERE id = $1
              AND status = 'running'
              AND claimed_by = $4
            ",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(detail)
        .bind(&self.instance_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::StaleClaim(id));
        }
        Ok(())
    }

    /// Compensating transition back to pending after a pool rejection.
    async fn release(&self, id: RequestId) -> Result<(), QueueError> {
        let result = sqlx::query(
            r"
            UPDATE batch_job_request
            SET status = 'pending',
                claimed_by = NULL,
                claimed_at = NULL
            WHERE id = $1
              AND status = 'running'
              AND claimed_by = $2
            ",
        )
        .bind(id)
        .bind(&self.instance_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::StaleClaim(id));
        }
        Ok(())
    }

    /// Requeue running rows whose claim is older than `older_than`,
    /// regardless of which instance holds them. Only invoked when the orphan
    /// reclaim policy is configured.
    async fn reclaim_orphans(&self, older_than: Duration) -> Result<u64, QueueError> {
        let result = sqlx::query(
            r"
            UPDATE batch_job_request
            SET status = 'pending',
                claimed_by = NULL,
                claimed_at = NULL
            WHERE status = 'running'
              AND claimed_at < NOW() - make_interval(secs => $1)
            ",
        )
        .bind(older_than.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn enqueue(&self, request: NewJobRequest) -> Result<RequestId, QueueError> {
        let row = sqlx::query(
            r"
            INSERT INTO batch_job_request (job_name, parameters, status)
            VALUES ($1, $2, 'pending')
            RETURNING id
            ",
        )
        .bind(&request.job_name)
        .bind(serde_json::Value::Object(request.parameters))
        .fetch_one(&self.pool)
        .await?;

        let id: RequestId = row.try_get("id")?;
        Ok(id)
    }

    async fn get(&self, id: RequestId) -> Result<Option<JobRequest>, QueueError> {
        let row = sqlx::query(
            r"
            SELECT id, job_name, parameters, status, created_at, claimed_by, claimed_at
            FROM batch_job_request
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_request(&row)?)),
            None => Ok(None),
        }
    }
}
