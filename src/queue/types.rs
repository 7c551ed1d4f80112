use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request ID (database primary key, assigned at enqueue time).
pub type RequestId = i64;

/// Opaque key/value parameters handed to the job at launch.
pub type JobParameters = serde_json::Map<String, serde_json::Value>;

/// Persisted lifecycle state of a job request.
///
/// `Pending -> Running` happens only through a successful claim;
/// `Running -> {Completed, Skipped, Failed}` only through the instance that
/// holds the claim. Terminal states never regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Running,
    Completed,
    Skipped,
    Failed,
}

impl RequestStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Running => "running",
            RequestStatus::Completed => "completed",
            RequestStatus::Skipped => "skipped",
            RequestStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "running" => Some(RequestStatus::Running),
            "completed" => Some(RequestStatus::Completed),
            "skipped" => Some(RequestStatus::Skipped),
            "failed" => Some(RequestStatus::Failed),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Skipped | RequestStatus::Failed
        )
    }
}

/// A row of the durable request queue.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub id: RequestId,
    pub job_name: String,
    pub parameters: JobParameters,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
}

/// A request to be inserted by a producer.
#[derive(Debug, Clone)]
pub struct NewJobRequest {
    pub job_name: String,
    pub parameters: JobParameters,
}
