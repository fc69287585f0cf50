//! Job status collaborator contract.
//!
//! The bridge does not persist anything itself. When the push path is
//! silent it falls back to polling whatever layer *does* know the
//! job's persisted status -- the engine's history endpoint in the
//! default deployment, a database-backed store in a fuller one. That
//! layer is abstracted as [`JobStatusSource`].

use serde::Serialize;

/// Lifecycle state of a generation job as reported by the status layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    /// Whether this state is terminal (no further progress possible).
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Point-in-time view of a job's persisted status.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusSnapshot {
    pub state: JobState,
    /// Total inference steps for the job, when the status layer knows it.
    pub total_steps: Option<i32>,
    /// Engine-reported failure detail. Only meaningful when `state`
    /// is [`JobState::Failed`]; passed through to clients verbatim.
    pub error_message: Option<String>,
}

impl JobStatusSnapshot {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            total_steps: None,
            error_message: None,
        }
    }
}

/// Errors from a status query.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    /// The status layer has no record of this job at all.
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    /// The status layer could not be reached or answered garbage.
    #[error("Status query failed: {0}")]
    Unavailable(String),
}

/// Read-only access to a job's persisted status.
///
/// Implementations must be cheap to call repeatedly -- the stream
/// publisher polls this at a fixed low frequency whenever the push
/// path goes quiet.
#[async_trait::async_trait]
pub trait JobStatusSource: Send + Sync {
    async fn job_status(&self, prompt_id: &str) -> Result<JobStatusSnapshot, StatusError>;
}
