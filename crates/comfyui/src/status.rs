//! Job status polling over the engine's HTTP history endpoint.
//!
//! The engine records finished executions under `GET /history/{id}`.
//! [`HistoryStatusSource`] maps that record onto the
//! [`JobStatusSource`] contract so the stream publisher can detect
//! terminal states even when the push path is silent or unavailable.

use avatarforge_core::job::{JobState, JobStatusSnapshot, JobStatusSource, StatusError};

/// Status poller backed by the engine's `/history/{prompt_id}` endpoint.
pub struct HistoryStatusSource {
    client: reqwest::Client,
    api_url: String,
}

impl HistoryStatusSource {
    /// Create a poller for an engine instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }
}

#[async_trait::async_trait]
impl JobStatusSource for HistoryStatusSource {
    async fn job_status(&self, prompt_id: &str) -> Result<JobStatusSnapshot, StatusError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await
            .map_err(|e| StatusError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StatusError::Unavailable(format!(
                "history endpoint returned {status}"
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| StatusError::Unavailable(format!("invalid history body: {e}")))?;

        Ok(snapshot_from_history(prompt_id, &body))
    }
}

/// Map a raw history response onto a status snapshot.
///
/// The history endpoint only has entries for executions that reached a
/// terminal state; an empty object means the job is still queued or
/// running (the engine cannot distinguish a job it has never seen, so
/// neither can we here -- a database-backed [`JobStatusSource`] can).
fn snapshot_from_history(prompt_id: &str, body: &serde_json::Value) -> JobStatusSnapshot {
    let Some(entry) = body.get(prompt_id) else {
        return JobStatusSnapshot::new(JobState::Processing);
    };

    let status = &entry["status"];
    if status["completed"].as_bool() == Some(true) {
        return JobStatusSnapshot::new(JobState::Completed);
    }

    if status["status_str"].as_str() == Some("error") {
        let mut snapshot = JobStatusSnapshot::new(JobState::Failed);
        snapshot.error_message = extract_error_message(status).map(str::to_string);
        return snapshot;
    }

    JobStatusSnapshot::new(JobState::Processing)
}

/// Pull the engine's failure detail out of the status message log.
///
/// The log is a list of `[kind, payload]` pairs; failures appear as
/// `["execution_error", { "exception_message": ... }]`.
fn extract_error_message(status: &serde_json::Value) -> Option<&str> {
    status["messages"].as_array()?.iter().find_map(|msg| {
        let pair = msg.as_array()?;
        if pair.first()?.as_str()? == "execution_error" {
            pair.get(1)?["exception_message"].as_str()
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_history_means_still_processing() {
        let snapshot = snapshot_from_history("abc", &json!({}));
        assert_eq!(snapshot.state, JobState::Processing);
        assert!(snapshot.error_message.is_none());
    }

    #[test]
    fn completed_entry_maps_to_completed() {
        let body = json!({
            "abc": {
                "outputs": {"9": {"images": [{"filename": "out.png"}]}},
                "status": {"status_str": "success", "completed": true, "messages": []}
            }
        });
        let snapshot = snapshot_from_history("abc", &body);
        assert_eq!(snapshot.state, JobState::Completed);
    }

    #[test]
    fn error_entry_maps_to_failed_with_engine_message() {
        let body = json!({
            "abc": {
                "outputs": {},
                "status": {
                    "status_str": "error",
                    "completed": false,
                    "messages": [
                        ["execution_start", {"prompt_id": "abc"}],
                        ["execution_error", {"exception_message": "CUDA out of memory"}]
                    ]
                }
            }
        });
        let snapshot = snapshot_from_history("abc", &body);
        assert_eq!(snapshot.state, JobState::Failed);
        assert_eq!(snapshot.error_message.as_deref(), Some("CUDA out of memory"));
    }

    #[test]
    fn error_entry_without_detail_still_fails() {
        let body = json!({
            "abc": {
                "status": {"status_str": "error", "completed": false, "messages": []}
            }
        });
        let snapshot = snapshot_from_history("abc", &body);
        assert_eq!(snapshot.state, JobState::Failed);
        assert!(snapshot.error_message.is_none());
    }

    #[test]
    fn entry_for_a_different_job_is_ignored() {
        let body = json!({
            "other": {"status": {"status_str": "success", "completed": true}}
        });
        let snapshot = snapshot_from_history("abc", &body);
        assert_eq!(snapshot.state, JobState::Processing);
    }
}
