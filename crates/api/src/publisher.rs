//! Per-client progress stream publisher.
//!
//! One publisher task runs per connected SSE client. It subscribes to
//! the bridge's reconciled sample stream and simultaneously arms a
//! poll timer against the persisted job status; whichever source fires
//! first drives the next outbound event. The timer is reset whenever a
//! push sample arrives, so status polling only happens once the push
//! path has been silent for the configured interval. Every stream ends
//! with exactly one terminal event (`complete` or `error`) -- a client
//! is never left hanging on a silent connection.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use avatarforge_comfyui::ComfyUiBridge;
use avatarforge_core::job::{JobState, JobStatusSnapshot, JobStatusSource, StatusError};
use avatarforge_core::types::ProgressSample;

/// Tunables for one publisher task.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Push-path silence tolerated before polling starts; also the
    /// polling period.
    pub poll_interval: Duration,
    /// Consecutive failed polls tolerated before giving up on the job.
    pub max_poll_failures: u32,
    /// Client-supplied total-step count, used for samples whose own
    /// total is unusable.
    pub total_steps_hint: Option<i32>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_poll_failures: 5,
            total_steps_hint: None,
        }
    }
}

/// One outbound server-push notification, serialized as a single JSON
/// object per event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    /// Sent exactly once, immediately on stream open.
    Connected,

    /// A reconciled progress sample, as a percentage plus step counts.
    #[serde(rename_all = "camelCase")]
    Progress {
        current_step: i32,
        total_steps: i32,
        percentage: i32,
        status: String,
    },

    /// Terminal: the job finished successfully.
    Complete { percentage: i32 },

    /// Terminal: the job failed, or its status became unknowable.
    Error { message: String },
}

impl ProgressEvent {
    fn complete() -> Self {
        ProgressEvent::Complete { percentage: 100 }
    }

    fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            message: message.into(),
        }
    }

    /// Translate a reconciled sample into a progress notification.
    ///
    /// `hint` stands in for the total when the sample's own `max` is
    /// unusable (some engine phases report counters before sizing them).
    fn from_sample(sample: ProgressSample, hint: Option<i32>) -> Self {
        let total_steps = if sample.max > 0 {
            sample.max
        } else {
            hint.unwrap_or(sample.max)
        };
        ProgressEvent::Progress {
            current_step: sample.value,
            total_steps,
            percentage: percentage(sample.value, total_steps),
            status: format!("Step {} of {}", sample.value, total_steps),
        }
    }
}

/// Completion percentage, rounded and clamped to `0..=100`.
///
/// Out-of-order samples can put `value` above `max`; the clamp keeps
/// the externally visible number sane instead of rejecting the sample.
fn percentage(value: i32, max: i32) -> i32 {
    if max <= 0 {
        return 0;
    }
    let pct = (f64::from(value) / f64::from(max) * 100.0).round() as i32;
    pct.clamp(0, 100)
}

/// If the snapshot is terminal, the event that reports it.
fn terminal_event(snapshot: JobStatusSnapshot) -> Option<ProgressEvent> {
    if !snapshot.state.is_terminal() {
        return None;
    }
    if snapshot.state == JobState::Completed {
        Some(ProgressEvent::complete())
    } else {
        Some(ProgressEvent::error(
            snapshot
                .error_message
                .unwrap_or_else(|| "Generation failed".to_string()),
        ))
    }
}

/// Spawn a publisher task for one client connection.
///
/// Returns the receiving half of the event channel; the stream of
/// events ends after the terminal event. Dropping the receiver (client
/// disconnect) stops the task and releases its registry subscription.
pub fn spawn_publisher(
    bridge: Arc<ComfyUiBridge>,
    status_source: Arc<dyn JobStatusSource>,
    prompt_id: String,
    config: PublisherConfig,
) -> mpsc::UnboundedReceiver<ProgressEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(publish_progress(bridge, status_source, prompt_id, config, tx));
    rx
}

async fn publish_progress(
    bridge: Arc<ComfyUiBridge>,
    status_source: Arc<dyn JobStatusSource>,
    prompt_id: String,
    config: PublisherConfig,
    tx: mpsc::UnboundedSender<ProgressEvent>,
) {
    // Subscribing also lazily establishes the shared engine connection.
    // The guard unsubscribes on every exit path below.
    let (_subscription, mut samples) = bridge.subscribe(&prompt_id);

    if tx.send(ProgressEvent::Connected).is_err() {
        return;
    }

    // Probe once up front: jobs the status layer has never heard of
    // fail fast instead of holding the stream open, and jobs that are
    // already terminal resolve without waiting a poll interval.
    match status_source.job_status(&prompt_id).await {
        Ok(snapshot) => {
            if let Some(event) = terminal_event(snapshot) {
                let _ = tx.send(event);
                return;
            }
        }
        Err(StatusError::UnknownJob(_)) => {
            tracing::debug!(prompt_id = %prompt_id, "Stream opened for unknown job");
            let _ = tx.send(ProgressEvent::error(format!("Unknown job: {prompt_id}")));
            return;
        }
        Err(e) => {
            // The push path may still deliver; the poll loop below
            // owns the give-up decision.
            tracing::debug!(prompt_id = %prompt_id, error = %e, "Initial status probe failed");
        }
    }

    let mut poll = tokio::time::interval_at(
        Instant::now() + config.poll_interval,
        config.poll_interval,
    );
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut failures = 0u32;
    let mut push_open = true;

    loop {
        tokio::select! {
            sample = samples.recv(), if push_open => match sample {
                Some(sample) => {
                    let event = ProgressEvent::from_sample(sample, config.total_steps_hint);
                    if tx.send(event).is_err() {
                        return; // client went away
                    }
                    // Push path is alive; defer polling by a full interval.
                    poll.reset();
                }
                None => {
                    // Bridge shut down mid-stream; polling carries on alone.
                    tracing::debug!(prompt_id = %prompt_id, "Push path closed, polling only");
                    push_open = false;
                }
            },
            _ = poll.tick() => {
                match status_source.job_status(&prompt_id).await {
                    Ok(snapshot) => {
                        failures = 0;
                        if let Some(event) = terminal_event(snapshot) {
                            let _ = tx.send(event);
                            return;
                        }
                    }
                    Err(e) => {
                        failures += 1;
                        tracing::debug!(
                            prompt_id = %prompt_id,
                            error = %e,
                            failures,
                            "Status poll failed",
                        );
                        if failures >= config.max_poll_failures {
                            let _ = tx.send(ProgressEvent::error(
                                "Job status is no longer reachable".to_string(),
                            ));
                            return;
                        }
                    }
                }
            }
        }
    }
}
