//! Integration tests for the SSE progress publisher.
//!
//! These drive the publisher task directly against an in-process
//! bridge (push path disabled, samples injected through the hub) and a
//! scripted status source, and assert on the exact sequence of emitted
//! events. Every stream must end with exactly one terminal event.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use avatarforge_api::publisher::{spawn_publisher, ProgressEvent, PublisherConfig};
use avatarforge_comfyui::ComfyUiBridge;
use avatarforge_core::job::{JobState, JobStatusSnapshot, JobStatusSource, StatusError};
use avatarforge_core::types::ProgressSample;

// ---------------------------------------------------------------------------
// Scripted status source
// ---------------------------------------------------------------------------

/// One scripted answer from the status layer.
#[derive(Clone)]
enum Reply {
    State(JobState, Option<&'static str>),
    Unknown,
    Unavailable,
}

/// Status source that pops replies in order and repeats the last one
/// once the script is exhausted.
struct ScriptedStatus {
    replies: Mutex<VecDeque<Reply>>,
}

impl ScriptedStatus {
    fn new(replies: &[Reply]) -> Arc<Self> {
        assert!(!replies.is_empty(), "script must not be empty");
        Arc::new(Self {
            replies: Mutex::new(replies.iter().cloned().collect()),
        })
    }
}

#[async_trait]
impl JobStatusSource for ScriptedStatus {
    async fn job_status(&self, prompt_id: &str) -> Result<JobStatusSnapshot, StatusError> {
        let mut queue = self.replies.lock().await;
        let reply = if queue.len() > 1 {
            queue.pop_front().expect("script must not be empty")
        } else {
            queue.front().cloned().expect("script must not be empty")
        };
        match reply {
            Reply::State(state, message) => {
                let mut snapshot = JobStatusSnapshot::new(state);
                snapshot.error_message = message.map(str::to_string);
                Ok(snapshot)
            }
            Reply::Unknown => Err(StatusError::UnknownJob(prompt_id.to_string())),
            Reply::Unavailable => Err(StatusError::Unavailable("connection refused".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fast_config() -> PublisherConfig {
    PublisherConfig {
        poll_interval: Duration::from_millis(100),
        max_poll_failures: 3,
        total_steps_hint: None,
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> ProgressEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("stream ended unexpectedly")
}

async fn assert_stream_ends(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) {
    let end = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for stream end");
    assert!(end.is_none(), "expected stream end, got {end:?}");
}

fn progress(current_step: i32, total_steps: i32, percentage: i32) -> ProgressEvent {
    ProgressEvent::Progress {
        current_step,
        total_steps,
        percentage,
        status: format!("Step {current_step} of {total_steps}"),
    }
}

// ---------------------------------------------------------------------------
// Test: full lifecycle -- setup aggregate, inference steps, completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_lifecycle_emits_connected_progress_and_complete() {
    let bridge = ComfyUiBridge::new(None);
    let status = ScriptedStatus::new(&[
        Reply::State(JobState::Processing, None),
        Reply::State(JobState::Completed, None),
    ]);

    // A full second of push silence before polling kicks in, so the
    // samples injected below always win the race against the poll timer.
    let config = PublisherConfig {
        poll_interval: Duration::from_secs(1),
        ..fast_config()
    };
    let mut rx = spawn_publisher(Arc::clone(&bridge), status, "j1".to_string(), config);

    // The subscription exists before `connected` is emitted, so samples
    // injected from here on are guaranteed to be seen.
    assert_eq!(next_event(&mut rx).await, ProgressEvent::Connected);

    // Setup phase: three nodes sized but not yet finished.
    let nodes = ["a", "b", "c"]
        .into_iter()
        .map(|id| {
            (
                id.to_string(),
                avatarforge_comfyui::messages::NodeProgress {
                    value: Some(0),
                    max: Some(1),
                    state: Some("running".into()),
                },
            )
        })
        .collect();
    bridge.hub().record_node_states("j1", &nodes);
    assert_eq!(next_event(&mut rx).await, progress(0, 3, 0));

    // Inference phase takes over; percentage is rebased, then climbs.
    bridge.hub().record_step("j1", ProgressSample::new(1, 20));
    assert_eq!(next_event(&mut rx).await, progress(1, 20, 5));

    bridge.hub().record_step("j1", ProgressSample::new(20, 20));
    assert_eq!(next_event(&mut rx).await, progress(20, 20, 100));

    // Push path goes quiet; the next status poll reports completion.
    assert_eq!(
        next_event(&mut rx).await,
        ProgressEvent::Complete { percentage: 100 }
    );
    assert_stream_ends(&mut rx).await;
}

// ---------------------------------------------------------------------------
// Test: polling fallback completes a job with no push traffic at all
// ---------------------------------------------------------------------------

#[tokio::test]
async fn polling_fallback_completes_without_any_push_samples() {
    let bridge = ComfyUiBridge::new(None);
    let status = ScriptedStatus::new(&[
        Reply::State(JobState::Processing, None),
        Reply::State(JobState::Processing, None),
        Reply::State(JobState::Completed, None),
    ]);

    let mut rx = spawn_publisher(bridge, status, "j1".to_string(), fast_config());

    assert_eq!(next_event(&mut rx).await, ProgressEvent::Connected);
    assert_eq!(
        next_event(&mut rx).await,
        ProgressEvent::Complete { percentage: 100 }
    );
    assert_stream_ends(&mut rx).await;
}

// ---------------------------------------------------------------------------
// Test: engine failure text passes through verbatim
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_job_reports_the_engine_error() {
    let bridge = ComfyUiBridge::new(None);
    let status = ScriptedStatus::new(&[
        Reply::State(JobState::Processing, None),
        Reply::State(JobState::Failed, Some("CUDA out of memory")),
    ]);

    let mut rx = spawn_publisher(bridge, status, "j1".to_string(), fast_config());

    assert_eq!(next_event(&mut rx).await, ProgressEvent::Connected);
    assert_eq!(
        next_event(&mut rx).await,
        ProgressEvent::Error {
            message: "CUDA out of memory".into()
        }
    );
    assert_stream_ends(&mut rx).await;
}

// ---------------------------------------------------------------------------
// Test: unknown jobs fail fast instead of hanging the stream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_closes_immediately_with_an_error() {
    let bridge = ComfyUiBridge::new(None);
    let status = ScriptedStatus::new(&[Reply::Unknown]);

    let mut rx = spawn_publisher(bridge, status, "ghost".to_string(), fast_config());

    assert_eq!(next_event(&mut rx).await, ProgressEvent::Connected);
    assert_eq!(
        next_event(&mut rx).await,
        ProgressEvent::Error {
            message: "Unknown job: ghost".into()
        }
    );
    assert_stream_ends(&mut rx).await;
}

// ---------------------------------------------------------------------------
// Test: persistent status failures eventually close the stream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_poll_failures_emit_a_terminal_error() {
    let bridge = ComfyUiBridge::new(None);
    let status = ScriptedStatus::new(&[Reply::Unavailable]);

    let mut rx = spawn_publisher(bridge, status, "j1".to_string(), fast_config());

    assert_eq!(next_event(&mut rx).await, ProgressEvent::Connected);
    // Three consecutive poll failures (the configured cap), then give up.
    assert_eq!(
        next_event(&mut rx).await,
        ProgressEvent::Error {
            message: "Job status is no longer reachable".into()
        }
    );
    assert_stream_ends(&mut rx).await;
}

// ---------------------------------------------------------------------------
// Test: a job that is already terminal resolves without waiting a poll
// ---------------------------------------------------------------------------

#[tokio::test]
async fn already_completed_job_resolves_from_the_initial_probe() {
    let bridge = ComfyUiBridge::new(None);
    let status = ScriptedStatus::new(&[Reply::State(JobState::Completed, None)]);

    let config = PublisherConfig {
        poll_interval: Duration::from_secs(30),
        ..fast_config()
    };
    let started = tokio::time::Instant::now();
    let mut rx = spawn_publisher(bridge, status, "j1".to_string(), config);

    assert_eq!(next_event(&mut rx).await, ProgressEvent::Connected);
    assert_eq!(
        next_event(&mut rx).await,
        ProgressEvent::Complete { percentage: 100 }
    );
    assert_stream_ends(&mut rx).await;
    // Resolved from the probe, not from a 30s poll tick.
    assert!(started.elapsed() < Duration::from_secs(5));
}

// ---------------------------------------------------------------------------
// Test: percentages may rebase downward once, never after a step sample
// ---------------------------------------------------------------------------

#[tokio::test]
async fn late_aggregates_never_move_progress_backwards() {
    let bridge = ComfyUiBridge::new(None);
    let status = ScriptedStatus::new(&[
        Reply::State(JobState::Processing, None),
        Reply::State(JobState::Completed, None),
    ]);

    let config = PublisherConfig {
        poll_interval: Duration::from_secs(1),
        ..fast_config()
    };
    let mut rx = spawn_publisher(Arc::clone(&bridge), status, "j1".to_string(), config);
    assert_eq!(next_event(&mut rx).await, ProgressEvent::Connected);

    bridge.hub().record_step("j1", ProgressSample::new(10, 20));
    assert_eq!(next_event(&mut rx).await, progress(10, 20, 50));

    // A straggler setup message that would read as "3 of 3 done".
    let nodes = std::iter::once((
        "a".to_string(),
        avatarforge_comfyui::messages::NodeProgress {
            value: Some(3),
            max: Some(3),
            state: Some("finished".into()),
        },
    ))
    .collect();
    bridge.hub().record_node_states("j1", &nodes);

    bridge.hub().record_step("j1", ProgressSample::new(11, 20));
    // The aggregate was discarded: the next event is the step sample.
    assert_eq!(next_event(&mut rx).await, progress(11, 20, 55));

    assert_eq!(
        next_event(&mut rx).await,
        ProgressEvent::Complete { percentage: 100 }
    );
    assert_stream_ends(&mut rx).await;
}
