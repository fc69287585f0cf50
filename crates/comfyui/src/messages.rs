//! ComfyUI WebSocket message types and parser.
//!
//! The engine sends JSON messages over WebSocket with the shape
//! `{"type": "<kind>", "data": {...}}`. This module deserializes the
//! three progress shapes the bridge understands into a strongly-typed
//! [`ComfyUiMessage`] enum. Everything else collapses into
//! [`ComfyUiMessage::Unknown`] so that new engine message types never
//! break the receive loop.

use std::collections::HashMap;

use serde::Deserialize;

/// Engine WebSocket messages relevant to progress tracking.
///
/// Deserialized via the adjacently-tagged `"type"` field with
/// associated `"data"` content. Unrecognized `"type"` values map to
/// [`Unknown`](Self::Unknown) rather than a parse error.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ComfyUiMessage {
    /// Legacy single-step progress. Older engine builds omit the
    /// `prompt_id`, in which case the frame cannot be attributed to a
    /// job and is dropped.
    #[serde(rename = "progress")]
    Progress(LegacyProgressData),

    /// Per-step progress in the newer envelope. Same semantics as
    /// [`Progress`](Self::Progress), always job-attributed.
    #[serde(rename = "step_progress")]
    StepProgress(StepProgressData),

    /// Per-node setup progress: one entry per workflow node, each with
    /// its own counters. Summed by the reconciler into a single sample.
    #[serde(rename = "progress_state")]
    ProgressState(ProgressStateData),

    /// Any message type the bridge does not understand.
    #[serde(other)]
    Unknown,
}

/// Payload for legacy `progress` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyProgressData {
    /// Current step number.
    pub value: i32,
    /// Total number of steps.
    pub max: i32,
    /// Job the step belongs to. Absent on some engine versions.
    #[serde(default)]
    pub prompt_id: Option<String>,
}

/// Payload for `step_progress` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct StepProgressData {
    pub value: i32,
    pub max: i32,
    pub prompt_id: String,
}

/// Payload for `progress_state` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressStateData {
    pub prompt_id: String,
    /// Per-node progress keyed by node id.
    #[serde(default)]
    pub nodes: HashMap<String, NodeProgress>,
}

/// Progress counters for a single workflow node.
///
/// The engine populates these incrementally; either counter may be
/// missing while a node is still being scheduled.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeProgress {
    #[serde(default)]
    pub value: Option<i32>,
    #[serde(default)]
    pub max: Option<i32>,
    /// Node execution state label (e.g. `"running"`, `"finished"`).
    #[serde(default)]
    pub state: Option<String>,
}

/// Parse an engine WebSocket text message into a typed enum.
///
/// Returns `Err` only for malformed JSON or a known type with a bad
/// payload; unknown `type` values succeed as
/// [`ComfyUiMessage::Unknown`]. Callers log failures and continue.
pub fn parse_message(text: &str) -> Result<ComfyUiMessage, serde_json::Error> {
    serde_json::from_str(text)
}
