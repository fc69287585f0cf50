/// Engine-assigned identifier for one queued generation job.
///
/// Opaque to the bridge; it is whatever string the engine returns when
/// a workflow is accepted, and it keys all per-job state.
pub type PromptId = String;

/// One progress measurement: `value` of `max` discrete units done.
///
/// Samples are compared only by arrival order, never by magnitude --
/// a smaller `max` means a different *kind* of progress (setup
/// bookkeeping vs. inference steps), not an earlier point in time.
/// Out-of-order delivery can make `value` temporarily exceed `max`;
/// consumers must clamp rather than reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    /// Completed units of work.
    pub value: i32,
    /// Total units of work for this phase.
    pub max: i32,
}

impl ProgressSample {
    pub fn new(value: i32, max: i32) -> Self {
        Self { value, max }
    }
}
