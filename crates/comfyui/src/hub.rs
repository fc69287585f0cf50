//! Per-job progress reconciliation and subscriber fan-out.
//!
//! [`ProgressHub`] is the single owner of all mutable bridge state:
//! the subscriber lists and the per-job step-sample cache. Step-level
//! ("granular") samples always win and are cached; per-node setup
//! ("aggregate") samples pass through only until the first step sample
//! has been seen for that job, after which they are discarded for the
//! rest of the job's lifetime. Without that latch, a late setup
//! message (max 3) arriving after real inference progress (max 20)
//! would make the externally visible percentage jump backwards --
//! or worse, leap to a false 100%.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use avatarforge_core::types::{ProgressSample, PromptId};
use tokio::sync::mpsc;

use crate::messages::NodeProgress;

/// Fan-out and reconciliation state for all jobs, shared via `Arc`.
pub struct ProgressHub {
    state: Mutex<HubState>,
}

#[derive(Default)]
struct HubState {
    /// Interested consumers, keyed by job. A job with an empty list
    /// never exists in the map -- the last unsubscribe removes the key.
    subscribers: HashMap<PromptId, Vec<Subscriber>>,
    /// Most recent step-level sample per job. Presence of an entry is
    /// the latch that suppresses aggregate samples for that job.
    last_step: HashMap<PromptId, ProgressSample>,
    next_id: u64,
}

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<ProgressSample>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HubState::default()),
        }
    }

    /// Register interest in a job's reconciled progress samples.
    ///
    /// Returns a guard that unsubscribes on drop, plus the receiving
    /// half of the sample channel. Samples are delivered in the order
    /// the receive loop observed them.
    pub fn subscribe(
        self: &Arc<Self>,
        prompt_id: &str,
    ) -> (JobSubscription, mpsc::UnboundedReceiver<ProgressSample>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;
            state
                .subscribers
                .entry(prompt_id.to_string())
                .or_default()
                .push(Subscriber { id, tx });
            id
        };

        tracing::debug!(prompt_id, subscriber_id = id, "Progress subscriber added");

        let guard = JobSubscription {
            hub: Arc::clone(self),
            prompt_id: prompt_id.to_string(),
            id,
        };
        (guard, rx)
    }

    /// Record a step-level sample and deliver it to the job's subscribers.
    ///
    /// Step samples are always trusted: last write wins, and the cached
    /// entry permanently suppresses aggregate samples for this job.
    pub fn record_step(&self, prompt_id: &str, sample: ProgressSample) {
        let mut state = self.lock();
        state.last_step.insert(prompt_id.to_string(), sample);
        Self::fan_out(&mut state, prompt_id, sample);
    }

    /// Reconcile a per-node aggregate update.
    ///
    /// Discarded outright once a step sample exists for the job. Before
    /// that, node counters with both fields present are summed into one
    /// sample and delivered -- but never cached, so aggregate data can
    /// never become the authoritative state.
    pub fn record_node_states(&self, prompt_id: &str, nodes: &HashMap<String, NodeProgress>) {
        let mut state = self.lock();
        if state.last_step.contains_key(prompt_id) {
            tracing::trace!(prompt_id, "Discarding aggregate progress after step progress");
            return;
        }

        let mut value = 0i32;
        let mut max = 0i32;
        for node in nodes.values() {
            if let (Some(v), Some(m)) = (node.value, node.max) {
                value += v;
                max += m;
            }
        }
        if max == 0 {
            return;
        }

        Self::fan_out(&mut state, prompt_id, ProgressSample::new(value, max));
    }

    /// Drop the cached step samples for every job.
    ///
    /// Called when the shared connection is torn down; a fresh
    /// connection starts with no latches set. Subscribers are left
    /// alone -- their lifetime belongs to the consumers.
    pub fn clear_reconciliation(&self) {
        let mut state = self.lock();
        let count = state.last_step.len();
        state.last_step.clear();
        if count > 0 {
            tracing::debug!(count, "Cleared per-job reconciliation state");
        }
    }

    fn unsubscribe(&self, prompt_id: &str, id: u64) {
        let mut state = self.lock();
        let Some(subs) = state.subscribers.get_mut(prompt_id) else {
            return;
        };
        subs.retain(|s| s.id != id);
        if subs.is_empty() {
            state.subscribers.remove(prompt_id);
            state.last_step.remove(prompt_id);
            tracing::debug!(prompt_id, "Last subscriber gone, purged job state");
        }
    }

    /// Deliver a sample to every subscriber of a job, pruning any whose
    /// receiver has gone away so one dead consumer cannot wedge the rest.
    fn fan_out(state: &mut HubState, prompt_id: &str, sample: ProgressSample) {
        if let Some(subs) = state.subscribers.get_mut(prompt_id) {
            subs.retain(|s| s.tx.send(sample).is_ok());
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        // A panic while holding the lock leaves only stale progress
        // caches behind; recover the data rather than poisoning every
        // future subscriber.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII handle for one subscription. Dropping it removes exactly this
/// subscriber; when the job's subscriber list empties, the job's cached
/// step sample is purged as well.
pub struct JobSubscription {
    hub: Arc<ProgressHub>,
    prompt_id: PromptId,
    id: u64,
}

impl Drop for JobSubscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(&self.prompt_id, self.id);
    }
}
