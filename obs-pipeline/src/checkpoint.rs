//! Checkpoint (spec §3, §4.10): latest observation per data item, plus change notification.

use obs_futures_util::{LatestValue, LatestValueSubscriber};
use obs_types::{ids::DataItemId, Observation};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

/// The "current value of everything" view sinks read via `current()`, kept in lockstep with the
/// ring buffer: every insert updates exactly one entry here before notifying subscribers.
pub struct Checkpoint {
    latest: RwLock<HashMap<DataItemId, Arc<Observation>>>,
    sequence_notifier: LatestValue<u64>,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self {
            latest: RwLock::new(HashMap::new()),
            sequence_notifier: LatestValue::new(0),
        }
    }

    /// Records `obs` as the latest for its data item and wakes anything subscribed to
    /// `subscribe_sequence`.
    pub fn record(&self, obs: &Arc<Observation>) {
        self.latest.write().insert(obs.data_item.id.clone(), obs.clone());
        self.sequence_notifier.set(obs.sequence.unwrap_or(0));
    }

    /// A point-in-time snapshot of every data item's latest observation.
    pub fn current(&self) -> HashMap<DataItemId, Arc<Observation>> {
        self.latest.read().clone()
    }

    pub fn get(&self, id: &DataItemId) -> Option<Arc<Observation>> {
        self.latest.read().get(id).cloned()
    }

    /// A stream of the latest delivered sequence number, for sinks implementing `subscribe` by
    /// waking up and draining the ring buffer from their own cursor (spec §6).
    pub fn subscribe_sequence(&self) -> LatestValueSubscriber<u64> {
        self.sequence_notifier.subscribe()
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::new()
    }
}
