//! Sequencer / ring buffer (spec §4.10).

use obs_types::{Observation, PipelineError};
use parking_lot::{Mutex, RwLock};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Fixed-capacity circular buffer of delivered observations, globally sequenced.
///
/// Writers (there is ever exactly one active writer per `insert` call, serialized by
/// `delivery`) assign the next sequence, write it into `seq % capacity`, and advance
/// `first_sequence` once the buffer has wrapped past capacity. Readers don't take `delivery` at
/// all: each slot has its own `RwLock`, so a read of slot `k` only ever contends with the single
/// write that lands on `k`, not with reads or writes to any other slot (spec §4.10's "lock-free
/// reads for the common case", realized here as per-slot rather than whole-buffer locking).
pub struct RingBuffer {
    capacity: u64,
    slots: Vec<RwLock<Option<Arc<Observation>>>>,
    next_sequence: AtomicU64,
    first_sequence: AtomicU64,
    delivery: Mutex<()>,
}

impl RingBuffer {
    pub fn new(capacity: u64) -> Self {
        assert!(capacity.is_power_of_two(), "ring buffer capacity must be a power of two");
        Self {
            capacity,
            slots: (0..capacity).map(|_| RwLock::new(None)).collect(),
            next_sequence: AtomicU64::new(0),
            first_sequence: AtomicU64::new(1),
            delivery: Mutex::new(()),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Assigns the next sequence number, writes the slot, and advances the retained window.
    /// Returns the now-sequenced observation.
    pub fn insert(&self, obs: Observation) -> Arc<Observation> {
        let _guard = self.delivery.lock();
        let seq = self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let obs = Arc::new(obs.with_sequence(seq));
        let slot = (seq - 1) % self.capacity;
        *self.slots[slot as usize].write() = Some(obs.clone());
        if seq > self.capacity {
            self.first_sequence.store(seq - self.capacity + 1, Ordering::SeqCst);
        }
        obs
    }

    pub fn last_sequence(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst)
    }

    pub fn first_sequence(&self) -> u64 {
        self.first_sequence.load(Ordering::SeqCst)
    }

    /// Reads one historical observation by sequence number.
    pub fn at(&self, sequence: u64) -> Result<Arc<Observation>, PipelineError> {
        let first = self.first_sequence();
        let last = self.last_sequence();
        if sequence == 0 || sequence < first || sequence > last {
            return Err(PipelineError::BufferOverrun { requested: sequence, first, last });
        }
        let slot = (sequence - 1) % self.capacity;
        let snapshot = self.slots[slot as usize].read().clone();
        match snapshot {
            Some(obs) if obs.sequence == Some(sequence) => Ok(obs),
            _ => {
                // the slot was overwritten between the bounds check and the read; report the
                // window as it stands now rather than the stale one we started with
                let first = self.first_sequence();
                let last = self.last_sequence();
                Err(PipelineError::BufferOverrun { requested: sequence, first, last })
            }
        }
    }

    /// Ordered, lazy `[from, to]` read; stops as soon as a sequence falls outside the retained
    /// window (callers restart a `range` from the last sequence they actually got back).
    pub fn range(&self, from: u64, to: u64) -> Vec<Arc<Observation>> {
        (from..=to).map_while(|seq| self.at(seq).ok()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obs_types::{
        data_item::{Category, DataItem},
        ids::DataItemId,
        observation::ObservationPayload,
        timestamp::{ArrivalOrdinal, Timestamp},
        Value,
    };

    fn obs(n: u64) -> Observation {
        let di = Arc::new(DataItem::new(DataItemId::new("Xpos").unwrap(), "Xpos", Category::Sample, "POSITION"));
        Observation::new(di, Timestamp::new(n), ArrivalOrdinal(n), ObservationPayload::Sample { value: Value::Double(n as f64) })
    }

    #[test]
    fn sequence_numbers_start_at_one_and_increase() {
        let rb = RingBuffer::new(8);
        let a = rb.insert(obs(1));
        let b = rb.insert(obs(2));
        assert_eq!(a.sequence, Some(1));
        assert_eq!(b.sequence, Some(2));
    }

    #[test]
    fn wrap_at_capacity_advances_first_sequence() {
        let rb = RingBuffer::new(8);
        for i in 0..12 {
            rb.insert(obs(i));
        }
        assert_eq!(rb.first_sequence(), 5);
        assert_eq!(rb.last_sequence(), 12);
        assert!(rb.at(3).is_err());
        let seventh = rb.at(7).unwrap();
        assert_eq!(seventh.sequence, Some(7));
    }

    #[test]
    fn range_stops_at_the_retained_window_edge() {
        let rb = RingBuffer::new(8);
        for i in 0..12 {
            rb.insert(obs(i));
        }
        let got = rb.range(3, 9);
        let sequences: Vec<u64> = got.iter().filter_map(|o| o.sequence).collect();
        assert_eq!(sequences, vec![5, 6, 7, 8, 9]);
    }
}
