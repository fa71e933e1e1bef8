use crate::{
    condition::{ConditionLevel, ConditionNode},
    data_item::DataItem,
    ids::DeviceId,
    timestamp::{ArrivalOrdinal, Timestamp},
    value::Value,
};
use std::sync::Arc;

/// Common, representation-independent bookkeeping carried on every observation (spec §3).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Properties {
    pub sub_type: Option<String>,
    pub native_code: Option<String>,
    pub qualifier: Option<String>,
    pub severity: Option<String>,
    pub reset_triggered: bool,
    /// Measurement duration attached via the `@<seconds>` timestamp suffix (spec §4.3).
    pub duration: Option<f64>,
}

/// The per-family payload of an observation (spec §3, §9 "tagged variant").
#[derive(Clone, Debug, PartialEq)]
pub enum ObservationPayload {
    Sample { value: Value },
    Event { value: Value },
    Condition {
        level: ConditionLevel,
        /// The new head of the per-data-item condition chain after this update (spec §4.9).
        head: Arc<ConditionNode>,
    },
    Message { native_code: String, text: String },
    DataSet { value: Value },
    Timeseries { count: u32, sample_rate: f64, values: Vec<f64> },
}

/// A single, time-stamped report for a data item (spec §3).
///
/// `sequence` is `None` until the observation has passed through the sequencer (spec §4.10); it
/// is assigned exactly once and never changes afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub data_item: Arc<DataItem>,
    pub timestamp: Timestamp,
    pub arrival: ArrivalOrdinal,
    pub sequence: Option<u64>,
    pub payload: ObservationPayload,
    pub properties: Properties,
}

impl Observation {
    pub fn new(data_item: Arc<DataItem>, timestamp: Timestamp, arrival: ArrivalOrdinal, payload: ObservationPayload) -> Self {
        Self {
            data_item,
            timestamp,
            arrival,
            sequence: None,
            payload,
            properties: Properties::default(),
        }
    }

    /// The scalar value, for families that carry one (`Sample`, `Event`, `DataSet`); `None` for
    /// `Condition`, `Message` and `Timeseries`, which have their own shape.
    pub fn value(&self) -> Option<&Value> {
        match &self.payload {
            ObservationPayload::Sample { value }
            | ObservationPayload::Event { value }
            | ObservationPayload::DataSet { value } => Some(value),
            _ => None,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }
}

/// A pseudo-data-item command (`@ASSET@`, `@UPDATE_ASSET@`, `@REMOVE_ASSET@`,
/// `@REMOVE_ALL_ASSETS@`) that bypasses the filter/chainer stages entirely (spec §4.4).
#[derive(Clone, Debug, PartialEq)]
pub struct AssetCommand {
    pub device: Option<DeviceId>,
    pub kind: AssetCommandKind,
    pub timestamp: Timestamp,
    pub arrival: ArrivalOrdinal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetCommandKind {
    Add { asset_id: String, body: String },
    Update { asset_id: String, body: String },
    Remove { asset_id: String },
    RemoveAll,
}

/// What a single logical field produced, once tokenized and resolved: a ready-to-filter
/// observation, an out-of-band asset command, or nothing (see `MapOutcome` in the pipeline
/// crate for the full "produced | skip | error" result this feeds into, per spec §9).
#[derive(Clone, Debug, PartialEq)]
pub enum MappedEntity {
    Observation(Box<Observation>),
    Asset(Box<AssetCommand>),
}
