use crate::ids::DataItemId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The observation families a data item can produce (spec §3, §4.4).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Sample,
    Event,
    Condition,
    /// Text message with an adapter-assigned native code; always two tokens wide.
    Message,
}

/// The shape of the value a data item reports.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Representation {
    /// A single scalar (string, integer, or double) per observation.
    Value,
    /// A fixed-count vector sampled at a declared rate.
    Timeseries,
    /// A map of key/value pairs, with `:key` removal tombstones.
    DataSet,
    /// A map of rows, each itself a map of key/value pairs.
    Table,
}

/// An immutable, process-lifetime descriptor for a single device data channel.
///
/// Owned by the (external) device model; the pipeline only ever holds `Arc<DataItem>`
/// resolved lookups, never a mutable reference, per the immutability invariant in spec §3.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataItem {
    pub id: DataItemId,
    pub name: String,
    pub category: Category,
    #[serde(rename = "type")]
    pub type_: String,
    pub sub_type: Option<String>,
    pub units: Option<String>,
    pub native_units: Option<String>,
    pub native_scale: Option<f64>,
    /// Rate-limiting period, in seconds, for the period filter (spec §4.8).
    pub filter_period: Option<f64>,
    /// Minimum absolute change required to forward a sample (spec §4.7).
    pub minimum_delta: Option<f64>,
    pub representation: Representation,
}

impl DataItem {
    pub fn new(id: DataItemId, name: impl Into<String>, category: Category, type_: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            category,
            type_: type_.into(),
            sub_type: None,
            units: None,
            native_units: None,
            native_scale: None,
            filter_period: None,
            minimum_delta: None,
            representation: Representation::Value,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>, native_units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self.native_units = Some(native_units.into());
        self
    }

    pub fn with_native_scale(mut self, scale: f64) -> Self {
        self.native_scale = Some(scale);
        self
    }

    pub fn with_filter_period(mut self, seconds: f64) -> Self {
        self.filter_period = Some(seconds);
        self
    }

    pub fn with_minimum_delta(mut self, delta: f64) -> Self {
        self.minimum_delta = Some(delta);
        self
    }

    pub fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }

    /// Whether a unit conversion is actually needed (spec §4.5: "applies only when
    /// `nativeUnits != units`").
    pub fn needs_conversion(&self) -> bool {
        match (&self.units, &self.native_units) {
            (Some(u), Some(n)) => u != n,
            _ => false,
        }
    }
}

/// Looks up [`DataItem`] descriptors by id, optionally scoped to a device.
///
/// The real implementation (XML device-model loading, entity/factory validation) is explicitly
/// out of scope for this crate (spec §1); the pipeline only consumes this trait.
pub trait DeviceModel: Send + Sync {
    fn resolve(&self, device: Option<&str>, data_item: &str) -> Option<Arc<DataItem>>;
    fn all_data_items(&self) -> Vec<Arc<DataItem>>;
}
