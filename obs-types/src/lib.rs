//! Canonical value, data-item and observation types shared across the observation pipeline.
//!
//! This crate holds no transform logic; it is the leaf of the dependency order described in
//! the pipeline crate's module documentation: value types → checkpoint primitives → transforms.

pub mod condition;
pub mod config;
pub mod data_item;
pub mod error;
pub mod ids;
pub mod observation;
pub mod timestamp;
pub mod value;

pub use condition::{ConditionLevel, ConditionNode};
pub use config::PipelineConfig;
pub use data_item::{Category, DataItem, DeviceModel, Representation};
pub use error::{ParseError, PipelineError};
pub use ids::{DataItemId, DataItemRef, DeviceId};
pub use observation::{AssetCommand, AssetCommandKind, MappedEntity, Observation, ObservationPayload, Properties};
pub use timestamp::{ArrivalOrdinal, Timestamp};
pub use value::{DataSetEntry, Value};
