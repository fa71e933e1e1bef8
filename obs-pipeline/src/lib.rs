//! The staged observation pipeline: tokenizer → timestamp extractor → token mapper → unit
//! converter → duplicate/delta/period filters → condition chainer → sequencer.
//!
//! Module dependency order mirrors [`obs_types`]'s own leaf-to-root layering: value types
//! ([`obs_types`]) at the bottom, individual stages in the middle, [`source`] wiring one
//! source's stages together into an `acto` actor, and [`pipeline`] assembling every source
//! plus the shared ring buffer and checkpoint at the top.

pub mod checkpoint;
pub mod condition_chainer;
pub mod diagnostics;
pub mod filters;
pub mod pipeline;
pub mod protocol_command;
pub mod ring_buffer;
pub mod source;
pub mod timestamp_extractor;
pub mod token_mapper;
pub mod tokenizer;
pub mod transform;
pub mod unit_converter;

pub use checkpoint::Checkpoint;
pub use filters::{DeltaFilter, DuplicateFilter, PeriodFilter, PeriodOutcome};
pub use pipeline::Pipeline;
pub use ring_buffer::RingBuffer;
pub use transform::{Transform, Verdict};

pub use obs_types::{
    data_item::{Category, DataItem, DeviceModel, Representation},
    ids::{DataItemId, DataItemRef, DeviceId},
    observation::{AssetCommand, AssetCommandKind, MappedEntity, Observation, ObservationPayload},
    ConditionLevel, ConditionNode, ParseError, PipelineConfig, PipelineError, Timestamp, Value,
};
