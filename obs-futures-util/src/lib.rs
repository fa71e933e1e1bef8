//! Stream/notification primitives shared between the sequencer and the sink-facing API.
//!
//! This crate intentionally stays small: it carries only the generic plumbing the pipeline
//! crate's checkpoint and ring-buffer subscription machinery is built on, not any
//! pipeline-specific logic.

pub mod broadcast;

pub use broadcast::{LatestValue, LatestValueSubscriber};
