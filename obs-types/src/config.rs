use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_buffer_size() -> usize {
    131_072
}

/// The configuration options recognized by the pipeline (spec §6).
///
/// This is the boundary between the (external, out-of-scope) configuration-file parser and the
/// pipeline: the pipeline only ever consumes an already-parsed `PipelineConfig`, it never reads
/// environment variables or files itself (spec §4.13).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PipelineConfig {
    #[serde(default)]
    pub filter_duplicates: bool,
    #[serde(default = "default_true")]
    pub upcase_data_item_value: bool,
    #[serde(default)]
    pub relative_time: bool,
    #[serde(default = "default_true")]
    pub conversion_required: bool,
    #[serde(default)]
    pub auto_available: bool,
    /// External adapter concern; carried through unused so configuration round-trips intact.
    #[serde(default)]
    pub reconnect_interval_ms: Option<u64>,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            filter_duplicates: false,
            upcase_data_item_value: true,
            relative_time: false,
            conversion_required: true,
            auto_available: false,
            reconnect_interval_ms: None,
            buffer_size: default_buffer_size(),
        }
    }
}

impl PipelineConfig {
    /// Validates the one invariant the spec actually requires of `BufferSize` (spec §4.10,
    /// §6: "power-of-two integer").
    pub fn validate(&self) -> Result<(), String> {
        if !self.buffer_size.is_power_of_two() {
            return Err(format!("BufferSize must be a power of two, got {}", self.buffer_size));
        }
        Ok(())
    }
}
