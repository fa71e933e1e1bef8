use std::fmt;

/// Validation failures for the scalar identifier newtypes in [`crate::ids`].
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Error)]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseError {
    pub fn invalid_id(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} id: `{}`", self.kind, self.value)
    }
}

/// The error taxonomy for the observation pipeline (see spec §7).
///
/// None of these ever abort the pipeline: each is handled at its origin per the policy
/// documented on the variant, and only surfaces here so that diagnostics and tests can
/// observe what happened.
#[derive(Debug, Clone, derive_more::Error)]
pub enum PipelineError {
    /// The tokenizer could not produce a timestamp candidate and at least one field token.
    MalformedLine {
        #[error(ignore)]
        source: String,
        #[error(ignore)]
        reason: String,
    },
    /// The token mapper could not resolve a `device:data_item` reference.
    UnknownDataItem {
        #[error(ignore)]
        data_item: String,
        #[error(ignore)]
        device: Option<String>,
    },
    /// Representation-specific parsing of a field's tokens failed; the observation is still
    /// produced, with value `Unavailable`.
    ValueParseError {
        #[error(ignore)]
        data_item: String,
        #[error(ignore)]
        reason: String,
    },
    /// No compositional path exists from `native_units` to `units` in the conversion table.
    ConversionError {
        #[error(ignore)]
        native_units: String,
        #[error(ignore)]
        units: String,
    },
    /// A sink's read cursor fell outside the ring buffer's retained window.
    BufferOverrun {
        #[error(ignore)]
        requested: u64,
        #[error(ignore)]
        first: u64,
        #[error(ignore)]
        last: u64,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::MalformedLine { source, reason } => {
                write!(f, "malformed line from source `{source}`: {reason}")
            }
            PipelineError::UnknownDataItem { data_item, device: Some(device) } => {
                write!(f, "unknown data item `{data_item}` on device `{device}`")
            }
            PipelineError::UnknownDataItem { data_item, device: None } => {
                write!(f, "unknown data item `{data_item}`")
            }
            PipelineError::ValueParseError { data_item, reason } => {
                write!(f, "failed to parse value for data item `{data_item}`: {reason}")
            }
            PipelineError::ConversionError { native_units, units } => {
                write!(f, "no unit conversion from `{native_units}` to `{units}`")
            }
            PipelineError::BufferOverrun { requested, first, last } => {
                write!(f, "requested sequence {requested} is outside retained window [{first}, {last}]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_data_item_formats_with_device() {
        let e = PipelineError::UnknownDataItem {
            data_item: "Xpos".into(),
            device: Some("mill-1".into()),
        };
        assert_eq!(e.to_string(), "unknown data item `Xpos` on device `mill-1`");
    }

    #[test]
    fn unknown_data_item_formats_without_device() {
        let e = PipelineError::UnknownDataItem {
            data_item: "Xpos".into(),
            device: None,
        };
        assert_eq!(e.to_string(), "unknown data item `Xpos`");
    }
}
