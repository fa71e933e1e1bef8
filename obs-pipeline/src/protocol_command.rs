//! Protocol-command handler (spec §4.11).

use crate::timestamp_extractor::TimeMode;

/// The per-source options a `* key : value` line can set directly.
#[derive(Clone, Debug, PartialEq)]
pub enum ProtocolCommand {
    ConversionRequired(bool),
    RelativeTime(TimeMode),
    RealTime(bool),
    Device(String),
    ShdrVersion(String),
    /// A recognized-but-external key, forwarded as-is (spec §4.11: "forwarded to an external
    /// command handler").
    Other { key: String, value: String },
}

/// Parses one already-split `(key, value)` pair (from [`crate::tokenizer::TokenizedLine::Command`])
/// into a [`ProtocolCommand`].
pub fn parse(key: &str, value: &str) -> ProtocolCommand {
    match key.to_ascii_lowercase().as_str() {
        "conversionrequired" => ProtocolCommand::ConversionRequired(parse_bool(value)),
        "relativetime" => ProtocolCommand::RelativeTime(if parse_bool(value) { TimeMode::Relative } else { TimeMode::Absolute }),
        "realtime" => ProtocolCommand::RealTime(parse_bool(value)),
        "device" => ProtocolCommand::Device(value.to_owned()),
        "shdrversion" => ProtocolCommand::ShdrVersion(value.to_owned()),
        _ => ProtocolCommand::Other { key: key.to_owned(), value: value.to_owned() },
    }
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_relative_time() {
        assert_eq!(parse("relativeTime", "true"), ProtocolCommand::RelativeTime(TimeMode::Relative));
        assert_eq!(parse("relativeTime", "false"), ProtocolCommand::RelativeTime(TimeMode::Absolute));
    }

    #[test]
    fn is_case_insensitive_on_the_key() {
        assert_eq!(parse("ConversionRequired", "true"), ProtocolCommand::ConversionRequired(true));
    }

    #[test]
    fn unknown_keys_are_forwarded() {
        assert_eq!(
            parse("calibration", "42"),
            ProtocolCommand::Other { key: "calibration".to_string(), value: "42".to_string() }
        );
    }
}
