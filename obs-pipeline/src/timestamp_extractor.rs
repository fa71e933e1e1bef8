//! Timestamp extraction and normalization (spec §4.3).

use chrono::{DateTime, Utc};
use obs_types::{ArrivalOrdinal, PipelineError, Timestamp};

/// How a source's timestamp token should be interpreted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimeMode {
    /// The token is taken as-is (the default).
    Absolute,
    /// The token is a monotonically increasing device-clock offset, rebased onto wall-clock
    /// time on first use (spec §4.3).
    Relative,
}

struct RelativeState {
    origin_device_ts: Timestamp,
    base_wall: Timestamp,
    last_offset_seconds: f64,
}

/// The result of extracting one timestamp token.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtractedTimestamp {
    pub timestamp: Timestamp,
    pub arrival: ArrivalOrdinal,
    /// The measurement duration attached via an `@<seconds>` suffix, if any.
    pub duration: Option<f64>,
}

/// Normalizes SHDR timestamp tokens and stamps each with a monotonic arrival ordinal.
///
/// One instance per source strand: `Relative` mode's rebasing state is sequential by
/// construction (spec §5).
pub struct TimestampExtractor {
    mode: TimeMode,
    relative: Option<RelativeState>,
    next_arrival: u64,
}

impl TimestampExtractor {
    pub fn new(mode: TimeMode) -> Self {
        Self {
            mode,
            relative: None,
            next_arrival: 0,
        }
    }

    pub fn set_mode(&mut self, mode: TimeMode) {
        if mode != self.mode {
            self.mode = mode;
            self.relative = None;
        }
    }

    /// Parses `token` (the tokenizer's timestamp candidate) and assigns the next arrival
    /// ordinal.
    pub fn extract(&mut self, token: &str) -> Result<ExtractedTimestamp, PipelineError> {
        let arrival = ArrivalOrdinal(self.next_arrival);
        self.next_arrival += 1;

        if token.is_empty() {
            let timestamp = match self.mode {
                TimeMode::Absolute => Timestamp::now(),
                TimeMode::Relative => self.advance_relative(Timestamp::now()),
            };
            return Ok(ExtractedTimestamp { timestamp, arrival, duration: None });
        }

        let (ts_part, duration) = match token.split_once('@') {
            Some((ts, dur)) => (
                ts,
                Some(dur.parse::<f64>().map_err(|e| PipelineError::ValueParseError {
                    data_item: "<timestamp>".to_owned(),
                    reason: format!("invalid duration suffix `{dur}`: {e}"),
                })?),
            ),
            None => (token, None),
        };

        let parsed = parse_iso8601(ts_part).map_err(|reason| PipelineError::ValueParseError {
            data_item: "<timestamp>".to_owned(),
            reason,
        })?;

        let timestamp = match self.mode {
            TimeMode::Absolute => parsed,
            TimeMode::Relative => self.advance_relative(parsed),
        };

        Ok(ExtractedTimestamp { timestamp, arrival, duration })
    }

    fn advance_relative(&mut self, device_ts: Timestamp) -> Timestamp {
        match self.relative.as_mut() {
            None => {
                let base_wall = Timestamp::now();
                self.relative = Some(RelativeState {
                    origin_device_ts: device_ts,
                    base_wall,
                    last_offset_seconds: 0.0,
                });
                base_wall
            }
            Some(state) => {
                let offset = device_ts.seconds_since(state.origin_device_ts);
                if offset < state.last_offset_seconds {
                    // non-monotonic offset: the device clock jumped backwards, rebase
                    let base_wall = Timestamp::now();
                    *state = RelativeState {
                        origin_device_ts: device_ts,
                        base_wall,
                        last_offset_seconds: 0.0,
                    };
                    base_wall
                } else {
                    state.last_offset_seconds = offset;
                    state.base_wall.offset_seconds(offset)
                }
            }
        }
    }
}

fn parse_iso8601(s: &str) -> Result<Timestamp, String> {
    let dt: DateTime<Utc> = s
        .parse::<DateTime<Utc>>()
        .map_err(|e| format!("invalid ISO-8601 timestamp `{s}`: {e}"))?;
    Ok(Timestamp::from(dt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_mode_parses_microsecond_precision() {
        let mut e = TimestampExtractor::new(TimeMode::Absolute);
        let out = e.extract("2021-01-22T12:33:45.123Z").unwrap();
        assert_eq!(out.timestamp.to_string(), "2021-01-22T12:33:45.123000Z");
        assert_eq!(out.arrival, ArrivalOrdinal(0));
    }

    #[test]
    fn duration_suffix_is_parsed_separately_from_timestamp() {
        let mut e = TimestampExtractor::new(TimeMode::Absolute);
        let out = e.extract("2021-01-22T12:33:45Z@0.5").unwrap();
        assert_eq!(out.duration, Some(0.5));
    }

    #[test]
    fn empty_token_uses_receipt_time() {
        let mut e = TimestampExtractor::new(TimeMode::Absolute);
        let before = Timestamp::now();
        let out = e.extract("").unwrap();
        assert!(out.timestamp >= before);
    }

    #[test]
    fn arrival_ordinal_is_strictly_increasing() {
        let mut e = TimestampExtractor::new(TimeMode::Absolute);
        let a = e.extract("2021-01-22T12:33:45Z").unwrap().arrival;
        let b = e.extract("2021-01-22T12:33:45Z").unwrap().arrival;
        assert!(b.0 > a.0);
    }

    #[test]
    fn relative_mode_rebases_onto_wall_clock() {
        let mut e = TimestampExtractor::new(TimeMode::Relative);
        let first = e.extract("2000-01-01T00:00:00Z").unwrap().timestamp;
        let second = e.extract("2000-01-01T00:00:01Z").unwrap().timestamp;
        // one second of device-clock advance should show up as one second of wall-clock advance
        assert!((second.seconds_since(first) - 1.0).abs() < 0.01);
        // and it should be rebased near "now", not parsed literally as year 2000
        assert!(first.seconds_since(Timestamp::new(0)) > 1_000_000_000.0);
    }

    #[test]
    fn relative_mode_resets_base_on_non_monotonic_offset() {
        let mut e = TimestampExtractor::new(TimeMode::Relative);
        let first = e.extract("2000-01-01T00:00:10Z").unwrap().timestamp;
        // going backwards resets the base, so the new reading is re-pinned near "now" again
        let second = e.extract("2000-01-01T00:00:05Z").unwrap().timestamp;
        assert!((second.seconds_since(first)).abs() < 0.5);
    }
}
