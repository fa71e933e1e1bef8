use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use derive_more::{From, Into};
use serde::{Deserialize, Serialize};
use std::{
    convert::TryFrom,
    fmt::{self, Display, Formatter},
    time::{SystemTime, UNIX_EPOCH},
};

/// Microseconds since the UNIX epoch, without leap seconds and in UTC.
///
/// ```
/// use obs_types::Timestamp;
///
/// let t = Timestamp::now();
/// let micros: u64 = t.into();
/// assert_eq!(Timestamp::from(micros), t);
/// ```
#[derive(Copy, Clone, Debug, Default, From, Into, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const fn new(micros: u64) -> Self {
        Self(micros)
    }

    pub fn now() -> Self {
        SystemTime::now().try_into().expect("system clock before UNIX epoch")
    }

    pub fn as_i64(self) -> i64 {
        self.0 as i64
    }

    /// Adds a duration expressed in fractional seconds, saturating at zero on underflow.
    pub fn offset_seconds(self, seconds: f64) -> Self {
        let micros = (seconds * 1_000_000.0).round();
        if micros >= 0.0 {
            Self(self.0.saturating_add(micros as u64))
        } else {
            Self(self.0.saturating_sub((-micros) as u64))
        }
    }

    /// Seconds elapsed from `earlier` to `self`, negative if `self` precedes `earlier`.
    pub fn seconds_since(self, earlier: Timestamp) -> f64 {
        (self.as_i64() - earlier.as_i64()) as f64 / 1_000_000.0
    }
}

impl TryFrom<SystemTime> for Timestamp {
    type Error = anyhow::Error;

    fn try_from(st: SystemTime) -> Result<Self, Self::Error> {
        let duration = st.duration_since(UNIX_EPOCH)?;
        Ok(Self::new(duration.as_micros() as u64))
    }
}

impl TryFrom<Timestamp> for DateTime<Utc> {
    type Error = anyhow::Error;

    fn try_from(ts: Timestamp) -> Result<Self, Self::Error> {
        Utc.timestamp_micros(ts.as_i64())
            .single()
            .ok_or_else(|| anyhow::anyhow!("timestamp {} is out of range for DateTime<Utc>", ts.0))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        let seconds = dt.timestamp() as i64;
        let micros = seconds * 1_000_000 + dt.timestamp_subsec_micros() as i64;
        Self(micros.max(0) as u64)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match DateTime::<Utc>::try_from(*self) {
            Ok(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Micros, true)),
            Err(_) => write!(f, "{}us", self.0),
        }
    }
}

/// An arrival ordinal, used to break ties between observations that carry identical timestamps.
///
/// Assigned by the timestamp extractor, strictly increasing per source.
#[derive(Copy, Clone, Debug, Default, From, Into, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArrivalOrdinal(pub u64);
