//! Period filter (spec §4.8): the "bucket-at-end" rate limiter.
//!
//! Unlike the other filters, a delayed delivery can't be expressed as a single
//! `Transform::apply` call — it has to surface again later, off of a timer, with no new input
//! observation driving it. This type is therefore not itself a [`crate::transform::Transform`];
//! the source strand (spec §5) owns it directly, feeding it observations and timer fires and
//! arming `tokio::time::sleep` for whatever delay it asks for.

use obs_types::{ids::DataItemId, Observation, Value};
use std::{collections::HashMap, time::Duration};

struct ItemState {
    last_ts_seconds: f64,
    pending: Option<Observation>,
    /// Seconds from `pending`'s own timestamp to the bucket boundary it's scheduled to fire at;
    /// used to advance `last_ts_seconds` correctly whichever way the pending is flushed.
    delta: f64,
    /// Bumped every time a new timer is armed; a fire carrying a stale generation is ignored
    /// (spec §5: "timers carry the data-item id, not a direct reference").
    generation: u64,
}

/// What the caller should do in response to one call into the filter.
pub enum PeriodOutcome {
    /// No period declared, or the value is `UNAVAILABLE` (which also clears state): pass
    /// straight through.
    Deliver(Observation),
    /// Held; arm (or re-arm) a timer for `after`, tagged with `generation`.
    Hold { after: Duration, generation: u64 },
    /// Case 3 (swap): deliver `flushed` immediately, then arm a timer for the new pending.
    DeliverAndHold { flushed: Observation, after: Duration, generation: u64 },
    /// Case 4: both are delivered immediately, in order; no timer to arm.
    DeliverBoth { first: Observation, second: Observation },
}

#[derive(Default)]
pub struct PeriodFilter {
    state: HashMap<DataItemId, ItemState>,
}

impl PeriodFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_observation(&mut self, obs: Observation) -> PeriodOutcome {
        let Some(period) = obs.data_item.filter_period.filter(|p| *p > 0.0) else {
            return PeriodOutcome::Deliver(obs);
        };
        let id = obs.data_item.id.clone();
        let now = obs.timestamp.as_i64() as f64 / 1_000_000.0;

        if obs.value().map(Value::is_unavailable).unwrap_or(false) {
            self.state.remove(&id);
            return PeriodOutcome::Deliver(obs);
        }

        let Some(state) = self.state.get_mut(&id) else {
            self.state.insert(id, ItemState { last_ts_seconds: now, pending: None, delta: 0.0, generation: 0 });
            return PeriodOutcome::Deliver(obs);
        };

        let elapsed = now - state.last_ts_seconds;

        if elapsed < period {
            // case 2 (unconditional on whether a pending already exists: a fresher arrival
            // always supersedes a stale one still waiting for its bucket to close)
            let delta = period - elapsed;
            state.delta = delta;
            state.pending = Some(obs);
            state.generation += 1;
            PeriodOutcome::Hold { after: secs(delta), generation: state.generation }
        } else if state.pending.is_none() {
            // case 1
            state.last_ts_seconds = now;
            PeriodOutcome::Deliver(obs)
        } else if elapsed < 2.0 * period {
            // case 3: swap
            let flushed = state.pending.take().expect("checked is_some above");
            let delta = 2.0 * period - elapsed;
            state.last_ts_seconds = now + delta;
            state.delta = delta;
            state.pending = Some(obs);
            state.generation += 1;
            PeriodOutcome::DeliverAndHold { flushed, after: secs(delta), generation: state.generation }
        } else {
            // case 4
            let flushed = state.pending.take().expect("checked is_some above");
            state.last_ts_seconds = now;
            PeriodOutcome::DeliverBoth { first: flushed, second: obs }
        }
    }

    /// Called when a previously armed timer fires. Returns `None` if the timer was for a
    /// pending that has since been superseded or flushed (a stale `generation`).
    pub fn on_timer(&mut self, id: &DataItemId, generation: u64) -> Option<Observation> {
        let state = self.state.get_mut(id)?;
        if state.generation != generation {
            return None;
        }
        let pending = state.pending.take()?;
        state.last_ts_seconds = pending.timestamp.as_i64() as f64 / 1_000_000.0 + state.delta;
        Some(pending)
    }
}

fn secs(seconds: f64) -> Duration {
    Duration::from_secs_f64(seconds.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use obs_types::{
        data_item::{Category, DataItem},
        observation::ObservationPayload,
        timestamp::{ArrivalOrdinal, Timestamp},
    };
    use std::sync::Arc;

    fn sample_at(ms: u64, value: f64, period_ms: f64) -> Observation {
        let di = Arc::new(
            DataItem::new(DataItemId::new("Load").unwrap(), "Load", Category::Sample, "LOAD").with_filter_period(period_ms / 1000.0),
        );
        Observation::new(di, Timestamp::new(ms * 1_000), ArrivalOrdinal(0), ObservationPayload::Sample { value: Value::Double(value) })
    }

    #[test]
    fn scenario_0_30_60_90_120_delivers_1_then_4_then_5() {
        let mut f = PeriodFilter::new();
        let id = DataItemId::new("Load").unwrap();

        let PeriodOutcome::Deliver(first) = f.on_observation(sample_at(0, 1.0, 100.0)) else { panic!("expected immediate delivery") };
        assert_eq!(first.value(), Some(&Value::Double(1.0)));

        let PeriodOutcome::Hold { generation: g1, .. } = f.on_observation(sample_at(30, 2.0, 100.0)) else { panic!("expected hold") };
        let PeriodOutcome::Hold { generation: g2, .. } = f.on_observation(sample_at(60, 3.0, 100.0)) else { panic!("expected hold") };
        let PeriodOutcome::Hold { generation: g3, after, .. } = f.on_observation(sample_at(90, 4.0, 100.0)) else { panic!("expected hold") };
        assert_eq!(after, Duration::from_millis(10));

        // stale fires for the superseded pendings are ignored
        assert!(f.on_timer(&id, g1).is_none());
        assert!(f.on_timer(&id, g2).is_none());

        let fired = f.on_timer(&id, g3).expect("latest pending should fire");
        assert_eq!(fired.value(), Some(&Value::Double(4.0)));

        let PeriodOutcome::Hold { generation: g4, after, .. } = f.on_observation(sample_at(120, 5.0, 100.0)) else { panic!("expected hold") };
        assert_eq!(after, Duration::from_millis(80));
        let fired = f.on_timer(&id, g4).expect("pending should fire");
        assert_eq!(fired.value(), Some(&Value::Double(5.0)));
    }

    #[test]
    fn unavailable_clears_state_and_passes_through() {
        let mut f = PeriodFilter::new();
        f.on_observation(sample_at(0, 1.0, 100.0));
        let _ = f.on_observation(sample_at(10, 2.0, 100.0));
        let di = Arc::new(
            DataItem::new(DataItemId::new("Load").unwrap(), "Load", Category::Sample, "LOAD").with_filter_period(0.1),
        );
        let unavailable = Observation::new(di, Timestamp::new(20_000), ArrivalOrdinal(0), ObservationPayload::Sample { value: Value::Unavailable });
        match f.on_observation(unavailable) {
            PeriodOutcome::Deliver(obs) => assert!(obs.value().unwrap().is_unavailable()),
            _ => panic!("expected immediate delivery of the unavailable observation"),
        }
    }

    #[test]
    fn no_declared_period_passes_straight_through() {
        let mut f = PeriodFilter::new();
        let di = Arc::new(DataItem::new(DataItemId::new("Xpos").unwrap(), "Xpos", Category::Sample, "POSITION"));
        let obs = Observation::new(di, Timestamp::new(0), ArrivalOrdinal(0), ObservationPayload::Sample { value: Value::Double(1.0) });
        assert!(matches!(f.on_observation(obs), PeriodOutcome::Deliver(_)));
    }
}
