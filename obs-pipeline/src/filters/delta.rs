//! Delta filter (spec §4.7).

use crate::transform::{Transform, Verdict};
use obs_types::{ids::DataItemId, MappedEntity};
use std::collections::HashMap;

/// Drops samples whose data item declares `minimumDelta > 0` when the change from the last
/// delivered numeric value is smaller than that threshold.
#[derive(Default)]
pub struct DeltaFilter {
    last: HashMap<DataItemId, f64>,
}

impl DeltaFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transform for DeltaFilter {
    fn guard(&self, entity: &MappedEntity) -> Verdict {
        match entity {
            MappedEntity::Observation(obs) => match obs.data_item.minimum_delta {
                Some(d) if d > 0.0 && obs.value().and_then(|v| v.as_f64()).is_some() => Verdict::Run,
                _ => Verdict::Skip,
            },
            MappedEntity::Asset(_) => Verdict::Skip,
        }
    }

    fn apply(&mut self, entity: MappedEntity) -> Option<MappedEntity> {
        let MappedEntity::Observation(obs) = entity else {
            return Some(entity);
        };
        let minimum_delta = obs.data_item.minimum_delta.expect("guard checked minimum_delta is set");
        let value = obs.value().and_then(|v| v.as_f64()).expect("guard checked value is numeric");

        let accept = match self.last.get(&obs.data_item.id) {
            Some(last) => (value - last).abs() >= minimum_delta,
            None => true,
        };

        if accept {
            self.last.insert(obs.data_item.id.clone(), value);
            Some(MappedEntity::Observation(obs))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obs_types::{
        data_item::{Category, DataItem},
        observation::ObservationPayload,
        timestamp::{ArrivalOrdinal, Timestamp},
        Observation, Value,
    };
    use std::sync::Arc;

    fn sample(value: f64, minimum_delta: f64) -> MappedEntity {
        let di = Arc::new(
            DataItem::new(DataItemId::new("Load").unwrap(), "Load", Category::Sample, "LOAD").with_minimum_delta(minimum_delta),
        );
        MappedEntity::Observation(Box::new(Observation::new(
            di,
            Timestamp::now(),
            ArrivalOrdinal(0),
            ObservationPayload::Sample { value: Value::Double(value) },
        )))
    }

    #[test]
    fn small_changes_are_dropped() {
        let mut f = DeltaFilter::new();
        assert!(f.run(sample(10.0, 1.0)).is_some());
        assert!(f.run(sample(10.5, 1.0)).is_none());
        assert!(f.run(sample(11.2, 1.0)).is_some());
    }

    #[test]
    fn zero_minimum_delta_disables_filtering() {
        let mut f = DeltaFilter::new();
        assert!(f.run(sample(10.0, 0.0)).is_some());
        assert!(f.run(sample(10.0001, 0.0)).is_some());
    }
}
