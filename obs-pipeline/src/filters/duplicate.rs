//! Duplicate filter (spec §4.6).

use crate::transform::{Transform, Verdict};
use obs_types::{ids::DataItemId, observation::ObservationPayload, MappedEntity, Value};
use std::collections::HashMap;

/// Drops an observation whose value is structurally equal to the last one delivered for the
/// same data item, unless `resetTriggered` is set. Owned per source strand: last-value state is
/// never shared across sources (spec §5).
#[derive(Default)]
pub struct DuplicateFilter {
    last: HashMap<DataItemId, Value>,
}

impl DuplicateFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transform for DuplicateFilter {
    fn guard(&self, entity: &MappedEntity) -> Verdict {
        match entity {
            // conditions, messages and timeseries have their own identity/rate semantics;
            // duplicate suppression only applies to scalar- or set-valued observations
            MappedEntity::Observation(obs) => match &obs.payload {
                ObservationPayload::Sample { .. } | ObservationPayload::Event { .. } | ObservationPayload::DataSet { .. } => Verdict::Run,
                _ => Verdict::Skip,
            },
            MappedEntity::Asset(_) => Verdict::Skip,
        }
    }

    fn apply(&mut self, entity: MappedEntity) -> Option<MappedEntity> {
        let MappedEntity::Observation(obs) = entity else {
            return Some(entity);
        };
        let value = obs.value().expect("guard only runs for value-bearing payloads").clone();
        let is_duplicate = self.last.get(&obs.data_item.id) == Some(&value) && !obs.properties.reset_triggered;

        self.last.insert(obs.data_item.id.clone(), value);

        if is_duplicate {
            None
        } else {
            Some(MappedEntity::Observation(obs))
        }
    }
}
