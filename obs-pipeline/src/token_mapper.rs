//! Token mapper (spec §4.4): turns `(timestamp, [tokens])` into zero or more [`MappedEntity`]s.

use crate::diagnostics::Diagnostics;
use obs_types::{
    condition::{ConditionLevel, ConditionNode},
    data_item::{Category, DataItem, DeviceModel, Representation},
    ids::{DataItemId, DataItemRef, DeviceId},
    observation::{AssetCommand, AssetCommandKind, MappedEntity, Observation, ObservationPayload},
    timestamp::{ArrivalOrdinal, Timestamp},
    value::{DataSetEntry, Value},
};
use std::sync::Arc;

/// Consumes the flat token list produced by the tokenizer, resolving each field against the
/// device model and emitting one [`MappedEntity`] per logical field.
///
/// Owned per source strand; holds no per-field state itself (unlike the filters and condition
/// chainer downstream), but shares a `Diagnostics` sink with the rest of the source so
/// "unknown data item" warnings are deduplicated process-wide per id.
pub struct TokenMapper {
    device_model: Arc<dyn DeviceModel>,
    default_device: Option<DeviceId>,
    upcase_event_values: bool,
    diagnostics: Arc<Diagnostics>,
    source_name: String,
}

impl TokenMapper {
    pub fn new(
        device_model: Arc<dyn DeviceModel>,
        default_device: Option<DeviceId>,
        upcase_event_values: bool,
        diagnostics: Arc<Diagnostics>,
        source_name: impl Into<String>,
    ) -> Self {
        Self {
            device_model,
            default_device,
            upcase_event_values,
            diagnostics,
            source_name: source_name.into(),
        }
    }

    /// Updates the device unqualified field references fall back to (spec §4.4/§4.11, the
    /// `* device : ...` protocol command).
    pub fn set_default_device(&mut self, device: Option<DeviceId>) {
        self.default_device = device;
    }

    /// Maps one tokenized data line into its constituent entities, in field order.
    pub fn map_line(&self, timestamp: Timestamp, arrival: ArrivalOrdinal, tokens: &[String]) -> Vec<MappedEntity> {
        let mut out = Vec::new();
        let mut idx = 0;
        while idx < tokens.len() {
            let head = &tokens[idx];
            idx += 1;

            if let Some(kind) = asset_command_kind(head) {
                let Some(entity) = self.map_asset_command(kind, &tokens[idx..], timestamp, arrival) else {
                    break;
                };
                out.push(entity);
                // asset commands consume the rest of the line (id + body, or just id for remove)
                break;
            }

            let data_item_ref = match DataItemRef::parse(head) {
                Ok(r) => r,
                Err(_) => {
                    self.diagnostics.warn_once(&self.source_name, "malformed-field", head, "field token is not a valid data item reference");
                    // a malformed head never had a representation-dependent arity to begin
                    // with, so it's always safe to drop just this token and resume at idx
                    continue;
                }
            };
            let device = data_item_ref.device.clone().or_else(|| self.default_device.clone());
            let data_item = match self.device_model.resolve(device.as_deref(), data_item_ref.data_item.as_str()) {
                Some(di) => di,
                None => {
                    self.diagnostics.warn_once(
                        &self.source_name,
                        "unknown-data-item",
                        data_item_ref.data_item.as_str(),
                        "no such data item in the device model",
                    );
                    // true arity is representation-dependent and unknowable without resolving
                    // the item; treat it as a single-token field so the line keeps parsing,
                    // same as the malformed-reference case above. if the unresolvable field
                    // actually carried extra value tokens, those get reinterpreted as the next
                    // field's head and are dropped in turn if they don't parse as one.
                    continue;
                }
            };

            let remaining = &tokens[idx..];
            let (consumed, observation) = self.map_field(&data_item, remaining, timestamp, arrival);
            idx += consumed;
            if let Some(obs) = observation {
                out.push(MappedEntity::Observation(Box::new(obs)));
            }
        }
        out
    }

    fn map_field(&self, data_item: &Arc<DataItem>, tokens: &[String], timestamp: Timestamp, arrival: ArrivalOrdinal) -> (usize, Option<Observation>) {
        match data_item.category {
            Category::Condition => self.map_condition(data_item, tokens, timestamp, arrival),
            Category::Message => self.map_message(data_item, tokens, timestamp, arrival),
            Category::Sample | Category::Event => match data_item.representation {
                Representation::Value => self.map_value(data_item, tokens, timestamp, arrival),
                Representation::Timeseries => self.map_timeseries(data_item, tokens, timestamp, arrival),
                Representation::DataSet | Representation::Table => self.map_data_set(data_item, tokens, timestamp, arrival),
            },
        }
    }

    /// Message consumes exactly two tokens: native-code, then text (spec §4.4).
    fn map_message(&self, data_item: &Arc<DataItem>, tokens: &[String], timestamp: Timestamp, arrival: ArrivalOrdinal) -> (usize, Option<Observation>) {
        let native_code = tokens.first().cloned().unwrap_or_default();
        let text = tokens.get(1).cloned().unwrap_or_default();
        let consumed = tokens.len().min(2);
        let payload = ObservationPayload::Message { native_code, text };
        (consumed, Some(Observation::new(data_item.clone(), timestamp, arrival, payload)))
    }

    fn map_value(&self, data_item: &Arc<DataItem>, tokens: &[String], timestamp: Timestamp, arrival: ArrivalOrdinal) -> (usize, Option<Observation>) {
        let Some(raw) = tokens.first() else {
            return (0, None);
        };
        let value = match data_item.category {
            Category::Sample => parse_numeric(raw, data_item, &self.diagnostics, &self.source_name),
            Category::Event => {
                if raw == "UNAVAILABLE" {
                    Value::Unavailable
                } else if self.upcase_event_values {
                    Value::String(raw.to_uppercase())
                } else {
                    Value::String(raw.clone())
                }
            }
            Category::Condition => unreachable!("handled by map_condition"),
            Category::Message => unreachable!("handled by map_message"),
        };
        let payload = match data_item.category {
            Category::Sample => ObservationPayload::Sample { value },
            _ => ObservationPayload::Event { value },
        };
        (1, Some(Observation::new(data_item.clone(), timestamp, arrival, payload)))
    }

    fn map_timeseries(&self, data_item: &Arc<DataItem>, tokens: &[String], timestamp: Timestamp, arrival: ArrivalOrdinal) -> (usize, Option<Observation>) {
        if tokens.len() < 3 {
            return (tokens.len(), None);
        }
        let count = tokens[0].parse::<u32>().unwrap_or(0);
        let sample_rate = tokens[1].parse::<f64>().unwrap_or(0.0);
        let values: Vec<f64> = tokens[2].split_whitespace().filter_map(|t| t.parse::<f64>().ok()).collect();
        let payload = ObservationPayload::Timeseries { count, sample_rate, values };
        (3, Some(Observation::new(data_item.clone(), timestamp, arrival, payload)))
    }

    fn map_data_set(&self, data_item: &Arc<DataItem>, tokens: &[String], timestamp: Timestamp, arrival: ArrivalOrdinal) -> (usize, Option<Observation>) {
        let Some(raw) = tokens.first() else {
            return (0, None);
        };
        let mut obs = Observation::new(data_item.clone(), timestamp, arrival, ObservationPayload::DataSet { value: Value::DataSet(Default::default()) });
        if raw.trim().is_empty() {
            obs.properties.reset_triggered = true;
            return (1, Some(obs));
        }
        let mut map = std::collections::BTreeMap::new();
        for entry in raw.split_whitespace() {
            if let Some(key) = entry.strip_prefix(':') {
                map.insert(key.to_owned(), DataSetEntry::Removed);
            } else if let Some((key, value)) = entry.split_once('=') {
                map.insert(key.to_owned(), DataSetEntry::Value(value.to_owned()));
            }
        }
        obs.payload = ObservationPayload::DataSet { value: Value::DataSet(map) };
        (1, Some(obs))
    }

    fn map_condition(&self, data_item: &Arc<DataItem>, tokens: &[String], timestamp: Timestamp, arrival: ArrivalOrdinal) -> (usize, Option<Observation>) {
        let Some(level_token) = tokens.first() else {
            return (0, None);
        };
        let level = parse_condition_level(level_token);
        let take = tokens.len().min(5);
        let native_code = tokens.get(1).cloned().unwrap_or_default();
        let native_severity = tokens.get(2).filter(|s| !s.is_empty()).cloned();
        let qualifier = tokens.get(3).filter(|s| !s.is_empty()).cloned();
        let text = tokens.get(4).filter(|s| !s.is_empty()).cloned();

        let head = Arc::new(ConditionNode {
            level,
            native_code,
            native_severity,
            qualifier,
            text,
            // the chainer threads this into the data item's real chain; token mapping has no
            // per-data-item state of its own (spec §5)
            prev: None,
        });
        let obs = Observation::new(data_item.clone(), timestamp, arrival, ObservationPayload::Condition { level, head });
        (take, Some(obs))
    }

    fn map_asset_command(&self, kind: AssetCommandPrefix, tokens: &[String], timestamp: Timestamp, arrival: ArrivalOrdinal) -> Option<MappedEntity> {
        let command = match kind {
            AssetCommandPrefix::Add | AssetCommandPrefix::Update => {
                let asset_id = tokens.first()?.clone();
                let body = tokens.get(1).cloned().unwrap_or_default();
                let kind = if matches!(kind, AssetCommandPrefix::Add) {
                    AssetCommandKind::Add { asset_id, body }
                } else {
                    AssetCommandKind::Update { asset_id, body }
                };
                kind
            }
            AssetCommandPrefix::Remove => AssetCommandKind::Remove { asset_id: tokens.first()?.clone() },
            AssetCommandPrefix::RemoveAll => AssetCommandKind::RemoveAll,
        };
        Some(MappedEntity::Asset(Box::new(AssetCommand {
            device: self.default_device.clone(),
            kind: command,
            timestamp,
            arrival,
        })))
    }
}

enum AssetCommandPrefix {
    Add,
    Update,
    Remove,
    RemoveAll,
}

fn asset_command_kind(token: &str) -> Option<AssetCommandPrefix> {
    match token {
        "@ASSET@" => Some(AssetCommandPrefix::Add),
        "@UPDATE_ASSET@" => Some(AssetCommandPrefix::Update),
        "@REMOVE_ASSET@" => Some(AssetCommandPrefix::Remove),
        "@REMOVE_ALL_ASSETS@" => Some(AssetCommandPrefix::RemoveAll),
        _ => None,
    }
}

fn parse_condition_level(token: &str) -> ConditionLevel {
    match token.to_ascii_uppercase().as_str() {
        "NORMAL" => ConditionLevel::Normal,
        "WARNING" => ConditionLevel::Warning,
        "FAULT" => ConditionLevel::Fault,
        _ => ConditionLevel::Unavailable,
    }
}

fn parse_numeric(raw: &str, data_item: &Arc<DataItem>, diagnostics: &Diagnostics, source: &str) -> Value {
    if raw == "UNAVAILABLE" || raw.is_empty() {
        return Value::Unavailable;
    }
    match raw.parse::<f64>() {
        Ok(v) => Value::Double(v),
        Err(e) => {
            diagnostics.warn_once(source, "value-parse-error", data_item.id.as_str(), &e.to_string());
            Value::Unavailable
        }
    }
}
