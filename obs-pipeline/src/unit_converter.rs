//! Unit converter (spec §4.5).
//!
//! Composite units (e.g. `MILLIMETER/SECOND`, `DEGREE/SECOND^2`) are split on `/` and `^` into a
//! list of `(primitive_unit, exponent)` terms, resolved term-by-term against a fixed table of
//! primitive units grouped by physical dimension. A temperature offset only ever applies to a
//! single, unexponentiated term — a composite (or exponentiated) unit is a ratio or power, for
//! which an additive offset has no physical meaning.

use crate::{
    diagnostics::Diagnostics,
    transform::{Transform, Verdict},
};
use obs_types::{observation::ObservationPayload, value::Value, MappedEntity, PipelineError};
use once_cell::sync::Lazy;
use std::{collections::HashMap, sync::Arc};

struct UnitDef {
    /// The dimension's canonical unit (e.g. `MILLIMETER` for length); two units only convert
    /// between each other when their `base` matches.
    base: &'static str,
    /// `value_in_base = value * factor + offset`.
    factor: f64,
    offset: f64,
}

const fn unit(base: &'static str, factor: f64) -> UnitDef {
    UnitDef { base, factor, offset: 0.0 }
}

static UNIT_TABLE: Lazy<HashMap<&'static str, UnitDef>> = Lazy::new(|| {
    let mut t = HashMap::new();
    // length, base = MILLIMETER
    t.insert("MILLIMETER", unit("MILLIMETER", 1.0));
    t.insert("CENTIMETER", unit("MILLIMETER", 10.0));
    t.insert("METER", unit("MILLIMETER", 1_000.0));
    t.insert("KILOMETER", unit("MILLIMETER", 1_000_000.0));
    t.insert("INCH", unit("MILLIMETER", 25.4));
    t.insert("FOOT", unit("MILLIMETER", 304.8));
    // mass, base = GRAM
    t.insert("GRAM", unit("GRAM", 1.0));
    t.insert("KILOGRAM", unit("GRAM", 1_000.0));
    t.insert("POUND", unit("GRAM", 453.592));
    // time, base = SECOND
    t.insert("MILLISECOND", unit("SECOND", 0.001));
    t.insert("SECOND", unit("SECOND", 1.0));
    t.insert("MINUTE", unit("SECOND", 60.0));
    t.insert("HOUR", unit("SECOND", 3_600.0));
    // plane angle, base = DEGREE
    t.insert("DEGREE", unit("DEGREE", 1.0));
    t.insert("RADIAN", unit("DEGREE", 57.295_779_513_082_32));
    t.insert("REVOLUTION", unit("REVOLUTION", 1.0));
    // temperature, base = CELSIUS, with offsets
    t.insert("CELSIUS", UnitDef { base: "CELSIUS", factor: 1.0, offset: 0.0 });
    t.insert("FAHRENHEIT", UnitDef { base: "CELSIUS", factor: 5.0 / 9.0, offset: -32.0 * 5.0 / 9.0 });
    t.insert("KELVIN", UnitDef { base: "CELSIUS", factor: 1.0, offset: -273.15 });
    t
});

fn parse_unit_expr(expr: &str) -> Vec<(&str, i32)> {
    expr.split('/')
        .enumerate()
        .map(|(i, part)| {
            let (name, exp) = match part.split_once('^') {
                Some((n, e)) => (n, e.parse::<i32>().unwrap_or(1)),
                None => (part, 1),
            };
            (name, if i == 0 { exp } else { -exp })
        })
        .collect()
}

fn conversion_error(native_units: &str, units: &str) -> PipelineError {
    PipelineError::ConversionError { native_units: native_units.to_owned(), units: units.to_owned() }
}

/// Converts a single scalar from `native_units` to `units`, per the compositional rule above.
fn convert_scalar(value: f64, native_units: &str, units: &str) -> Result<f64, PipelineError> {
    if native_units == units {
        return Ok(value);
    }
    let native_terms = parse_unit_expr(native_units);
    let target_terms = parse_unit_expr(units);
    if native_terms.len() != target_terms.len() {
        return Err(conversion_error(native_units, units));
    }

    let simple = native_terms.len() == 1 && native_terms[0].1 == 1 && target_terms[0].1 == 1;
    let mut factor = 1.0;
    for (&(n_name, n_exp), &(t_name, t_exp)) in native_terms.iter().zip(target_terms.iter()) {
        if n_exp != t_exp {
            return Err(conversion_error(native_units, units));
        }
        let n_def = UNIT_TABLE.get(n_name).ok_or_else(|| conversion_error(native_units, units))?;
        let t_def = UNIT_TABLE.get(t_name).ok_or_else(|| conversion_error(native_units, units))?;
        if n_def.base != t_def.base {
            return Err(conversion_error(native_units, units));
        }
        factor *= (n_def.factor / t_def.factor).powi(n_exp);
    }

    if simple {
        let n_def = &UNIT_TABLE[native_terms[0].0];
        let t_def = &UNIT_TABLE[target_terms[0].0];
        let base_value = value * n_def.factor + n_def.offset;
        Ok((base_value - t_def.offset) / t_def.factor)
    } else {
        Ok(value * factor)
    }
}

/// Pipeline stage that converts `Sample`/`Event`/`DataSet`/`Timeseries` payloads whose data item
/// declares both `units` and `nativeUnits` (and they differ). `nativeScale` is applied last,
/// as a straight divisor, regardless of whether a unit conversion also ran.
pub struct UnitConverter {
    diagnostics: Arc<Diagnostics>,
    source_name: String,
}

impl UnitConverter {
    pub fn new(diagnostics: Arc<Diagnostics>, source_name: impl Into<String>) -> Self {
        Self { diagnostics, source_name: source_name.into() }
    }

    fn convert_one(&self, value: f64, native_units: &str, units: &str) -> f64 {
        match convert_scalar(value, native_units, units) {
            Ok(v) => v,
            Err(e) => {
                self.diagnostics.warn_once(&self.source_name, "conversion-error", &format!("{native_units}->{units}"), &e.to_string());
                value
            }
        }
    }
}

impl Transform for UnitConverter {
    fn guard(&self, entity: &MappedEntity) -> Verdict {
        match entity {
            MappedEntity::Observation(obs) if obs.data_item.needs_conversion() => Verdict::Run,
            _ => Verdict::Skip,
        }
    }

    fn apply(&mut self, entity: MappedEntity) -> Option<MappedEntity> {
        let MappedEntity::Observation(mut obs) = entity else {
            return Some(entity);
        };
        let native_units = obs.data_item.native_units.clone().unwrap_or_default();
        let units = obs.data_item.units.clone().unwrap_or_default();
        let scale = obs.data_item.native_scale.unwrap_or(1.0);

        match &mut obs.payload {
            ObservationPayload::Sample { value } | ObservationPayload::Event { value } | ObservationPayload::DataSet { value } => {
                match value {
                    Value::Double(d) => *d = self.convert_one(*d, &native_units, &units) / scale,
                    Value::Vector(v) => {
                        for d in v.iter_mut() {
                            *d = self.convert_one(*d, &native_units, &units) / scale;
                        }
                    }
                    _ => {}
                }
            }
            ObservationPayload::Timeseries { values, .. } => {
                for d in values.iter_mut() {
                    *d = self.convert_one(*d, &native_units, &units) / scale;
                }
            }
            ObservationPayload::Condition { .. } | ObservationPayload::Message { .. } => {}
        }
        Some(MappedEntity::Observation(obs))
    }
}
