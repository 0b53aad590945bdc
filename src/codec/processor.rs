//! Schema-negotiating line processor.

use serde_json::{json, Value};
use std::collections::HashMap;

use super::CodecError;
use crate::observation::{Observation, ObservationKind};

/// Control record kind declaring a sender's field ordering.
pub const META_KIND: &str = "meta";
/// Terminal record kind.
pub const END_KIND: &str = "end";

/// What a single wire record turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A field ordering was registered for the kind.
    Meta(ObservationKind),
    /// A fully decoded observation.
    Observation(Observation),
    /// A record of a kind this analyzer does not know.
    Ignored,
    /// End of stream.
    End,
}

/// Decodes positional records into typed observations.
///
/// Holds one cached field mapping per kind: for each canonical field, the
/// position the sender puts it at, or `None` for an omitted optional field.
#[derive(Debug, Default)]
pub struct LineProcessor {
    field_orders: HashMap<ObservationKind, Vec<Option<usize>>>,
}

impl LineProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and decode one line of newline-delimited JSON.
    pub fn decode_line(&mut self, line: &str) -> Result<Record, CodecError> {
        let value: Value = serde_json::from_str(line)?;
        self.decode(&value)
    }

    /// Decode one record.
    pub fn decode(&mut self, record: &Value) -> Result<Record, CodecError> {
        let items = record
            .as_array()
            .ok_or_else(|| CodecError::Malformed("record is not an array".to_string()))?;
        let kind = items
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| CodecError::Malformed("record has no kind".to_string()))?;

        match kind {
            END_KIND => Ok(Record::End),
            META_KIND => self.apply_meta(&items[1..]),
            other => match ObservationKind::parse(other) {
                Some(kind) => self.decode_data(kind, &items[1..]).map(Record::Observation),
                None => Ok(Record::Ignored),
            },
        }
    }

    fn apply_meta(&mut self, args: &[Value]) -> Result<Record, CodecError> {
        let kind_name = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| CodecError::Malformed("meta without kind".to_string()))?;
        let header: Vec<&str> = args
            .get(1)
            .and_then(Value::as_array)
            .ok_or_else(|| CodecError::Malformed("meta without field header".to_string()))?
            .iter()
            .map(|name| {
                name.as_str()
                    .ok_or_else(|| CodecError::Malformed("field name is not a string".to_string()))
            })
            .collect::<Result<_, _>>()?;

        let Some(kind) = ObservationKind::parse(kind_name) else {
            return Ok(Record::Ignored);
        };

        let mut order = Vec::with_capacity(kind.fields().len());
        for field in kind.fields() {
            let position = header.iter().position(|name| name == field);
            if position.is_none() && !kind.is_optional(field) {
                return Err(CodecError::MissingField {
                    kind: kind.as_str(),
                    field: *field,
                });
            }
            order.push(position);
        }

        self.field_orders.insert(kind, order);
        Ok(Record::Meta(kind))
    }

    fn decode_data(
        &self,
        kind: ObservationKind,
        values: &[Value],
    ) -> Result<Observation, CodecError> {
        let order = self
            .field_orders
            .get(&kind)
            .ok_or(CodecError::NoFieldOrder(kind.as_str()))?;

        let expected = order.iter().flatten().max().map_or(0, |max| max + 1);
        if values.len() < expected {
            return Err(CodecError::InsufficientFields {
                kind: kind.as_str(),
                expected,
                actual: values.len(),
            });
        }

        let canonical = Value::Array(
            order
                .iter()
                .map(|position| position.map_or(Value::Null, |i| values[i].clone()))
                .collect(),
        );
        let observation = match kind {
            ObservationKind::Init => Observation::Init(serde_json::from_value(canonical)?),
            ObservationKind::PromiseResolve => {
                Observation::PromiseResolve(serde_json::from_value(canonical)?)
            }
            ObservationKind::Before => Observation::Before(serde_json::from_value(canonical)?),
            ObservationKind::After => Observation::After(serde_json::from_value(canonical)?),
            ObservationKind::Destroy => Observation::Destroy(serde_json::from_value(canonical)?),
        };
        Ok(observation)
    }

    /// Encode an observation as `[kind, ...canonical-field-values]`.
    pub fn encode(observation: &Observation) -> Value {
        let kind = observation.kind().as_str();
        match observation {
            Observation::Init(init) => json!([
                kind,
                init.type_tag,
                init.execution_id,
                init.trigger_id,
                init.id,
                init.stack
            ]),
            Observation::PromiseResolve(resolve) => json!([
                kind,
                resolve.execution_id,
                resolve.trigger_id,
                resolve.id,
                resolve.inspected
            ]),
            Observation::Before(cb) | Observation::After(cb) => {
                json!([kind, cb.trigger_id, cb.id])
            }
            Observation::Destroy(destroy) => json!([kind, destroy.id]),
        }
    }

    /// The meta record announcing the canonical ordering for a kind.
    pub fn meta_record(kind: ObservationKind) -> Value {
        json!([META_KIND, kind.as_str(), kind.fields()])
    }

    pub fn end_record() -> Value {
        json!([END_KIND])
    }
}
