//! # Response Transformer
//!
//! Stateless shaping of aggregated output. Every operation takes its input by
//! reference and returns a new record; nothing is mutated in place.

use crate::constants::SENSITIVE_FIELDS;
use crate::error::{AggregationError, AggregationResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Generic key-value record
pub type Record = Map<String, Value>;

/// Named value derived from the original record
pub type ComputedField<'a> = (&'a str, &'a dyn Fn(&Record) -> Value);

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseTransformer;

impl ResponseTransformer {
    pub fn new() -> Self {
        Self
    }

    /// Keep only `fields` that are present
    pub fn pick(&self, data: &Record, fields: &[&str]) -> Record {
        fields
            .iter()
            .filter_map(|field| {
                data.get(*field)
                    .map(|value| (field.to_string(), value.clone()))
            })
            .collect()
    }

    /// Drop `fields`, keep everything else
    pub fn omit(&self, data: &Record, fields: &[&str]) -> Record {
        let excluded: HashSet<&str> = fields.iter().copied().collect();
        data.iter()
            .filter(|(key, _)| !excluded.contains(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// `omit` with the built-in list of sensitive field names
    pub fn sanitize(&self, data: &Record) -> Record {
        self.omit(data, SENSITIVE_FIELDS)
    }

    /// Apply `mapping` to field names; unmapped fields pass through
    pub fn rename(&self, data: &Record, mapping: &HashMap<String, String>) -> Record {
        data.iter()
            .map(|(key, value)| {
                let key = mapping.get(key).unwrap_or(key);
                (key.clone(), value.clone())
            })
            .collect()
    }

    /// Collapse nested objects into dot-joined keys
    ///
    /// Arrays and scalars are leaves. An empty `prefix` leaves top-level
    /// keys unprefixed.
    pub fn flatten(&self, data: &Record, prefix: &str) -> Record {
        let mut result = Record::new();
        flatten_into(data, prefix, &mut result);
        result
    }

    /// Shallow merge, later records win on conflicting keys
    pub fn merge(&self, records: &[&Record]) -> Record {
        let mut result = Record::new();
        for record in records {
            for (key, value) in record.iter() {
                result.insert(key.clone(), value.clone());
            }
        }
        result
    }

    /// Copy of `data` plus each computed field, each derived from the original
    pub fn add_computed_fields(&self, data: &Record, computed: &[ComputedField<'_>]) -> Record {
        let mut result = data.clone();
        for (name, compute) in computed {
            result.insert(name.to_string(), compute(data));
        }
        result
    }

    pub fn filter_null(&self, data: &Record) -> Record {
        data.iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// `pick` from a comma-separated list; an empty list keeps everything
    pub fn select_fields(&self, data: &Record, fields: &str) -> Record {
        if fields.trim().is_empty() {
            return data.clone();
        }
        let fields: Vec<&str> = fields
            .split(',')
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .collect();
        self.pick(data, &fields)
    }

    /// Apply `transform` to every item, failing on the first error
    pub fn transform_array<T, U, F>(&self, items: &[T], mut transform: F) -> AggregationResult<Vec<U>>
    where
        F: FnMut(&T) -> AggregationResult<U>,
    {
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                transform(item).map_err(|e| {
                    AggregationError::Internal(format!("failed to transform item {index}: {e}"))
                })
            })
            .collect()
    }

    pub fn map_keys<F>(&self, data: &Record, mut map: F) -> Record
    where
        F: FnMut(&str) -> String,
    {
        data.iter()
            .map(|(key, value)| (map(key), value.clone()))
            .collect()
    }

    pub fn map_values<F>(&self, data: &Record, mut map: F) -> Record
    where
        F: FnMut(&Value) -> Value,
    {
        data.iter()
            .map(|(key, value)| (key.clone(), map(value)))
            .collect()
    }

    /// Pretty-printed JSON
    pub fn to_json<T: Serialize + ?Sized>(&self, data: &T) -> AggregationResult<String> {
        Ok(serde_json::to_string_pretty(data)?)
    }

    pub fn from_json(&self, json: &str) -> AggregationResult<Record> {
        Ok(serde_json::from_str(json)?)
    }

    /// Any serializable value as a record; it must serialize to an object
    pub fn to_record<T: Serialize + ?Sized>(&self, data: &T) -> AggregationResult<Record> {
        match serde_json::to_value(data)? {
            Value::Object(record) => Ok(record),
            other => Err(AggregationError::Serialization(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn flatten_into(data: &Record, prefix: &str, result: &mut Record) {
    for (key, value) in data {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(nested) => flatten_into(nested, &full_key, result),
            leaf => {
                result.insert(full_key, leaf.clone());
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
