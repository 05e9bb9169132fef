//! Condition tree
//!
//! A condition is a map from key to value where the value is a scalar, an
//! array, or a nested condition. The variant is fixed once at parse time;
//! compilers dispatch on it and never inspect runtime types.

use std::collections::BTreeMap;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{QueryError, QueryResult};
use crate::value::Value;

/// A node value inside a [`Condition`]
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    Scalar(Value),
    Array(Vec<ConditionValue>),
    Map(Condition),
}

impl ConditionValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ConditionValue::Scalar(Value::Null))
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            ConditionValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Condition> {
        match self {
            ConditionValue::Map(c) => Some(c),
            _ => None,
        }
    }

    /// Elements of an array whose members are all scalars
    pub fn scalar_items(&self) -> Option<Vec<&Value>> {
        match self {
            ConditionValue::Array(items) => items.iter().map(|i| i.as_scalar()).collect(),
            _ => None,
        }
    }

    /// Collapse into a plain [`Value`]. Nested maps become JSON objects.
    pub fn to_value(&self) -> Value {
        match self {
            ConditionValue::Scalar(v) => v.clone(),
            ConditionValue::Array(items) => {
                Value::Array(items.iter().map(ConditionValue::to_value).collect())
            }
            ConditionValue::Map(c) => Value::Json(c.to_json()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ConditionValue::Scalar(v) => v.to_json(),
            ConditionValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(ConditionValue::to_json).collect())
            }
            ConditionValue::Map(c) => c.to_json(),
        }
    }
}

impl From<serde_json::Value> for ConditionValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Object(map) => ConditionValue::Map(Condition {
                entries: map
                    .into_iter()
                    .map(|(k, v)| (k, ConditionValue::from(v)))
                    .collect(),
            }),
            serde_json::Value::Array(items) => {
                ConditionValue::Array(items.into_iter().map(ConditionValue::from).collect())
            }
            other => ConditionValue::Scalar(Value::from(other)),
        }
    }
}

impl From<Value> for ConditionValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Array(items) => {
                ConditionValue::Array(items.into_iter().map(ConditionValue::from).collect())
            }
            Value::Json(json @ serde_json::Value::Object(_)) => ConditionValue::from(json),
            other => ConditionValue::Scalar(other),
        }
    }
}

impl From<Condition> for ConditionValue {
    fn from(c: Condition) -> Self {
        ConditionValue::Map(c)
    }
}

/// Backend-neutral filter tree.
///
/// Keys iterate in sorted order so compilation output is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    entries: BTreeMap<String, ConditionValue>,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConditionValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ConditionValue> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ConditionValue> {
        self.entries.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ConditionValue)> {
        self.entries.iter()
    }

    /// Parse from a JSON object
    pub fn from_json(value: serde_json::Value) -> QueryResult<Self> {
        match ConditionValue::from(value) {
            ConditionValue::Map(c) => Ok(c),
            ConditionValue::Scalar(Value::Null) => Ok(Condition::new()),
            _ => Err(QueryError::malformed("condition must be an object")),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl TryFrom<serde_json::Value> for Condition {
    type Error = QueryError;

    fn try_from(value: serde_json::Value) -> QueryResult<Self> {
        Condition::from_json(value)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Condition::from_json(raw).map_err(de::Error::custom)
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
