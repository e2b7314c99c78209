//! Feature attribute values and the per-layer key/value tables.
//!
//! Keys and values are interned in first-seen order: the first occurrence is
//! appended to the table, later occurrences reuse its index. Values compare
//! by type and value, so `true` and `1` (or `1` and `1.0`) are distinct.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::vector_tile::tile::Value;
use crate::{Error, Result};

/// A property value that can be encoded in MVT.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Float(f32),
    Double(f64),
    Int(i64),
    UInt(u64),
    Bool(bool),
}

impl PropertyValue {
    /// Convert a decoded JSON value.
    ///
    /// Returns `Ok(None)` for `null`, which is skipped entirely. Arrays and
    /// objects have no MVT representation and fail with
    /// [`Error::UnsupportedValueType`].
    pub fn from_json(key: &str, value: &JsonValue) -> Result<Option<Self>> {
        let converted = match value {
            JsonValue::Null => return Ok(None),
            JsonValue::Bool(b) => PropertyValue::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    PropertyValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    PropertyValue::UInt(u)
                } else if let Some(f) = n.as_f64() {
                    PropertyValue::Double(f)
                } else {
                    return Err(Error::UnsupportedValueType {
                        key: key.to_string(),
                        kind: "number",
                    });
                }
            }
            JsonValue::String(s) => PropertyValue::String(s.clone()),
            JsonValue::Array(_) => {
                return Err(Error::UnsupportedValueType {
                    key: key.to_string(),
                    kind: "array",
                })
            }
            JsonValue::Object(_) => {
                return Err(Error::UnsupportedValueType {
                    key: key.to_string(),
                    kind: "object",
                })
            }
        };
        Ok(Some(converted))
    }

    /// Convert to MVT Value type.
    pub fn to_mvt_value(&self) -> Value {
        match self {
            PropertyValue::String(s) => Value {
                string_value: Some(s.clone()),
                ..Default::default()
            },
            PropertyValue::Float(f) => Value {
                float_value: Some(*f),
                ..Default::default()
            },
            PropertyValue::Double(d) => Value {
                double_value: Some(*d),
                ..Default::default()
            },
            PropertyValue::Int(i) => Value {
                int_value: Some(*i),
                ..Default::default()
            },
            PropertyValue::UInt(u) => Value {
                uint_value: Some(*u),
                ..Default::default()
            },
            PropertyValue::Bool(b) => Value {
                bool_value: Some(*b),
                ..Default::default()
            },
        }
    }

    /// Read back an MVT value. The first populated field wins.
    pub fn from_mvt_value(value: &Value) -> Option<Self> {
        if let Some(b) = value.bool_value {
            Some(PropertyValue::Bool(b))
        } else if let Some(d) = value.double_value {
            Some(PropertyValue::Double(d))
        } else if let Some(f) = value.float_value {
            Some(PropertyValue::Float(f))
        } else if let Some(i) = value.int_value {
            Some(PropertyValue::Int(i))
        } else if let Some(i) = value.sint_value {
            Some(PropertyValue::Int(i))
        } else if let Some(s) = &value.string_value {
            Some(PropertyValue::String(s.clone()))
        } else {
            value.uint_value.map(PropertyValue::UInt)
        }
    }

    /// Convert to a JSON value, for callers that want plain property maps back.
    pub fn to_json(&self) -> JsonValue {
        match self {
            PropertyValue::String(s) => JsonValue::String(s.clone()),
            PropertyValue::Float(f) => JsonValue::from(f64::from(*f)),
            PropertyValue::Double(d) => JsonValue::from(*d),
            PropertyValue::Int(i) => JsonValue::from(*i),
            PropertyValue::UInt(u) => JsonValue::from(*u),
            PropertyValue::Bool(b) => JsonValue::Bool(*b),
        }
    }

    fn table_key(&self) -> ValueKey {
        match self {
            PropertyValue::String(s) => ValueKey::String(s.clone()),
            PropertyValue::Float(f) => ValueKey::Float(f.to_bits()),
            PropertyValue::Double(d) => ValueKey::Double(d.to_bits()),
            PropertyValue::Int(i) => ValueKey::Int(*i),
            PropertyValue::UInt(u) => ValueKey::UInt(*u),
            PropertyValue::Bool(b) => ValueKey::Bool(*b),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Int(i)
    }
}

impl From<u64> for PropertyValue {
    fn from(u: u64) -> Self {
        PropertyValue::UInt(u)
    }
}

impl From<f32> for PropertyValue {
    fn from(f: f32) -> Self {
        PropertyValue::Float(f)
    }
}

impl From<f64> for PropertyValue {
    fn from(d: f64) -> Self {
        PropertyValue::Double(d)
    }
}

/// Hashable identity of a value: the type tag plus the exact bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueKey {
    String(String),
    Float(u32),
    Double(u64),
    Int(i64),
    UInt(u64),
    Bool(bool),
}

/// Interned keys and values for a single layer.
#[derive(Debug, Default)]
pub struct PropertyTable {
    keys: Vec<String>,
    key_index: HashMap<String, u32>,
    values: Vec<Value>,
    value_index: HashMap<ValueKey, u32>,
}

impl PropertyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or insert a key, returning its index.
    pub fn intern_key(&mut self, key: &str) -> u32 {
        if let Some(&idx) = self.key_index.get(key) {
            idx
        } else {
            let idx = self.keys.len() as u32;
            self.keys.push(key.to_string());
            self.key_index.insert(key.to_string(), idx);
            idx
        }
    }

    /// Get or insert a value, returning its index.
    pub fn intern_value(&mut self, value: &PropertyValue) -> u32 {
        let value_key = value.table_key();

        if let Some(&idx) = self.value_index.get(&value_key) {
            idx
        } else {
            let idx = self.values.len() as u32;
            self.values.push(value.to_mvt_value());
            self.value_index.insert(value_key, idx);
            idx
        }
    }

    /// Intern a key/value pair, returning `(key_index, value_index)`.
    pub fn intern(&mut self, key: &str, value: &PropertyValue) -> (u32, u32) {
        (self.intern_key(key), self.intern_value(value))
    }

    /// Intern every property and return the interleaved tag list.
    pub fn tags<'a, I>(&mut self, properties: I) -> Vec<u32>
    where
        I: IntoIterator<Item = (&'a str, &'a PropertyValue)>,
    {
        let mut tags = Vec::new();
        for (key, value) in properties {
            let (key_idx, value_idx) = self.intern(key, value);
            tags.push(key_idx);
            tags.push(value_idx);
        }
        tags
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the table, returning the key and value tables in wire order.
    pub fn into_parts(self) -> (Vec<String>, Vec<Value>) {
        (self.keys, self.values)
    }
}
