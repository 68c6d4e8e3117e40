//! Extraction results
//!
//! Absent results are `None` at every API boundary and are never stored inside
//! a [`Value`], so a mapping simply lacks the key of an absent field.

use std::collections::BTreeMap;

use serde::Serialize;

/// Value extracted by a pattern
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key of a mapping
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?.get(key)
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(n) => serde_json::Value::from(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_to_native_json() {
        let mut item = BTreeMap::new();
        item.insert("Title".to_string(), Value::from("Widget"));
        item.insert("Price".to_string(), Value::Int(42));
        item.insert("Weight".to_string(), Value::Float(1.5));
        item.insert(
            "Tags".to_string(),
            Value::List(vec![Value::from("a"), Value::from("b")]),
        );
        let value = Value::Map(item);

        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(
            json,
            r#"{"Price":42,"Tags":["a","b"],"Title":"Widget","Weight":1.5}"#
        );
        assert_eq!(serde_json::to_value(&value).unwrap(), value.to_json());
    }

    #[test]
    fn test_accessors() {
        let value = Value::Map(BTreeMap::from([("n".to_string(), Value::Int(3))]));
        assert_eq!(value.get("n").and_then(Value::as_i64), Some(3));
        assert_eq!(value.get("n").and_then(Value::as_f64), Some(3.0));
        assert!(value.get("missing").is_none());
        assert!(Value::from("x").as_map().is_none());
    }
}
