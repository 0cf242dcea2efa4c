use std::{
    fmt::{Display, Formatter as FmtFormatter, Result as FmtResult},
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

use crate::schema::ScalarKind;

/// A single column value, as stored in a row or passed as an argument.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum ScalarValue {
    #[default]
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Lists and objects have no scalar representation.
    pub fn from_json(value: &serde_json::Value) -> Option<ScalarValue> {
        match value {
            serde_json::Value::Null => Some(ScalarValue::Null),
            serde_json::Value::Bool(b) => Some(ScalarValue::Boolean(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(ScalarValue::Int)
                .or_else(|| n.as_f64().map(ScalarValue::Float)),
            serde_json::Value::String(s) => Some(ScalarValue::String(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    /// Converts the value into the representation expected by a column of `kind`.
    /// Returns `None` when the value can't be represented.
    pub fn coerce(self, kind: ScalarKind) -> Option<ScalarValue> {
        match (kind, self) {
            (_, ScalarValue::Null) => Some(ScalarValue::Null),
            (ScalarKind::String, v @ ScalarValue::String(_)) => Some(v),
            (ScalarKind::Id, v @ ScalarValue::String(_)) => Some(v),
            (ScalarKind::Id, ScalarValue::Int(i)) => Some(ScalarValue::String(i.to_string())),
            (ScalarKind::Int, v @ ScalarValue::Int(_)) => Some(v),
            (ScalarKind::Float, v @ ScalarValue::Float(_)) => Some(v),
            (ScalarKind::Float, ScalarValue::Int(i)) => Some(ScalarValue::Float(i as f64)),
            (ScalarKind::Boolean, v @ ScalarValue::Boolean(_)) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ScalarValue::Null, ScalarValue::Null) => true,
            (ScalarValue::Boolean(a), ScalarValue::Boolean(b)) => a == b,
            (ScalarValue::Int(a), ScalarValue::Int(b)) => a == b,
            (ScalarValue::Float(a), ScalarValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ScalarValue::String(a), ScalarValue::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ScalarValue::Null => {}
            ScalarValue::Boolean(b) => b.hash(state),
            ScalarValue::Int(i) => i.hash(state),
            ScalarValue::Float(f) => f.to_bits().hash(state),
            ScalarValue::String(s) => s.hash(state),
        }
    }
}

impl Display for ScalarValue {
    fn fmt(&self, f: &mut FmtFormatter<'_>) -> FmtResult {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Boolean(b) => write!(f, "{}", b),
            ScalarValue::Int(i) => write!(f, "{}", i),
            ScalarValue::Float(v) => write!(f, "{}", v),
            ScalarValue::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::String(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::String(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float(value)
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}
