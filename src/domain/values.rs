//! Concrete values and the simplicity order used during shrinking

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A concrete value bound to a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Int(i64),
    Bool(bool),
    Text(String),
    Null,
    List(Vec<Value>),
    Record(Vec<(String, Value)>),
}

/// Parameter name to value, ordered by name.
pub type Bindings = BTreeMap<String, Value>;

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a record field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Text(_) => "text",
            Value::Null => "null",
            Value::List(_) => "list",
            Value::Record(_) => "record",
        }
    }

    /// Canonical compact rendering. The simplicity order compares these.
    pub fn serialized(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Null => write!(f, "null"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}:{}", name, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Sort key for the total simplicity order: serialized length in characters,
/// then the serialized text lexicographically. Smaller is simpler.
pub fn sort_key(value: &Value) -> (usize, String) {
    let rendered = value.serialized();
    (rendered.chars().count(), rendered)
}

/// Sort key over a whole binding set, rendered in parameter-name order.
pub fn bindings_sort_key(bindings: &Bindings) -> (usize, String) {
    let mut rendered = String::new();
    for (i, (name, value)) in bindings.iter().enumerate() {
        if i > 0 {
            rendered.push(';');
        }
        rendered.push_str(name);
        rendered.push('=');
        rendered.push_str(&value.serialized());
    }
    (rendered.chars().count(), rendered)
}

/// Whether `left` is strictly simpler than `right`.
pub fn simpler_than(left: &Bindings, right: &Bindings) -> bool {
    bindings_sort_key(left) < bindings_sort_key(right)
}

/// Render bindings as `name=value` pairs for logs and failure reasons.
pub fn render_bindings(bindings: &Bindings) -> String {
    bindings
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}
