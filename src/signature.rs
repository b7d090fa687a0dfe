//! Building constraints from an externally extracted signature.
//!
//! The engine never inspects live code. Callers hand over a
//! [`SignatureDescription`], usually parsed from JSON, and get back a
//! parameter-name to [`Constraint`] map ready for the matrix builder.
//!
//! ```json
//! {
//!   "parameters": [
//!     { "name": "count", "type": { "kind": "integer", "min": 0, "max": 10 } },
//!     { "name": "label", "type": { "kind": "text", "max_len": 8 } }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{Constraint, ConstraintError, ListConstraint, NumericConstraint, TextConstraint, Value};
use crate::matrix::Signature;

pub type SignatureResult<T> = Result<T, SignatureError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature description: {0}")]
    Parse(String),

    #[error("parameter name must not be empty")]
    EmptyName,

    #[error("duplicate parameter '{0}'")]
    DuplicateParameter(String),

    #[error("parameter '{parameter}': {source}")]
    Constraint {
        parameter: String,
        #[source]
        source: ConstraintError,
    },
}

impl From<serde_json::Error> for SignatureError {
    fn from(e: serde_json::Error) -> Self {
        SignatureError::Parse(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDescription,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDescription {
    Integer {
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
        #[serde(default)]
        step: Option<u64>,
    },
    Boolean,
    Text {
        #[serde(default)]
        min_len: usize,
        #[serde(default)]
        max_len: Option<usize>,
        #[serde(default)]
        alphabet: Option<String>,
    },
    Enum {
        values: Vec<Value>,
    },
    Record {
        fields: Vec<ParameterDescription>,
    },
    Optional {
        inner: Box<TypeDescription>,
        #[serde(default = "default_presence")]
        presence: f64,
    },
    List {
        element: Box<TypeDescription>,
        #[serde(default)]
        min_len: usize,
        #[serde(default)]
        max_len: Option<usize>,
    },
}

fn default_presence() -> f64 {
    0.5
}

impl TypeDescription {
    pub fn to_constraint(&self) -> Constraint {
        match self {
            TypeDescription::Integer { min, max, step } => Constraint::Numeric(NumericConstraint {
                min: *min,
                max: *max,
                step: *step,
            }),
            TypeDescription::Boolean => Constraint::boolean(),
            TypeDescription::Text { min_len, max_len, alphabet } => Constraint::Text(TextConstraint {
                min_len: *min_len,
                max_len: *max_len,
                alphabet: alphabet.as_ref().map(|a| a.chars().collect()),
            }),
            TypeDescription::Enum { values } => Constraint::Enumerated(values.clone()),
            TypeDescription::Record { fields } => Constraint::Composite(
                fields.iter().map(|f| (f.name.clone(), f.ty.to_constraint())).collect(),
            ),
            TypeDescription::Optional { inner, presence } => Constraint::optional(inner.to_constraint(), *presence),
            TypeDescription::List { element, min_len, max_len } => Constraint::List(ListConstraint {
                element: Box::new(element.to_constraint()),
                min_len: *min_len,
                max_len: *max_len,
            }),
        }
    }
}

/// Parameters of one callable, in declaration order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SignatureDescription {
    pub parameters: Vec<ParameterDescription>,
}

impl SignatureDescription {
    pub fn from_json(json: &str) -> SignatureResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Turn a signature description into checked constraints.
pub fn build_constraints_from_signature(description: &SignatureDescription) -> SignatureResult<Signature> {
    let mut constraints = BTreeMap::new();
    for parameter in &description.parameters {
        if parameter.name.is_empty() {
            return Err(SignatureError::EmptyName);
        }
        let constraint = parameter.ty.to_constraint();
        constraint
            .check()
            .map_err(|source| SignatureError::Constraint { parameter: parameter.name.clone(), source })?;
        if constraints.insert(parameter.name.clone(), constraint).is_some() {
            return Err(SignatureError::DuplicateParameter(parameter.name.clone()));
        }
    }
    Ok(constraints)
}
