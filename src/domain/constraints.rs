//! # Constraint Model
//!
//! A [`Constraint`] describes the legal value domain of one parameter. It is a
//! leaf data type: beyond validation it only answers the three questions the
//! rest of the engine asks of a domain:
//!
//! - [`Constraint::is_boundary`]: does a value sit on the domain's edge?
//! - [`Constraint::sample`]: produce values under a [`SampleStrategy`]
//! - [`Constraint::size`]: finite cardinality or infinite
//!
//! The generation work behind `is_boundary` and `sample` lives in
//! [`crate::domain::value_generation`]; the constraint delegates to it so that
//! every producer of values shares one definition of "boundary".
//!
//! Constraints are immutable once built. Numeric domains range over `i64`
//! integers on an optional step grid; text domains count length in `char`s and
//! restrict characters to an optional alphabet.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::value_generation::{self, GenerationResult, SampleStrategy, DEFAULT_BOUNDARY_DEPTH};
use super::values::Value;

/// Printable ASCII, used when a text constraint declares no alphabet.
pub const DEFAULT_ALPHABET: std::ops::RangeInclusive<char> = ' '..='~';

/// Result type for constraint well-formedness checks
pub type ConstraintResult<T> = Result<T, ConstraintError>;

/// A constraint that cannot describe any sensible domain.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConstraintError {
    #[error("inverted numeric range: min {min} > max {max}")]
    InvertedRange { min: i64, max: i64 },

    #[error("numeric step must be at least 1")]
    ZeroStep,

    #[error("inverted length range: min_len {min} > max_len {max}")]
    InvertedLength { min: usize, max: usize },

    #[error("text alphabet is empty")]
    EmptyAlphabet,

    #[error("presence probability {0} is outside [0, 1]")]
    PresenceOutOfRange(f64),

    #[error("duplicate composite field '{0}'")]
    DuplicateField(String),

    #[error("in '{path}': {source}")]
    Nested {
        path: String,
        #[source]
        source: Box<ConstraintError>,
    },
}

impl ConstraintError {
    fn under(self, path: impl Into<String>) -> Self {
        ConstraintError::Nested { path: path.into(), source: Box::new(self) }
    }
}

/// A value that falls outside a constraint's domain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: {message}")]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    fn new(message: impl Into<String>) -> Self {
        Violation { path: "$".to_string(), message: message.into() }
    }

    fn under(mut self, segment: &str) -> Self {
        self.path = format!("${}{}", segment, &self.path[1..]);
        self
    }
}

/// Cardinality of a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// Finite count, saturating at `u128::MAX`.
    Finite(u128),
    Infinite,
}

impl Cardinality {
    pub fn is_finite(&self) -> bool {
        matches!(self, Cardinality::Finite(_))
    }

    fn add(self, other: Cardinality) -> Cardinality {
        match (self, other) {
            (Cardinality::Finite(a), Cardinality::Finite(b)) => Cardinality::Finite(a.saturating_add(b)),
            _ => Cardinality::Infinite,
        }
    }

    fn mul(self, other: Cardinality) -> Cardinality {
        match (self, other) {
            (Cardinality::Finite(0), _) | (_, Cardinality::Finite(0)) => Cardinality::Finite(0),
            (Cardinality::Finite(a), Cardinality::Finite(b)) => Cardinality::Finite(a.saturating_mul(b)),
            _ => Cardinality::Infinite,
        }
    }
}

/// Integer range on a step grid. Missing bounds are unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericConstraint {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub step: Option<u64>,
}

impl NumericConstraint {
    pub fn step(&self) -> u64 {
        self.step.unwrap_or(1)
    }

    /// Origin of the step grid: `min`, else `max`, else zero.
    pub fn grid_origin(&self) -> i64 {
        self.min.or(self.max).unwrap_or(0)
    }

    /// Whether `value` lies on the step grid.
    pub fn on_grid(&self, value: i64) -> bool {
        let step = self.step() as i128;
        (value as i128 - self.grid_origin() as i128).rem_euclid(step) == 0
    }

    /// Largest grid value not above `max`.
    pub fn effective_max(&self) -> Option<i64> {
        let max = self.max?;
        Some(self.snap_down(max))
    }

    /// Largest grid value `<= value`.
    pub fn snap_down(&self, value: i64) -> i64 {
        let step = self.step() as i128;
        let origin = self.grid_origin() as i128;
        let offset = (value as i128 - origin).div_euclid(step) * step;
        clamp_i64(origin + offset)
    }

    fn count(&self) -> Cardinality {
        match (self.min, self.effective_max()) {
            (Some(min), Some(max)) if max >= min => {
                Cardinality::Finite(((max as i128 - min as i128) / self.step() as i128) as u128 + 1)
            }
            (Some(_), Some(_)) => Cardinality::Finite(0),
            _ => Cardinality::Infinite,
        }
    }
}

pub(crate) fn clamp_i64(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Strings whose length in chars is within bounds, drawn from an alphabet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextConstraint {
    pub min_len: usize,
    pub max_len: Option<usize>,
    pub alphabet: Option<Vec<char>>,
}

impl TextConstraint {
    /// Sorted, deduplicated alphabet.
    pub fn alphabet_chars(&self) -> Vec<char> {
        let mut chars: Vec<char> = match &self.alphabet {
            Some(chars) => chars.clone(),
            None => DEFAULT_ALPHABET.collect(),
        };
        chars.sort_unstable();
        chars.dedup();
        chars
    }

    pub fn allows_char(&self, ch: char) -> bool {
        match &self.alphabet {
            Some(chars) => chars.contains(&ch),
            None => DEFAULT_ALPHABET.contains(&ch),
        }
    }
}

/// A value that may be absent (`Value::Null`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionalConstraint {
    pub inner: Box<Constraint>,
    /// Probability that random sampling produces a present value.
    pub presence: f64,
}

impl OptionalConstraint {
    pub fn allows_null(&self) -> bool {
        self.presence < 1.0
    }

    pub fn allows_present(&self) -> bool {
        self.presence > 0.0
    }
}

/// Homogeneous sequence of elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListConstraint {
    pub element: Box<Constraint>,
    pub min_len: usize,
    pub max_len: Option<usize>,
}

/// The legal value domain of a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    Numeric(NumericConstraint),
    Text(TextConstraint),
    Enumerated(Vec<Value>),
    Composite(Vec<(String, Constraint)>),
    Optional(OptionalConstraint),
    List(ListConstraint),
}

impl Constraint {
    /// Integers in `min..=max`.
    pub fn numeric(min: i64, max: i64) -> Self {
        Constraint::Numeric(NumericConstraint { min: Some(min), max: Some(max), step: None })
    }

    /// Integers in `min..=max` reachable from `min` in multiples of `step`.
    pub fn numeric_stepped(min: i64, max: i64, step: u64) -> Self {
        Constraint::Numeric(NumericConstraint { min: Some(min), max: Some(max), step: Some(step) })
    }

    /// All `i64` integers, with no declared bounds.
    pub fn integers() -> Self {
        Constraint::Numeric(NumericConstraint { min: None, max: None, step: None })
    }

    pub fn text(min_len: usize, max_len: usize) -> Self {
        Constraint::Text(TextConstraint { min_len, max_len: Some(max_len), alphabet: None })
    }

    pub fn text_with_alphabet(min_len: usize, max_len: usize, alphabet: &str) -> Self {
        Constraint::Text(TextConstraint {
            min_len,
            max_len: Some(max_len),
            alphabet: Some(alphabet.chars().collect()),
        })
    }

    /// Text with no upper length bound.
    pub fn unbounded_text(min_len: usize) -> Self {
        Constraint::Text(TextConstraint { min_len, max_len: None, alphabet: None })
    }

    pub fn enumerated<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Constraint::Enumerated(values.into_iter().map(Into::into).collect())
    }

    pub fn boolean() -> Self {
        Constraint::Enumerated(vec![Value::Bool(false), Value::Bool(true)])
    }

    pub fn composite<S: Into<String>>(fields: impl IntoIterator<Item = (S, Constraint)>) -> Self {
        Constraint::Composite(fields.into_iter().map(|(n, c)| (n.into(), c)).collect())
    }

    pub fn optional(inner: Constraint, presence: f64) -> Self {
        Constraint::Optional(OptionalConstraint { inner: Box::new(inner), presence })
    }

    pub fn list(element: Constraint, min_len: usize, max_len: usize) -> Self {
        Constraint::List(ListConstraint { element: Box::new(element), min_len, max_len: Some(max_len) })
    }

    /// Reject constraints that describe no sensible domain.
    pub fn check(&self) -> ConstraintResult<()> {
        match self {
            Constraint::Numeric(n) => {
                if n.step == Some(0) {
                    return Err(ConstraintError::ZeroStep);
                }
                if let (Some(min), Some(max)) = (n.min, n.max) {
                    if min > max {
                        return Err(ConstraintError::InvertedRange { min, max });
                    }
                }
                Ok(())
            }
            Constraint::Text(t) => {
                if let Some(max) = t.max_len {
                    if t.min_len > max {
                        return Err(ConstraintError::InvertedLength { min: t.min_len, max });
                    }
                }
                if matches!(&t.alphabet, Some(chars) if chars.is_empty()) {
                    return Err(ConstraintError::EmptyAlphabet);
                }
                Ok(())
            }
            Constraint::Enumerated(_) => Ok(()),
            Constraint::Composite(fields) => {
                let mut seen = HashSet::new();
                for (name, field) in fields {
                    if !seen.insert(name.as_str()) {
                        return Err(ConstraintError::DuplicateField(name.clone()));
                    }
                    field.check().map_err(|e| e.under(name.clone()))?;
                }
                Ok(())
            }
            Constraint::Optional(o) => {
                if !(0.0..=1.0).contains(&o.presence) {
                    return Err(ConstraintError::PresenceOutOfRange(o.presence));
                }
                o.inner.check().map_err(|e| e.under("?"))
            }
            Constraint::List(l) => {
                if let Some(max) = l.max_len {
                    if l.min_len > max {
                        return Err(ConstraintError::InvertedLength { min: l.min_len, max });
                    }
                }
                l.element.check().map_err(|e| e.under("[]"))
            }
        }
    }

    /// Validity predicate: `Ok` iff `value` is inside this domain.
    pub fn validate(&self, value: &Value) -> Result<(), Violation> {
        match (self, value) {
            (Constraint::Numeric(n), Value::Int(v)) => {
                if n.min.map_or(false, |min| *v < min) || n.max.map_or(false, |max| *v > max) {
                    return Err(Violation::new(format!("{} is outside {}", v, self)));
                }
                if !n.on_grid(*v) {
                    return Err(Violation::new(format!("{} is not a multiple of step {} from {}", v, n.step(), n.grid_origin())));
                }
                Ok(())
            }
            (Constraint::Text(t), Value::Text(s)) => {
                let len = s.chars().count();
                if len < t.min_len || t.max_len.map_or(false, |max| len > max) {
                    return Err(Violation::new(format!("length {} is outside {}", len, self)));
                }
                if let Some(ch) = s.chars().find(|ch| !t.allows_char(*ch)) {
                    return Err(Violation::new(format!("character {:?} is not in the alphabet", ch)));
                }
                Ok(())
            }
            (Constraint::Enumerated(values), v) => {
                if values.contains(v) {
                    Ok(())
                } else {
                    Err(Violation::new(format!("{} is not one of the declared values", v)))
                }
            }
            (Constraint::Composite(fields), Value::Record(record)) => {
                if fields.len() != record.len() {
                    return Err(Violation::new(format!("expected {} fields, found {}", fields.len(), record.len())));
                }
                for ((name, field), (record_name, field_value)) in fields.iter().zip(record) {
                    if name != record_name {
                        return Err(Violation::new(format!("expected field '{}', found '{}'", name, record_name)));
                    }
                    field.validate(field_value).map_err(|v| v.under(&format!(".{}", name)))?;
                }
                Ok(())
            }
            (Constraint::Optional(o), Value::Null) => {
                if o.allows_null() {
                    Ok(())
                } else if o.allows_present() && o.inner.contains(&Value::Null) {
                    // the inner domain admits null itself
                    Ok(())
                } else {
                    Err(Violation::new("value is required (presence = 1)"))
                }
            }
            (Constraint::Optional(o), v) => {
                if !o.allows_present() {
                    return Err(Violation::new("value must be absent (presence = 0)"));
                }
                o.inner.validate(v)
            }
            (Constraint::List(l), Value::List(items)) => {
                if items.len() < l.min_len || l.max_len.map_or(false, |max| items.len() > max) {
                    return Err(Violation::new(format!("length {} is outside {}", items.len(), self)));
                }
                for (i, item) in items.iter().enumerate() {
                    l.element.validate(item).map_err(|v| v.under(&format!("[{}]", i)))?;
                }
                Ok(())
            }
            (_, v) => Err(Violation::new(format!("{} value does not fit {}", v.kind(), self))),
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.validate(value).is_ok()
    }

    /// Whether `value` is one of this domain's boundary values.
    ///
    /// Domains that cannot be finitely reduced have no boundary set and
    /// answer `false`.
    pub fn is_boundary(&self, value: &Value) -> bool {
        value_generation::generate_boundaries_at_depth(self, DEFAULT_BOUNDARY_DEPTH)
            .map(|boundaries| boundaries.contains(value))
            .unwrap_or(false)
    }

    pub fn sample(&self, strategy: &SampleStrategy) -> GenerationResult<Vec<Value>> {
        match strategy {
            SampleStrategy::Boundaries { depth } => value_generation::generate_boundaries_at_depth(self, *depth),
            SampleStrategy::EquivalenceClasses => value_generation::generate_equivalence_classes(self),
            SampleStrategy::Random { count, seed } => value_generation::sample_random(self, *count, *seed),
        }
    }

    pub fn size(&self) -> Cardinality {
        match self {
            Constraint::Numeric(n) => n.count(),
            Constraint::Text(t) => {
                let Some(max) = t.max_len else {
                    return Cardinality::Infinite;
                };
                let letters = t.alphabet_chars().len() as u128;
                sum_of_powers(Cardinality::Finite(letters), t.min_len, max)
            }
            Constraint::Enumerated(values) => {
                let mut distinct: Vec<&Value> = Vec::new();
                for v in values {
                    if !distinct.contains(&v) {
                        distinct.push(v);
                    }
                }
                Cardinality::Finite(distinct.len() as u128)
            }
            Constraint::Composite(fields) => fields
                .iter()
                .fold(Cardinality::Finite(1), |acc, (_, field)| acc.mul(field.size())),
            Constraint::Optional(o) => {
                let present = if o.allows_present() { o.inner.size() } else { Cardinality::Finite(0) };
                let absent = Cardinality::Finite(if o.allows_null() { 1 } else { 0 });
                present.add(absent)
            }
            Constraint::List(l) => match l.max_len {
                Some(max) => sum_of_powers(l.element.size(), l.min_len, max),
                None => Cardinality::Infinite,
            },
        }
    }

    /// Whether boundary and equivalence generation can reduce this domain
    /// to a finite representative set.
    pub fn is_reducible(&self) -> bool {
        match self {
            Constraint::Numeric(n) => n.min.is_some() && n.max.is_some(),
            Constraint::Text(t) => t.max_len.is_some(),
            Constraint::Enumerated(_) => true,
            Constraint::Composite(fields) => fields.iter().all(|(_, f)| f.is_reducible()),
            Constraint::Optional(o) => !o.allows_present() || o.inner.is_reducible(),
            Constraint::List(l) => l.max_len.is_some() && l.element.is_reducible(),
        }
    }
}

/// `base^min + base^(min+1) + ... + base^max`, saturating.
fn sum_of_powers(base: Cardinality, min: usize, max: usize) -> Cardinality {
    let Cardinality::Finite(b) = base else {
        return if max == 0 { Cardinality::Finite(1) } else { Cardinality::Infinite };
    };
    let mut total: u128 = 0;
    let mut power: u128 = 1;
    for len in 0..=max {
        if len >= min {
            total = total.saturating_add(power);
        }
        if total == u128::MAX {
            break;
        }
        power = power.saturating_mul(b);
    }
    Cardinality::Finite(total)
}

fn fmt_bound(bound: Option<i64>) -> String {
    bound.map(|b| b.to_string()).unwrap_or_default()
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Numeric(n) => {
                write!(f, "Numeric({}..={}", fmt_bound(n.min), fmt_bound(n.max))?;
                if let Some(step) = n.step {
                    write!(f, " step {}", step)?;
                }
                write!(f, ")")
            }
            Constraint::Text(t) => match t.max_len {
                Some(max) => write!(f, "Text(len {}..={})", t.min_len, max),
                None => write!(f, "Text(len {}..)", t.min_len),
            },
            Constraint::Enumerated(values) => write!(f, "Enumerated({} values)", values.len()),
            Constraint::Composite(fields) => {
                let names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
                write!(f, "Composite({})", names.join(", "))
            }
            Constraint::Optional(o) => write!(f, "Optional({}, p={})", o.inner, o.presence),
            Constraint::List(l) => match l.max_len {
                Some(max) => write!(f, "List({}, len {}..={})", l.element, l.min_len, max),
                None => write!(f, "List({}, len {}..)", l.element, l.min_len),
            },
        }
    }
}
