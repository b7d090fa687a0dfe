//! Composable behavior checks.
//!
//! A [`Predicate`] is a small tree: leaves wrap a named check over a binding
//! set, inner nodes combine leaves with `And`, `Or` and `Not`. Evaluation is a
//! direct interpretation of the tree and yields a three-way [`Verdict`], so a
//! check that panics or returns an error is kept apart from one that simply
//! does not hold.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::domain::Bindings;

/// Signature of a leaf check. `Err` means the check itself could not be
/// evaluated.
pub type CheckFn = dyn Fn(&Bindings) -> Result<bool, String> + Send + Sync;

/// A predicate raised instead of answering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("predicate '{predicate}' raised: {description}")]
pub struct PredicateEvaluationError {
    pub predicate: String,
    pub description: String,
}

/// Outcome of evaluating a predicate against one binding set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Holds,
    Violated { reason: String },
    Raised(PredicateEvaluationError),
}

impl Verdict {
    pub fn holds(&self) -> bool {
        matches!(self, Verdict::Holds)
    }

    /// Whether two failing verdicts fail the same way (both violated or both raised).
    pub fn same_failure_kind(&self, other: &Verdict) -> bool {
        matches!(
            (self, other),
            (Verdict::Violated { .. }, Verdict::Violated { .. }) | (Verdict::Raised(_), Verdict::Raised(_))
        )
    }
}

#[derive(Clone)]
pub enum Predicate {
    Leaf { name: String, check: Arc<CheckFn> },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// A check that always answers.
    pub fn leaf<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Bindings) -> bool + Send + Sync + 'static,
    {
        Predicate::Leaf { name: name.into(), check: Arc::new(move |b: &Bindings| Ok(check(b))) }
    }

    /// A check that may report that it could not be evaluated.
    pub fn fallible<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Bindings) -> Result<bool, String> + Send + Sync + 'static,
    {
        Predicate::Leaf { name: name.into(), check: Arc::new(check) }
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    pub fn evaluate(&self, bindings: &Bindings) -> Verdict {
        match self {
            Predicate::Leaf { name, check } => match catch_unwind(AssertUnwindSafe(|| check(bindings))) {
                Ok(Ok(true)) => Verdict::Holds,
                Ok(Ok(false)) => Verdict::Violated { reason: format!("'{}' does not hold", name) },
                Ok(Err(description)) => Verdict::Raised(PredicateEvaluationError { predicate: name.clone(), description }),
                Err(payload) => Verdict::Raised(PredicateEvaluationError {
                    predicate: name.clone(),
                    description: panic_message(payload.as_ref()),
                }),
            },
            Predicate::And(left, right) => match left.evaluate(bindings) {
                Verdict::Holds => right.evaluate(bindings),
                failed => failed,
            },
            Predicate::Or(left, right) => {
                let first = left.evaluate(bindings);
                if first.holds() {
                    return first;
                }
                let second = right.evaluate(bindings);
                match (first, second) {
                    (_, Verdict::Holds) => Verdict::Holds,
                    (Verdict::Raised(e), _) | (_, Verdict::Raised(e)) => Verdict::Raised(e),
                    (Verdict::Violated { reason: a }, Verdict::Violated { reason: b }) => {
                        Verdict::Violated { reason: format!("{} and {}", a, b) }
                    }
                    (Verdict::Holds, _) => Verdict::Holds,
                }
            }
            Predicate::Not(inner) => match inner.evaluate(bindings) {
                Verdict::Holds => Verdict::Violated { reason: format!("'{}' holds", inner) },
                Verdict::Violated { .. } => Verdict::Holds,
                raised => raised,
            },
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Leaf { name, .. } => write!(f, "{}", name),
            Predicate::And(l, r) => write!(f, "({} && {})", l, r),
            Predicate::Or(l, r) => write!(f, "({} || {})", l, r),
            Predicate::Not(inner) => write!(f, "!{}", inner),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({})", self)
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
