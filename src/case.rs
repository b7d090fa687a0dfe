//! Test cases and their results

use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use crate::domain::{render_bindings, Bindings, Value};
use crate::predicate::{panic_message, Predicate, PredicateEvaluationError, Verdict};

/// Binding name under which a target's return value is exposed to
/// `Expectation::Satisfies` and to properties run against a target.
pub const RESULT_BINDING: &str = "result";

/// The system under test. `Err` is an error the target reported itself.
pub trait Target: Send + Sync {
    fn call(&self, inputs: &Bindings) -> Result<Value, String>;
}

impl<F> Target for F
where
    F: Fn(&Bindings) -> Result<Value, String> + Send + Sync,
{
    fn call(&self, inputs: &Bindings) -> Result<Value, String> {
        self(inputs)
    }
}

/// Call the target, turning a panic into an error.
pub fn invoke(target: &dyn Target, inputs: &Bindings) -> Result<Value, String> {
    match catch_unwind(AssertUnwindSafe(|| target.call(inputs))) {
        Ok(result) => result,
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

/// Run the target on `inputs` and judge the output.
pub fn judge(target: &dyn Target, inputs: &Bindings, expectation: &Expectation) -> Verdict {
    match invoke(target, inputs) {
        Ok(output) => expectation.check(inputs, &output),
        Err(description) => Verdict::Raised(PredicateEvaluationError { predicate: "target".to_string(), description }),
    }
}

/// What a test case expects of the target.
#[derive(Debug, Clone)]
pub enum Expectation {
    /// Only that the target returns without error.
    Anything,
    /// The target returns exactly this value.
    Equals(Value),
    /// The predicate holds over the inputs plus a `result` binding.
    Satisfies(Predicate),
}

impl Expectation {
    pub fn check(&self, inputs: &Bindings, output: &Value) -> Verdict {
        match self {
            Expectation::Anything => Verdict::Holds,
            Expectation::Equals(expected) => {
                if output == expected {
                    Verdict::Holds
                } else {
                    Verdict::Violated { reason: format!("expected {}, got {}", expected, output) }
                }
            }
            Expectation::Satisfies(predicate) => predicate.evaluate(&with_result(inputs, output)),
        }
    }
}

/// Inputs extended with the target's output.
pub fn with_result(inputs: &Bindings, output: &Value) -> Bindings {
    let mut bindings = inputs.clone();
    bindings.insert(RESULT_BINDING.to_string(), output.clone());
    bindings
}

/// Which generator produced a test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Matrix { row: usize },
    Random { seed: u64, index: usize },
    Property { name: String, sample: usize },
    Manual,
}

/// One concrete invocation of the target. Immutable after creation.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub inputs: Bindings,
    pub expectation: Expectation,
    pub provenance: Provenance,
}

impl TestCase {
    pub fn new(name: impl Into<String>, inputs: Bindings, provenance: Provenance) -> Self {
        Self { name: name.into(), inputs, expectation: Expectation::Anything, provenance }
    }

    /// Hand-written case.
    pub fn manual(name: impl Into<String>, inputs: Bindings) -> Self {
        Self::new(name, inputs, Provenance::Manual)
    }

    pub fn expecting(mut self, expectation: Expectation) -> Self {
        self.expectation = expectation;
        self
    }
}

/// How a single case went
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail(String),
    Error(String),
}

impl Outcome {
    pub fn from_verdict(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Holds => Outcome::Pass,
            Verdict::Violated { reason } => Outcome::Fail(reason),
            Verdict::Raised(e) => Outcome::Error(e.to_string()),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass)
    }
}

#[derive(Debug, Clone)]
pub struct CaseResult {
    pub case: TestCase,
    pub outcome: Outcome,
    pub duration: Duration,
}

impl CaseResult {
    pub fn describe(&self) -> String {
        match &self.outcome {
            Outcome::Pass => format!("{} passed", self.case.name),
            Outcome::Fail(reason) => format!("{} failed on {}: {}", self.case.name, render_bindings(&self.case.inputs), reason),
            Outcome::Error(description) => {
                format!("{} errored on {}: {}", self.case.name, render_bindings(&self.case.inputs), description)
            }
        }
    }
}
