//! # Property Engine
//!
//! Verifies "for all generated inputs, P holds" claims. Each bound variable
//! draws its own seeded random stream, samples are evaluated in order, and the
//! first failure is handed to the [`Shrinker`] for minimization.
//!
//! A property may run against a [`Target`]: the target is called with each
//! sample and its return value is exposed to the predicate as `result`. A
//! target error or panic counts as a raised evaluation, so it shrinks and
//! reports as `Errored` rather than `Failed`.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cancel::Interrupt;
use crate::case::{invoke, with_result, Provenance, Target, TestCase};
use crate::config::{EngineConfig, DEFAULT_PROPERTY_SAMPLES, DEFAULT_SHRINK_ROUND_LIMIT};
use crate::domain::{derive_seed, sample_random, Bindings, Constraint, GenerationError, Value, DEFAULT_BOUNDARY_DEPTH};
use crate::matrix::{CoverageUniverse, ParameterDomain, Signature};
use crate::predicate::{Predicate, PredicateEvaluationError, Verdict};
use crate::shrinking::{BoundExhausted, ShrinkStep, Shrinker};

pub type VerifyResult<T> = Result<T, PropertyError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PropertyError {
    #[error("property '{property}', variable '{variable}': {source}")]
    Variable {
        property: String,
        variable: String,
        #[source]
        source: GenerationError,
    },
}

/// A named claim quantified over constrained variables.
#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub bindings: Signature,
    pub predicate: Predicate,
}

impl Property {
    pub fn new(name: impl Into<String>, predicate: Predicate) -> Self {
        Self { name: name.into(), bindings: BTreeMap::new(), predicate }
    }

    pub fn for_all(mut self, variable: impl Into<String>, constraint: Constraint) -> Self {
        self.bindings.insert(variable.into(), constraint);
        self
    }

    /// Boundary and class predicates of every finitely reducible variable,
    /// scoped under the property name.
    pub fn universe(&self, boundary_depth: usize) -> CoverageUniverse {
        let domains = self
            .bindings
            .iter()
            .filter_map(|(name, constraint)| ParameterDomain::reduce(name, constraint, boundary_depth).ok())
            .collect();
        CoverageUniverse::scoped(&self.name, domains, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyStatus {
    Passed,
    Failed(String),
    Errored(String),
}

/// A failing input before and after shrinking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterExample {
    pub input: Bindings,
    pub original: Bindings,
    pub lineage: Vec<ShrinkStep>,
}

#[derive(Debug, Clone)]
pub struct PropertyResult {
    pub property: String,
    pub status: PropertyStatus,
    pub counter_example: Option<CounterExample>,
    pub samples_run: usize,
    pub shrink_steps: usize,
    pub shrink_rounds: usize,
    pub shrink_calls: usize,
    /// Set when a limit or interruption stopped sampling or shrinking early.
    pub exhausted: Option<BoundExhausted>,
    pub seed: u64,
    pub duration: Duration,
}

impl PropertyResult {
    pub fn passed(&self) -> bool {
        self.status == PropertyStatus::Passed
    }
}

/// Runs properties with a fixed shrink budget.
#[derive(Clone)]
pub struct PropertyEngine {
    shrink_round_limit: usize,
    boundary_depth: usize,
    target: Option<Arc<dyn Target>>,
    interrupt: Interrupt,
}

impl Default for PropertyEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SHRINK_ROUND_LIMIT)
    }
}

impl PropertyEngine {
    pub fn new(shrink_round_limit: usize) -> Self {
        Self {
            shrink_round_limit,
            boundary_depth: DEFAULT_BOUNDARY_DEPTH,
            target: None,
            interrupt: Interrupt::none(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let mut engine = Self::new(config.shrink_round_limit);
        engine.boundary_depth = config.boundary_depth;
        engine
    }

    pub fn with_target(mut self, target: Arc<dyn Target>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn boundary_depth(&self) -> usize {
        self.boundary_depth
    }

    /// Evaluate one binding set, calling the target first when there is one.
    pub fn evaluate(&self, property: &Property, inputs: &Bindings) -> Verdict {
        match &self.target {
            None => property.predicate.evaluate(inputs),
            Some(target) => match invoke(target.as_ref(), inputs) {
                Ok(output) => property.predicate.evaluate(&with_result(inputs, &output)),
                Err(description) => {
                    Verdict::Raised(PredicateEvaluationError { predicate: "target".to_string(), description })
                }
            },
        }
    }

    pub fn verify(&self, property: &Property, sample_count: usize, seed: u64) -> VerifyResult<PropertyResult> {
        self.verify_observed(property, sample_count, seed, |_| {})
    }

    /// Like [`verify`](Self::verify), reporting every sampled binding set to
    /// `observe` before it is evaluated.
    pub fn verify_observed<O>(
        &self,
        property: &Property,
        sample_count: usize,
        seed: u64,
        mut observe: O,
    ) -> VerifyResult<PropertyResult>
    where
        O: FnMut(&Bindings),
    {
        let start = Instant::now();
        let samples = self.draw_samples(property, sample_count, seed)?;
        let mut result = PropertyResult {
            property: property.name.clone(),
            status: PropertyStatus::Passed,
            counter_example: None,
            samples_run: 0,
            shrink_steps: 0,
            shrink_rounds: 0,
            shrink_calls: 0,
            exhausted: None,
            seed,
            duration: Duration::ZERO,
        };

        for (index, inputs) in samples.into_iter().enumerate() {
            if let Some(reason) = self.interrupt.triggered() {
                warn!("property '{}' stopped after {} samples: {:?}", property.name, index, reason);
                result.exhausted = Some(reason.into());
                break;
            }
            observe(&inputs);
            result.samples_run += 1;
            let verdict = self.evaluate(property, &inputs);
            if verdict.holds() {
                continue;
            }
            debug!("property '{}' failed on sample {}", property.name, index);
            let case = TestCase::new(
                format!("{}#{}", property.name, index),
                inputs.clone(),
                Provenance::Property { name: property.name.clone(), sample: index },
            );
            let outcome = Shrinker::new(
                case,
                verdict,
                &property.bindings,
                |candidate: &Bindings| self.evaluate(property, candidate),
                self.shrink_round_limit,
            )
            .with_interrupt(self.interrupt.clone())
            .shrink();

            result.status = match &outcome.verdict {
                Verdict::Raised(e) => PropertyStatus::Errored(e.to_string()),
                Verdict::Violated { reason } => PropertyStatus::Failed(reason.clone()),
                Verdict::Holds => PropertyStatus::Failed("shrunk candidate no longer fails".to_string()),
            };
            result.shrink_steps = outcome.steps();
            result.shrink_rounds = outcome.rounds;
            result.shrink_calls = outcome.calls;
            result.exhausted = outcome.exhausted;
            result.counter_example = Some(CounterExample {
                input: outcome.candidate.case.inputs,
                original: inputs,
                lineage: outcome.candidate.lineage,
            });
            break;
        }

        result.duration = start.elapsed();
        info!(
            "property '{}' {} after {} samples ({} shrink steps)",
            property.name,
            if result.passed() { "passed" } else { "failed" },
            result.samples_run,
            result.shrink_steps
        );
        Ok(result)
    }

    /// Sample `count` binding sets, one independent seeded stream per variable.
    fn draw_samples(&self, property: &Property, count: usize, seed: u64) -> VerifyResult<Vec<Bindings>> {
        let mut columns: Vec<(String, Vec<Value>)> = Vec::with_capacity(property.bindings.len());
        for (variable, constraint) in &property.bindings {
            let stream = derive_seed(seed, &format!("{}/{}", property.name, variable));
            let values = sample_random(constraint, count, stream).map_err(|source| PropertyError::Variable {
                property: property.name.clone(),
                variable: variable.clone(),
                source,
            })?;
            columns.push((variable.clone(), values));
        }
        Ok((0..count)
            .map(|i| columns.iter().map(|(name, values)| (name.clone(), values[i].clone())).collect())
            .collect())
    }
}

/// Verify with the default shrink budget.
pub fn verify(property: &Property, sample_count: usize, seed: u64) -> VerifyResult<PropertyResult> {
    PropertyEngine::default().verify(property, sample_count, seed)
}

/// Verify with the default sample count.
pub fn verify_default(property: &Property, seed: u64) -> VerifyResult<PropertyResult> {
    verify(property, DEFAULT_PROPERTY_SAMPLES, seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn non_negative() -> Property {
        Property::new("non-negative", Predicate::leaf("x >= 0", |b| b["x"].as_int().unwrap_or(-1) >= 0))
            .for_all("x", Constraint::numeric(0, 100))
    }

    #[test]
    fn test_passing_property() {
        let result = verify(&non_negative(), 50, 1).unwrap();
        assert!(result.passed());
        assert_eq!(result.samples_run, 50);
        assert!(result.counter_example.is_none());
    }

    #[test]
    fn test_failing_property_is_shrunk() {
        let property = Property::new("small", Predicate::leaf("x < 10", |b| b["x"].as_int().unwrap_or(0) < 10))
            .for_all("x", Constraint::numeric(0, 1000));
        let result = verify(&property, 100, 3).unwrap();
        assert!(!result.passed());
        let counter = result.counter_example.unwrap();
        assert_eq!(counter.input["x"], Value::Int(10));
        assert_eq!(result.shrink_steps, counter.lineage.len());
    }

    #[test]
    fn test_raising_predicate_reports_errored() {
        let property = Property::new("lookup", Predicate::fallible("lookup", |_| Err("no such key".to_string())))
            .for_all("x", Constraint::numeric(0, 10));
        let result = verify(&property, 5, 0).unwrap();
        assert!(matches!(result.status, PropertyStatus::Errored(_)));
        assert_eq!(result.counter_example.unwrap().input["x"], Value::Int(0));
    }

    #[test]
    fn test_same_seed_same_result() {
        let property = Property::new("small", Predicate::leaf("x < 500", |b| b["x"].as_int().unwrap_or(0) < 500))
            .for_all("x", Constraint::numeric(0, 1000));
        let a = verify(&property, 20, 9).unwrap();
        let b = verify(&property, 20, 9).unwrap();
        assert_eq!(a.status, b.status);
        assert_eq!(a.counter_example, b.counter_example);
        assert_eq!(a.samples_run, b.samples_run);
    }

    #[test]
    fn test_target_result_is_bound() {
        let double = Arc::new(|b: &Bindings| -> Result<Value, String> {
            Ok(Value::Int(b["x"].as_int().unwrap_or(0) * 2))
        });
        let property = Property::new(
            "doubles",
            Predicate::leaf("result is even", |b| b["result"].as_int().map_or(false, |r| r % 2 == 0)),
        )
        .for_all("x", Constraint::numeric(-50, 50));
        let result = PropertyEngine::default().with_target(double).verify(&property, 30, 4).unwrap();
        assert!(result.passed());
    }

    #[test]
    fn test_interrupt_stops_sampling_and_is_recorded() {
        let token = crate::cancel::CancellationToken::new();
        token.cancel();
        let engine = PropertyEngine::default().with_interrupt(Interrupt::new(token, None));
        let result = engine.verify(&non_negative(), 20, 1).unwrap();
        assert!(result.passed());
        assert_eq!(result.samples_run, 0);
        assert_eq!(result.exhausted, Some(BoundExhausted::Cancelled));

        let expired = PropertyEngine::default()
            .with_interrupt(Interrupt::new(crate::cancel::CancellationToken::new(), Some(Duration::ZERO)));
        let result = expired.verify(&non_negative(), 20, 1).unwrap();
        assert_eq!(result.samples_run, 0);
        assert_eq!(result.exhausted, Some(BoundExhausted::Deadline));
    }

    #[test]
    fn test_empty_enumeration_is_an_error() {
        let property = Property::new("empty", Predicate::leaf("any", |_| true))
            .for_all("x", Constraint::enumerated(Vec::<Value>::new()));
        let err = verify(&property, 5, 0).unwrap_err();
        assert!(matches!(err, PropertyError::Variable { source: GenerationError::EmptyDomain(_), .. }));
    }

    #[test]
    fn test_universe_skips_unbounded_variables() {
        let property = non_negative().for_all("n", Constraint::integers());
        let universe = property.universe(1);
        assert!(universe.predicates().iter().all(|id| id.starts_with("non-negative/x:")));
        assert!(universe.predicates().contains(&"non-negative/x:boundary:0".to_string()));
    }
}
