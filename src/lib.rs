//! # casegen
//!
//! A generative test-construction engine. Given constraints over a callable's
//! parameters it synthesizes boundary and equivalence-class values, combines
//! them into a covering array at a configurable interaction strength,
//! verifies declared properties against seeded random inputs with
//! counter-example shrinking, and reports which behavioral predicates the run
//! exercised.
//!
//! Everything is deterministic for a given seed and configuration.

pub mod cancel;
pub mod case;
pub mod config;
pub mod coverage;
pub mod domain;
pub mod engine_orchestrator;
pub mod matrix;
pub mod predicate;
pub mod property;
pub mod report;
pub mod shrinking;
pub mod signature;

use log::info;
use std::sync::Arc;

pub use cancel::{CancellationToken, StopReason};
pub use case::{CaseResult, Expectation, Outcome, Provenance, Target, TestCase};
pub use config::{ConfigError, EngineConfig};
pub use coverage::{CoverageModel, CoverageProfile};
pub use domain::{
    generate_boundaries, generate_equivalence_classes, out_of_domain_probes, sample_random, Bindings, Cardinality,
    Constraint, ConstraintError, GenerationError, Value,
};
pub use engine_orchestrator::{Orchestrator, OrchestratorError, RunSummary, Workload};
pub use matrix::{CoverageUniverse, MatrixBuilder, MatrixError, Signature, TestMatrix};
pub use predicate::{Predicate, PredicateEvaluationError, Verdict};
pub use property::{CounterExample, Property, PropertyEngine, PropertyResult, PropertyStatus};
pub use report::Report;
pub use shrinking::{BoundExhausted, ShrinkStep, Shrinker};
pub use signature::{build_constraints_from_signature, SignatureDescription, SignatureError};

pub type EngineResult<T> = Result<T, EngineError>;

/// Fatal, configuration-level failures. Per-case and per-property problems
/// are recorded in results instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("parameter '{parameter}': {source}")]
    Constraint {
        parameter: String,
        #[source]
        source: ConstraintError,
    },

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

/// Covering array over `constraints`, followed by `config.sample_count`
/// random cases, with the coverage universe of the array.
pub fn generate_matrix(constraints: &Signature, config: &EngineConfig) -> EngineResult<TestMatrix> {
    config.validate()?;
    for (parameter, constraint) in constraints {
        constraint
            .check()
            .map_err(|source| EngineError::Constraint { parameter: parameter.clone(), source })?;
    }
    let mut matrix = MatrixBuilder::new(config.strength)
        .with_boundary_depth(config.boundary_depth)
        .build(constraints)?;
    if config.sample_count > 0 {
        matrix.cases.extend(matrix::random_cases(constraints, config.sample_count, config.seed)?);
    }
    info!("generated {} test cases over {} parameters", matrix.cases.len(), constraints.len());
    Ok(matrix)
}

pub fn generate_tests(constraints: &Signature, config: &EngineConfig) -> EngineResult<Vec<TestCase>> {
    Ok(generate_matrix(constraints, config)?.cases)
}

pub fn verify_properties(properties: &[Property], config: &EngineConfig) -> EngineResult<Vec<PropertyResult>> {
    let orchestrator = Orchestrator::new(config.clone())?;
    Ok(orchestrator.run_properties(properties, None)?.results)
}

pub fn run_and_report(workload: Workload, target: Arc<dyn Target>, config: &EngineConfig) -> EngineResult<Report> {
    let orchestrator = Orchestrator::new(config.clone())?;
    Ok(orchestrator.run_and_report(workload, target)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_strength_fails_before_generation() {
        let config = EngineConfig { strength: 0, ..EngineConfig::default() };
        let err = generate_tests(&Signature::new(), &config).unwrap_err();
        assert!(matches!(err, EngineError::Config(ConfigError::InvalidStrength(0))));
    }

    #[test]
    fn test_malformed_constraint_is_fatal() {
        let mut constraints = Signature::new();
        constraints.insert("n".to_string(), Constraint::numeric_stepped(0, 10, 0));
        let err = generate_tests(&constraints, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::Constraint { source: ConstraintError::ZeroStep, .. }));
    }

    #[test]
    fn test_sample_count_appends_random_cases() {
        let mut constraints = Signature::new();
        constraints.insert("n".to_string(), Constraint::numeric(0, 10));
        let base = generate_tests(&constraints, &EngineConfig::default()).unwrap();
        let config = EngineConfig { sample_count: 7, seed: 3, ..EngineConfig::default() };
        let extended = generate_tests(&constraints, &config).unwrap();
        assert_eq!(extended.len(), base.len() + 7);
        assert!(matches!(extended.last().map(|c| &c.provenance), Some(Provenance::Random { seed: 3, index: 6 })));
    }
}
