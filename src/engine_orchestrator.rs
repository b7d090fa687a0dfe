//! Execution orchestration.
//!
//! The [`Orchestrator`] owns a fixed-size worker pool. Workers pull test
//! cases (or properties) from a shared index, execute them against the
//! target, and hand each result to a single aggregation lock that also merges
//! coverage. One failing or panicking case never stops the others.
//!
//! Cancellation is cooperative: workers check the run's [`Interrupt`] before
//! taking new work, so a cancelled or timed-out run returns every result that
//! completed and counts the rest as skipped.

use log::{debug, info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::cancel::{CancellationToken, Interrupt, StopReason};
use crate::case::{judge, CaseResult, Outcome, Target, TestCase};
use crate::config::{ConfigError, EngineConfig};
use crate::coverage::{CoverageModel, CoverageProfile};
use crate::domain::ConstraintError;
use crate::matrix::{CoverageUniverse, TestMatrix};
use crate::property::{Property, PropertyEngine, PropertyResult, PropertyStatus};
use crate::report::Report;
use crate::shrinking::BoundExhausted;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start worker pool: {0}")]
    Pool(String),

    #[error("property '{property}', variable '{variable}': {source}")]
    Constraint {
        property: String,
        variable: String,
        #[source]
        source: ConstraintError,
    },
}

/// Results of one run plus the reason it stopped early, if it did.
#[derive(Debug, Clone)]
pub struct RunSummary<R> {
    /// Completed results, in input order.
    pub results: Vec<R>,
    pub skipped: usize,
    pub stopped: Option<StopReason>,
    pub elapsed: Duration,
    pub coverage: CoverageProfile,
    pub gaps: Vec<String>,
}

impl<R> RunSummary<R> {
    pub fn completed(&self) -> usize {
        self.results.len()
    }

    pub fn cancelled(&self) -> bool {
        self.stopped.is_some()
    }
}

/// What `run_and_report` should execute.
pub enum Workload {
    Cases { cases: Vec<TestCase>, universe: CoverageUniverse },
    Properties(Vec<Property>),
}

impl From<TestMatrix> for Workload {
    fn from(matrix: TestMatrix) -> Self {
        Workload::Cases { cases: matrix.cases, universe: matrix.universe }
    }
}

/// State shared by workers behind the aggregation lock.
struct Aggregate<R> {
    results: Vec<(usize, R)>,
    coverage: CoverageModel,
    stopped: Option<StopReason>,
}

impl<R> Aggregate<R> {
    fn new(coverage: CoverageModel) -> Self {
        Self { results: Vec::new(), coverage, stopped: None }
    }

    fn finish(self, total: usize, start: Instant) -> RunSummary<R> {
        let mut results = self.results;
        results.sort_by_key(|(index, _)| *index);
        let results: Vec<R> = results.into_iter().map(|(_, r)| r).collect();
        RunSummary {
            skipped: total - results.len(),
            results,
            stopped: self.stopped,
            elapsed: start.elapsed(),
            coverage: self.coverage.report(),
            gaps: self.coverage.gaps(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Orchestrator {
    config: EngineConfig,
    pool: Arc<rayon::ThreadPool>,
    token: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: EngineConfig) -> OrchestratorResult<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("casegen-worker-{}", i))
            .build()
            .map_err(|e| OrchestratorError::Pool(e.to_string()))?;
        Ok(Self { config, pool: Arc::new(pool), token: CancellationToken::new() })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Token that cancels runs of this orchestrator.
    ///
    /// A cancellation is sticky: the in-flight run and every later run stop
    /// before dispatching work until [`reset_cancellation`](Self::reset_cancellation)
    /// is called.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Clear a previous cancellation so the next run starts normally.
    pub fn reset_cancellation(&self) {
        self.token.reset();
    }

    fn interrupt(&self) -> Interrupt {
        Interrupt::new(self.token.clone(), self.config.deadline())
    }

    /// Execute cases without a coverage universe.
    pub fn run(&self, cases: &[TestCase], target: &dyn Target) -> RunSummary<CaseResult> {
        self.run_with_universe(cases, target, &CoverageUniverse::empty())
    }

    pub fn run_matrix(&self, matrix: &TestMatrix, target: &dyn Target) -> RunSummary<CaseResult> {
        self.run_with_universe(&matrix.cases, target, &matrix.universe)
    }

    /// Execute cases on the worker pool, recording which predicates of
    /// `universe` each case exercised.
    pub fn run_with_universe(
        &self,
        cases: &[TestCase],
        target: &dyn Target,
        universe: &CoverageUniverse,
    ) -> RunSummary<CaseResult> {
        let start = Instant::now();
        let interrupt = self.interrupt();
        let next = AtomicUsize::new(0);
        let aggregate = Mutex::new(Aggregate::new(CoverageModel::from_universe(universe)));

        self.pool.scope(|scope| {
            for _ in 0..self.config.workers {
                scope.spawn(|_| loop {
                    if let Some(reason) = interrupt.triggered() {
                        lock(&aggregate).stopped.get_or_insert(reason);
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(case) = cases.get(index) else {
                        break;
                    };
                    let began = Instant::now();
                    let outcome = Outcome::from_verdict(judge(target, &case.inputs, &case.expectation));
                    let result = CaseResult { case: case.clone(), outcome, duration: began.elapsed() };
                    let hits = universe.predicates_hit(&case.inputs);
                    debug!("{}", result.describe());

                    let mut aggregate = lock(&aggregate);
                    aggregate.coverage.record(&result.case, &hits);
                    aggregate.results.push((index, result));
                });
            }
        });

        let summary = aggregate.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()).finish(cases.len(), start);
        if let Some(reason) = summary.stopped {
            warn!("run stopped ({:?}): {} cases completed, {} skipped", reason, summary.completed(), summary.skipped);
        }
        info!(
            "ran {} cases in {:?}, coverage {:.1}%",
            summary.completed(),
            summary.elapsed,
            summary.coverage.percentage
        );
        summary
    }

    /// Verify properties concurrently, one property per worker at a time.
    ///
    /// Malformed constraints fail the whole call before anything runs. A
    /// property whose values cannot be generated is recorded as errored.
    pub fn run_properties(
        &self,
        properties: &[Property],
        target: Option<Arc<dyn Target>>,
    ) -> OrchestratorResult<RunSummary<PropertyResult>> {
        for property in properties {
            for (variable, constraint) in &property.bindings {
                constraint.check().map_err(|source| OrchestratorError::Constraint {
                    property: property.name.clone(),
                    variable: variable.clone(),
                    source,
                })?;
            }
        }

        let start = Instant::now();
        let interrupt = self.interrupt();
        let mut engine = PropertyEngine::from_config(&self.config).with_interrupt(interrupt.clone());
        if let Some(target) = target {
            engine = engine.with_target(target);
        }
        let universes: Vec<CoverageUniverse> =
            properties.iter().map(|p| p.universe(self.config.boundary_depth)).collect();
        let coverage = CoverageModel::new(CoverageUniverse::union(universes.iter().cloned()));
        let next = AtomicUsize::new(0);
        let aggregate = Mutex::new(Aggregate::new(coverage));

        self.pool.scope(|scope| {
            for _ in 0..self.config.workers.min(properties.len()) {
                scope.spawn(|_| loop {
                    if let Some(reason) = interrupt.triggered() {
                        lock(&aggregate).stopped.get_or_insert(reason);
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(property) = properties.get(index) else {
                        break;
                    };
                    let universe = &universes[index];
                    let mut hits: Vec<Vec<String>> = Vec::new();
                    let result = engine
                        .verify_observed(property, self.config.property_samples, self.config.seed, |inputs| {
                            hits.push(universe.predicates_hit(inputs))
                        })
                        .unwrap_or_else(|e| errored(property, self.config.seed, e.to_string()));

                    let mut aggregate = lock(&aggregate);
                    for (sample, exercised) in hits.iter().enumerate() {
                        aggregate.coverage.record_named(&format!("{}#{}", property.name, sample), exercised);
                    }
                    if let Some(reason) = result.exhausted.and_then(interruption) {
                        aggregate.stopped.get_or_insert(reason);
                    }
                    aggregate.results.push((index, result));
                });
            }
        });

        let summary = aggregate.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()).finish(properties.len(), start);
        info!(
            "verified {} properties ({} failing) in {:?}",
            summary.completed(),
            summary.results.iter().filter(|r| !r.passed()).count(),
            summary.elapsed
        );
        Ok(summary)
    }

    pub fn run_and_report(&self, workload: Workload, target: Arc<dyn Target>) -> OrchestratorResult<Report> {
        match workload {
            Workload::Cases { cases, universe } => {
                let summary = self.run_with_universe(&cases, target.as_ref(), &universe);
                Ok(Report::from_case_run(&summary))
            }
            Workload::Properties(properties) => {
                let summary = self.run_properties(&properties, Some(target))?;
                Ok(Report::from_property_run(&summary))
            }
        }
    }
}

fn interruption(exhausted: BoundExhausted) -> Option<StopReason> {
    match exhausted {
        BoundExhausted::Cancelled => Some(StopReason::Cancelled),
        BoundExhausted::Deadline => Some(StopReason::DeadlineReached),
        BoundExhausted::ShrinkRounds(_) => None,
    }
}

fn errored(property: &Property, seed: u64, description: String) -> PropertyResult {
    warn!("property '{}' could not run: {}", property.name, description);
    PropertyResult {
        property: property.name.clone(),
        status: PropertyStatus::Errored(description),
        counter_example: None,
        samples_run: 0,
        shrink_steps: 0,
        shrink_rounds: 0,
        shrink_calls: 0,
        exhausted: None,
        seed,
        duration: Duration::ZERO,
    }
}
