//! Run report wire form
//!
//! The [`Report`] is the one artifact handed to reporting and CLI layers. It
//! serializes to camelCase JSON and parses back to an equal value.

use serde::{Deserialize, Serialize};

use crate::case::{CaseResult, Outcome};
use crate::domain::Bindings;
use crate::engine_orchestrator::RunSummary;
use crate::property::{PropertyResult, PropertyStatus};

/// How a counter-example failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fail,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedCounterExample {
    /// Property name, or the test case name for generated cases.
    pub property_name: String,
    pub minimal_input: Bindings,
    pub shrink_step_count: usize,
    pub kind: FailureKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub pass_count: usize,
    pub fail_count: usize,
    pub error_count: usize,
    #[serde(default)]
    pub skipped_count: usize,
    pub coverage_percentage: f64,
    pub counter_examples: Vec<ReportedCounterExample>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub gaps: Vec<String>,
}

impl Report {
    pub fn from_case_run(summary: &RunSummary<CaseResult>) -> Self {
        let mut report = Self::empty(summary);
        for result in &summary.results {
            let (kind, reason) = match &result.outcome {
                Outcome::Pass => {
                    report.pass_count += 1;
                    continue;
                }
                Outcome::Fail(reason) => {
                    report.fail_count += 1;
                    (FailureKind::Fail, reason.clone())
                }
                Outcome::Error(description) => {
                    report.error_count += 1;
                    (FailureKind::Error, description.clone())
                }
            };
            report.counter_examples.push(ReportedCounterExample {
                property_name: result.case.name.clone(),
                minimal_input: result.case.inputs.clone(),
                shrink_step_count: 0,
                kind,
                reason,
            });
        }
        report
    }

    pub fn from_property_run(summary: &RunSummary<PropertyResult>) -> Self {
        let mut report = Self::empty(summary);
        for result in &summary.results {
            let (kind, reason) = match &result.status {
                PropertyStatus::Passed => {
                    report.pass_count += 1;
                    continue;
                }
                PropertyStatus::Failed(reason) => {
                    report.fail_count += 1;
                    (FailureKind::Fail, reason.clone())
                }
                PropertyStatus::Errored(description) => {
                    report.error_count += 1;
                    (FailureKind::Error, description.clone())
                }
            };
            if let Some(counter) = &result.counter_example {
                report.counter_examples.push(ReportedCounterExample {
                    property_name: result.property.clone(),
                    minimal_input: counter.input.clone(),
                    shrink_step_count: result.shrink_steps,
                    kind,
                    reason,
                });
            }
        }
        report
    }

    fn empty<R>(summary: &RunSummary<R>) -> Self {
        Self {
            pass_count: 0,
            fail_count: 0,
            error_count: 0,
            skipped_count: summary.skipped,
            coverage_percentage: summary.coverage.percentage,
            counter_examples: Vec::new(),
            cancelled: summary.stopped.is_some(),
            gaps: summary.gaps.clone(),
        }
    }

    pub fn total(&self) -> usize {
        self.pass_count + self.fail_count + self.error_count
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
