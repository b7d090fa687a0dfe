//! Coverage Model
//!
//! Tracks which behavioral predicates (boundaries, classes, interaction
//! tuples) have been exercised. The universe of predicate identifiers is fixed
//! when the model is created, so the percentage denominator never moves during
//! a run. Recording is an append-only merge; identifiers outside the universe
//! are ignored.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::case::TestCase;
use crate::matrix::CoverageUniverse;

/// Snapshot of coverage at one point in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageProfile {
    pub total: usize,
    /// Exercised identifier to number of cases that hit it.
    pub exercised: BTreeMap<String, u64>,
    pub cases_recorded: usize,
    pub percentage: f64,
}

impl CoverageProfile {
    pub fn exercised_count(&self) -> usize {
        self.exercised.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CoverageModel {
    universe: Vec<String>,
    members: HashSet<String>,
    counts: BTreeMap<String, u64>,
    cases: Vec<String>,
}

impl CoverageModel {
    pub fn new(universe: impl IntoIterator<Item = String>) -> Self {
        let mut ids = Vec::new();
        let mut members = HashSet::new();
        for id in universe {
            if members.insert(id.clone()) {
                ids.push(id);
            }
        }
        Self { universe: ids, members, counts: BTreeMap::new(), cases: Vec::new() }
    }

    pub fn from_universe(universe: &CoverageUniverse) -> Self {
        Self::new(universe.predicates().iter().cloned())
    }

    pub fn universe(&self) -> &[String] {
        &self.universe
    }

    /// Merge the predicates one case exercised.
    pub fn record(&mut self, case: &TestCase, exercised: &[String]) {
        self.record_named(&case.name, exercised);
    }

    pub(crate) fn record_named(&mut self, case: &str, exercised: &[String]) {
        self.cases.push(case.to_string());
        for id in exercised {
            if self.members.contains(id) {
                *self.counts.entry(id.clone()).or_insert(0) += 1;
            }
        }
    }

    pub fn merge_from(&mut self, other: &CoverageModel) {
        for (id, count) in &other.counts {
            if self.members.contains(id) {
                *self.counts.entry(id.clone()).or_insert(0) += count;
            }
        }
        self.cases.extend(other.cases.iter().cloned());
    }

    /// Exercised over total, as a percentage. An empty universe is fully covered.
    pub fn percentage(&self) -> f64 {
        if self.universe.is_empty() {
            return 100.0;
        }
        self.counts.len() as f64 * 100.0 / self.universe.len() as f64
    }

    pub fn report(&self) -> CoverageProfile {
        CoverageProfile {
            total: self.universe.len(),
            exercised: self.counts.clone(),
            cases_recorded: self.cases.len(),
            percentage: self.percentage(),
        }
    }

    /// Unexercised identifiers, in universe order.
    pub fn gaps(&self) -> Vec<String> {
        self.universe.iter().filter(|id| !self.counts.contains_key(*id)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bindings;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_record_and_gaps() {
        let mut model = CoverageModel::new(ids(&["a:boundary:0", "a:boundary:1", "b:class:0", "a,b:pair:0,0"]));
        let case = TestCase::manual("one", Bindings::new());
        model.record(&case, &ids(&["a:boundary:0", "a,b:pair:0,0", "unknown"]));
        model.record(&case, &ids(&["a:boundary:0"]));

        let profile = model.report();
        assert_eq!(profile.total, 4);
        assert_eq!(profile.exercised_count(), 2);
        assert_eq!(profile.exercised["a:boundary:0"], 2);
        assert_eq!(profile.cases_recorded, 2);
        assert!((profile.percentage - 50.0).abs() < 1e-9);
        assert_eq!(model.gaps(), ids(&["a:boundary:1", "b:class:0"]));
    }

    #[test]
    fn test_empty_universe_is_fully_covered() {
        let model = CoverageModel::new(Vec::new());
        assert_eq!(model.percentage(), 100.0);
        assert!(model.gaps().is_empty());
    }

    #[test]
    fn test_duplicate_universe_ids_count_once() {
        let model = CoverageModel::new(ids(&["x", "x", "y"]));
        assert_eq!(model.universe().len(), 2);
    }

    #[test]
    fn test_merge_from() {
        let universe = ids(&["x", "y"]);
        let mut left = CoverageModel::new(universe.clone());
        let mut right = CoverageModel::new(universe);
        left.record_named("l", &ids(&["x"]));
        right.record_named("r", &ids(&["x", "y"]));
        left.merge_from(&right);
        assert_eq!(left.report().exercised["x"], 2);
        assert!(left.gaps().is_empty());
    }
}
