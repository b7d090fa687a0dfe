//! # Matrix Builder
//!
//! Combines per-parameter value sets into a covering array: every combination
//! of `strength` parameters sees every tuple of their values in at least one
//! row, while the row count stays near `v^strength` instead of `v^n`.
//!
//! ## Construction
//!
//! Parameters are ordered by name and their values are the boundary values
//! followed by any equivalence-class representatives not already present.
//! Rows are built greedily:
//!
//! 1. Seed the row with the first uncovered tuple (combinations in
//!    lexicographic order of parameter names, tuples in value-index order).
//! 2. For each still-unassigned parameter, in name order, pick the value that
//!    covers the most uncovered tuples among already-assigned parameters.
//!    Ties go to the value that leaves the most partner combinations with an
//!    uncovered tuple still reachable from the partial row, then to the lowest
//!    value index, so a parameter that gains nothing either way is fixed to
//!    its lowest-index representative.
//! 3. Mark every tuple the row covers and repeat until none remain.
//!
//! Identical input always yields the identical matrix.
//!
//! The builder also emits the [`CoverageUniverse`]: the fixed set of
//! behavioral predicates (boundaries, classes, interaction tuples) that the
//! coverage model measures against.

use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

use crate::case::{Provenance, TestCase};
use crate::domain::{
    derive_seed, draw, generate_boundaries_at_depth, generate_equivalence_classes, Bindings, Constraint,
    GenerationError, Value, DEFAULT_BOUNDARY_DEPTH,
};

/// Parameter name to constraint, ordered by name.
pub type Signature = BTreeMap<String, Constraint>;

/// Result type for matrix construction
pub type MatrixResult<T> = Result<T, MatrixError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatrixError {
    #[error("strength must be at least 1, got {0}")]
    InvalidStrength(usize),

    #[error("parameter '{parameter}': {source}")]
    Parameter {
        parameter: String,
        #[source]
        source: GenerationError,
    },
}

impl MatrixError {
    /// Whether the failure is an unreducible infinite domain.
    pub fn is_unbounded_domain(&self) -> bool {
        matches!(self, MatrixError::Parameter { source: GenerationError::UnboundedDomain(_), .. })
    }
}

/// The reduced value set of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDomain {
    pub name: String,
    pub boundaries: Vec<Value>,
    pub classes: Vec<Value>,
    /// Boundaries followed by classes not already among them.
    pub values: Vec<Value>,
}

impl ParameterDomain {
    pub fn reduce(name: &str, constraint: &Constraint, boundary_depth: usize) -> Result<Self, GenerationError> {
        let boundaries = generate_boundaries_at_depth(constraint, boundary_depth)?;
        let classes = generate_equivalence_classes(constraint)?;
        let mut values = boundaries.clone();
        for class in &classes {
            if !values.contains(class) {
                values.push(class.clone());
            }
        }
        Ok(Self { name: name.to_string(), boundaries, classes, values })
    }

    fn value_index(&self, value: &Value) -> Option<usize> {
        self.values.iter().position(|v| v == value)
    }
}

/// Fixed predicate universe derived from the reduced parameter domains.
///
/// Identifiers are deterministic functions of the constraint structure:
/// `"<param>:boundary:<i>"`, `"<param>:class:<i>"`, and for interaction
/// tuples `"<a>,<b>:pair:<i>,<j>"` (`value` for strength 1, `tuple` above 2),
/// optionally prefixed with `"<scope>/"`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageUniverse {
    scope: Option<String>,
    parameters: Vec<ParameterDomain>,
    strength: usize,
    predicates: Vec<String>,
}

impl CoverageUniverse {
    pub fn new(parameters: Vec<ParameterDomain>, strength: usize) -> Self {
        Self::build(None, parameters, strength)
    }

    /// Universe whose identifiers are prefixed with `scope/`.
    pub fn scoped(scope: &str, parameters: Vec<ParameterDomain>, strength: usize) -> Self {
        Self::build(Some(scope.to_string()), parameters, strength)
    }

    pub fn empty() -> Self {
        Self::build(None, Vec::new(), 0)
    }

    fn build(scope: Option<String>, parameters: Vec<ParameterDomain>, strength: usize) -> Self {
        let mut universe = Self { scope, parameters, strength, predicates: Vec::new() };
        let mut predicates = Vec::new();
        for p in &universe.parameters {
            for i in 0..p.boundaries.len() {
                predicates.push(universe.boundary_id(&p.name, i));
            }
            for i in 0..p.classes.len() {
                predicates.push(universe.class_id(&p.name, i));
            }
        }
        let radices: Vec<usize> = universe.parameters.iter().map(|p| p.values.len()).collect();
        for combo in universe.combinations() {
            let combo_radices: Vec<usize> = combo.iter().map(|&p| radices[p]).collect();
            for indices in MixedRadix::new(&combo_radices) {
                predicates.push(universe.tuple_id(&combo, &indices));
            }
        }
        universe.predicates = predicates;
        universe
    }

    /// Merge several universes, for instance one per property.
    pub fn union(universes: impl IntoIterator<Item = CoverageUniverse>) -> Vec<String> {
        universes.into_iter().flat_map(|u| u.predicates).collect()
    }

    pub fn predicates(&self) -> &[String] {
        &self.predicates
    }

    pub fn parameters(&self) -> &[ParameterDomain] {
        &self.parameters
    }

    pub fn strength(&self) -> usize {
        self.strength
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    fn prefixed(&self, id: String) -> String {
        match &self.scope {
            Some(scope) => format!("{}/{}", scope, id),
            None => id,
        }
    }

    fn boundary_id(&self, param: &str, index: usize) -> String {
        self.prefixed(format!("{}:boundary:{}", param, index))
    }

    fn class_id(&self, param: &str, index: usize) -> String {
        self.prefixed(format!("{}:class:{}", param, index))
    }

    fn tuple_id(&self, combo: &[usize], indices: &[usize]) -> String {
        let names: Vec<&str> = combo.iter().map(|&p| self.parameters[p].name.as_str()).collect();
        let kind = match combo.len() {
            1 => "value",
            2 => "pair",
            _ => "tuple",
        };
        let idx: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
        self.prefixed(format!("{}:{}:{}", names.join(","), kind, idx.join(",")))
    }

    fn combinations(&self) -> Vec<Vec<usize>> {
        combinations(self.parameters.len(), self.strength.min(self.parameters.len()))
    }

    /// Predicates a binding set exercises, found by value rather than by
    /// provenance so random and hand-written cases count too.
    pub fn predicates_hit(&self, inputs: &Bindings) -> Vec<String> {
        let mut hit = Vec::new();
        let mut value_indices: Vec<Option<usize>> = Vec::with_capacity(self.parameters.len());
        for p in &self.parameters {
            let value = inputs.get(&p.name);
            if let Some(value) = value {
                for (i, b) in p.boundaries.iter().enumerate() {
                    if b == value {
                        hit.push(self.boundary_id(&p.name, i));
                    }
                }
                for (i, c) in p.classes.iter().enumerate() {
                    if c == value {
                        hit.push(self.class_id(&p.name, i));
                    }
                }
            }
            value_indices.push(value.and_then(|v| p.value_index(v)));
        }
        for combo in self.combinations() {
            let indices: Option<Vec<usize>> = combo.iter().map(|&p| value_indices[p]).collect();
            if let Some(indices) = indices {
                hit.push(self.tuple_id(&combo, &indices));
            }
        }
        hit
    }
}

/// All `k`-element subsets of `0..n` in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if k == 0 || k > n {
        return out;
    }
    let mut current: Vec<usize> = (0..k).collect();
    loop {
        out.push(current.clone());
        let mut i = k;
        while i > 0 && current[i - 1] == n - k + (i - 1) {
            i -= 1;
        }
        if i == 0 {
            return out;
        }
        current[i - 1] += 1;
        for j in i..k {
            current[j] = current[j - 1] + 1;
        }
    }
}

/// Iterates every index vector of a mixed-radix number, last digit fastest.
struct MixedRadix {
    radices: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl MixedRadix {
    fn new(radices: &[usize]) -> Self {
        let next = if radices.iter().any(|&r| r == 0) { None } else { Some(vec![0; radices.len()]) };
        Self { radices: radices.to_vec(), next }
    }
}

impl Iterator for MixedRadix {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let mut following = current.clone();
        let mut i = following.len();
        loop {
            if i == 0 {
                break;
            }
            i -= 1;
            following[i] += 1;
            if following[i] < self.radices[i] {
                self.next = Some(following);
                break;
            }
            following[i] = 0;
        }
        Some(current)
    }
}

fn tuple_index(indices: impl Iterator<Item = usize>, radices: impl Iterator<Item = usize>) -> usize {
    indices.zip(radices).fold(0, |acc, (i, r)| acc * r + i)
}

/// A generated covering array and the universe it was built against.
#[derive(Debug, Clone)]
pub struct TestMatrix {
    pub cases: Vec<TestCase>,
    pub universe: CoverageUniverse,
}

/// Builds covering arrays at a configurable interaction strength.
#[derive(Debug, Clone)]
pub struct MatrixBuilder {
    strength: usize,
    boundary_depth: usize,
}

impl MatrixBuilder {
    pub fn new(strength: usize) -> Self {
        Self { strength, boundary_depth: DEFAULT_BOUNDARY_DEPTH }
    }

    pub fn with_boundary_depth(mut self, depth: usize) -> Self {
        self.boundary_depth = depth;
        self
    }

    /// Reduce every parameter to its boundary and class values.
    pub fn reduce(&self, signature: &Signature) -> MatrixResult<Vec<ParameterDomain>> {
        signature
            .iter()
            .map(|(name, constraint)| {
                ParameterDomain::reduce(name, constraint, self.boundary_depth)
                    .map_err(|source| MatrixError::Parameter { parameter: name.clone(), source })
            })
            .collect()
    }

    pub fn universe(&self, signature: &Signature) -> MatrixResult<CoverageUniverse> {
        if self.strength < 1 {
            return Err(MatrixError::InvalidStrength(self.strength));
        }
        Ok(CoverageUniverse::new(self.reduce(signature)?, self.strength))
    }

    pub fn build(&self, signature: &Signature) -> MatrixResult<TestMatrix> {
        if self.strength < 1 {
            return Err(MatrixError::InvalidStrength(self.strength));
        }
        let parameters = self.reduce(signature)?;
        let rows = covering_rows(&parameters, self.strength);
        let cases: Vec<TestCase> = rows
            .iter()
            .enumerate()
            .map(|(row, indices)| {
                let inputs: Bindings = parameters
                    .iter()
                    .zip(indices)
                    .map(|(p, &i)| (p.name.clone(), p.values[i].clone()))
                    .collect();
                TestCase::new(format!("matrix-{}", row), inputs, Provenance::Matrix { row })
            })
            .collect();
        let full_product: u128 = parameters.iter().map(|p| p.values.len() as u128).product();
        info!(
            "built {} rows over {} parameters at strength {} (full product {})",
            cases.len(),
            parameters.len(),
            self.strength,
            full_product
        );
        Ok(TestMatrix { cases, universe: CoverageUniverse::new(parameters, self.strength) })
    }
}

/// Greedy covering-array construction over value indices.
fn covering_rows(parameters: &[ParameterDomain], strength: usize) -> Vec<Vec<usize>> {
    let n = parameters.len();
    if n == 0 {
        return vec![Vec::new()];
    }
    let radices: Vec<usize> = parameters.iter().map(|p| p.values.len()).collect();
    let combos = combinations(n, strength.min(n));
    let mut combos_of: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (ci, combo) in combos.iter().enumerate() {
        for &p in combo {
            combos_of[p].push(ci);
        }
    }
    let mut uncovered: Vec<Vec<bool>> = combos
        .iter()
        .map(|combo| vec![true; combo.iter().map(|&p| radices[p]).product()])
        .collect();
    let mut remaining: usize = uncovered.iter().map(Vec::len).sum();
    let mut rows = Vec::new();

    while remaining > 0 {
        let mut row: Vec<Option<usize>> = vec![None; n];

        // Seed with the first uncovered tuple.
        for (ci, combo) in combos.iter().enumerate() {
            if let Some(flat) = uncovered[ci].iter().position(|&u| u) {
                let mut rest = flat;
                for &p in combo.iter().rev() {
                    row[p] = Some(rest % radices[p]);
                    rest /= radices[p];
                }
                break;
            }
        }

        for p in 0..n {
            if row[p].is_some() {
                continue;
            }
            let mut best = ((0usize, 0usize), 0usize);
            for v in 0..radices[p] {
                let mut gain = 0;
                let mut open = 0;
                for &ci in &combos_of[p] {
                    let combo = &combos[ci];
                    let assigned: Option<Vec<usize>> =
                        combo.iter().map(|&q| if q == p { Some(v) } else { row[q] }).collect();
                    match assigned {
                        Some(indices) => {
                            if uncovered[ci][tuple_index(indices.into_iter(), combo.iter().map(|&q| radices[q]))] {
                                gain += 1;
                            }
                        }
                        None => {
                            if reachable(&uncovered[ci], combo, &radices, &row, p, v) {
                                open += 1;
                            }
                        }
                    }
                }
                if (gain, open) > best.0 {
                    best = ((gain, open), v);
                }
            }
            row[p] = Some(best.1);
        }

        let row: Vec<usize> = row.into_iter().map(|v| v.unwrap_or(0)).collect();
        for (ci, combo) in combos.iter().enumerate() {
            let idx = tuple_index(combo.iter().map(|&p| row[p]), combo.iter().map(|&p| radices[p]));
            if uncovered[ci][idx] {
                uncovered[ci][idx] = false;
                remaining -= 1;
            }
        }
        debug!("row {}: {:?} ({} tuples left)", rows.len(), row, remaining);
        rows.push(row);
    }
    rows
}

/// Whether some uncovered tuple of `combo` agrees with the partial `row` once
/// parameter `p` takes value `v`.
fn reachable(uncovered: &[bool], combo: &[usize], radices: &[usize], row: &[Option<usize>], p: usize, v: usize) -> bool {
    let combo_radices: Vec<usize> = combo.iter().map(|&q| radices[q]).collect();
    MixedRadix::new(&combo_radices).any(|indices| {
        let consistent = combo.iter().zip(&indices).all(|(&q, &i)| {
            if q == p {
                i == v
            } else {
                row[q].map_or(true, |assigned| assigned == i)
            }
        });
        consistent && uncovered[tuple_index(indices.iter().copied(), combo_radices.iter().copied())]
    })
}

/// `count` random cases drawn from one seeded stream, parameters in name
/// order. Every constraint must already have passed `check`.
pub fn random_cases(signature: &Signature, count: usize, seed: u64) -> MatrixResult<Vec<TestCase>> {
    let stream_seed = derive_seed(seed, "random-cases");
    let mut rng = ChaCha8Rng::seed_from_u64(stream_seed);
    let mut cases = Vec::with_capacity(count);
    for index in 0..count {
        let mut inputs = Bindings::new();
        for (name, constraint) in signature {
            let value = draw(constraint, &mut rng)
                .map_err(|source| MatrixError::Parameter { parameter: name.clone(), source })?;
            inputs.insert(name.clone(), value);
        }
        cases.push(TestCase::new(format!("random-{}", index), inputs, Provenance::Random { seed, index }));
    }
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn signature(params: &[(&str, Constraint)]) -> Signature {
        params.iter().map(|(n, c)| (n.to_string(), c.clone())).collect()
    }

    fn all_pairs_covered(matrix: &TestMatrix) -> bool {
        let params = matrix.universe.parameters();
        let mut seen = HashSet::new();
        for case in &matrix.cases {
            for a in 0..params.len() {
                for b in (a + 1)..params.len() {
                    seen.insert((a, b, case.inputs[&params[a].name].clone(), case.inputs[&params[b].name].clone()));
                }
            }
        }
        for a in 0..params.len() {
            for b in (a + 1)..params.len() {
                for va in &params[a].values {
                    for vb in &params[b].values {
                        if !seen.contains(&(a, b, va.clone(), vb.clone())) {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    #[test]
    fn test_combinations() {
        assert_eq!(combinations(4, 2).len(), 6);
        assert_eq!(combinations(3, 3), vec![vec![0, 1, 2]]);
        assert_eq!(combinations(3, 1), vec![vec![0], vec![1], vec![2]]);
        assert!(combinations(2, 3).is_empty());
    }

    #[test]
    fn test_mixed_radix() {
        let all: Vec<Vec<usize>> = MixedRadix::new(&[2, 3]).collect();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], vec![0, 0]);
        assert_eq!(all[1], vec![0, 1]);
        assert_eq!(all[5], vec![1, 2]);
    }

    #[test]
    fn test_two_parameters_pairwise_is_full_product() {
        let sig = signature(&[("a", Constraint::numeric(0, 3)), ("b", Constraint::numeric(0, 3))]);
        let matrix = MatrixBuilder::new(2).build(&sig).unwrap();
        assert_eq!(matrix.cases.len(), 16);
        assert!(all_pairs_covered(&matrix));
    }

    #[test]
    fn test_pairwise_reduces_product() {
        let sig = signature(&[
            ("a", Constraint::numeric(0, 3)),
            ("b", Constraint::numeric(0, 3)),
            ("c", Constraint::numeric(0, 3)),
            ("d", Constraint::numeric(0, 3)),
        ]);
        let matrix = MatrixBuilder::new(2).build(&sig).unwrap();
        assert!(all_pairs_covered(&matrix));
        assert!(matrix.cases.len() >= 16);
        assert!(matrix.cases.len() < 4 * 4 * 4 * 4);
    }

    #[test]
    fn test_pairwise_rows_stay_flat_as_parameters_grow() {
        let names = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let params: Vec<(&str, Constraint)> = names.iter().map(|n| (*n, Constraint::numeric(0, 3))).collect();
        let six = MatrixBuilder::new(2).build(&signature(&params[..6])).unwrap();
        let eight = MatrixBuilder::new(2).build(&signature(&params)).unwrap();
        assert!(all_pairs_covered(&eight));
        assert!(six.cases.len() <= 28);
        assert!(eight.cases.len() <= 28);
    }

    #[test]
    fn test_build_is_deterministic() {
        let sig = signature(&[
            ("flag", Constraint::boolean()),
            ("n", Constraint::numeric(-5, 5)),
            ("s", Constraint::text(0, 3)),
        ]);
        let first = MatrixBuilder::new(2).build(&sig).unwrap();
        let second = MatrixBuilder::new(2).build(&sig).unwrap();
        let inputs = |m: &TestMatrix| m.cases.iter().map(|c| c.inputs.clone()).collect::<Vec<_>>();
        assert_eq!(inputs(&first), inputs(&second));
    }

    #[test]
    fn test_strength_one_covers_every_value() {
        let sig = signature(&[("a", Constraint::numeric(0, 10)), ("b", Constraint::boolean())]);
        let matrix = MatrixBuilder::new(1).build(&sig).unwrap();
        let a_values = &matrix.universe.parameters()[0].values;
        assert_eq!(matrix.cases.len(), a_values.len());
    }

    #[test]
    fn test_unbounded_parameter_fails() {
        let sig = signature(&[("a", Constraint::integers()), ("b", Constraint::boolean())]);
        let err = MatrixBuilder::new(2).build(&sig).unwrap_err();
        assert!(err.is_unbounded_domain());
    }

    #[test]
    fn test_zero_strength_rejected() {
        let sig = signature(&[("b", Constraint::boolean())]);
        assert_eq!(MatrixBuilder::new(0).build(&sig).unwrap_err(), MatrixError::InvalidStrength(0));
    }

    #[test]
    fn test_no_parameters_yields_single_case() {
        let matrix = MatrixBuilder::new(2).build(&Signature::new()).unwrap();
        assert_eq!(matrix.cases.len(), 1);
        assert!(matrix.cases[0].inputs.is_empty());
        assert!(matrix.universe.is_empty());
    }

    #[test]
    fn test_universe_identifiers() {
        let sig = signature(&[("x", Constraint::numeric(0, 1)), ("y", Constraint::boolean())]);
        let universe = MatrixBuilder::new(2).universe(&sig).unwrap();
        let ids = universe.predicates();
        assert!(ids.contains(&"x:boundary:0".to_string()));
        assert!(ids.contains(&"y:class:1".to_string()));
        assert!(ids.contains(&"x,y:pair:1,0".to_string()));
        // x: 2 boundaries + 1 class, y: 2 + 2, pairs 2*2
        assert_eq!(universe.len(), 3 + 4 + 4);
    }

    #[test]
    fn test_predicates_hit_by_value() {
        let sig = signature(&[("x", Constraint::numeric(0, 10))]);
        let universe = MatrixBuilder::new(2).universe(&sig).unwrap();
        let mut inputs = Bindings::new();
        inputs.insert("x".to_string(), Value::Int(10));
        assert_eq!(universe.predicates_hit(&inputs), vec!["x:boundary:4".to_string(), "x:value:4".to_string()]);
        inputs.insert("x".to_string(), Value::Int(5));
        let hit = universe.predicates_hit(&inputs);
        assert!(hit.contains(&"x:boundary:2".to_string()));
        assert!(hit.contains(&"x:class:1".to_string()));
        inputs.insert("x".to_string(), Value::Int(3));
        assert!(universe.predicates_hit(&inputs).is_empty());
    }

    #[test]
    fn test_random_cases_are_reproducible() {
        let sig = signature(&[("x", Constraint::numeric(0, 1000)), ("s", Constraint::text(0, 8))]);
        let a = random_cases(&sig, 5, 11).unwrap();
        let b = random_cases(&sig, 5, 11).unwrap();
        assert_eq!(a.len(), 5);
        for (ca, cb) in a.iter().zip(&b) {
            assert_eq!(ca.inputs, cb.inputs);
            assert!(sig["x"].contains(&ca.inputs["x"]));
        }
    }
}
