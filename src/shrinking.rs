//! Counter-example shrinking
//!
//! An explicit worklist loop over a single failing candidate. Each round
//! proposes simpler variants of the current bindings through type-specific
//! reductions and greedily accepts the first proposal that
//!
//! - still satisfies every parameter constraint,
//! - still fails, and fails the same way (violated vs raised), and
//! - is strictly simpler under [`bindings_sort_key`].
//!
//! The loop stops when a full round finds no improvement, when the round
//! limit is reached, or when the run is interrupted. Proposals already
//! evaluated are remembered and never re-run.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::cancel::{Interrupt, StopReason};
use crate::case::TestCase;
use crate::domain::{bindings_sort_key, neutral_value, numeric_target, render_bindings, Bindings, Constraint, Value};
use crate::matrix::Signature;
use crate::predicate::Verdict;

/// A limit stopped work before it converged. Recorded in results, never
/// returned as an `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum BoundExhausted {
    #[error("shrink round limit of {0} reached")]
    ShrinkRounds(usize),

    #[error("run deadline reached")]
    Deadline,

    #[error("run cancelled")]
    Cancelled,
}

impl From<StopReason> for BoundExhausted {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::Cancelled => BoundExhausted::Cancelled,
            StopReason::DeadlineReached => BoundExhausted::Deadline,
        }
    }
}

/// The transformation a shrink step applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    JumpToTarget,
    HalveTowardTarget,
    StepTowardTarget,
    RemoveSlice { start: usize, len: usize },
    SimplifyChar { index: usize },
    ReplaceWithNull,
    EarlierVariant { index: usize },
    RemoveElements { start: usize, len: usize },
}

/// One accepted reduction: which parameter, where inside its value, and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShrinkStep {
    pub parameter: String,
    /// `$` for the parameter itself, `$.field` and `$[i]` below it.
    pub path: String,
    pub reduction: Reduction,
}

/// The current failing case plus the steps that led to it.
#[derive(Debug, Clone)]
pub struct ShrinkCandidate {
    pub case: TestCase,
    pub lineage: Vec<ShrinkStep>,
}

impl ShrinkCandidate {
    pub fn new(case: TestCase) -> Self {
        Self { case, lineage: Vec::new() }
    }

    pub fn inputs(&self) -> &Bindings {
        &self.case.inputs
    }
}

/// What the shrink search ended with.
#[derive(Debug, Clone)]
pub struct ShrinkOutcome {
    pub candidate: ShrinkCandidate,
    /// Verdict of the final candidate; always a failure of the original kind.
    pub verdict: Verdict,
    pub rounds: usize,
    pub calls: usize,
    pub changes: usize,
    pub exhausted: Option<BoundExhausted>,
}

impl ShrinkOutcome {
    pub fn steps(&self) -> usize {
        self.candidate.lineage.len()
    }
}

/// A proposed replacement for a value somewhere inside one parameter.
struct Proposal {
    path: String,
    reduction: Reduction,
    value: Value,
}

/// Greedy shrinker over a failing binding set.
pub struct Shrinker<'a, F>
where
    F: Fn(&Bindings) -> Verdict,
{
    constraints: &'a Signature,
    oracle: F,
    current: ShrinkCandidate,
    verdict: Verdict,
    seen: HashSet<String>,
    calls: usize,
    changes: usize,
    round_limit: usize,
    interrupt: Interrupt,
}

impl<'a, F> Shrinker<'a, F>
where
    F: Fn(&Bindings) -> Verdict,
{
    /// `verdict` is the failure observed for `case`; `oracle` re-evaluates a
    /// candidate binding set.
    pub fn new(case: TestCase, verdict: Verdict, constraints: &'a Signature, oracle: F, round_limit: usize) -> Self {
        let mut seen = HashSet::new();
        seen.insert(render_bindings(&case.inputs));
        Self {
            constraints,
            oracle,
            current: ShrinkCandidate::new(case),
            verdict,
            seen,
            calls: 0,
            changes: 0,
            round_limit,
            interrupt: Interrupt::none(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Evaluate a candidate and adopt it if it is an improvement.
    fn consider(&mut self, inputs: Bindings, step: ShrinkStep) -> bool {
        if !self.seen.insert(render_bindings(&inputs)) {
            return false;
        }
        if bindings_sort_key(&inputs) >= bindings_sort_key(&self.current.case.inputs) {
            return false;
        }
        let valid = inputs
            .iter()
            .all(|(name, value)| self.constraints.get(name).map_or(true, |c| c.contains(value)));
        if !valid {
            return false;
        }
        self.calls += 1;
        let verdict = (self.oracle)(&inputs);
        if verdict.holds() || !verdict.same_failure_kind(&self.verdict) {
            return false;
        }
        debug!("shrink accepted {:?} on {}{}: {}", step.reduction, step.parameter, &step.path[1..], render_bindings(&inputs));
        self.current.case.inputs = inputs;
        self.current.lineage.push(step);
        self.verdict = verdict;
        self.changes += 1;
        true
    }

    /// Run one round. Returns whether any proposal was accepted, or the
    /// reason work was interrupted.
    fn run_round(&mut self) -> Result<bool, StopReason> {
        let names: Vec<String> = self.current.case.inputs.keys().cloned().collect();
        for name in names {
            let constraint = match self.constraints.get(&name) {
                Some(c) => c,
                None => continue,
            };
            let value = match self.current.case.inputs.get(&name) {
                Some(v) => v.clone(),
                None => continue,
            };
            let mut proposals = Vec::new();
            propose(constraint, &value, "$", &mut proposals);
            for proposal in proposals {
                if let Some(reason) = self.interrupt.triggered() {
                    return Err(reason);
                }
                let mut inputs = self.current.case.inputs.clone();
                inputs.insert(name.clone(), proposal.value);
                let step = ShrinkStep { parameter: name.clone(), path: proposal.path, reduction: proposal.reduction };
                if self.consider(inputs, step) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    pub fn shrink(mut self) -> ShrinkOutcome {
        let mut rounds = 0;
        let mut exhausted = None;
        loop {
            if rounds >= self.round_limit {
                warn!("shrinking stopped after {} rounds without converging", rounds);
                exhausted = Some(BoundExhausted::ShrinkRounds(self.round_limit));
                break;
            }
            rounds += 1;
            match self.run_round() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(reason) => {
                    warn!("shrinking interrupted: {:?}", reason);
                    exhausted = Some(reason.into());
                    break;
                }
            }
        }
        ShrinkOutcome {
            candidate: self.current,
            verdict: self.verdict,
            rounds,
            calls: self.calls,
            changes: self.changes,
            exhausted,
        }
    }
}

/// Lengths to try removing, largest first: `max, max/2, max/4, ..., 1`.
fn removal_lengths(max: usize) -> Vec<usize> {
    let mut lengths = Vec::new();
    let mut len = max;
    while len > 0 {
        lengths.push(len);
        len /= 2;
    }
    lengths
}

/// Append the reductions of `value` under `constraint` at `path`.
fn propose(constraint: &Constraint, value: &Value, path: &str, out: &mut Vec<Proposal>) {
    let push = |reduction: Reduction, replacement: Value, out: &mut Vec<Proposal>| {
        if &replacement != value && !out.iter().any(|p: &Proposal| p.path == path && p.value == replacement) {
            out.push(Proposal { path: path.to_string(), reduction, value: replacement });
        }
    };
    match (constraint, value) {
        (Constraint::Numeric(n), Value::Int(v)) => {
            let target = numeric_target(n) as i128;
            let v = *v as i128;
            let diff = v - target;
            if diff == 0 {
                return;
            }
            let step = n.step() as i128;
            push(Reduction::JumpToTarget, Value::Int(target as i64), out);
            let half = (diff / 2) / step * step;
            if half != 0 {
                push(Reduction::HalveTowardTarget, Value::Int((target + half) as i64), out);
            }
            push(Reduction::StepTowardTarget, Value::Int((v - diff.signum() * step) as i64), out);
        }
        (Constraint::Text(t), Value::Text(s)) => {
            let chars: Vec<char> = s.chars().collect();
            let removable = chars.len().saturating_sub(t.min_len);
            for len in removal_lengths(removable) {
                for start in 0..=(chars.len() - len) {
                    let shorter: String = chars[..start].iter().chain(&chars[start + len..]).collect();
                    push(Reduction::RemoveSlice { start, len }, Value::Text(shorter), out);
                }
            }
            if let Some(&lowest) = t.alphabet_chars().first() {
                for (index, &ch) in chars.iter().enumerate() {
                    if ch != lowest {
                        let mut simpler = chars.clone();
                        simpler[index] = lowest;
                        push(Reduction::SimplifyChar { index }, Value::Text(simpler.into_iter().collect()), out);
                    }
                }
            }
        }
        (Constraint::Enumerated(values), v) => {
            if let Some(position) = values.iter().position(|candidate| candidate == v) {
                for (index, earlier) in values[..position].iter().enumerate() {
                    push(Reduction::EarlierVariant { index }, earlier.clone(), out);
                }
            }
        }
        (Constraint::Optional(o), v) => {
            if v.is_null() {
                return;
            }
            if o.allows_null() {
                push(Reduction::ReplaceWithNull, Value::Null, out);
            }
            propose(&o.inner, v, path, out);
        }
        (Constraint::Composite(fields), Value::Record(record)) => {
            for (name, field) in fields {
                let Some(index) = record.iter().position(|(n, _)| n == name) else {
                    continue;
                };
                let mut nested = Vec::new();
                propose(field, &record[index].1, &format!("{}.{}", path, name), &mut nested);
                for proposal in nested {
                    let mut replaced = record.clone();
                    replaced[index].1 = proposal.value;
                    out.push(Proposal { path: proposal.path, reduction: proposal.reduction, value: Value::Record(replaced) });
                }
            }
        }
        (Constraint::List(l), Value::List(items)) => {
            let removable = items.len().saturating_sub(l.min_len);
            for len in removal_lengths(removable) {
                for start in 0..=(items.len() - len) {
                    let mut shorter = items[..start].to_vec();
                    shorter.extend_from_slice(&items[start + len..]);
                    push(Reduction::RemoveElements { start, len }, Value::List(shorter), out);
                }
            }
            let filler = neutral_value(&l.element).ok();
            for (index, item) in items.iter().enumerate() {
                let mut nested = Vec::new();
                propose(&l.element, item, &format!("{}[{}]", path, index), &mut nested);
                if let Some(filler) = &filler {
                    if filler != item && !nested.iter().any(|p| &p.value == filler) {
                        nested.insert(
                            0,
                            Proposal {
                                path: format!("{}[{}]", path, index),
                                reduction: Reduction::JumpToTarget,
                                value: filler.clone(),
                            },
                        );
                    }
                }
                for proposal in nested {
                    let mut replaced = items.clone();
                    replaced[index] = proposal.value;
                    out.push(Proposal { path: proposal.path, reduction: proposal.reduction, value: Value::List(replaced) });
                }
            }
        }
        _ => {}
    }
}
