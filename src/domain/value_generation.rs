//! Value Generation System
//!
//! Produces candidate values for a [`Constraint`]: boundary values, one
//! representative per equivalence class, and seeded random samples. Every
//! value produced here satisfies the constraint it was produced from; values
//! deliberately outside a domain come only from [`out_of_domain_probes`].
//!
//! Random sampling draws from a `ChaCha8Rng` seeded with `seed_from_u64`, so an
//! identical (constraint, count, seed) triple always reproduces the same
//! sequence.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

use super::constraints::{
    clamp_i64, Constraint, ConstraintError, ListConstraint, NumericConstraint, OptionalConstraint, TextConstraint,
};
use super::values::{sort_key, Value};

/// Nested composite levels expanded by default when generating boundaries.
pub const DEFAULT_BOUNDARY_DEPTH: usize = 1;

/// Half-width of the sampling window substituted for a missing numeric bound.
pub const UNBOUNDED_NUMERIC_SPAN: i64 = 1 << 20;

/// Extra length allowed beyond `min_len` when sampling unbounded text or lists.
pub const UNBOUNDED_LENGTH_SLACK: usize = 32;

/// Longest text or list `draw` will build.
pub const MAX_DRAWN_LENGTH: usize = 1 << 20;

/// Result type for value generation operations
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Errors raised when a generator cannot produce values for a constraint
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("unbounded domain: {0} cannot be finitely reduced")]
    UnboundedDomain(String),

    #[error("empty domain: {0} admits no values")]
    EmptyDomain(String),

    #[error("oversized domain: {0} requires values longer than {max}", max = MAX_DRAWN_LENGTH)]
    Oversized(String),

    #[error("malformed constraint: {0}")]
    Constraint(#[from] ConstraintError),
}

/// How [`Constraint::sample`] should produce values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStrategy {
    Boundaries { depth: usize },
    EquivalenceClasses,
    Random { count: usize, seed: u64 },
}

fn push_unique(values: &mut Vec<Value>, value: Value) {
    if !values.contains(&value) {
        values.push(value);
    }
}

fn require_reducible(constraint: &Constraint) -> GenerationResult<()> {
    if constraint.is_reducible() {
        Ok(())
    } else {
        Err(GenerationError::UnboundedDomain(constraint.to_string()))
    }
}

/// Derive an independent seed for a named stream from a run seed.
pub fn derive_seed(seed: u64, label: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(label.as_bytes());
    let digest = hasher.finalize();
    LittleEndian::read_u64(&digest[..8])
}

/// Boundary values at the default nesting depth.
pub fn generate_boundaries(constraint: &Constraint) -> GenerationResult<Vec<Value>> {
    generate_boundaries_at_depth(constraint, DEFAULT_BOUNDARY_DEPTH)
}

/// Boundary values, expanding nested composites `depth` levels deep.
///
/// Composite boundaries are a union rather than a product: the all-neutral
/// record, then each field's boundaries with every sibling held neutral.
/// Composites below `depth` contribute only their neutral value.
pub fn generate_boundaries_at_depth(constraint: &Constraint, depth: usize) -> GenerationResult<Vec<Value>> {
    constraint.check()?;
    require_reducible(constraint)?;
    boundaries(constraint, depth)
}

fn boundaries(constraint: &Constraint, depth: usize) -> GenerationResult<Vec<Value>> {
    let mut out = Vec::new();
    match constraint {
        Constraint::Numeric(n) => {
            let (min, max) = bounded_range(n)?;
            let step = n.step() as i128;
            let mid = n.snap_down(clamp_i64((min as i128 + max as i128) / 2));
            for candidate in [min as i128, min as i128 + step, mid as i128, max as i128 - step, max as i128] {
                if candidate >= min as i128 && candidate <= max as i128 {
                    push_unique(&mut out, Value::Int(candidate as i64));
                }
            }
        }
        Constraint::Text(t) => {
            let max = t.max_len.unwrap_or(t.min_len);
            let chars = t.alphabet_chars();
            let (lowest, highest) = (chars[0], chars[chars.len() - 1]);
            let lengths = [Some(t.min_len), t.min_len.checked_add(1), max.checked_sub(1), Some(max)];
            for len in lengths.into_iter().flatten() {
                if len >= t.min_len && len <= max {
                    push_unique(&mut out, Value::Text(std::iter::repeat(lowest).take(len).collect()));
                }
            }
            let edge_len = t.min_len.max(1);
            if edge_len <= max {
                push_unique(&mut out, Value::Text(std::iter::repeat(lowest).take(edge_len).collect()));
                push_unique(&mut out, Value::Text(std::iter::repeat(highest).take(edge_len).collect()));
            }
        }
        Constraint::Enumerated(values) => {
            if values.is_empty() {
                return Err(GenerationError::EmptyDomain(constraint.to_string()));
            }
            for v in values {
                push_unique(&mut out, v.clone());
            }
        }
        Constraint::Composite(fields) => {
            let neutral = neutral_fields(fields)?;
            push_unique(&mut out, Value::Record(neutral.clone()));
            if depth == 0 {
                return Ok(out);
            }
            for (i, (_, field)) in fields.iter().enumerate() {
                for b in boundaries(field, depth - 1)? {
                    let mut record = neutral.clone();
                    record[i].1 = b;
                    push_unique(&mut out, Value::Record(record));
                }
            }
        }
        Constraint::Optional(o) => {
            if o.allows_null() {
                out.push(Value::Null);
            }
            if o.allows_present() {
                for b in boundaries(&o.inner, depth)? {
                    push_unique(&mut out, b);
                }
            }
        }
        Constraint::List(l) => {
            let max = l.max_len.unwrap_or(l.min_len);
            let filler = neutral_value(&l.element)?;
            let lengths = [Some(l.min_len), l.min_len.checked_add(1), max.checked_sub(1), Some(max)];
            for len in lengths.into_iter().flatten() {
                if len >= l.min_len && len <= max {
                    push_unique(&mut out, Value::List(vec![filler.clone(); len]));
                }
            }
            let holder_len = l.min_len.max(1);
            if depth > 0 && holder_len <= max {
                for b in boundaries(&l.element, depth - 1)? {
                    let mut items = vec![filler.clone(); holder_len];
                    items[0] = b;
                    push_unique(&mut out, Value::List(items));
                }
            }
        }
    }
    Ok(out)
}

/// One representative value per equivalence class.
///
/// Numeric domains split into low, middle and high regions of the range; text
/// and lists into short, medium and long; enumerations treat each declared
/// value as its own class.
pub fn generate_equivalence_classes(constraint: &Constraint) -> GenerationResult<Vec<Value>> {
    constraint.check()?;
    require_reducible(constraint)?;
    equivalence_classes(constraint)
}

fn equivalence_classes(constraint: &Constraint) -> GenerationResult<Vec<Value>> {
    let mut out = Vec::new();
    match constraint {
        Constraint::Numeric(n) => {
            let (min, max) = bounded_range(n)?;
            let span = max as i128 - min as i128;
            for quarter in [1i128, 2, 3] {
                let target = clamp_i64(min as i128 + span * quarter / 4);
                push_unique(&mut out, Value::Int(n.snap_down(target).max(min)));
            }
        }
        Constraint::Text(t) => {
            let max = t.max_len.unwrap_or(t.min_len);
            let chars = t.alphabet_chars();
            for len in [t.min_len, t.min_len + (max - t.min_len) / 2, max] {
                push_unique(&mut out, Value::Text(cycle_chars(&chars, len)));
            }
        }
        Constraint::Enumerated(values) => {
            if values.is_empty() {
                return Err(GenerationError::EmptyDomain(constraint.to_string()));
            }
            for v in values {
                push_unique(&mut out, v.clone());
            }
        }
        Constraint::Composite(fields) => {
            let neutral = neutral_fields(fields)?;
            push_unique(&mut out, Value::Record(neutral.clone()));
            for (i, (_, field)) in fields.iter().enumerate() {
                for class in equivalence_classes(field)? {
                    let mut record = neutral.clone();
                    record[i].1 = class;
                    push_unique(&mut out, Value::Record(record));
                }
            }
        }
        Constraint::Optional(o) => {
            if o.allows_null() {
                out.push(Value::Null);
            }
            if o.allows_present() {
                for class in equivalence_classes(&o.inner)? {
                    push_unique(&mut out, class);
                }
            }
        }
        Constraint::List(l) => {
            let max = l.max_len.unwrap_or(l.min_len);
            let classes = equivalence_classes(&l.element)?;
            for len in [l.min_len, l.min_len + (max - l.min_len) / 2, max] {
                let items = (0..len).map(|i| classes[i % classes.len()].clone()).collect();
                push_unique(&mut out, Value::List(items));
            }
        }
    }
    Ok(out)
}

/// `count` random values, reproducible from `seed`.
pub fn sample_random(constraint: &Constraint, count: usize, seed: u64) -> GenerationResult<Vec<Value>> {
    constraint.check()?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let values = (0..count).map(|_| draw(constraint, &mut rng)).collect::<GenerationResult<Vec<_>>>()?;
    debug!("sampled {} values from {} with seed {}", values.len(), constraint, seed);
    Ok(values)
}

/// Draw a single value. The constraint must already have passed `check`.
pub fn draw(constraint: &Constraint, rng: &mut ChaCha8Rng) -> GenerationResult<Value> {
    match constraint {
        Constraint::Numeric(n) => {
            let (lo, hi) = sampling_range(n);
            let step = n.step() as i128;
            let slots = ((hi as i128 - lo as i128) / step) as u128;
            let k = rng.gen_range(0..=slots) as i128;
            Ok(Value::Int(clamp_i64(lo as i128 + k * step)))
        }
        Constraint::Text(t) => {
            let max = drawn_length_cap(constraint, t.min_len, t.max_len)?;
            let chars = t.alphabet_chars();
            let len = rng.gen_range(t.min_len..=max);
            Ok(Value::Text((0..len).map(|_| chars[rng.gen_range(0..chars.len())]).collect()))
        }
        Constraint::Enumerated(values) => {
            if values.is_empty() {
                return Err(GenerationError::EmptyDomain(constraint.to_string()));
            }
            Ok(values[rng.gen_range(0..values.len())].clone())
        }
        Constraint::Composite(fields) => {
            let mut record = Vec::with_capacity(fields.len());
            for (name, field) in fields {
                record.push((name.clone(), draw(field, rng)?));
            }
            Ok(Value::Record(record))
        }
        Constraint::Optional(OptionalConstraint { inner, presence }) => {
            if rng.gen_bool(*presence) {
                draw(inner, rng)
            } else {
                Ok(Value::Null)
            }
        }
        Constraint::List(ListConstraint { element, min_len, max_len }) => {
            let max = drawn_length_cap(constraint, *min_len, *max_len)?;
            let len = rng.gen_range(*min_len..=max);
            let items = (0..len).map(|_| draw(element, rng)).collect::<GenerationResult<Vec<_>>>()?;
            Ok(Value::List(items))
        }
    }
}

/// Upper length for a draw: the declared maximum, or `min_len` plus slack when
/// unbounded, never beyond `MAX_DRAWN_LENGTH`.
fn drawn_length_cap(constraint: &Constraint, min_len: usize, max_len: Option<usize>) -> GenerationResult<usize> {
    if min_len > MAX_DRAWN_LENGTH {
        return Err(GenerationError::Oversized(constraint.to_string()));
    }
    let max = max_len.unwrap_or_else(|| min_len.saturating_add(UNBOUNDED_LENGTH_SLACK));
    Ok(max.min(MAX_DRAWN_LENGTH).max(min_len))
}

/// The simplest value of a domain, used to hold composite siblings fixed and
/// as the target that shrinking moves toward.
pub fn neutral_value(constraint: &Constraint) -> GenerationResult<Value> {
    match constraint {
        Constraint::Numeric(n) => Ok(Value::Int(numeric_target(n))),
        Constraint::Text(TextConstraint { min_len, .. }) => {
            let lowest = lowest_char(constraint);
            Ok(Value::Text(std::iter::repeat(lowest).take(*min_len).collect()))
        }
        Constraint::Enumerated(values) => values
            .first()
            .cloned()
            .ok_or_else(|| GenerationError::EmptyDomain(constraint.to_string())),
        Constraint::Composite(fields) => Ok(Value::Record(neutral_fields(fields)?)),
        Constraint::Optional(o) => {
            if o.allows_null() {
                Ok(Value::Null)
            } else {
                neutral_value(&o.inner)
            }
        }
        Constraint::List(l) => {
            let filler = neutral_value(&l.element)?;
            Ok(Value::List(vec![filler; l.min_len]))
        }
    }
}

fn neutral_fields(fields: &[(String, Constraint)]) -> GenerationResult<Vec<(String, Value)>> {
    fields
        .iter()
        .map(|(name, field)| Ok((name.clone(), neutral_value(field)?)))
        .collect()
}

fn lowest_char(constraint: &Constraint) -> char {
    match constraint {
        Constraint::Text(t) => t.alphabet_chars().first().copied().unwrap_or(' '),
        _ => ' ',
    }
}

/// Grid value closest to zero; ties go to the simpler rendering.
pub fn numeric_target(n: &NumericConstraint) -> i64 {
    let step = n.step() as i128;
    let below = n.snap_down(0) as i128;
    let above = below + if below == 0 { 0 } else { step };
    let above_simpler = above.abs() < below.abs()
        || (above.abs() == below.abs() && sort_key(&Value::Int(clamp_i64(above))) < sort_key(&Value::Int(clamp_i64(below))));
    let mut target = if above_simpler { above } else { below };
    if let Some(min) = n.min {
        target = target.max(min as i128);
    }
    if let Some(max) = n.effective_max() {
        target = target.min(max as i128);
    }
    clamp_i64(target)
}

fn bounded_range(n: &NumericConstraint) -> GenerationResult<(i64, i64)> {
    match (n.min, n.effective_max()) {
        (Some(min), Some(max)) => Ok((min, max)),
        _ => Err(GenerationError::UnboundedDomain(Constraint::Numeric(n.clone()).to_string())),
    }
}

/// Grid-aligned sampling window; missing bounds are replaced by a window of
/// `UNBOUNDED_NUMERIC_SPAN` around the present bound or zero.
fn sampling_range(n: &NumericConstraint) -> (i64, i64) {
    let span = UNBOUNDED_NUMERIC_SPAN as i128;
    let lo_raw = match (n.min, n.max) {
        (Some(min), _) => min as i128,
        (None, Some(max)) => max as i128 - span,
        (None, None) => -span,
    };
    let hi_raw = match (n.min, n.max) {
        (_, Some(max)) => max as i128,
        (Some(min), None) => min as i128 + span,
        (None, None) => span,
    };
    let step = n.step() as i128;
    let origin = n.grid_origin() as i128;
    let lo = origin - (origin - lo_raw.max(i64::MIN as i128)).div_euclid(step) * step;
    let hi = origin + (hi_raw.min(i64::MAX as i128) - origin).div_euclid(step) * step;
    if lo > hi {
        (clamp_i64(origin), clamp_i64(origin))
    } else {
        (clamp_i64(lo), clamp_i64(hi))
    }
}

fn cycle_chars(chars: &[char], len: usize) -> String {
    (0..len).map(|i| chars[i % chars.len()]).collect()
}

/// Values deliberately outside the domain: one past each closed bound, one
/// character outside the alphabet, one value not in an enumerated set.
///
/// These never feed the test matrix; they exist so callers can force-test
/// rejection paths. Every probe returned fails `constraint.validate`.
pub fn out_of_domain_probes(constraint: &Constraint) -> Vec<Value> {
    let mut probes = Vec::new();
    match constraint {
        Constraint::Numeric(n) => {
            if let Some(min) = n.min.and_then(|m| m.checked_sub(1)) {
                probes.push(Value::Int(min));
            }
            if let Some(max) = n.max.and_then(|m| m.checked_add(1)) {
                probes.push(Value::Int(max));
            }
            if n.step() > 1 {
                if let Some(off_grid) = n.grid_origin().checked_add(1) {
                    probes.push(Value::Int(off_grid));
                }
            }
        }
        Constraint::Text(t) => {
            let lowest = lowest_char(constraint);
            if let Some(max) = t.max_len {
                probes.push(Value::Text(std::iter::repeat(lowest).take(max + 1).collect()));
            }
            if t.min_len > 0 {
                probes.push(Value::Text(std::iter::repeat(lowest).take(t.min_len - 1).collect()));
            }
            let outsider = ['\u{0}', '~', 'a', '\u{7f}', '\u{e9}', '\u{1F600}']
                .into_iter()
                .find(|ch| !t.allows_char(*ch));
            if let Some(ch) = outsider {
                let mut s: String = std::iter::repeat(lowest).take(t.min_len.saturating_sub(1)).collect();
                s.push(ch);
                probes.push(Value::Text(s));
            }
        }
        Constraint::Enumerated(values) => {
            let next_int = values.iter().filter_map(Value::as_int).max().and_then(|m| m.checked_add(1));
            let candidates = [next_int.map(Value::Int), Some(Value::text("<not-in-set>")), Some(Value::Null)];
            if let Some(probe) = candidates.into_iter().flatten().find(|v| !values.contains(v)) {
                probes.push(probe);
            }
        }
        Constraint::Composite(fields) => {
            if let Ok(neutral) = neutral_fields(fields) {
                for (i, (_, field)) in fields.iter().enumerate() {
                    for probe in out_of_domain_probes(field) {
                        let mut record = neutral.clone();
                        record[i].1 = probe;
                        probes.push(Value::Record(record));
                    }
                }
            }
        }
        Constraint::Optional(o) => {
            if !o.allows_null() {
                probes.push(Value::Null);
            }
            probes.extend(out_of_domain_probes(&o.inner).into_iter().filter(|p| !p.is_null()));
        }
        Constraint::List(l) => {
            if let Ok(filler) = neutral_value(&l.element) {
                if let Some(max) = l.max_len {
                    probes.push(Value::List(vec![filler.clone(); max + 1]));
                }
                if l.min_len > 0 {
                    probes.push(Value::List(vec![filler; l.min_len - 1]));
                }
            }
        }
    }
    probes.retain(|p| !constraint.contains(p));
    probes
}
