//! Domain layer: values, the constraints that bound them, and the generators
//! that produce them.
//!
//! All values flow through a [`Constraint`]; nothing downstream of this module
//! invents a value without asking a constraint for it.

pub mod constraints;
pub mod value_generation;
pub mod values;

pub use constraints::{
    Cardinality, Constraint, ConstraintError, ConstraintResult, ListConstraint, NumericConstraint,
    OptionalConstraint, TextConstraint, Violation,
};
pub use value_generation::{
    derive_seed, draw, generate_boundaries, generate_boundaries_at_depth, generate_equivalence_classes,
    neutral_value, numeric_target, out_of_domain_probes, sample_random, GenerationError, GenerationResult, SampleStrategy,
    DEFAULT_BOUNDARY_DEPTH, MAX_DRAWN_LENGTH, UNBOUNDED_LENGTH_SLACK, UNBOUNDED_NUMERIC_SPAN,
};
pub use values::{bindings_sort_key, render_bindings, simpler_than, sort_key, Bindings, Value};
