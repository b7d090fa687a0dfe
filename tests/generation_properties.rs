//! Property tests for the generation and shrinking invariants.

use std::collections::HashSet;

use casegen::case::Provenance;
use casegen::domain::{generate_boundaries, generate_equivalence_classes, sample_random};
use casegen::{Bindings, Constraint, MatrixBuilder, Predicate, Shrinker, Signature, TestCase, Value};
use proptest::prelude::*;

fn numeric_constraint() -> impl Strategy<Value = Constraint> {
    (-10_000i64..10_000, 0i64..5_000, 1u64..20)
        .prop_map(|(min, span, step)| Constraint::numeric_stepped(min, min + span, step))
}

fn text_constraint() -> impl Strategy<Value = Constraint> {
    (0usize..6, 0usize..12, "[a-z]{1,5}")
        .prop_map(|(min_len, extra, alphabet)| Constraint::text_with_alphabet(min_len, min_len + extra, &alphabet))
}

fn any_constraint() -> impl Strategy<Value = Constraint> {
    let leaf = prop_oneof![
        numeric_constraint(),
        text_constraint(),
        Just(Constraint::boolean()),
        prop::collection::vec(-50i64..50, 1..6).prop_map(|values| Constraint::enumerated(values)),
    ];
    leaf.prop_recursive(2, 8, 3, |inner| {
        prop_oneof![
            (inner.clone(), 0.0f64..=1.0).prop_map(|(c, p)| Constraint::optional(c, p)),
            (inner.clone(), 0usize..3, 0usize..4).prop_map(|(c, min, extra)| Constraint::list(c, min, min + extra)),
            prop::collection::vec(inner, 1..3).prop_map(|fields| {
                Constraint::composite(fields.into_iter().enumerate().map(|(i, c)| (format!("f{}", i), c)))
            }),
        ]
    })
}

proptest! {
    #[test]
    fn sampling_is_deterministic(constraint in any_constraint(), count in 0usize..40, seed in any::<u64>()) {
        let first = sample_random(&constraint, count, seed).unwrap();
        let second = sample_random(&constraint, count, seed).unwrap();
        prop_assert_eq!(first.len(), count);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn generated_values_satisfy_their_constraint(constraint in any_constraint(), seed in any::<u64>()) {
        let boundaries = generate_boundaries(&constraint).unwrap();
        let classes = generate_equivalence_classes(&constraint).unwrap();
        let samples = sample_random(&constraint, 25, seed).unwrap();
        prop_assert!(!boundaries.is_empty());
        for value in boundaries.iter().chain(&classes).chain(&samples) {
            prop_assert!(constraint.validate(value).is_ok(), "{} escapes {}", value, constraint);
        }
    }

    #[test]
    fn pairwise_matrix_covers_every_pair(
        sizes in prop::collection::vec(0i64..5, 2..5),
    ) {
        let sig: Signature = sizes
            .iter()
            .enumerate()
            .map(|(i, max)| (format!("p{}", i), Constraint::numeric(0, *max)))
            .collect();
        let matrix = MatrixBuilder::new(2).build(&sig).unwrap();
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
                        prop_assert!(seen.contains(&(a, b, va.clone(), vb.clone())));
                    }
                }
            }
        }
    }

    #[test]
    fn shrunk_counter_examples_do_not_shrink_further(threshold in 0i64..500, start in 0i64..1000, len in 0usize..12) {
        let start = start.max(threshold);
        let mut sig = Signature::new();
        sig.insert("n".to_string(), Constraint::numeric(0, 1000));
        sig.insert("s".to_string(), Constraint::text(0, 12));
        let predicate = Predicate::leaf("n below threshold", move |b: &Bindings| {
            b["n"].as_int().unwrap_or(0) < threshold
        });

        let mut inputs = Bindings::new();
        inputs.insert("n".to_string(), Value::Int(start));
        inputs.insert("s".to_string(), Value::Text("q".repeat(len)));
        let case = TestCase::new("seed", inputs, Provenance::Manual);
        let verdict = predicate.evaluate(&case.inputs);
        let first = Shrinker::new(case, verdict, &sig, |b: &Bindings| predicate.evaluate(b), 10_000).shrink();
        prop_assert_eq!(first.candidate.inputs()["n"].clone(), Value::Int(threshold));
        prop_assert_eq!(first.candidate.inputs()["s"].clone(), Value::text(""));

        let again = Shrinker::new(
            first.candidate.case.clone(),
            first.verdict.clone(),
            &sig,
            |b: &Bindings| predicate.evaluate(b),
            10_000,
        )
        .shrink();
        prop_assert_eq!(again.steps(), 0);
        prop_assert_eq!(again.candidate.inputs(), first.candidate.inputs());
    }
}
