//! End-to-end scenarios for generation, verification and shrinking.

use casegen::domain::generate_boundaries;
use casegen::property::verify;
use casegen::{
    out_of_domain_probes, Constraint, EngineConfig, MatrixBuilder, Predicate, Property, PropertyStatus, Signature,
    Value,
};

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|v| Value::Int(*v)).collect()
}

#[test]
fn numeric_boundaries_exclude_out_of_range_probes() {
    let constraint = Constraint::numeric(0, 10);
    let boundaries = generate_boundaries(&constraint).unwrap();
    assert_eq!(boundaries, ints(&[0, 1, 5, 9, 10]));

    let probes = out_of_domain_probes(&constraint);
    assert_eq!(probes, ints(&[-1, 11]));
    for probe in &probes {
        assert!(!boundaries.contains(probe));
        assert!(constraint.validate(probe).is_err(), "{} should be rejected", probe);
    }
}

#[test]
fn adding_zero_holds_for_every_sample() {
    let property = Property::new(
        "additive identity",
        Predicate::leaf("x + 0 == x", |b| {
            let x = b["x"].as_int().unwrap_or(0);
            x + 0 == x
        }),
    )
    .for_all("x", Constraint::numeric(-1000, 1000));

    let result = verify(&property, 500, 42).unwrap();
    assert!(result.passed());
    assert_eq!(result.samples_run, 500);
    assert!(result.counter_example.is_none());
}

/// Reverses `s`, but loses the last character of anything longer than five.
fn buggy_reverse(s: &str) -> String {
    let mut reversed: Vec<char> = s.chars().rev().collect();
    if reversed.len() > 5 {
        reversed.pop();
    }
    reversed.into_iter().collect()
}

#[test]
fn double_reverse_counter_example_shrinks_to_six_characters() {
    let property = Property::new(
        "reverse twice",
        Predicate::leaf("reverse(reverse(x)) == x", |b| {
            let x = b["x"].as_text().unwrap_or_default();
            buggy_reverse(&buggy_reverse(x)) == x
        }),
    )
    .for_all("x", Constraint::text(0, 20));

    let result = verify(&property, 100, 7).unwrap();
    assert!(!result.passed());
    assert!(matches!(result.status, PropertyStatus::Failed(_)));

    let counter = result.counter_example.unwrap();
    let minimal = counter.input["x"].as_text().unwrap().to_string();
    let original = counter.original["x"].as_text().unwrap().to_string();
    assert_eq!(minimal.chars().count(), 6);
    assert!(original.chars().count() >= 6);
    assert_eq!(minimal, "      ");
    assert!(result.shrink_steps > 0);
}

fn four_valued(names: &[&str]) -> Signature {
    names.iter().map(|n| (n.to_string(), Constraint::numeric(0, 3))).collect()
}

#[test]
fn pairwise_matrix_stays_near_the_pair_count() {
    let builder = MatrixBuilder::new(EngineConfig::default().strength);

    let two = builder.build(&four_valued(&["a", "b"])).unwrap();
    assert_eq!(two.universe.parameters()[0].values.len(), 4);
    assert_eq!(two.cases.len(), 16);

    let three = builder.build(&four_valued(&["a", "b", "c"])).unwrap();
    assert!(three.cases.len() >= 16);
    assert!(three.cases.len() < 4 * 4 * 4);

    let five = builder.build(&four_valued(&["a", "b", "c", "d", "e"])).unwrap();
    assert!(five.cases.len() < 4 * 4 * 4);
}

#[test]
fn higher_strength_covers_every_triple() {
    let sig: Signature = ["a", "b", "c", "d"]
        .iter()
        .map(|n| (n.to_string(), Constraint::boolean()))
        .collect();
    let matrix = MatrixBuilder::new(3).build(&sig).unwrap();
    let names = ["a", "b", "c", "d"];
    for i in 0..4 {
        for j in (i + 1)..4 {
            for k in (j + 1)..4 {
                for bits in 0..8u8 {
                    let want = [bits & 1 == 1, bits & 2 == 2, bits & 4 == 4];
                    let found = matrix.cases.iter().any(|case| {
                        case.inputs[names[i]] == Value::Bool(want[0])
                            && case.inputs[names[j]] == Value::Bool(want[1])
                            && case.inputs[names[k]] == Value::Bool(want[2])
                    });
                    assert!(found, "missing triple {:?} for {}{}{}", want, names[i], names[j], names[k]);
                }
            }
        }
    }
    assert!(matrix.cases.len() < 16);
}
