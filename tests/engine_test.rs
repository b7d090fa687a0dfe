//! Generation, execution and reporting through the public entry points.

use std::sync::Arc;
use std::time::Duration;

use casegen::{
    build_constraints_from_signature, generate_matrix, run_and_report, verify_properties, Bindings, CancellationToken,
    Constraint, EngineConfig, Expectation, Orchestrator, Outcome, Predicate, Property, Report, SignatureDescription,
    StopReason, Target, TestCase, Value, Workload,
};

const SIGNATURE: &str = r#"{
    "parameters": [
        {"name": "quantity", "type": {"kind": "integer", "min": 0, "max": 100}},
        {"name": "express", "type": {"kind": "boolean"}},
        {"name": "code", "type": {"kind": "text", "min_len": 1, "max_len": 4, "alphabet": "ABC"}}
    ]
}"#;

/// Shipping cost that mishandles express orders of zero items.
fn shipping_cost(inputs: &Bindings) -> Result<Value, String> {
    let quantity = inputs.get("quantity").and_then(Value::as_int).ok_or("quantity missing")?;
    let express = inputs.get("express").and_then(Value::as_bool).ok_or("express missing")?;
    if express && quantity == 0 {
        return Err("division by zero".to_string());
    }
    Ok(Value::Int(if express { 500 / quantity + quantity } else { quantity * 2 }))
}

fn target() -> Arc<dyn Target> {
    Arc::new(shipping_cost)
}

#[test]
fn signature_to_report() {
    let description = SignatureDescription::from_json(SIGNATURE).unwrap();
    let constraints = build_constraints_from_signature(&description).unwrap();
    let config = EngineConfig { sample_count: 10, seed: 5, ..EngineConfig::default() };
    let matrix = generate_matrix(&constraints, &config).unwrap();
    let total = matrix.cases.len();

    let report = run_and_report(Workload::from(matrix), target(), &config).unwrap();
    assert_eq!(report.total(), total);
    assert_eq!(report.fail_count, 0);
    assert!(report.error_count >= 1);
    assert_eq!(report.coverage_percentage, 100.0);
    assert!(report.gaps.is_empty());
    assert!(!report.cancelled);
    for counter in &report.counter_examples {
        assert_eq!(counter.shrink_step_count, 0);
        assert_eq!(counter.minimal_input["quantity"], Value::Int(0));
        assert_eq!(counter.minimal_input["express"], Value::Bool(true));
    }

    let json = report.to_json().unwrap();
    assert_eq!(Report::from_json(&json).unwrap(), report);
}

#[test]
fn expectations_distinguish_fail_from_error() {
    let mut inputs = Bindings::new();
    inputs.insert("quantity".to_string(), Value::Int(3));
    inputs.insert("express".to_string(), Value::Bool(false));
    let mut zero_express = inputs.clone();
    zero_express.insert("quantity".to_string(), Value::Int(0));
    zero_express.insert("express".to_string(), Value::Bool(true));

    let cases = vec![
        TestCase::manual("exact", inputs.clone()).expecting(Expectation::Equals(Value::Int(6))),
        TestCase::manual("wrong", inputs).expecting(Expectation::Equals(Value::Int(7))),
        TestCase::manual("crash", zero_express),
    ];
    let orchestrator = Orchestrator::new(EngineConfig::default()).unwrap();
    let summary = orchestrator.run(&cases, &shipping_cost);

    assert_eq!(summary.results[0].outcome, Outcome::Pass);
    assert!(matches!(summary.results[1].outcome, Outcome::Fail(_)));
    assert!(matches!(summary.results[2].outcome, Outcome::Error(_)));
}

#[test]
fn properties_against_a_target_shrink_to_the_crash() {
    let positive = Property::new(
        "cost is positive",
        Predicate::leaf("result >= 0", |b| b["result"].as_int().map_or(false, |r| r >= 0)),
    )
    .for_all("quantity", Constraint::numeric(0, 5))
    .for_all("express", Constraint::boolean());

    let config = EngineConfig { property_samples: 300, seed: 11, ..EngineConfig::default() };
    let report = run_and_report(Workload::Properties(vec![positive]), target(), &config).unwrap();
    assert_eq!(report.error_count, 1);
    let counter = &report.counter_examples[0];
    assert_eq!(counter.property_name, "cost is positive");
    assert_eq!(counter.minimal_input["quantity"], Value::Int(0));
    assert_eq!(counter.minimal_input["express"], Value::Bool(true));
}

#[test]
fn verify_properties_keeps_order_and_isolates_errors() {
    let properties = vec![
        Property::new("holds", Predicate::leaf("true", |_| true)).for_all("x", Constraint::numeric(0, 5)),
        Property::new("empty", Predicate::leaf("true", |_| true))
            .for_all("x", Constraint::enumerated(Vec::<Value>::new())),
        Property::new("fails", Predicate::leaf("x < 3", |b| b["x"].as_int().unwrap_or(0) < 3))
            .for_all("x", Constraint::numeric(0, 5)),
    ];
    let results = verify_properties(&properties, &EngineConfig::default()).unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].passed());
    assert!(matches!(results[1].status, casegen::PropertyStatus::Errored(_)));
    assert_eq!(results[2].counter_example.as_ref().unwrap().input["x"], Value::Int(3));
}

#[test]
fn expired_deadline_skips_everything() {
    let config = EngineConfig { deadline_ms: Some(0), ..EngineConfig::default() };
    let orchestrator = Orchestrator::new(config).unwrap();
    let cases: Vec<TestCase> = (0..5).map(|i| TestCase::manual(format!("c{}", i), Bindings::new())).collect();
    let summary = orchestrator.run(&cases, &|_: &Bindings| -> Result<Value, String> { Ok(Value::Null) });
    assert_eq!(summary.completed(), 0);
    assert_eq!(summary.skipped, 5);
    assert_eq!(summary.stopped, Some(StopReason::DeadlineReached));
}

#[test]
fn cancellation_from_another_thread_keeps_completed_results() {
    let orchestrator = Orchestrator::new(EngineConfig { workers: 2, ..EngineConfig::default() }).unwrap();
    let token: CancellationToken = orchestrator.cancellation_token();
    let slow = |_: &Bindings| -> Result<Value, String> {
        std::thread::sleep(Duration::from_millis(5));
        Ok(Value::Null)
    };
    let cases: Vec<TestCase> = (0..400).map(|i| TestCase::manual(format!("c{}", i), Bindings::new())).collect();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        token.cancel();
    });
    let summary = orchestrator.run(&cases, &slow);
    canceller.join().unwrap();

    assert_eq!(summary.stopped, Some(StopReason::Cancelled));
    assert!(summary.completed() > 0);
    assert!(summary.skipped > 0);
    assert_eq!(summary.completed() + summary.skipped, 400);
}
