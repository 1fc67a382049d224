//! Coverage for the `StepKind` fragments and rule-engine rewrites not
//! exercised by `scenarios.rs`: Sequence, Sync, Loop, EventTrigger,
//! ErrorHandler, Compensation, CircuitBreaker, PipelineStage,
//! ResourceConstrained, NestedConditional, FanOutFanIn, and rules 3/6/7.

mod common;

use test_case::test_case;
use workflow_verifier_core::build_net;
use workflow_verifier_core::petri_net::MarkingFn;
use workflow_verifier_core::validator::{self, ValidationConfig, ValidationStatus};

/// Every non-`Action`/`Parallel`/`Choice` step kind compiles to a frozen,
/// structurally valid net on its own. Some fragments (Loop, CircuitBreaker)
/// are deliberately cyclic and may never reach a terminal marking; this
/// only confirms each fragment explores without panicking and passes its
/// structural check (every node wired, or exempted as deliberately
/// unwired).
#[test_case(common::spec("sequence", vec![common::action("A", &[]), common::sequence("B", &["A"])]) ; "sequence")]
#[test_case(common::spec("sync", vec![common::action("A", &[]), common::action("B", &[]), common::sync("S", &["A", "B"])]) ; "sync")]
#[test_case(common::spec("loop", vec![common::loop_step("L", &[], "done")]) ; "loop")]
#[test_case(common::spec("event_trigger", vec![common::event_trigger("E", &[], "order.created")]) ; "event_trigger")]
#[test_case(common::spec("error_handler", vec![common::error_handler("H", &[])]) ; "error_handler")]
#[test_case(common::spec("compensation", vec![common::compensation("C", &[], &["refund", "notify"])]) ; "compensation")]
#[test_case(common::spec("circuit_breaker", vec![common::circuit_breaker("CB", &[])]) ; "circuit_breaker")]
#[test_case(common::spec("pipeline_stage", vec![common::pipeline_stage("PS", &[])]) ; "pipeline_stage")]
#[test_case(common::spec("resource_constrained", vec![common::resource_constrained("R", &[], "db-conn", 3)]) ; "resource_constrained")]
#[test_case(common::spec("nested_conditional", vec![common::nested_conditional("N", &[], &["x", "y"])]) ; "nested_conditional")]
#[test_case(common::spec("fan_out_fan_in", vec![common::action("A", &[]), common::fan_out_fan_in("F", &["A"], &["x", "y"])]) ; "fan_out_fan_in")]
fn step_kind_compiles(spec: workflow_verifier_core::IntentSpec) {
    let net = build_net(&spec).unwrap_or_else(|e| panic!("{} failed to compile: {e}", spec.name));
    assert!(!net.places().is_empty(), "{}: expected at least one place", spec.name);
    assert!(!net.transitions().is_empty(), "{}: expected at least one transition", spec.name);

    let result = validator::validate(&net, &ValidationConfig::default(), None);
    assert_eq!(
        result.structural.expect("structural check ran").status,
        ValidationStatus::Pass,
        "{}: unexpected structural violation",
        spec.name
    );
}

/// A `ResourceConstrained` pool shares one semaphore place across members
/// and seeds it once with the pool's total declared capacity (rule 5).
#[test]
fn resource_pool_shares_one_seeded_semaphore() {
    let spec = common::spec(
        "pool",
        vec![
            common::resource_constrained("R1", &[], "db-conn", 2),
            common::resource_constrained("R2", &[], "db-conn", 3),
        ],
    );
    let net = build_net(&spec).expect("compiles");

    let semaphore_places: Vec<_> = net
        .places()
        .iter()
        .filter(|p| p.id.contains("__resource_pool__db-conn"))
        .collect();
    assert_eq!(semaphore_places.len(), 1, "pool members must share one semaphore place");
    let semaphore = semaphore_places[0].index();
    assert_eq!(net.initial_marking.get(semaphore).0, 5, "semaphore seeded with pooled capacity 2+3");
}

/// Rule 3: a step with no dependents has its exit place(s) tagged `isSink`.
#[test]
fn sink_marking_tags_exit_places_with_no_dependents() {
    let spec = common::spec(
        "sequential",
        vec![common::action("A", &[]), common::action("B", &["A"])],
    );
    let net = build_net(&spec).expect("compiles");

    let sinks: Vec<_> = net.places().iter().filter(|p| p.is_sink()).collect();
    assert_eq!(sinks.len(), 1, "only B's exit place has no dependents");
    assert!(sinks[0].id.starts_with("B__"));

    let non_sinks_with_no_dependents = net
        .places()
        .iter()
        .filter(|p| p.id.starts_with("A__") && p.is_sink())
        .count();
    assert_eq!(non_sinks_with_no_dependents, 0, "A's places have a dependent (B) and are not sinks");
}

/// Rule 6: two or more `ErrorHandler` steps trigger synthesis of a global
/// error handler place/transition pair, deliberately left out of the arc
/// graph, and the validator does not mistake it for an orphan or treat it
/// as permanently enabled.
#[test]
fn two_error_handlers_synthesize_global_error_handler() {
    let spec = common::spec(
        "two-handlers",
        vec![common::error_handler("H1", &[]), common::error_handler("H2", &[])],
    );
    let net = build_net(&spec).expect("compiles");

    assert!(net.places().iter().any(|p| p.id == "__global_error_handler"));
    assert!(net.transitions().iter().any(|t| t.id == "__global_error_recovery"));

    let result = validator::validate(&net, &ValidationConfig::default(), None);
    assert_ne!(result.overall, ValidationStatus::Fail);
    assert_eq!(
        result.structural.expect("structural check ran").status,
        ValidationStatus::Pass,
        "the unwired global error handler must not be reported as an orphan"
    );
    assert_eq!(
        result.liveness.expect("liveness check ran").status,
        ValidationStatus::Pass,
        "the deliberately unwired global error recovery transition must not count as dead"
    );
}

/// A single `ErrorHandler` step does not trigger rule 6.
#[test]
fn one_error_handler_does_not_synthesize_global_error_handler() {
    let spec = common::spec("one-handler", vec![common::error_handler("H1", &[])]);
    let net = build_net(&spec).expect("compiles");
    assert!(!net.places().iter().any(|p| p.id == "__global_error_handler"));
}

/// Rule 7: any step with `timeout_ms` set triggers synthesis of a timeout
/// manager place/transition pair, and it does not break liveness either.
#[test]
fn step_with_timeout_synthesizes_timeout_manager() {
    let spec = common::spec("timed", vec![common::action_with_timeout("A", &[], 5_000)]);
    let net = build_net(&spec).expect("compiles");

    assert!(net.places().iter().any(|p| p.id == "__timeout_manager"));
    assert!(net.transitions().iter().any(|t| t.id == "__timeout_check"));

    let result = validator::validate(&net, &ValidationConfig::default(), None);
    assert_ne!(result.overall, ValidationStatus::Fail);
    assert_eq!(
        result.liveness.expect("liveness check ran").status,
        ValidationStatus::Pass,
        "the deliberately unwired timeout check transition must not count as dead"
    );
}
