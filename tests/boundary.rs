//! Boundary behaviors from §8: tight resource budgets and degenerate nets.

mod common;

use workflow_verifier_core::build_net;
use workflow_verifier_core::explorer::ExplorationConfig;
use workflow_verifier_core::petri_net::builder::PetriNetBuilder;
use workflow_verifier_core::petri_net::Tokens;
use workflow_verifier_core::simulator::{DeterministicResolver, SimulationConfig, SimulationState, Simulator};
use workflow_verifier_core::validator::{self, CheckKind, ValidationConfig, ValidationStatus};

#[test]
fn k_bound_one_yields_inconclusive_bound() {
    let spec = common::spec(
        "sequential",
        vec![common::action("A", &[]), common::action("B", &["A"])],
    );
    let net = build_net(&spec).expect("compiles");

    let config = ValidationConfig {
        exploration: ExplorationConfig { k_bound: 1, ..Default::default() },
        ..Default::default()
    };
    let result = validator::validate(&net, &config, None);
    assert_eq!(result.overall, ValidationStatus::InconclusiveBound);
}

#[test]
fn max_time_ms_zero_yields_inconclusive_timeout() {
    let spec = common::spec(
        "sequential",
        vec![common::action("A", &[]), common::action("B", &["A"])],
    );
    let net = build_net(&spec).expect("compiles");

    let config = ValidationConfig {
        exploration: ExplorationConfig { max_time_ms: 0, ..Default::default() },
        ..Default::default()
    };
    let result = validator::validate(&net, &config, None);
    assert_eq!(result.overall, ValidationStatus::InconclusiveTimeout);
}

#[test]
fn max_time_ms_zero_with_only_structural_check_passes() {
    let spec = common::spec("single", vec![common::action("A", &[])]);
    let net = build_net(&spec).expect("compiles");

    let config = ValidationConfig {
        exploration: ExplorationConfig { max_time_ms: 0, ..Default::default() },
        enabled_checks: [CheckKind::Structural].into_iter().collect(),
    };
    let result = validator::validate(&net, &config, None);
    assert_eq!(result.overall, ValidationStatus::Pass);
    assert_eq!(result.states_explored, 0);
}

#[test]
fn max_steps_zero_halts_before_any_firing() {
    let spec = common::spec(
        "sequential",
        vec![common::action("A", &[]), common::action("B", &["A"])],
    );
    let net = build_net(&spec).expect("compiles");

    let config = SimulationConfig { max_steps: 0, ..Default::default() };
    let mut sim = Simulator::new(&net, config, None);
    let mut resolver = DeterministicResolver::new(7);
    let state = sim.run(&mut resolver);

    assert_eq!(state, SimulationState::MaxStepsReached);
    assert!(sim.fired_transitions().is_empty());
}

#[test]
fn net_with_no_transitions_passes_deadlock_and_liveness_vacuously() {
    let mut builder = PetriNetBuilder::new("static");
    let mut sink_metadata = workflow_verifier_core::petri_net::Metadata::new();
    sink_metadata.insert("isSink".to_string(), serde_json::Value::Bool(true));
    let p = builder.add_place("p", None, None, sink_metadata).unwrap();
    builder.mark_initial(p, Tokens::ONE);
    let net = builder.freeze().expect("valid net");

    let result = validator::validate(&net, &ValidationConfig::default(), None);
    assert_eq!(result.overall, ValidationStatus::Pass);
    assert_eq!(
        result.deadlock.expect("deadlock check ran").status,
        ValidationStatus::Pass,
        "a terminal initial marking with no transitions is not a deadlock"
    );
    assert_eq!(
        result.liveness.expect("liveness check ran").status,
        ValidationStatus::Pass,
        "liveness holds vacuously when there are no transitions to check"
    );
    assert_eq!(
        result.reachability.expect("reachability check ran").status,
        ValidationStatus::Pass,
        "the initial marking is itself terminal, so reachability is satisfied"
    );
}

#[test]
fn choice_step_with_no_branches_is_a_compile_error() {
    use workflow_verifier_core::CompileError;

    let spec = common::spec("empty-choice", vec![common::choice("C", &[], &[])]);
    let err = build_net(&spec).unwrap_err();
    assert_eq!(
        err,
        CompileError::MissingField {
            step: "C".to_string(),
            field: "branches".to_string(),
        }
    );
}
