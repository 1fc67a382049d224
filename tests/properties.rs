//! Property-based tests for the algebraic invariants of §8: purity of
//! `fire`, sorted `enabled`, marking normalization, deterministic
//! simulation reproducibility, and the explorer's single-traversal
//! invariant.

mod common;

use proptest::prelude::*;
use workflow_verifier_core::build_net;
use workflow_verifier_core::explorer::{self, ExplorationConfig};
use workflow_verifier_core::petri_net::firing;
use workflow_verifier_core::simulator::{DeterministicResolver, SimulationConfig, Simulator};

fn chain_spec(n: usize) -> workflow_verifier_core::IntentSpec {
    let mut steps = Vec::with_capacity(n);
    steps.push(common::action("s0", &[]));
    for i in 1..n {
        let prev = format!("s{}", i - 1);
        steps.push(common::action(&format!("s{i}"), &[prev.as_str()]));
    }
    common::spec("chain", steps)
}

proptest! {
    /// `fire` never mutates its input marking; the returned marking is a
    /// genuinely new value, and firing the same enabled transition twice
    /// from the same starting marking always yields the same result.
    #[test]
    fn fire_is_pure(n in 2usize..8) {
        let spec = chain_spec(n);
        let net = build_net(&spec).expect("compiles");
        let m0 = net.initial_marking.clone();
        let enabled = firing::enabled(&net, &m0, None);
        prop_assume!(!enabled.is_empty());
        let t = enabled[0];

        let before = m0.clone();
        let after_a = firing::fire(&net, &m0, t);
        let after_b = firing::fire(&net, &m0, t);

        prop_assert_eq!(&m0, &before, "fire must not mutate its input marking");
        prop_assert_eq!(after_a, after_b, "firing the same transition from the same marking is deterministic");
    }

    /// `enabled` always returns transition ids in strictly increasing order.
    #[test]
    fn enabled_is_sorted(n in 2usize..8) {
        let spec = chain_spec(n);
        let net = build_net(&spec).expect("compiles");
        let ids = firing::enabled(&net, &net.initial_marking, None);
        let mut sorted = ids.clone();
        sorted.sort_by_key(|t| t.0);
        prop_assert_eq!(ids, sorted);
    }

    /// Two deterministic simulator runs seeded identically fire the exact
    /// same transition sequence, regardless of wall-clock timing.
    #[test]
    fn deterministic_simulation_is_reproducible(n in 2usize..8, seed in any::<u64>()) {
        let spec = chain_spec(n);
        let net = build_net(&spec).expect("compiles");

        let mut sim_a = Simulator::new(&net, SimulationConfig::default(), None);
        let mut resolver_a = DeterministicResolver::new(seed);
        sim_a.run(&mut resolver_a);

        let mut sim_b = Simulator::new(&net, SimulationConfig::default(), None);
        let mut resolver_b = DeterministicResolver::new(seed);
        sim_b.run(&mut resolver_b);

        prop_assert_eq!(sim_a.fired_transitions(), sim_b.fired_transitions());
    }

    /// A single exploration call populates every one of the four checks;
    /// `states_explored` never exceeds the configured bound.
    #[test]
    fn exploration_respects_k_bound(n in 2usize..8, k_bound in 1usize..50) {
        let spec = chain_spec(n);
        let net = build_net(&spec).expect("compiles");
        let config = ExplorationConfig { k_bound, ..Default::default() };
        let report = explorer::explore(&net, &config, None);
        prop_assert!(report.states_explored <= k_bound);
    }
}

/// A marking never stores a zero-token entry; `Marking` normalizes its
/// backing map so `places_with_tokens` never yields a zero count.
#[test]
fn marking_normalizes_zero_counts() {
    let spec = common::spec("pair", vec![common::action("A", &[])]);
    let net = build_net(&spec).expect("compiles");
    let t = firing::enabled(&net, &net.initial_marking, None)[0];
    let after = firing::fire(&net, &net.initial_marking, t);
    assert!(after.places_with_tokens().all(|(_, tokens)| tokens.0 > 0));
}

/// A counter-example witness is replayable: firing it step by step from the
/// initial marking reaches the deadlock/terminal marking the explorer found.
#[test]
fn deadlock_witness_replays() {
    use workflow_verifier_core::compiler;
    use workflow_verifier_core::rules::RuleDecisions;

    let spec = common::spec(
        "parallel-no-sync",
        vec![common::action("A", &[]), common::parallel("P", &["A"], &["x", "y"])],
    );
    let decisions = RuleDecisions::default();
    let (builder, _, _) = compiler::compile(&spec, &decisions).expect("compiles without rules");
    let net = builder.freeze().expect("valid net");

    let report = explorer::explore(&net, &ExplorationConfig::default(), None);
    assert!(report.deadlock.found);
    let witness = report.deadlock.witness.expect("witness recorded");

    let mut marking = net.initial_marking.clone();
    for &t in &witness {
        assert!(firing::is_enabled(&net, &marking, t, None), "witness step must be enabled when replayed");
        marking = firing::fire(&net, &marking, t);
    }
    assert!(firing::enabled(&net, &marking, None).is_empty(), "replayed witness must end in a deadlock");
}
