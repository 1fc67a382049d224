//! Firing semantics over a frozen net (§4.1). `enabled` and `fire` are pure
//! and deterministic; conflict resolution between several enabled
//! transitions is never made here — it is left to the caller (the explorer
//! enumerates every enabled transition, the simulator applies its own
//! resolution policy).

use super::{GuardEvaluator, Marking, MarkingFn, PetriNet, Tokens, TransitionId};
use crate::error::ContractViolation;

/// Returns true iff every input arc of `transition` is satisfied by `marking`
/// and every output arc would not overflow its target place's capacity.
/// Guards are not considered here; see [`enabled`].
fn structurally_enabled(net: &PetriNet, marking: &Marking, transition: TransitionId) -> bool {
    let inputs_ok = net.input_arcs(transition).all(|arc| {
        let place = arc.source_place().expect("input arc has a source place");
        marking.get(place).0 >= net.weight_of(arc).0
    });
    if !inputs_ok {
        return false;
    }
    net.output_arcs(transition).all(|arc| {
        let place = arc.target_place().expect("output arc has a target place");
        let projected = marking.get(place).0 + net.weight_of(arc).0;
        projected <= net.capacity_of(place).0
    })
}

/// A transition is enabled iff it is structurally enabled, and — when it
/// carries a guard and an evaluator was supplied — the guard evaluates to
/// true in `marking`. Without an evaluator, guarded transitions are treated
/// as always enabled: a documented conservative over-approximation (§4.1).
///
/// Rule 6/7's global error handler and timeout manager are synthesized with
/// no arcs at all (§4.3), which would otherwise make `structurally_enabled`
/// vacuously true for them in every marking. They are excluded here rather
/// than treated as part of the enable/fire surface; a vacuously-enabled
/// transition would never let a deadlocked or non-terminal marking's
/// `enabled()` set go empty, permanently hiding it from the explorer.
pub fn is_enabled(
    net: &PetriNet,
    marking: &Marking,
    transition: TransitionId,
    guard_evaluator: Option<&dyn GuardEvaluator>,
) -> bool {
    if net.transition(transition).is_deliberately_unwired() {
        return false;
    }
    if !structurally_enabled(net, marking, transition) {
        return false;
    }
    match (&net.transition(transition).guard, guard_evaluator) {
        (Some(guard), Some(evaluator)) => evaluator.evaluate(marking, guard),
        _ => true,
    }
}

/// All transitions enabled in `marking`, sorted deterministically by
/// transition id (§8, testable property 2).
pub fn enabled(
    net: &PetriNet,
    marking: &Marking,
    guard_evaluator: Option<&dyn GuardEvaluator>,
) -> Vec<TransitionId> {
    let mut ids: Vec<TransitionId> = net
        .transitions()
        .iter()
        .map(|t| t.index())
        .filter(|&t| is_enabled(net, marking, t, guard_evaluator))
        .collect();
    ids.sort_by_key(|t| t.0);
    ids
}

/// Applies `transition`'s token movement to `marking`, producing a new
/// marking. `transition` must be enabled in `marking`; firing a disabled
/// transition is a programmer error (Tier 1, §7) and panics rather than
/// returning an error value.
pub fn fire(net: &PetriNet, marking: &Marking, transition: TransitionId) -> Marking {
    assert!(
        structurally_enabled(net, marking, transition),
        "{}",
        ContractViolation::TransitionNotEnabled(transition)
    );
    let mut next = marking.clone();
    for arc in net.input_arcs(transition) {
        let place = arc.source_place().expect("input arc has a source place");
        let current = next.get(place);
        next.set(place, Tokens(current.0 - net.weight_of(arc).0));
    }
    for arc in net.output_arcs(transition) {
        let place = arc.target_place().expect("output arc has a target place");
        let current = next.get(place);
        next.set(place, Tokens(current.0 + net.weight_of(arc).0));
    }
    next
}

/// A marking is terminal iff it holds a token in a place flagged `isSink`,
/// or — absent any declared sinks — it has no enabled transitions and holds
/// no tokens in non-sink places.
pub fn is_terminal(
    net: &PetriNet,
    marking: &Marking,
    guard_evaluator: Option<&dyn GuardEvaluator>,
) -> bool {
    let has_sink_token = marking
        .places_with_tokens()
        .any(|(id, _)| net.place(id).is_sink());
    if has_sink_token {
        return true;
    }
    if !enabled(net, marking, guard_evaluator).is_empty() {
        return false;
    }
    marking
        .places_with_tokens()
        .all(|(id, _)| net.place(id).is_sink())
}
