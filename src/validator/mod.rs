//! The validator façade (§4.4.5): runs the non-exploratory structural check,
//! then — unless only the structural check was requested — hands the net to
//! the explorer for a single bounded traversal, and aggregates every
//! requested check's outcome into one overall [`ValidationStatus`].

use crate::explorer::{self, ExplorationConfig, ExplorationOutcome, ExplorationReport};
use crate::petri_net::{is_deliberately_unwired, GuardEvaluator, PetriNet, PlaceId, TransitionId};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    Structural,
    Deadlock,
    Reachability,
    Liveness,
    Boundedness,
}

impl CheckKind {
    pub fn all() -> HashSet<CheckKind> {
        [
            CheckKind::Structural,
            CheckKind::Deadlock,
            CheckKind::Reachability,
            CheckKind::Liveness,
            CheckKind::Boundedness,
        ]
        .into_iter()
        .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub exploration: ExplorationConfig,
    pub enabled_checks: HashSet<CheckKind>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            exploration: ExplorationConfig::default(),
            enabled_checks: CheckKind::all(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralViolation {
    OrphanPlace(PlaceId),
    OrphanTransition(TransitionId),
}

/// §4.4.1: invariants checkable without walking the state space at all.
/// A frozen [`PetriNet`] already guarantees arcs resolve, ids are unique,
/// capacities/weights are positive and the initial marking is non-empty —
/// `freeze()` rejects those before a net can exist — so this only inspects
/// what `freeze()` doesn't: orphaned nodes nobody wired.
pub fn structural_check(net: &PetriNet) -> Vec<StructuralViolation> {
    let mut connected_places = vec![false; net.places().len()];
    let mut connected_transitions = vec![false; net.transitions().len()];

    for (place, _) in net.initial_marking.places_with_tokens() {
        connected_places[place.0] = true;
    }
    for arc in net.arcs() {
        match arc {
            crate::petri_net::Arc::PlaceTransition(p, t) => {
                connected_places[p.0] = true;
                connected_transitions[t.0] = true;
            }
            crate::petri_net::Arc::TransitionPlace(t, p) => {
                connected_transitions[t.0] = true;
                connected_places[p.0] = true;
            }
        }
    }

    let mut violations = Vec::new();
    for place in net.places() {
        if !connected_places[place.index().0] && !is_deliberately_unwired(&place.metadata) {
            violations.push(StructuralViolation::OrphanPlace(place.index()));
        }
    }
    for transition in net.transitions() {
        if !connected_transitions[transition.index().0] && !is_deliberately_unwired(&transition.metadata) {
            violations.push(StructuralViolation::OrphanTransition(transition.index()));
        }
    }
    violations
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationStatus {
    // Ordered so that `max` picks the most severe: Pass < InconclusiveBound
    // < InconclusiveTimeout < Fail (§4.4.5: timeout dominates bound).
    Pass,
    InconclusiveBound,
    InconclusiveTimeout,
    Fail,
}

fn inconclusive_for(outcome: ExplorationOutcome) -> ValidationStatus {
    match outcome {
        ExplorationOutcome::TimeExhausted => ValidationStatus::InconclusiveTimeout,
        ExplorationOutcome::BoundExhausted => ValidationStatus::InconclusiveBound,
        ExplorationOutcome::Completed => ValidationStatus::Pass,
    }
}

/// A check's counter-example, shaped per §4.4.4: a firing sequence for
/// deadlock/reachability failures, a transition list for liveness, a
/// place/maximum list for boundedness.
#[derive(Debug, Clone)]
pub enum CounterExample {
    Firings(Vec<TransitionId>),
    DeadTransitions(Vec<TransitionId>),
    UnboundedPlaces(Vec<(PlaceId, usize)>),
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub status: ValidationStatus,
    pub message: String,
    pub counter_example: Option<CounterExample>,
}

impl CheckResult {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Pass,
            message: message.into(),
            counter_example: None,
        }
    }

    fn inconclusive(status: ValidationStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            counter_example: None,
        }
    }

    fn fail(message: impl Into<String>, counter_example: CounterExample) -> Self {
        Self {
            status: ValidationStatus::Fail,
            message: message.into(),
            counter_example: Some(counter_example),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub structural: Option<CheckResult>,
    pub deadlock: Option<CheckResult>,
    pub reachability: Option<CheckResult>,
    pub liveness: Option<CheckResult>,
    pub boundedness: Option<CheckResult>,
    pub states_explored: usize,
    pub overall: ValidationStatus,
}

fn deadlock_result(report: &ExplorationReport) -> CheckResult {
    if report.deadlock.found {
        return CheckResult::fail(
            "a reachable marking has no enabled transitions and is not terminal",
            CounterExample::Firings(report.deadlock.witness.clone().unwrap_or_default()),
        );
    }
    match report.outcome {
        ExplorationOutcome::Completed => CheckResult::pass("no deadlock reachable from the initial marking"),
        other => CheckResult::inconclusive(inconclusive_for(other), "exploration was cut off before a deadlock could be ruled out"),
    }
}

fn reachability_result(report: &ExplorationReport) -> CheckResult {
    if report.reachability.terminal_found {
        return CheckResult::pass("at least one terminal marking is reachable");
    }
    match report.outcome {
        ExplorationOutcome::Completed => CheckResult::fail(
            "exhaustive exploration finished without reaching a terminal marking",
            CounterExample::Firings(Vec::new()),
        ),
        other => CheckResult::inconclusive(inconclusive_for(other), "exploration was cut off before a terminal marking was found"),
    }
}

fn liveness_result(report: &ExplorationReport) -> CheckResult {
    if report.liveness.dead_transitions.is_empty() {
        return CheckResult::pass("every transition was enabled in some reachable marking");
    }
    match report.outcome {
        ExplorationOutcome::Completed => CheckResult::fail(
            "some transitions were never enabled in any reachable marking",
            CounterExample::DeadTransitions(report.liveness.dead_transitions.clone()),
        ),
        other => CheckResult::inconclusive(inconclusive_for(other), "exploration was cut off with transitions that might still become enabled"),
    }
}

fn boundedness_result(report: &ExplorationReport) -> CheckResult {
    match report.outcome {
        ExplorationOutcome::Completed => {
            if report.boundedness.suspect_places.is_empty() {
                CheckResult::pass("no place's token count approached the boundedness threshold")
            } else {
                CheckResult::fail(
                    "some places' observed maxima reached the boundedness threshold",
                    CounterExample::UnboundedPlaces(report.boundedness.suspect_places.clone()),
                )
            }
        }
        other => CheckResult::inconclusive(inconclusive_for(other), "exploration was cut off under the k_bound/10 heuristic threshold"),
    }
}

/// Runs the structural check and, if any exploratory check is requested, a
/// single bounded exploration feeding all of them at once. Every requested
/// check's status rolls up into one overall verdict — the most severe of
/// the requested checks wins (§4.4.5).
pub fn validate(
    net: &PetriNet,
    config: &ValidationConfig,
    guard_evaluator: Option<&dyn GuardEvaluator>,
) -> ValidationResult {
    let structural = config.enabled_checks.contains(&CheckKind::Structural).then(|| {
        let violations = structural_check(net);
        if violations.is_empty() {
            CheckResult::pass("no structural violations")
        } else {
            CheckResult {
                status: ValidationStatus::Fail,
                message: format!("{} structural violation(s)", violations.len()),
                counter_example: None,
            }
        }
    });

    let exploratory_requested = config.enabled_checks.iter().any(|c| *c != CheckKind::Structural);

    let (deadlock, reachability, liveness, boundedness, states_explored) = if exploratory_requested {
        let report = explorer::explore(net, &config.exploration, guard_evaluator);
        (
            config.enabled_checks.contains(&CheckKind::Deadlock).then(|| deadlock_result(&report)),
            config.enabled_checks.contains(&CheckKind::Reachability).then(|| reachability_result(&report)),
            config.enabled_checks.contains(&CheckKind::Liveness).then(|| liveness_result(&report)),
            config.enabled_checks.contains(&CheckKind::Boundedness).then(|| boundedness_result(&report)),
            report.states_explored,
        )
    } else {
        (None, None, None, None, 0)
    };

    let overall = [&structural, &deadlock, &reachability, &liveness, &boundedness]
        .into_iter()
        .flatten()
        .map(|r| r.status)
        .max()
        .unwrap_or(ValidationStatus::Pass);

    tracing::info!(?overall, states_explored, "validation finished");

    ValidationResult {
        structural,
        deadlock,
        reachability,
        liveness,
        boundedness,
        states_explored,
        overall,
    }
}
