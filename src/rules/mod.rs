//! Post-compile rewrites (§4.3). Seven rules applied in a fixed, idempotent
//! order before `freeze()`. Three of them (implicit join synthesis, choice
//! merge synthesis, shared resource pools) change the *topology* the
//! grammar compiler emits, so they are decided up front — from the
//! `IntentSpec` alone, before any place or transition exists — and handed
//! to the compiler as [`RuleDecisions`]. The rest (sink marking,
//! initial-marking audit, the global error handler, the timeout manager)
//! are pure additions applied to the builder after compilation, via
//! [`apply_post_compile`].

use crate::error::CompileError;
use crate::intent::{IntentSpec, StepKind};
use crate::petri_net::builder::PetriNetBuilder;
use crate::petri_net::{set_flag, MarkingFn, Metadata, PlaceId, Tokens};
use std::collections::{HashMap, HashSet};

/// Decisions computed once from the spec, consumed by the compiler while it
/// emits fragments.
#[derive(Debug, Default, Clone)]
pub struct RuleDecisions {
    /// For every step id, how many other steps name it in `needs`.
    pub dependents_count: HashMap<String, usize>,
    /// `Parallel` steps with no matching `Sync` dependent: the compiler
    /// synthesizes an implicit join for these instead of leaving their
    /// branch places dangling.
    pub needs_implicit_join: HashSet<String>,
    /// `Choice`/`NestedConditional` steps with two or more dependents: the
    /// compiler merges their path places into one shared place instead of
    /// wiring every dependent from every path individually.
    pub needs_choice_merge: HashSet<String>,
    /// Resource type -> ordered list of `ResourceConstrained` step ids
    /// sharing one semaphore place, plus its pooled capacity.
    pub resource_pools: HashMap<String, ResourcePool>,
    pub needs_global_error_handler: bool,
    pub needs_timeout_manager: bool,
}

#[derive(Debug, Clone)]
pub struct ResourcePool {
    pub members: Vec<String>,
    pub total_capacity: u32,
}

/// Rule 1, 2 and 5's precondition analysis (§4.3 items 1, 2, 5).
pub fn analyze(spec: &IntentSpec) -> RuleDecisions {
    let mut dependents_count: HashMap<String, usize> = HashMap::new();
    for step in &spec.steps {
        dependents_count.entry(step.id.clone()).or_insert(0);
        for dep in &step.needs {
            *dependents_count.entry(dep.clone()).or_insert(0) += 1;
        }
    }

    let sync_targets: HashSet<&str> = spec
        .steps
        .iter()
        .filter(|s| matches!(s.kind, StepKind::Sync))
        .flat_map(|s| s.needs.iter().map(|d| d.as_str()))
        .collect();

    let mut needs_implicit_join = HashSet::new();
    let mut needs_choice_merge = HashSet::new();
    for step in &spec.steps {
        match &step.kind {
            StepKind::Parallel { .. } if !sync_targets.contains(step.id.as_str()) => {
                needs_implicit_join.insert(step.id.clone());
            }
            StepKind::Choice { .. } | StepKind::NestedConditional { .. } => {
                if dependents_count.get(&step.id).copied().unwrap_or(0) >= 2 {
                    needs_choice_merge.insert(step.id.clone());
                }
            }
            _ => {}
        }
    }

    let mut resource_pools: HashMap<String, ResourcePool> = HashMap::new();
    for step in &spec.steps {
        if let StepKind::ResourceConstrained {
            resource_type,
            capacity,
        } = &step.kind
        {
            let pool = resource_pools.entry(resource_type.clone()).or_insert_with(|| ResourcePool {
                members: Vec::new(),
                total_capacity: 0,
            });
            pool.members.push(step.id.clone());
            pool.total_capacity += capacity;
        }
    }

    let error_handler_count = spec
        .steps
        .iter()
        .filter(|s| matches!(s.kind, StepKind::ErrorHandler))
        .count();
    let needs_timeout_manager = spec.steps.iter().any(|s| s.timeout_ms.is_some());

    RuleDecisions {
        dependents_count,
        needs_implicit_join,
        needs_choice_merge,
        resource_pools,
        needs_global_error_handler: error_handler_count >= 2,
        needs_timeout_manager,
    }
}

fn tagged_metadata(flag_key: &str) -> Metadata {
    let mut metadata = Metadata::new();
    set_flag(&mut metadata, flag_key, true);
    metadata
}

/// Rules 3, 4, 6 and 7: pure additions to an already-compiled builder.
///
/// `exits` maps each step id to its current exit places (as produced by the
/// compiler), and `entries` maps each no-`needs` step id to its entry
/// place, so the audit in rule 4 has something to check against.
pub fn apply_post_compile(
    builder: &mut PetriNetBuilder,
    spec: &IntentSpec,
    decisions: &RuleDecisions,
    exits: &HashMap<String, Vec<PlaceId>>,
    entries: &HashMap<String, PlaceId>,
) -> Result<(), CompileError> {
    // Rule 3: sink marking. Steps with no dependents have their exit
    // place(s) tagged `isSink`.
    for step in &spec.steps {
        if decisions.dependents_count.get(&step.id).copied().unwrap_or(0) == 0 {
            if let Some(places) = exits.get(&step.id) {
                for &place in places {
                    set_flag(&mut builder.places_mut()[place.0].metadata, "isSink", true);
                }
            }
        }
    }

    // Rule 4: initial-marking audit. Every step with no `needs` must have
    // exactly one token in its entry place.
    for step in &spec.steps {
        if step.needs.is_empty() {
            let Some(&entry) = entries.get(&step.id) else {
                return Err(CompileError::CompilationInvariantViolation {
                    description: format!("root step {} has no recorded entry place", step.id),
                });
            };
            if builder.initial_marking().get(entry).0 != 1 {
                return Err(CompileError::CompilationInvariantViolation {
                    description: format!(
                        "root step {} entry place does not hold exactly one initial token",
                        step.id
                    ),
                });
            }
        }
    }

    // Rule 6: global error handler. Added unwired — a caller that wants it
    // in the enable graph must connect it explicitly.
    if decisions.needs_global_error_handler {
        let error_place = builder.add_place(
            "__global_error_handler",
            Some("Global Error".to_string()),
            None,
            tagged_metadata("isGlobalErrorHandler"),
        )?;
        builder.add_transition(
            "__global_error_recovery",
            Some("Global Recovery".to_string()),
            None,
            None,
            tagged_metadata("isGlobalErrorHandler"),
        )?;
        let _ = error_place; // deliberately left unconnected, see §4.3 rule 6
    }

    // Rule 7: timeout manager. Informational carrier, not enabled by
    // default.
    if decisions.needs_timeout_manager {
        builder.add_place(
            "__timeout_manager",
            Some("Timeout Manager".to_string()),
            None,
            tagged_metadata("isTimeoutManager"),
        )?;
        builder.add_transition(
            "__timeout_check",
            Some("Timeout Check".to_string()),
            None,
            None,
            tagged_metadata("isTimeoutManager"),
        )?;
    }

    Ok(())
}

pub(crate) fn semaphore_place_name(resource_type: &str) -> String {
    format!("__resource_pool__{resource_type}")
}

/// Sum of the weight a `ResourceConstrained` step should seed into a shared
/// pool's semaphore place: only the first member of the pool actually seeds
/// it, with the pool's total capacity (rule 5).
pub fn pool_seed_tokens(decisions: &RuleDecisions, resource_type: &str) -> Tokens {
    decisions
        .resource_pools
        .get(resource_type)
        .map(|pool| Tokens(pool.total_capacity as usize))
        .unwrap_or(Tokens(0))
}

pub fn is_first_pool_member(decisions: &RuleDecisions, resource_type: &str, step_id: &str) -> bool {
    decisions
        .resource_pools
        .get(resource_type)
        .and_then(|pool| pool.members.first())
        .map(|first| first == step_id)
        .unwrap_or(false)
}
