//! The grammar compiler (§4.2): expands each `IntentStep` into its canonical
//! Petri-net fragment and stitches fragments together along the `needs`
//! graph. Fragment shapes mirror the table in §4.2 exactly; dependency
//! stitching inserts a connector transition (tagged `isDependencyConnector`)
//! wherever two fragments would otherwise be joined place-to-place, except
//! into a `Sync` step, whose own join transition already sits between the
//! two places.

use crate::error::CompileError;
use crate::intent::{IntentSpec, IntentStep, StepKind};
use crate::petri_net::builder::PetriNetBuilder;
use crate::petri_net::{set_flag, Arc, Metadata, PlaceId, Tokens};
use crate::rules::{self, RuleDecisions};
use std::collections::HashMap;

/// What a compiled step exposes to its dependents: where an incoming token
/// should land (`entry`, absent for steps like `Sync` that consume their
/// dependencies' exits directly) and where a dependent should connect from
/// (`exits`, almost always a single place).
#[derive(Debug, Clone, Default)]
struct StepNodes {
    entry: Option<PlaceId>,
    exits: Vec<PlaceId>,
    branch_places: Vec<PlaceId>,
    path_places: Vec<PlaceId>,
}

struct Compiler<'a> {
    spec: &'a IntentSpec,
    decisions: &'a RuleDecisions,
    builder: PetriNetBuilder,
    next_id: usize,
    nodes: HashMap<String, StepNodes>,
    semaphore_places: HashMap<String, PlaceId>,
}

fn step_metadata(step_id: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("step".to_string(), serde_json::Value::String(step_id.to_string()));
    metadata
}

fn flagged(step_id: &str, flag: &str) -> Metadata {
    let mut metadata = step_metadata(step_id);
    set_flag(&mut metadata, flag, true);
    metadata
}

impl<'a> Compiler<'a> {
    fn new(spec: &'a IntentSpec, decisions: &'a RuleDecisions) -> Self {
        Self {
            spec,
            decisions,
            builder: PetriNetBuilder::new(spec.name.clone()),
            next_id: 0,
            nodes: HashMap::new(),
            semaphore_places: HashMap::new(),
        }
    }

    fn fresh_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    fn place(
        &mut self,
        step_id: &str,
        label: &str,
        metadata: Metadata,
    ) -> Result<PlaceId, CompileError> {
        let n = self.fresh_id();
        self.builder
            .add_place(format!("{step_id}__{label}#{n}"), None, None, metadata)
            .map_err(CompileError::from)
    }

    fn transition(
        &mut self,
        step_id: &str,
        label: &str,
        guard: Option<crate::petri_net::GuardExpr>,
        action: Option<String>,
        metadata: Metadata,
    ) -> Result<crate::petri_net::TransitionId, CompileError> {
        let n = self.fresh_id();
        self.builder
            .add_transition(format!("{step_id}__{label}#{n}"), None, guard, action, metadata)
            .map_err(CompileError::from)
    }

    fn arc(&mut self, arc: Arc) -> Result<(), CompileError> {
        self.builder.add_arc(arc, None).map_err(CompileError::from)
    }

    /// Topological order over `needs`: every dependency is compiled before
    /// its dependents. `IntentSpec::validate_structure` already rejected
    /// cycles, so this always terminates.
    fn topo_order(&self) -> Vec<&'a IntentStep> {
        enum Mark {
            InProgress,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut order = Vec::with_capacity(self.spec.steps.len());

        fn visit<'s>(
            spec: &'s IntentSpec,
            id: &'s str,
            marks: &mut HashMap<&'s str, Mark>,
            order: &mut Vec<&'s IntentStep>,
        ) {
            if marks.contains_key(id) {
                return;
            }
            marks.insert(id, Mark::InProgress);
            if let Some(step) = spec.step(id) {
                for dep in &step.needs {
                    visit(spec, dep, marks, order);
                }
                order.push(step);
            }
            marks.insert(id, Mark::Done);
        }

        for step in &self.spec.steps {
            visit(self.spec, &step.id, &mut marks, &mut order);
        }
        order
    }

    /// Generic stitching for every step kind except `Sync`: one connector
    /// transition per (dependency exit, own entry) pair.
    fn stitch_generic(&mut self, step: &IntentStep, entry: PlaceId) -> Result<(), CompileError> {
        for dep in &step.needs {
            let dep_exits = self
                .nodes
                .get(dep)
                .map(|n| n.exits.clone())
                .unwrap_or_default();
            for exit in dep_exits {
                let conn = self.transition(
                    &step.id,
                    &format!("conn_from_{dep}"),
                    None,
                    None,
                    flagged(&step.id, "isDependencyConnector"),
                )?;
                self.arc(Arc::PlaceTransition(exit, conn))?;
                self.arc(Arc::TransitionPlace(conn, entry))?;
            }
        }
        Ok(())
    }

    fn mark_root_if_needed(&mut self, step: &IntentStep, entry: PlaceId) {
        if step.needs.is_empty() {
            self.builder.mark_initial(entry, Tokens::ONE);
        }
    }

    fn compile_step(&mut self, step: &'a IntentStep) -> Result<(), CompileError> {
        let nodes = match &step.kind {
            StepKind::Action => self.compile_action(step)?,
            StepKind::Sequence => self.compile_sequence(step)?,
            StepKind::Choice { branches } => self.compile_choice(step, branches, false)?,
            StepKind::NestedConditional { branches } => self.compile_choice(step, branches, true)?,
            StepKind::Parallel { branches } => self.compile_parallel(step, branches, false)?,
            StepKind::FanOutFanIn { branches } => self.compile_parallel(step, branches, true)?,
            StepKind::Sync => self.compile_sync(step)?,
            StepKind::Loop { condition } => self.compile_loop(step, condition)?,
            StepKind::EventTrigger { event_name } => self.compile_event_trigger(step, event_name)?,
            StepKind::ErrorHandler => self.compile_error_handler(step)?,
            StepKind::Compensation { actions } => self.compile_compensation(step, actions)?,
            StepKind::CircuitBreaker => self.compile_circuit_breaker(step)?,
            StepKind::PipelineStage => self.compile_pipeline_stage(step)?,
            StepKind::ResourceConstrained {
                resource_type,
                capacity,
            } => self.compile_resource_constrained(step, resource_type, *capacity)?,
        };
        self.nodes.insert(step.id.clone(), nodes);
        Ok(())
    }

    fn compile_action(&mut self, step: &IntentStep) -> Result<StepNodes, CompileError> {
        let pre = self.place(&step.id, "pre", step_metadata(&step.id))?;
        let post = self.place(&step.id, "post", step_metadata(&step.id))?;
        let act = self.transition(&step.id, "act", step.guard.clone(), Some(step.id.clone()), step_metadata(&step.id))?;
        self.arc(Arc::PlaceTransition(pre, act))?;
        self.arc(Arc::TransitionPlace(act, post))?;
        self.mark_root_if_needed(step, pre);
        self.stitch_generic(step, pre)?;
        Ok(StepNodes {
            entry: Some(pre),
            exits: vec![post],
            ..Default::default()
        })
    }

    fn compile_sequence(&mut self, step: &IntentStep) -> Result<StepNodes, CompileError> {
        let sync_place = self.place(&step.id, "sync", step_metadata(&step.id))?;
        self.mark_root_if_needed(step, sync_place);
        self.stitch_generic(step, sync_place)?;
        Ok(StepNodes {
            entry: Some(sync_place),
            exits: vec![sync_place],
            ..Default::default()
        })
    }

    fn compile_choice(
        &mut self,
        step: &IntentStep,
        branches: &[crate::intent::ChoiceBranch],
        nested: bool,
    ) -> Result<StepNodes, CompileError> {
        if branches.is_empty() {
            return Err(CompileError::MissingField {
                step: step.id.clone(),
                field: "branches".to_string(),
            });
        }
        let root_label = if nested { "root" } else { "pre" };
        let root = self.place(&step.id, root_label, step_metadata(&step.id))?;
        self.mark_root_if_needed(step, root);
        self.stitch_generic(step, root)?;

        let mut path_places = Vec::with_capacity(branches.len());
        for branch in branches {
            let t = self.transition(
                &step.id,
                &format!("cond_{}", branch.id),
                branch.guard.clone(),
                None,
                step_metadata(&step.id),
            )?;
            let p = self.place(&step.id, &format!("path_{}", branch.id), step_metadata(&step.id))?;
            self.arc(Arc::PlaceTransition(root, t))?;
            self.arc(Arc::TransitionPlace(t, p))?;
            path_places.push(p);
        }

        let exits = if self.decisions.needs_choice_merge.contains(&step.id) {
            let merged = self.place(&step.id, "merged", step_metadata(&step.id))?;
            for p in &path_places {
                let t = self.transition(&step.id, "merge", None, None, flagged(&step.id, "isJoin"))?;
                self.arc(Arc::PlaceTransition(*p, t))?;
                self.arc(Arc::TransitionPlace(t, merged))?;
            }
            vec![merged]
        } else {
            path_places.clone()
        };

        Ok(StepNodes {
            entry: Some(root),
            exits,
            path_places,
            ..Default::default()
        })
    }

    fn compile_parallel(
        &mut self,
        step: &IntentStep,
        branches: &[String],
        fan_out_fan_in: bool,
    ) -> Result<StepNodes, CompileError> {
        if branches.is_empty() {
            return Err(CompileError::MissingField {
                step: step.id.clone(),
                field: "branches".to_string(),
            });
        }
        let pre = self.place(&step.id, "pre", step_metadata(&step.id))?;
        self.mark_root_if_needed(step, pre);
        self.stitch_generic(step, pre)?;

        let fork = self.transition(&step.id, "fork", None, None, flagged(&step.id, "isFork"))?;
        self.arc(Arc::PlaceTransition(pre, fork))?;

        let mut branch_places = Vec::with_capacity(branches.len());
        for branch in branches {
            let p = self.place(&step.id, &format!("branch_{branch}"), step_metadata(&step.id))?;
            self.arc(Arc::TransitionPlace(fork, p))?;
            branch_places.push(p);
        }

        let synthesize_join = fan_out_fan_in || self.decisions.needs_implicit_join.contains(&step.id);
        let exits = if synthesize_join {
            let join = self.transition(&step.id, "join", None, None, flagged(&step.id, "isJoin"))?;
            for p in &branch_places {
                self.arc(Arc::PlaceTransition(*p, join))?;
            }
            let post = self.place(&step.id, "post", step_metadata(&step.id))?;
            self.arc(Arc::TransitionPlace(join, post))?;
            vec![post]
        } else {
            branch_places.clone()
        };

        Ok(StepNodes {
            entry: Some(pre),
            exits,
            branch_places,
            ..Default::default()
        })
    }

    fn compile_sync(&mut self, step: &IntentStep) -> Result<StepNodes, CompileError> {
        let mut inputs: Vec<PlaceId> = step
            .needs
            .iter()
            .flat_map(|dep| self.nodes.get(dep).map(|n| n.exits.clone()).unwrap_or_default())
            .collect();

        let mut entry = None;
        if inputs.is_empty() {
            let dummy = self.place(&step.id, "pre", step_metadata(&step.id))?;
            self.builder.mark_initial(dummy, Tokens::ONE);
            entry = Some(dummy);
            inputs.push(dummy);
        }

        let join = self.transition(&step.id, "join", None, None, flagged(&step.id, "isJoin"))?;
        for p in &inputs {
            self.arc(Arc::PlaceTransition(*p, join))?;
        }
        let post = self.place(&step.id, "post", step_metadata(&step.id))?;
        self.arc(Arc::TransitionPlace(join, post))?;

        Ok(StepNodes {
            entry,
            exits: vec![post],
            ..Default::default()
        })
    }

    fn compile_loop(&mut self, step: &IntentStep, condition: &crate::petri_net::GuardExpr) -> Result<StepNodes, CompileError> {
        let entry = self.place(&step.id, "entry", step_metadata(&step.id))?;
        self.mark_root_if_needed(step, entry);
        self.stitch_generic(step, entry)?;

        let body = self.transition(&step.id, "body", step.guard.clone(), None, step_metadata(&step.id))?;
        self.arc(Arc::PlaceTransition(entry, body))?;
        self.arc(Arc::TransitionPlace(body, entry))?;

        let check = self.transition(&step.id, "check", Some(condition.clone()), None, step_metadata(&step.id))?;
        let exit = self.place(&step.id, "exit", step_metadata(&step.id))?;
        self.arc(Arc::PlaceTransition(entry, check))?;
        self.arc(Arc::TransitionPlace(check, exit))?;

        Ok(StepNodes {
            entry: Some(entry),
            exits: vec![exit],
            ..Default::default()
        })
    }

    fn compile_event_trigger(&mut self, step: &IntentStep, event_name: &str) -> Result<StepNodes, CompileError> {
        let wait = self.place(&step.id, "wait", step_metadata(&step.id))?;
        self.mark_root_if_needed(step, wait);
        self.stitch_generic(step, wait)?;

        let fire = self.transition(
            &step.id,
            "fire",
            step.guard.clone(),
            Some(event_name.to_string()),
            flagged(&step.id, "isExternalTrigger"),
        )?;
        let triggered = self.place(&step.id, "triggered", step_metadata(&step.id))?;
        self.arc(Arc::PlaceTransition(wait, fire))?;
        self.arc(Arc::TransitionPlace(fire, triggered))?;

        Ok(StepNodes {
            entry: Some(wait),
            exits: vec![triggered],
            ..Default::default()
        })
    }

    fn compile_error_handler(&mut self, step: &IntentStep) -> Result<StepNodes, CompileError> {
        let try_place = self.place(&step.id, "try", step_metadata(&step.id))?;
        self.mark_root_if_needed(step, try_place);
        self.stitch_generic(step, try_place)?;

        let exec = self.transition(&step.id, "exec", step.guard.clone(), None, step_metadata(&step.id))?;
        let success = self.place(&step.id, "success", step_metadata(&step.id))?;
        let error = self.place(&step.id, "error", step_metadata(&step.id))?;
        self.arc(Arc::PlaceTransition(try_place, exec))?;
        self.arc(Arc::TransitionPlace(exec, success))?;
        self.arc(Arc::TransitionPlace(exec, error))?;

        let catch = self.transition(&step.id, "catch", None, None, step_metadata(&step.id))?;
        let caught = self.place(&step.id, "caught", step_metadata(&step.id))?;
        self.arc(Arc::PlaceTransition(error, catch))?;
        self.arc(Arc::TransitionPlace(catch, caught))?;

        let finally = self.transition(&step.id, "finally", None, None, flagged(&step.id, "isJoin"))?;
        let complete = self.place(&step.id, "complete", step_metadata(&step.id))?;
        self.arc(Arc::PlaceTransition(success, finally))?;
        self.arc(Arc::PlaceTransition(caught, finally))?;
        self.arc(Arc::TransitionPlace(finally, complete))?;

        Ok(StepNodes {
            entry: Some(try_place),
            exits: vec![complete],
            ..Default::default()
        })
    }

    fn compile_compensation(
        &mut self,
        step: &IntentStep,
        actions: &[crate::intent::CompensationAction],
    ) -> Result<StepNodes, CompileError> {
        let pre = self.place(&step.id, "pre", step_metadata(&step.id))?;
        self.mark_root_if_needed(step, pre);
        self.stitch_generic(step, pre)?;

        let fork = self.transition(&step.id, "fork", None, None, flagged(&step.id, "isFork"))?;
        self.arc(Arc::PlaceTransition(pre, fork))?;

        let mut done_places = Vec::with_capacity(actions.len());
        for action in actions {
            let ready = self.place(&step.id, &format!("ready_{}", action.id), step_metadata(&step.id))?;
            self.arc(Arc::TransitionPlace(fork, ready))?;
            let comp = self.transition(
                &step.id,
                &format!("comp_{}", action.id),
                None,
                Some(action.id.clone()),
                step_metadata(&step.id),
            )?;
            self.arc(Arc::PlaceTransition(ready, comp))?;
            let done = self.place(&step.id, &format!("done_{}", action.id), step_metadata(&step.id))?;
            self.arc(Arc::TransitionPlace(comp, done))?;
            done_places.push(done);
        }

        Ok(StepNodes {
            entry: Some(pre),
            exits: done_places.clone(),
            branch_places: done_places,
            ..Default::default()
        })
    }

    fn compile_circuit_breaker(&mut self, step: &IntentStep) -> Result<StepNodes, CompileError> {
        let closed = self.place(&step.id, "closed", step_metadata(&step.id))?;
        let half_open = self.place(&step.id, "half_open", step_metadata(&step.id))?;
        let open = self.place(&step.id, "open", step_metadata(&step.id))?;
        // Tokenized in closed unconditionally, per its fragment definition,
        // regardless of whether the step also has declared `needs`.
        self.builder.mark_initial(closed, Tokens::ONE);
        self.stitch_generic(step, closed)?;

        let execute = self.transition(&step.id, "execute", step.guard.clone(), None, step_metadata(&step.id))?;
        self.arc(Arc::PlaceTransition(closed, execute))?;
        self.arc(Arc::TransitionPlace(execute, open))?;

        let recover = self.transition(&step.id, "recover", None, None, step_metadata(&step.id))?;
        self.arc(Arc::PlaceTransition(open, recover))?;
        self.arc(Arc::TransitionPlace(recover, half_open))?;

        let reclose = self.transition(&step.id, "reclose", None, None, step_metadata(&step.id))?;
        self.arc(Arc::PlaceTransition(half_open, reclose))?;
        self.arc(Arc::TransitionPlace(reclose, closed))?;

        Ok(StepNodes {
            entry: Some(closed),
            exits: vec![open],
            ..Default::default()
        })
    }

    fn compile_pipeline_stage(&mut self, step: &IntentStep) -> Result<StepNodes, CompileError> {
        let input = self.place(&step.id, "in", step_metadata(&step.id))?;
        self.mark_root_if_needed(step, input);
        self.stitch_generic(step, input)?;

        let process = self.transition(&step.id, "process", step.guard.clone(), Some(step.id.clone()), step_metadata(&step.id))?;
        let output = self.place(&step.id, "out", step_metadata(&step.id))?;
        self.arc(Arc::PlaceTransition(input, process))?;
        self.arc(Arc::TransitionPlace(process, output))?;

        Ok(StepNodes {
            entry: Some(input),
            exits: vec![output],
            ..Default::default()
        })
    }

    fn compile_resource_constrained(
        &mut self,
        step: &IntentStep,
        resource_type: &str,
        capacity: u32,
    ) -> Result<StepNodes, CompileError> {
        let _ = capacity; // pooled capacity lives on `RuleDecisions`, not the individual step
        let semaphore = if let Some(&existing) = self.semaphore_places.get(resource_type) {
            existing
        } else {
            let mut metadata = step_metadata(&step.id);
            metadata.insert("resourceType".to_string(), serde_json::Value::String(resource_type.to_string()));
            let place = self.place(&step.id, &rules::semaphore_place_name(resource_type), metadata)?;
            self.semaphore_places.insert(resource_type.to_string(), place);
            place
        };
        if rules::is_first_pool_member(self.decisions, resource_type, &step.id) {
            let seed = rules::pool_seed_tokens(self.decisions, resource_type);
            self.builder.mark_initial(semaphore, seed);
        }

        let pre = self.place(&step.id, "pre", step_metadata(&step.id))?;
        self.mark_root_if_needed(step, pre);
        self.stitch_generic(step, pre)?;

        let acquire = self.transition(&step.id, "acquire", None, None, step_metadata(&step.id))?;
        let executing = self.place(&step.id, "executing", step_metadata(&step.id))?;
        self.arc(Arc::PlaceTransition(pre, acquire))?;
        self.arc(Arc::PlaceTransition(semaphore, acquire))?;
        self.arc(Arc::TransitionPlace(acquire, executing))?;

        let release = self.transition(&step.id, "release", step.guard.clone(), None, step_metadata(&step.id))?;
        let post = self.place(&step.id, "post", step_metadata(&step.id))?;
        self.arc(Arc::PlaceTransition(executing, release))?;
        self.arc(Arc::TransitionPlace(release, post))?;
        self.arc(Arc::TransitionPlace(release, semaphore))?;

        Ok(StepNodes {
            entry: Some(pre),
            exits: vec![post],
            ..Default::default()
        })
    }
}

/// Compiles an `IntentSpec` into a net builder, consulting `decisions` for
/// the topology-affecting rules (implicit join, choice merge, resource
/// pooling). Returns the builder plus enough bookkeeping (exit/entry maps)
/// for the rule engine's remaining post-compile passes.
pub fn compile(
    spec: &IntentSpec,
    decisions: &RuleDecisions,
) -> Result<(PetriNetBuilder, HashMap<String, Vec<PlaceId>>, HashMap<String, PlaceId>), CompileError> {
    spec.validate_structure()?;

    let mut compiler = Compiler::new(spec, decisions);
    let order = compiler.topo_order();
    tracing::trace!(
        order = ?order.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        "compiling steps in topological order"
    );
    for step in order {
        compiler.compile_step(step)?;
    }

    let mut exits = HashMap::new();
    let mut entries = HashMap::new();
    for (id, nodes) in &compiler.nodes {
        exits.insert(id.clone(), nodes.exits.clone());
        if let Some(entry) = nodes.entry {
            entries.insert(id.clone(), entry);
        }
    }

    Ok((compiler.builder, exits, entries))
}
