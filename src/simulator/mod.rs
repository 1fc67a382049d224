//! The token simulator (§4.5): drives a single run of the net forward one
//! firing at a time, either deterministically (seeded PRNG, reproducible)
//! or interactively (an external caller picks among enabled transitions,
//! falling back to the lexicographic-first one if it doesn't).

use crate::petri_net::firing;
use crate::petri_net::{Arc, GuardEvaluator, Marking, MarkingFn, PetriNet, PlaceId, TransitionId};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationState {
    Initialized,
    Running,
    Completed,
    Deadlocked,
    MaxStepsReached,
    Stopped,
    Failed,
}

impl SimulationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SimulationState::Initialized | SimulationState::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverMode {
    Deterministic,
    Interactive,
}

/// Picks which of several simultaneously enabled transitions fires next.
/// Firing order between *non-conflicting* transitions never matters for the
/// net's eventual marking, so this is only consulted when more than one
/// transition is enabled at once.
pub trait ConflictResolver {
    fn mode(&self) -> ResolverMode;
    fn resolve(&mut self, enabled: &[TransitionId]) -> TransitionId;
}

/// Seeded pseudo-random resolution: the same seed against the same net
/// always produces the same trace (§8, reproducibility invariant).
pub struct DeterministicResolver {
    rng: StdRng,
}

impl DeterministicResolver {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// A fresh, non-reproducible seed for callers that left `seed` unset
    /// (§4.5: "auto-generated if absent").
    pub fn random_seed() -> u64 {
        rand::thread_rng().next_u64()
    }
}

impl ConflictResolver for DeterministicResolver {
    fn mode(&self) -> ResolverMode {
        ResolverMode::Deterministic
    }

    fn resolve(&mut self, enabled: &[TransitionId]) -> TransitionId {
        let idx = self.rng.gen_range(0..enabled.len());
        enabled[idx]
    }
}

/// An external caller supplies the next choice via [`InteractiveResolver::choose`]
/// between steps; if none was supplied, the lexicographically first enabled
/// transition fires (`enabled` is already sorted by id, see
/// [`firing::enabled`]), and the defaulted choice is recorded on the trace
/// event.
#[derive(Default)]
pub struct InteractiveResolver {
    pending: Option<TransitionId>,
    pub last_defaulted: bool,
}

impl InteractiveResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn choose(&mut self, transition: TransitionId) {
        self.pending = Some(transition);
    }
}

impl ConflictResolver for InteractiveResolver {
    fn mode(&self) -> ResolverMode {
        ResolverMode::Interactive
    }

    fn resolve(&mut self, enabled: &[TransitionId]) -> TransitionId {
        if let Some(choice) = self.pending.take() {
            if enabled.contains(&choice) {
                self.last_defaulted = false;
                return choice;
            }
        }
        self.last_defaulted = true;
        enabled[0]
    }
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub max_steps: usize,
    pub step_delay_ms: u64,
    pub enable_tracing: bool,
    pub pause_on_deadlock: bool,
    pub verbose: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_steps: 1_000,
            step_delay_ms: 0,
            enable_tracing: true,
            pause_on_deadlock: true,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TraceEventKind {
    Started,
    TransitionFired {
        transition: TransitionId,
        input_places: Vec<PlaceId>,
        output_places: Vec<PlaceId>,
        marking_before: Marking,
        marking_after: Marking,
        enabled_set: Vec<TransitionId>,
        resolver_mode: ResolverMode,
    },
    Completed,
    Deadlocked,
}

/// One entry of a simulation's trace. `elapsed` is monotonic time since the
/// simulation started, not a wall-clock timestamp — wall clocks would break
/// the reproducibility invariant (§8) for two deterministic runs with the
/// same seed but different start times.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub sequence: usize,
    pub elapsed: Duration,
    pub kind: TraceEventKind,
}

fn place_io(net: &PetriNet, transition: TransitionId) -> (Vec<PlaceId>, Vec<PlaceId>) {
    let inputs = net
        .input_arcs(transition)
        .filter_map(Arc::source_place)
        .collect();
    let outputs = net
        .output_arcs(transition)
        .filter_map(Arc::target_place)
        .collect();
    (inputs, outputs)
}

/// One run of the net, advanced by repeated calls to [`Simulator::step`] or
/// [`Simulator::run`].
pub struct Simulator<'a> {
    net: &'a PetriNet,
    guard_evaluator: Option<&'a dyn GuardEvaluator>,
    config: SimulationConfig,
    state: SimulationState,
    marking: Marking,
    trace: Vec<TraceEvent>,
    steps: usize,
    paused: bool,
    start: std::time::Instant,
}

impl<'a> Simulator<'a> {
    pub fn new(
        net: &'a PetriNet,
        config: SimulationConfig,
        guard_evaluator: Option<&'a dyn GuardEvaluator>,
    ) -> Self {
        let mut sim = Self {
            net,
            guard_evaluator,
            marking: net.initial_marking.clone(),
            config,
            state: SimulationState::Initialized,
            trace: Vec::new(),
            steps: 0,
            paused: false,
            start: std::time::Instant::now(),
        };
        if sim.config.enable_tracing {
            sim.trace.push(TraceEvent {
                sequence: 0,
                elapsed: Duration::ZERO,
                kind: TraceEventKind::Started,
            });
        }
        sim.state = SimulationState::Running;
        sim
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn marking(&self) -> &Marking {
        &self.marking
    }

    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    /// Transition ids fired so far, in order — the view two deterministic
    /// runs with the same seed are expected to agree on exactly (§8).
    pub fn fired_transitions(&self) -> Vec<TransitionId> {
        self.trace
            .iter()
            .filter_map(|event| match &event.kind {
                TraceEventKind::TransitionFired { transition, .. } => Some(*transition),
                _ => None,
            })
            .collect()
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn stop(&mut self) {
        self.state = SimulationState::Stopped;
    }

    pub fn reset(&mut self) {
        self.marking = self.net.initial_marking.clone();
        self.trace.clear();
        self.steps = 0;
        self.paused = false;
        self.start = std::time::Instant::now();
        self.state = SimulationState::Initialized;
        if self.config.enable_tracing {
            self.trace.push(TraceEvent {
                sequence: 0,
                elapsed: Duration::ZERO,
                kind: TraceEventKind::Started,
            });
        }
        self.state = SimulationState::Running;
    }

    fn record(&mut self, kind: TraceEventKind) {
        if !self.config.enable_tracing {
            return;
        }
        self.trace.push(TraceEvent {
            sequence: self.trace.len(),
            elapsed: self.start.elapsed(),
            kind,
        });
    }

    /// Advances the simulation by exactly one firing, or transitions to a
    /// terminal state if none can fire. No-op once a terminal state has
    /// been reached.
    pub fn step(&mut self, resolver: &mut dyn ConflictResolver) -> SimulationState {
        if self.state.is_terminal() {
            return self.state;
        }
        if self.steps >= self.config.max_steps {
            self.state = SimulationState::MaxStepsReached;
            return self.state;
        }

        let enabled = firing::enabled(self.net, &self.marking, self.guard_evaluator);
        if enabled.is_empty() {
            if firing::is_terminal(self.net, &self.marking, self.guard_evaluator) {
                self.state = SimulationState::Completed;
                self.record(TraceEventKind::Completed);
                tracing::debug!(steps = self.steps, "simulation completed");
            } else {
                self.state = SimulationState::Deadlocked;
                self.record(TraceEventKind::Deadlocked);
                tracing::warn!(steps = self.steps, "simulation deadlocked");
                if self.config.pause_on_deadlock {
                    self.pause();
                }
            }
            return self.state;
        }

        let chosen = resolver.resolve(&enabled);
        if !enabled.contains(&chosen) {
            self.state = SimulationState::Failed;
            return self.state;
        }

        let marking_before = self.marking.clone();
        let marking_after = firing::fire(self.net, &self.marking, chosen);
        let (input_places, output_places) = place_io(self.net, chosen);
        self.marking = marking_after.clone();
        self.steps += 1;
        if self.config.verbose {
            tracing::trace!(transition = chosen.0, step = self.steps, "transition fired");
        }
        self.record(TraceEventKind::TransitionFired {
            transition: chosen,
            input_places,
            output_places,
            marking_before,
            marking_after,
            enabled_set: enabled,
            resolver_mode: resolver.mode(),
        });
        if self.config.step_delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.step_delay_ms));
        }
        self.state = SimulationState::Running;
        self.state
    }

    /// Runs to completion (a terminal state, `max_steps`, or an explicit
    /// `pause`), calling `resolver` once per firing.
    pub fn run(&mut self, resolver: &mut dyn ConflictResolver) -> SimulationState {
        while !self.state.is_terminal() && !self.paused {
            self.step(resolver);
        }
        self.state
    }
}
