//! The Petri-net data model: places, transitions, arcs and markings.
//!
//! This module owns the substrate every other component operates over. A
//! [`PetriNet`] is built incrementally through [`builder::PetriNetBuilder`]
//! and becomes immutable once [`builder::PetriNetBuilder::freeze`] succeeds;
//! everything downstream (the explorer, the validator, the simulator, the
//! DAG projector) only ever borrows the frozen net.

pub mod builder;
pub mod firing;

use ahash::RandomState;
use derive_more::Display as DeriveDisplay;
use std::collections::{BTreeMap, HashMap};

/// A non-negative count of tokens (also used for arc weights and place
/// capacities, which share the same unit).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, DeriveDisplay)]
pub struct Tokens(pub usize);

impl Tokens {
    pub const ZERO: Tokens = Tokens(0);
    pub const ONE: Tokens = Tokens(1);
}

/// Dense index of a place within a frozen net. Indices are assigned in
/// declaration order by the builder and never change after `freeze()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, DeriveDisplay)]
#[display(fmt = "P{}", _0)]
pub struct PlaceId(pub usize);

/// Dense index of a transition within a frozen net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, DeriveDisplay)]
#[display(fmt = "T{}", _0)]
pub struct TransitionId(pub usize);

/// A weighted directed edge. Exactly one endpoint is a place and the other a
/// transition (the bipartite invariant), so the two legal shapes are encoded
/// as separate variants rather than a generic `(from, to)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arc {
    PlaceTransition(PlaceId, TransitionId),
    TransitionPlace(TransitionId, PlaceId),
}

impl Arc {
    pub fn source_place(&self) -> Option<PlaceId> {
        match *self {
            Arc::PlaceTransition(p, _) => Some(p),
            Arc::TransitionPlace(_, _) => None,
        }
    }

    pub fn target_place(&self) -> Option<PlaceId> {
        match *self {
            Arc::TransitionPlace(_, p) => Some(p),
            Arc::PlaceTransition(_, _) => None,
        }
    }

    pub fn transition(&self) -> TransitionId {
        match *self {
            Arc::PlaceTransition(_, t) | Arc::TransitionPlace(t, _) => t,
        }
    }
}

/// Opaque, uninterpreted boolean expression carried by a guarded transition.
/// The core never parses or evaluates this text itself (§6.3); it is either
/// ignored (conservative over-approximation) or handed to a caller-supplied
/// [`GuardEvaluator`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GuardExpr(pub String);

/// Caller-supplied predicate deciding whether a guarded transition's
/// condition holds in a given marking. Absent, every guarded transition is
/// treated as structurally enabled (§4.1).
pub trait GuardEvaluator {
    fn evaluate(&self, marking: &Marking, guard: &GuardExpr) -> bool;
}

/// Arbitrary, uninterpreted key-value metadata carried by places,
/// transitions and nets: provenance, step type, boolean flags like
/// `isSource`, `isSink`, `isFork`, `isJoin`, `isDependencyConnector`.
pub type Metadata = HashMap<String, serde_json::Value>;

pub(crate) fn flag(metadata: &Metadata, key: &str) -> bool {
    metadata.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

pub(crate) fn set_flag(metadata: &mut Metadata, key: &str, value: bool) {
    metadata.insert(key.to_string(), serde_json::Value::Bool(value));
}

/// Rule 6/7 (§4.3) synthesize a global error handler and a timeout manager
/// that are deliberately left out of the arc graph — informational
/// carriers, not part of the enable/fire surface. Both the structural check
/// and firing semantics treat a node flagged this way as exempt from the
/// "every node is wired" expectation rather than as an orphan or a
/// vacuously-enabled transition.
pub(crate) fn is_deliberately_unwired(metadata: &Metadata) -> bool {
    flag(metadata, "isGlobalErrorHandler") || flag(metadata, "isTimeoutManager")
}

/// A token container.
#[derive(Debug, Clone)]
pub struct Place {
    pub(crate) index: PlaceId,
    pub id: String,
    pub name: Option<String>,
    pub capacity: Option<Tokens>,
    pub metadata: Metadata,
}

impl Place {
    pub fn index(&self) -> PlaceId {
        self.index
    }

    pub fn is_sink(&self) -> bool {
        flag(&self.metadata, "isSink")
    }

    pub fn is_source(&self) -> bool {
        flag(&self.metadata, "isSource")
    }
}

/// A firing atom.
#[derive(Debug, Clone)]
pub struct Transition {
    pub(crate) index: TransitionId,
    pub id: String,
    pub name: Option<String>,
    pub guard: Option<GuardExpr>,
    pub action: Option<String>,
    pub metadata: Metadata,
}

impl Transition {
    pub fn index(&self) -> TransitionId {
        self.index
    }

    pub fn is_fork(&self) -> bool {
        flag(&self.metadata, "isFork")
    }

    pub fn is_join(&self) -> bool {
        flag(&self.metadata, "isJoin")
    }

    pub fn is_dependency_connector(&self) -> bool {
        flag(&self.metadata, "isDependencyConnector")
    }

    pub fn is_deliberately_unwired(&self) -> bool {
        is_deliberately_unwired(&self.metadata)
    }
}

/// A marking function is a mapping from place ids to token counts. It is
/// used to track the current state of the net.
pub trait MarkingFn: Clone + Eq + std::hash::Hash {
    fn get(&self, id: PlaceId) -> Tokens;
    fn set(&mut self, id: PlaceId, tokens: Tokens);
}

/// An immutable, normalized assignment of token counts to places. Only
/// places with a strictly positive count are stored; a missing key means
/// zero. Two markings compare equal iff their normalized maps are equal.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct Marking(pub(crate) BTreeMap<PlaceId, Tokens>);

impl Marking {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A marking is covered by another marking if the other has at least as
    /// many tokens on every place this marking has tokens on. Used to spot
    /// candidate unbounded places.
    pub fn covered_by(&self, other: &Self) -> bool {
        self.0.iter().all(|(id, tokens)| other.get(*id).0 >= tokens.0)
    }

    pub fn places_with_tokens(&self) -> impl Iterator<Item = (PlaceId, Tokens)> + '_ {
        self.0.iter().map(|(&id, &tokens)| (id, tokens))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl MarkingFn for Marking {
    fn get(&self, id: PlaceId) -> Tokens {
        self.0.get(&id).copied().unwrap_or_default()
    }

    fn set(&mut self, id: PlaceId, tokens: Tokens) {
        // Internal implementation detail: only non-zero entries are stored,
        // so marking equality doesn't need a separate normalization pass.
        if tokens.0 == 0 {
            self.0.remove(&id);
        } else {
            self.0.insert(id, tokens);
        }
    }
}

impl FromIterator<(PlaceId, Tokens)> for Marking {
    fn from_iter<I: IntoIterator<Item = (PlaceId, Tokens)>>(iter: I) -> Self {
        let mut marking = Marking::default();
        for (id, tokens) in iter {
            marking.set(id, tokens);
        }
        marking
    }
}

/// The composed, immutable model. Construct one via [`builder::PetriNetBuilder`].
#[derive(Debug, Clone)]
pub struct PetriNet {
    pub name: String,
    pub(crate) places: Vec<Place>,
    pub(crate) transitions: Vec<Transition>,
    pub(crate) arcs: Vec<Arc>,
    pub(crate) arc_weights: HashMap<Arc, Tokens, RandomState>,
    pub initial_marking: Marking,
    pub metadata: Metadata,
    place_ids: HashMap<String, PlaceId>,
    transition_ids: HashMap<String, TransitionId>,
}

impl PetriNet {
    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn arcs(&self) -> &[Arc] {
        &self.arcs
    }

    pub fn place(&self, id: PlaceId) -> &Place {
        &self.places[id.0]
    }

    pub fn transition(&self, id: TransitionId) -> &Transition {
        &self.transitions[id.0]
    }

    pub fn place_by_str_id(&self, id: &str) -> Option<PlaceId> {
        self.place_ids.get(id).copied()
    }

    pub fn transition_by_str_id(&self, id: &str) -> Option<TransitionId> {
        self.transition_ids.get(id).copied()
    }

    /// Weight of an arc, or the default of 1 if the arc carries no explicit
    /// weight.
    pub fn weight_of(&self, arc: &Arc) -> Tokens {
        self.arc_weights.get(arc).copied().unwrap_or(Tokens::ONE)
    }

    /// Capacity of a place, or `usize::MAX` (treated as unbounded) if none
    /// was declared.
    pub fn capacity_of(&self, id: PlaceId) -> Tokens {
        self.places[id.0].capacity.unwrap_or(Tokens(usize::MAX))
    }

    pub fn input_arcs(&self, transition: TransitionId) -> impl Iterator<Item = &Arc> {
        self.arcs
            .iter()
            .filter(move |arc| matches!(arc, Arc::PlaceTransition(_, t) if *t == transition))
    }

    pub fn output_arcs(&self, transition: TransitionId) -> impl Iterator<Item = &Arc> {
        self.arcs
            .iter()
            .filter(move |arc| matches!(arc, Arc::TransitionPlace(t, _) if *t == transition))
    }
}
