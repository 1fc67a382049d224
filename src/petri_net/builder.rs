//! The only mutable entity in the data model. A [`PetriNetBuilder`] accepts
//! incremental additions of places, transitions and arcs; [`PetriNetBuilder::freeze`]
//! checks every structural invariant from §3 and yields an immutable
//! [`PetriNet`]. Once frozen, a net is shared by borrow, never by ownership
//! transfer (§9).

use super::{Arc, GuardExpr, Marking, MarkingFn, Metadata, PetriNet, Place, PlaceId, Tokens, Transition, TransitionId};
use crate::error::FreezeError;
use ahash::RandomState;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct PetriNetBuilder {
    name: String,
    places: Vec<Place>,
    transitions: Vec<Transition>,
    arcs: Vec<Arc>,
    arc_weights: HashMap<Arc, Tokens, RandomState>,
    initial_marking: Marking,
    metadata: Metadata,
    place_ids: HashMap<String, PlaceId>,
    transition_ids: HashMap<String, TransitionId>,
}

impl PetriNetBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Declares a place. Returns its dense id, or `Err` if `id` was already
    /// used by another place in this builder.
    pub fn add_place(
        &mut self,
        id: impl Into<String>,
        name: Option<String>,
        capacity: Option<Tokens>,
        metadata: Metadata,
    ) -> Result<PlaceId, FreezeError> {
        let id = id.into();
        if self.place_ids.contains_key(&id) {
            return Err(FreezeError::DuplicatePlaceId(id));
        }
        if let Some(cap) = capacity {
            if cap.0 == 0 {
                let index = PlaceId(self.places.len());
                return Err(FreezeError::NonPositiveCapacity(index));
            }
        }
        let index = PlaceId(self.places.len());
        self.place_ids.insert(id.clone(), index);
        self.places.push(Place {
            index,
            id,
            name,
            capacity,
            metadata,
        });
        Ok(index)
    }

    /// Declares a transition. Returns its dense id, or `Err` if `id` was
    /// already used by another transition in this builder.
    pub fn add_transition(
        &mut self,
        id: impl Into<String>,
        name: Option<String>,
        guard: Option<GuardExpr>,
        action: Option<String>,
        metadata: Metadata,
    ) -> Result<TransitionId, FreezeError> {
        let id = id.into();
        if self.transition_ids.contains_key(&id) {
            return Err(FreezeError::DuplicateTransitionId(id));
        }
        let index = TransitionId(self.transitions.len());
        self.transition_ids.insert(id.clone(), index);
        self.transitions.push(Transition {
            index,
            id,
            name,
            guard,
            action,
            metadata,
        });
        Ok(index)
    }

    /// Adds an arc from a place to a transition (or the reverse) with the
    /// given weight (default 1 if `None`). Both endpoints must already be
    /// declared, which is guaranteed by construction since callers only
    /// hold [`PlaceId`]/[`TransitionId`] values handed back by `add_place`/
    /// `add_transition` of this same builder.
    pub fn add_arc(&mut self, arc: Arc, weight: Option<Tokens>) -> Result<(), FreezeError> {
        match arc {
            Arc::PlaceTransition(p, t) => {
                if p.0 >= self.places.len() {
                    return Err(FreezeError::UnknownPlace(p));
                }
                if t.0 >= self.transitions.len() {
                    return Err(FreezeError::UnknownTransition(t));
                }
            }
            Arc::TransitionPlace(t, p) => {
                if t.0 >= self.transitions.len() {
                    return Err(FreezeError::UnknownTransition(t));
                }
                if p.0 >= self.places.len() {
                    return Err(FreezeError::UnknownPlace(p));
                }
            }
        }
        if let Some(w) = weight {
            if w.0 == 0 {
                return Err(FreezeError::NonPositiveWeight);
            }
            self.arc_weights.insert(arc, w);
        }
        self.arcs.push(arc);
        Ok(())
    }

    /// Adds one token to a place's entry in the initial marking.
    pub fn mark_initial(&mut self, place: PlaceId, tokens: Tokens) {
        let mut current = self.initial_marking.get(place);
        current.0 += tokens.0;
        self.initial_marking.set(place, current);
    }

    pub fn place_id_of(&self, id: &str) -> Option<PlaceId> {
        self.place_ids.get(id).copied()
    }

    pub fn transition_id_of(&self, id: &str) -> Option<TransitionId> {
        self.transition_ids.get(id).copied()
    }

    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn transitions_mut(&mut self) -> &mut [Transition] {
        &mut self.transitions
    }

    pub fn places_mut(&mut self) -> &mut [Place] {
        &mut self.places
    }

    pub fn arcs(&self) -> &[Arc] {
        &self.arcs
    }

    pub fn initial_marking(&self) -> &Marking {
        &self.initial_marking
    }

    /// Checks every structural invariant from §3 and yields an immutable
    /// [`PetriNet`]. Once this returns `Ok`, the net is shared by shared
    /// borrow only; there is no path back to a mutable builder.
    pub fn freeze(self) -> Result<PetriNet, FreezeError> {
        if self.places.is_empty() {
            return Err(FreezeError::NoPlaces);
        }
        if self.initial_marking.is_empty() {
            return Err(FreezeError::EmptyInitialMarking);
        }
        for (&place, _) in self.initial_marking.0.iter() {
            if place.0 >= self.places.len() {
                return Err(FreezeError::InitialMarkingUnknownPlace(format!("{place:?}")));
            }
        }
        for place in &self.places {
            if let Some(cap) = place.capacity {
                if cap.0 == 0 {
                    return Err(FreezeError::NonPositiveCapacity(place.index));
                }
            }
        }
        for weight in self.arc_weights.values() {
            if weight.0 == 0 {
                return Err(FreezeError::NonPositiveWeight);
            }
        }
        Ok(PetriNet {
            name: self.name,
            places: self.places,
            transitions: self.transitions,
            arcs: self.arcs,
            arc_weights: self.arc_weights,
            initial_marking: self.initial_marking,
            metadata: self.metadata,
            place_ids: self.place_ids,
            transition_ids: self.transition_ids,
        })
    }
}
