//! The DAG projector (§4.6): derives a transition-successor graph from the
//! net (transition A precedes transition B iff some place A produces into
//! is consumed by B) and reduces it to its transitive closure's minimal
//! form. A net containing a genuine cycle in this graph — a `Loop` or
//! `CircuitBreaker` fragment, say — cannot be projected and is reported as
//! [`ProjectionError::CyclicProjection`] rather than silently dropping the
//! offending edges.

use crate::error::ProjectionError;
use crate::petri_net::{Arc, MarkingFn, PetriNet, PlaceId, TransitionId};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct DagProjection {
    pub edges: Vec<(TransitionId, TransitionId)>,
    pub roots: Vec<TransitionId>,
}

/// Synthesized connectors (`isDependencyConnector`, see the grammar
/// compiler) exist only to stitch a dependency's exits to its dependent's
/// entry — they aren't a step a caller projecting the workflow's shape cares
/// about, so an edge bridges straight through one rather than terminating
/// on it.
fn is_bridge(net: &PetriNet, transition: TransitionId) -> bool {
    net.transition(transition).is_dependency_connector()
}

fn successor_adjacency(net: &PetriNet) -> Vec<HashSet<usize>> {
    let mut producers_of: HashMap<PlaceId, Vec<TransitionId>> = HashMap::new();
    let mut consumers_of: HashMap<PlaceId, Vec<TransitionId>> = HashMap::new();
    for arc in net.arcs() {
        match arc {
            Arc::TransitionPlace(t, p) => producers_of.entry(*p).or_default().push(*t),
            Arc::PlaceTransition(p, t) => consumers_of.entry(*p).or_default().push(*t),
        }
    }

    // Direct places-bridge edges, including through bridge transitions.
    let mut adjacency = vec![HashSet::new(); net.transitions().len()];
    for (place, producers) in &producers_of {
        let Some(consumers) = consumers_of.get(place) else {
            continue;
        };
        for &producer in producers {
            for &consumer in consumers {
                if producer != consumer {
                    adjacency[producer.0].insert(consumer.0);
                }
            }
        }
    }

    // Traverse through bridge transitions: an edge into one becomes an edge
    // to everything reachable through its outputs, recursively, and the
    // bridge itself is excluded from the final graph.
    fn resolve_through_bridges(
        net: &PetriNet,
        start: usize,
        adjacency: &[HashSet<usize>],
        visited: &mut HashSet<usize>,
        out: &mut HashSet<usize>,
    ) {
        if !visited.insert(start) {
            return;
        }
        for &next in &adjacency[start] {
            if is_bridge(net, TransitionId(next)) {
                resolve_through_bridges(net, next, adjacency, visited, out);
            } else {
                out.insert(next);
            }
        }
    }

    let mut resolved = vec![HashSet::new(); adjacency.len()];
    for (u, successors) in adjacency.iter().enumerate() {
        if is_bridge(net, TransitionId(u)) {
            continue;
        }
        let mut visited = HashSet::new();
        for &v in successors {
            if is_bridge(net, TransitionId(v)) {
                resolve_through_bridges(net, v, &adjacency, &mut visited, &mut resolved[u]);
            } else {
                resolved[u].insert(v);
            }
        }
    }
    resolved
}

/// Depth-first cycle search; returns the first cycle found, as the sequence
/// of transitions composing it.
fn find_cycle(adjacency: &[HashSet<usize>]) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }
    let mut marks = vec![Mark::Unvisited; adjacency.len()];
    let mut stack = Vec::new();

    fn visit(
        u: usize,
        adjacency: &[HashSet<usize>],
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        marks[u] = Mark::InProgress;
        stack.push(u);
        for &v in &adjacency[u] {
            match marks[v] {
                Mark::Done => continue,
                Mark::InProgress => {
                    let start = stack.iter().position(|&x| x == v).unwrap_or(0);
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(v);
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = visit(v, adjacency, marks, stack) {
                        return Some(cycle);
                    }
                }
            }
        }
        stack.pop();
        marks[u] = Mark::Done;
        None
    }

    for u in 0..adjacency.len() {
        if marks[u] == Mark::Unvisited {
            if let Some(cycle) = visit(u, adjacency, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

fn reachable_sets(adjacency: &[HashSet<usize>]) -> Vec<HashSet<usize>> {
    adjacency
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let mut visited = HashSet::new();
            let mut stack = vec![i];
            while let Some(u) = stack.pop() {
                for &v in &adjacency[u] {
                    if visited.insert(v) {
                        stack.push(v);
                    }
                }
            }
            visited
        })
        .collect()
}

/// Drops every edge `u -> v` for which some other direct successor of `u`
/// already reaches `v`, leaving the minimal edge set with the same
/// reachability relation.
fn transitive_reduction(adjacency: &[HashSet<usize>]) -> Vec<(usize, usize)> {
    let reach = reachable_sets(adjacency);
    let mut edges = Vec::new();
    for (u, successors) in adjacency.iter().enumerate() {
        for &v in successors {
            let redundant = successors
                .iter()
                .any(|&w| w != v && reach[w].contains(&v));
            if !redundant {
                edges.push((u, v));
            }
        }
    }
    edges
}

/// A transition is a root of the projection when nothing feeds into it
/// *and* its inputs are already satisfied by the net's initial marking —
/// a dependency-free step the workflow can start on immediately, as
/// opposed to one merely missed by the reduction because its predecessor
/// was itself unreachable.
fn inputs_initially_marked(net: &PetriNet, transition: TransitionId) -> bool {
    net.input_arcs(transition).all(|arc| match arc {
        Arc::PlaceTransition(place, _) => net.initial_marking.get(*place).0 > 0,
        Arc::TransitionPlace(..) => false,
    })
}

/// Projects `net`'s transition-successor graph, reduced to its transitive
/// minimum. Fails if the graph contains a cycle. Bridge (dependency
/// connector) transitions never appear in the output: edges run straight
/// through them and they are never reported as roots.
pub fn project(net: &PetriNet) -> Result<DagProjection, ProjectionError> {
    let adjacency = successor_adjacency(net);

    if let Some(cycle) = find_cycle(&adjacency) {
        return Err(ProjectionError::CyclicProjection(
            cycle.into_iter().map(TransitionId).collect(),
        ));
    }

    let edges: Vec<(TransitionId, TransitionId)> = transitive_reduction(&adjacency)
        .into_iter()
        .map(|(u, v)| (TransitionId(u), TransitionId(v)))
        .collect();

    let mut has_incoming = vec![false; adjacency.len()];
    for &(_, v) in &edges {
        has_incoming[v.0] = true;
    }
    let roots: Vec<TransitionId> = (0..adjacency.len())
        .map(TransitionId)
        .filter(|&t| !has_incoming[t.0] && !is_bridge(net, t) && inputs_initially_marked(net, t))
        .collect();

    Ok(DagProjection { edges, roots })
}
