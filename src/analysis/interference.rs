// This module builds the interference graph the chordal allocator colors. Every value some node
// defines becomes a graph node; walking the sequence backward, each defining node's target is
// connected to every value live immediately after it, except itself. That is the classic
// definition-point rule: two values interfere when one is defined while the other is still
// needed. The graph is an undirected adjacency-set map keyed by ValueId, kept irreflexive and
// symmetric by add_edge, which also refuses edges that name an unregistered node. Node removal
// is destructive, so consumers that need it (maximum cardinality search) work on an explicit
// clone.

//! Interference graph construction.

use super::liveness::Liveness;
use super::node_sequence::NodeSequence;
use crate::core::error::{CompileError, CompileResult};
use crate::ir::ValueId;
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};

/// Undirected, irreflexive interference graph over values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterferenceGraph {
    adjacency: BTreeMap<ValueId, BTreeSet<ValueId>>,
}

impl InterferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` as a node; returns false if it was already present.
    pub fn add_node(&mut self, value: ValueId) -> bool {
        if self.adjacency.contains_key(&value) {
            return false;
        }
        self.adjacency.insert(value, BTreeSet::new());
        true
    }

    pub fn contains(&self, value: ValueId) -> bool {
        self.adjacency.contains_key(&value)
    }

    /// Connect `a` and `b`. Both must already be nodes.
    pub fn add_edge(&mut self, a: ValueId, b: ValueId) -> CompileResult<()> {
        if a == b {
            return Err(CompileError::SelfEdge {
                value: a.to_string(),
            });
        }
        for value in [a, b] {
            if !self.contains(value) {
                return Err(CompileError::NodeNotFound {
                    value: value.to_string(),
                });
            }
        }
        if let Some(set) = self.adjacency.get_mut(&a) {
            set.insert(b);
        }
        if let Some(set) = self.adjacency.get_mut(&b) {
            set.insert(a);
        }
        Ok(())
    }

    pub fn neighbors(&self, value: ValueId) -> CompileResult<&BTreeSet<ValueId>> {
        self.adjacency
            .get(&value)
            .ok_or_else(|| CompileError::NodeNotFound {
                value: value.to_string(),
            })
    }

    pub fn interferes(&self, a: ValueId, b: ValueId) -> bool {
        self.adjacency
            .get(&a)
            .is_some_and(|set| set.contains(&b))
    }

    /// Remove `value` and its edges, returning its former neighbours.
    pub fn remove_node(&mut self, value: ValueId) -> CompileResult<BTreeSet<ValueId>> {
        let neighbors = self
            .adjacency
            .remove(&value)
            .ok_or_else(|| CompileError::NodeNotFound {
                value: value.to_string(),
            })?;
        for other in &neighbors {
            if let Some(set) = self.adjacency.get_mut(other) {
                set.remove(&value);
            }
        }
        Ok(neighbors)
    }

    /// Nodes in ascending value order.
    pub fn nodes(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }
}

/// Build the interference graph of `seq` from its liveness.
pub fn build(seq: &NodeSequence<'_>, liveness: &Liveness) -> CompileResult<InterferenceGraph> {
    let mut graph = InterferenceGraph::new();

    for node in seq.nodes() {
        if let Some(target) = node.instruction.target() {
            graph.add_node(target.id);
        }
    }

    for node in seq.nodes().iter().rev() {
        let Some(target) = node.instruction.target() else {
            continue;
        };
        for &live in liveness.live_after(node.position) {
            if live != target.id {
                trace!("interference {} -- {live}", target.id);
                graph.add_edge(target.id, live)?;
            }
        }
    }

    debug!(
        "interference graph of `{}`: {} nodes, {} edges",
        seq.function().name,
        graph.node_count(),
        graph.edge_count()
    );
    Ok(graph)
}
