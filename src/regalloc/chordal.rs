// This module implements register allocation by coloring the interference graph. SSA
// interference graphs are chordal, so a maximum cardinality search yields an order in which
// greedy coloring uses exactly as many colors as the largest clique. The search runs on a
// clone of the graph: it repeatedly picks the remaining node with the most already-ordered
// neighbours (lowest value id on ties), bumps the weight of its neighbours and removes it.
// Coloring then walks that order and gives each node the smallest color none of its colored
// neighbours has. Colors map to machine registers through the RegisterFile in its fixed
// allocation order; colors past the end of the register pool become numbered stack slots, so
// every value with the same color lands in the same place. After phi resolution the graph is
// no longer guaranteed to be chordal; the result stays a valid coloring, only optimality is
// lost.

//! Chordal graph coloring register allocation.

use crate::analysis::interference::{self, InterferenceGraph};
use crate::analysis::liveness;
use crate::analysis::node_sequence::NodeSequence;
use crate::core::error::CompileResult;
use crate::core::register_file::{AsmReg, RegBitSet, RegisterFile};
use crate::ir::ValueId;
use hashbrown::HashMap;
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Where a value lives for the whole function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Gp(AsmReg),
    /// Slot `n` is addressed as `-(8 * (n + 1))(%rbp)`.
    StackSlot(u32),
}

impl Register {
    pub fn is_stack(&self) -> bool {
        matches!(self, Register::StackSlot(_))
    }

    /// Frame offset of a stack slot relative to `%rbp`.
    pub fn frame_offset(slot: u32) -> i64 {
        -8 * (i64::from(slot) + 1)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Gp(reg) => write!(f, "{reg}"),
            Register::StackSlot(slot) => write!(f, "{}(%rbp)", Register::frame_offset(*slot)),
        }
    }
}

/// Outcome of allocating one function.
#[derive(Debug, Clone)]
pub struct RegisterAllocationResult {
    pub locations: HashMap<ValueId, Register>,
    pub colors: BTreeMap<ValueId, usize>,
    /// Maximum cardinality search order the coloring followed.
    pub ordering: Vec<ValueId>,
    pub color_count: usize,
    pub stack_slots: u32,
    pub scratch: AsmReg,
    pub used: RegBitSet,
}

impl RegisterAllocationResult {
    pub fn location(&self, value: ValueId) -> Option<Register> {
        self.locations.get(&value).copied()
    }

    /// Bytes reserved below `%rbp`; one spare slot is always kept.
    pub fn frame_size(&self) -> i32 {
        (self.stack_slots as i32 + 1) * 8
    }

    /// Callee-saved registers the function clobbers, in push order.
    pub fn callee_saved(&self) -> Vec<AsmReg> {
        self.used.iter().filter(AsmReg::is_callee_saved).collect()
    }
}

/// Order the nodes of `graph` by maximum cardinality search.
pub fn maximum_cardinality_search(graph: &InterferenceGraph) -> CompileResult<Vec<ValueId>> {
    let mut working = graph.clone();
    let mut weights: BTreeMap<ValueId, usize> = graph.nodes().map(|v| (v, 0)).collect();
    let mut order = Vec::with_capacity(graph.node_count());

    while !working.is_empty() {
        // BTreeMap iterates ascending, so `>` keeps the lowest id on ties.
        let mut best: Option<(ValueId, usize)> = None;
        for value in working.nodes() {
            let weight = weights.get(&value).copied().unwrap_or(0);
            if best.map_or(true, |(_, w)| weight > w) {
                best = Some((value, weight));
            }
        }
        let Some((chosen, _)) = best else {
            break;
        };

        for neighbor in working.remove_node(chosen)? {
            if let Some(weight) = weights.get_mut(&neighbor) {
                *weight += 1;
            }
        }
        order.push(chosen);
    }

    trace!("elimination order: {order:?}");
    Ok(order)
}

/// Color `order` greedily with the smallest color free among colored neighbours.
pub fn greedy_color(
    graph: &InterferenceGraph,
    order: &[ValueId],
) -> CompileResult<BTreeMap<ValueId, usize>> {
    let mut colors: BTreeMap<ValueId, usize> = BTreeMap::new();
    for &value in order {
        let taken: BTreeSet<usize> = graph
            .neighbors(value)?
            .iter()
            .filter_map(|n| colors.get(n).copied())
            .collect();
        let color = (0..).find(|c| !taken.contains(c)).unwrap_or(taken.len());
        colors.insert(value, color);
    }
    Ok(colors)
}

/// Colors interference graphs and maps colors onto the register file.
pub struct ChordalAllocator {
    registers: RegisterFile,
}

impl ChordalAllocator {
    /// Allocator over the full register pool, or its first `register_limit` registers.
    pub fn new(register_limit: Option<usize>) -> Self {
        Self {
            registers: RegisterFile::new(register_limit),
        }
    }

    /// Run liveness, build the interference graph and color it.
    pub fn allocate(&mut self, seq: &NodeSequence<'_>) -> CompileResult<RegisterAllocationResult> {
        let live = liveness::analyze(seq)?;
        let graph = interference::build(seq, &live)?;
        self.allocate_graph(&graph)
    }

    /// Color an already built graph.
    pub fn allocate_graph(
        &mut self,
        graph: &InterferenceGraph,
    ) -> CompileResult<RegisterAllocationResult> {
        self.registers.reset();
        let ordering = maximum_cardinality_search(graph)?;
        let colors = greedy_color(graph, &ordering)?;
        let color_count = colors.values().max().map_or(0, |c| c + 1);

        let pool = self.registers.pool_size();
        let mut locations = HashMap::with_capacity(colors.len());
        for (&value, &color) in &colors {
            let location = match self.registers.assign_color(color) {
                Some(reg) => Register::Gp(reg),
                None => Register::StackSlot((color - pool) as u32),
            };
            trace!("{value} -> color {color} -> {location}");
            locations.insert(value, location);
        }

        let stack_slots = color_count.saturating_sub(pool) as u32;
        debug!(
            "allocated {} values with {color_count} colors: {} registers, {stack_slots} stack slots",
            colors.len(),
            self.registers.used().len()
        );

        Ok(RegisterAllocationResult {
            locations,
            colors,
            ordering,
            color_count,
            stack_slots,
            scratch: self.registers.scratch(),
            used: self.registers.used(),
        })
    }
}

impl Default for ChordalAllocator {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Allocate `seq` with a fresh allocator.
pub fn allocate(
    seq: &NodeSequence<'_>,
    register_limit: Option<usize>,
) -> CompileResult<RegisterAllocationResult> {
    ChordalAllocator::new(register_limit).allocate(seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: u32, edges: &[(u32, u32)]) -> InterferenceGraph {
        let mut g = InterferenceGraph::new();
        for id in 0..nodes {
            g.add_node(ValueId(id));
        }
        for &(a, b) in edges {
            g.add_edge(ValueId(a), ValueId(b)).unwrap();
        }
        g
    }

    #[test]
    fn test_mcs_breaks_ties_by_lowest_id() {
        let g = graph(3, &[]);
        let order = maximum_cardinality_search(&g).unwrap();
        assert_eq!(order, vec![ValueId(0), ValueId(1), ValueId(2)]);
    }

    #[test]
    fn test_mcs_follows_cardinality() {
        // 0-3, 3-1, 1-2: after 0, node 3 has the only ordered neighbour.
        let g = graph(4, &[(0, 3), (3, 1), (1, 2)]);
        let order = maximum_cardinality_search(&g).unwrap();
        assert_eq!(order, vec![ValueId(0), ValueId(3), ValueId(1), ValueId(2)]);
        // the input graph is untouched
        assert_eq!(g.edge_count(), 3);
    }

    #[test]
    fn test_triangle_needs_three_colors() {
        let g = graph(4, &[(0, 1), (1, 2), (0, 2), (2, 3)]);
        let order = maximum_cardinality_search(&g).unwrap();
        let colors = greedy_color(&g, &order).unwrap();
        assert_eq!(colors.values().max(), Some(&2));
        for (a, b) in [(0, 1), (1, 2), (0, 2), (2, 3)] {
            assert_ne!(colors[&ValueId(a)], colors[&ValueId(b)]);
        }
    }

    #[test]
    fn test_colors_map_to_registers_then_slots() {
        let edges: Vec<(u32, u32)> = (0..4)
            .flat_map(|a| (a + 1..4).map(move |b| (a, b)))
            .collect();
        let g = graph(4, &edges);
        let result = ChordalAllocator::new(Some(2)).allocate_graph(&g).unwrap();

        assert_eq!(result.color_count, 4);
        assert_eq!(result.stack_slots, 2);
        assert_eq!(result.frame_size(), 24);
        let mut slots = 0;
        for value in g.nodes() {
            match result.location(value).unwrap() {
                Register::Gp(reg) => assert!(reg == AsmReg::RBX || reg == AsmReg::RSI),
                Register::StackSlot(n) => {
                    assert!(n < 2);
                    slots += 1;
                }
            }
        }
        assert_eq!(slots, 2);
        assert_eq!(result.callee_saved(), vec![AsmReg::RBX]);
    }

    #[test]
    fn test_empty_graph() {
        let result = ChordalAllocator::default()
            .allocate_graph(&InterferenceGraph::new())
            .unwrap();
        assert_eq!(result.color_count, 0);
        assert_eq!(result.frame_size(), 8);
        assert!(result.used.is_empty());
    }

    #[test]
    fn test_slot_display() {
        assert_eq!(Register::StackSlot(0).to_string(), "-8(%rbp)");
        assert_eq!(Register::StackSlot(2).to_string(), "-24(%rbp)");
        assert_eq!(Register::Gp(AsmReg::R12).to_string(), "%r12");
    }
}
