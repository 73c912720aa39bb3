// This module flattens an IR function into the linear node sequence the analysis and
// allocation stages walk. Blocks are visited in the function's layout order (successor-DFS
// preorder from the start block, unreachable blocks dropped) and every instruction becomes
// one Node recording its block, its index inside that block and its global position. The
// nodes live in the compilation session arena as a plain slice, so lookups by position and
// the previous/next node are constant time, and each block maps to the contiguous range of
// positions its instructions occupy.

//! Linear node order over an IR function.

use crate::core::session::CompilationSession;
use crate::ir::{BlockId, IrBlock, IrFunction, IrInstruction};
use bumpalo::collections::Vec as BumpVec;
use hashbrown::HashMap;
use log::trace;
use std::ops::Range;

/// One instruction at a fixed position of the sequence.
#[derive(Debug, Clone, Copy)]
pub struct Node<'a> {
    pub position: usize,
    pub block: BlockId,
    /// Index of the instruction inside its block.
    pub index: usize,
    pub instruction: &'a IrInstruction,
}

/// Total order over the instructions of one function.
pub struct NodeSequence<'a> {
    function: &'a IrFunction,
    nodes: &'a [Node<'a>],
    order: Vec<BlockId>,
    ranges: HashMap<BlockId, Range<usize>>,
}

/// Lay out `function` and allocate its node sequence in the session arena.
pub fn linearize<'a>(session: &CompilationSession<'a>, function: &'a IrFunction) -> NodeSequence<'a> {
    let order = function.layout();
    let mut nodes = BumpVec::with_capacity_in(function.instruction_count(), session.arena());
    let mut ranges = HashMap::with_capacity(order.len());

    for &block in &order {
        let start = nodes.len();
        for (index, instruction) in function.block(block).instructions.iter().enumerate() {
            nodes.push(Node {
                position: nodes.len(),
                block,
                index,
                instruction,
            });
        }
        ranges.insert(block, start..nodes.len());
    }

    trace!(
        "linearized `{}`: {} nodes in {} blocks",
        function.name,
        nodes.len(),
        order.len()
    );

    NodeSequence {
        function,
        nodes: nodes.into_bump_slice(),
        order,
        ranges,
    }
}

impl<'a> NodeSequence<'a> {
    pub fn function(&self) -> &'a IrFunction {
        self.function
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &'a [Node<'a>] {
        self.nodes
    }

    pub fn node(&self, position: usize) -> Option<&'a Node<'a>> {
        self.nodes.get(position)
    }

    pub fn prev(&self, position: usize) -> Option<&'a Node<'a>> {
        position.checked_sub(1).and_then(|p| self.nodes.get(p))
    }

    pub fn next(&self, position: usize) -> Option<&'a Node<'a>> {
        self.nodes.get(position + 1)
    }

    /// Blocks in layout order.
    pub fn blocks(&self) -> &[BlockId] {
        &self.order
    }

    pub fn block(&self, id: BlockId) -> &'a IrBlock {
        self.function.block(id)
    }

    /// Positions covered by `block`; empty for blocks outside the layout.
    pub fn block_range(&self, block: BlockId) -> Range<usize> {
        self.ranges.get(&block).cloned().unwrap_or(0..0)
    }

    pub fn block_nodes(&self, block: BlockId) -> &'a [Node<'a>] {
        let nodes = self.nodes;
        &nodes[self.block_range(block)]
    }
}
