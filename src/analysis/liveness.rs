// This module computes, for every node of a NodeSequence, the set of values live immediately
// after it. The analysis runs in two steps. First a block-level backward dataflow iterates to a
// fixed point: a block's live-out set is the union of its successors' live-in sets, and its
// live-in set is its upward-exposed uses plus everything live-out that the block does not
// define. Then each block is walked backward once from its live-out set: the set seen after a
// node is recorded, the node's target is removed and its operands are added. Terminators thus
// take exactly the liveness of their successor blocks. Phis must have been resolved before this
// runs; a phi in the sequence is reported as an UnresolvedPhi error with its block.

//! Backward liveness analysis.

use super::node_sequence::NodeSequence;
use crate::core::error::{CompileError, CompileResult};
use crate::ir::{BlockId, IrInstruction, ValueId};
use hashbrown::HashMap;
use log::{debug, trace};
use std::collections::BTreeSet;

pub type LiveSet = BTreeSet<ValueId>;

/// Live-after sets per node plus the live-in set of every block.
#[derive(Debug, Clone)]
pub struct Liveness {
    live_after: Vec<LiveSet>,
    live_in: HashMap<BlockId, LiveSet>,
}

#[derive(Default)]
struct BlockSummary {
    uses: LiveSet,
    defs: LiveSet,
}

/// Compute liveness over a phi-free node sequence.
pub fn analyze(seq: &NodeSequence<'_>) -> CompileResult<Liveness> {
    let function = seq.function();
    let mut summaries: HashMap<BlockId, BlockSummary> = HashMap::with_capacity(seq.blocks().len());

    for &block in seq.blocks() {
        let mut summary = BlockSummary::default();
        for node in seq.block_nodes(block) {
            if let IrInstruction::Phi { target, .. } = node.instruction {
                return Err(CompileError::UnresolvedPhi {
                    stage: "liveness",
                    value: target.to_string(),
                    block: function.block(block).label.clone(),
                });
            }
            for operand in node.instruction.operands() {
                if !summary.defs.contains(&operand.id) {
                    summary.uses.insert(operand.id);
                }
            }
            if let Some(target) = node.instruction.target() {
                summary.defs.insert(target.id);
            }
        }
        summaries.insert(block, summary);
    }

    let mut live_in: HashMap<BlockId, LiveSet> =
        seq.blocks().iter().map(|&b| (b, LiveSet::new())).collect();
    let mut live_out: HashMap<BlockId, LiveSet> = live_in.clone();

    let mut rounds = 0;
    let mut changed = true;
    while changed {
        changed = false;
        rounds += 1;
        for &block in seq.blocks().iter().rev() {
            let mut out = LiveSet::new();
            for succ in &seq.block(block).successors {
                if let Some(set) = live_in.get(succ) {
                    out.extend(set.iter().copied());
                }
            }

            let Some(summary) = summaries.get(&block) else {
                continue;
            };
            let mut inn = summary.uses.clone();
            inn.extend(out.difference(&summary.defs).copied());

            if live_in.get(&block) != Some(&inn) {
                live_in.insert(block, inn);
                changed = true;
            }
            live_out.insert(block, out);
        }
    }
    trace!("liveness of `{}` converged after {rounds} rounds", function.name);

    let mut live_after = vec![LiveSet::new(); seq.len()];
    for &block in seq.blocks() {
        let mut live = live_out.get(&block).cloned().unwrap_or_default();
        for node in seq.block_nodes(block).iter().rev() {
            live_after[node.position] = live.clone();
            if let Some(target) = node.instruction.target() {
                live.remove(&target.id);
            }
            for operand in node.instruction.operands() {
                live.insert(operand.id);
            }
        }
    }

    let liveness = Liveness {
        live_after,
        live_in,
    };
    debug!(
        "liveness of `{}`: max pressure {}",
        function.name,
        liveness.max_pressure()
    );
    Ok(liveness)
}

impl Liveness {
    /// Values live immediately after the node at `position`.
    pub fn live_after(&self, position: usize) -> &LiveSet {
        &self.live_after[position]
    }

    pub fn live_in(&self, block: BlockId) -> Option<&LiveSet> {
        self.live_in.get(&block)
    }

    pub fn len(&self) -> usize {
        self.live_after.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live_after.is_empty()
    }

    /// Largest live-after set.
    pub fn max_pressure(&self) -> usize {
        self.live_after.iter().map(LiveSet::len).max().unwrap_or(0)
    }
}
