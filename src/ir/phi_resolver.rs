//! Phi resolution (out-of-SSA translation).
//!
//! Every phi is replaced by copies at the end of its predecessors. The copies
//! for one edge form a parallel copy, which is sequentialized here: a copy is
//! emitted once no other pending copy still reads its target, and cycles are
//! broken by saving one target into a fresh temporary. Critical edges are
//! split first so the copies never execute on the wrong path.

use super::{BlockId, IrFunction, IrInstruction, SsaValue};
use crate::core::error::{CompileError, CompileResult};
use log::{debug, trace};

/// One copy of a parallel copy group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhiMove {
    pub source: SsaValue,
    pub target: SsaValue,
}

/// Replace every phi in `function` with copies; returns the number of phis removed.
pub fn resolve_phis(function: &mut IrFunction) -> CompileResult<usize> {
    let mut resolved = 0;

    let block_ids: Vec<BlockId> = function.blocks.iter().map(|b| b.id).collect();
    for block in block_ids {
        let phi_count = function.block(block).phis().count();
        if phi_count == 0 {
            continue;
        }
        let phis: Vec<IrInstruction> = function
            .block_mut(block)
            .instructions
            .drain(..phi_count)
            .collect();

        let preds = function.block(block).predecessors.clone();
        for pred in preds {
            let moves = edge_moves(function, &phis, block, pred)?;
            if moves.is_empty() {
                continue;
            }

            let insert_into = if function.block(pred).successors.len() > 1 {
                let split = function.split_edge(pred, block);
                trace!("split critical edge {pred} -> {block} with {split}");
                split
            } else {
                pred
            };

            let copies = sequentialize(function, &moves);
            let instructions = &mut function.block_mut(insert_into).instructions;
            let at = instructions.len().saturating_sub(1);
            instructions.splice(at..at, copies);
        }

        resolved += phi_count;
    }

    if resolved > 0 {
        debug!("resolved {resolved} phi(s) in `{}`", function.name);
    }
    Ok(resolved)
}

/// The copies the edge `pred -> block` needs, without self-copies.
fn edge_moves(
    function: &IrFunction,
    phis: &[IrInstruction],
    block: BlockId,
    pred: BlockId,
) -> CompileResult<Vec<PhiMove>> {
    let mut moves = Vec::with_capacity(phis.len());
    for phi in phis {
        let IrInstruction::Phi { target, incoming } = phi else {
            continue;
        };
        let source = incoming
            .iter()
            .find(|(_, from)| *from == pred)
            .map(|(value, _)| *value)
            .ok_or_else(|| CompileError::MissingPhiIncoming {
                phi: target.to_string(),
                block: function.block(block).label.clone(),
                predecessor: function.block(pred).label.clone(),
            })?;
        if source.id != target.id {
            moves.push(PhiMove {
                source,
                target: *target,
            });
        }
    }
    Ok(moves)
}

/// Order a parallel copy into sequential moves.
pub fn sequentialize(function: &mut IrFunction, moves: &[PhiMove]) -> Vec<IrInstruction> {
    let mut pending = moves.to_vec();
    let mut out = Vec::with_capacity(moves.len() + 1);

    while !pending.is_empty() {
        let ready = pending.iter().position(|mv| {
            !pending
                .iter()
                .any(|other| other.source.id == mv.target.id && other != mv)
        });

        match ready {
            Some(index) => {
                let mv = pending.remove(index);
                out.push(IrInstruction::Move {
                    target: mv.target,
                    source: mv.source,
                });
            }
            None => {
                // Only cycles are left: park one target in a temporary.
                let blocked = pending[0].target;
                let temp = function.new_value(blocked.ty, None);
                trace!("breaking copy cycle through {temp}");
                out.push(IrInstruction::Move {
                    target: temp,
                    source: blocked,
                });
                for mv in pending.iter_mut() {
                    if mv.source.id == blocked.id {
                        mv.source = temp;
                    }
                }
            }
        }
    }

    out
}
