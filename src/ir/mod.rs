// This module defines the SSA intermediate representation chordc lowers typed functions into.
// Values are numbered per function (ValueId) and carry their type plus the source symbol they
// were created for, which is informational only: identity and equality of an SsaValue are its
// number and type. Blocks hold an ordered instruction list and predecessor/successor lists
// that are only ever updated together through IrFunction::add_edge and friends. Instructions
// form a closed set of value-producing variants (constants, move, unary, binary, phi) and
// control variants (jump, branch, return). IrFunction also owns the block layout used by the
// later stages: a preorder depth-first walk over successors starting at the entry block, which
// both the node sequence and the emitter follow so a jump to the next laid-out block can be
// dropped. The Display implementations render the textual dump printed by --dump-ir.

//! SSA intermediate representation.

pub mod builder;
pub mod eval;
pub mod phi_resolver;

use crate::frontend::typed::{SymbolId, Type};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Function-local value number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Types of SSA values. Both live in 32-bit registers; bools are 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    Int,
    Bool,
}

impl From<Type> for IrType {
    fn from(ty: Type) -> Self {
        match ty {
            Type::Int => IrType::Int,
            Type::Bool => IrType::Bool,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Int => write!(f, "int"),
            IrType::Bool => write!(f, "bool"),
        }
    }
}

/// An SSA value. The source symbol does not take part in identity.
#[derive(Debug, Clone, Copy)]
pub struct SsaValue {
    pub id: ValueId,
    pub ty: IrType,
    pub symbol: Option<SymbolId>,
}

impl PartialEq for SsaValue {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.ty == other.ty
    }
}

impl Eq for SsaValue {}

impl Hash for SsaValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.ty.hash(state);
    }
}

impl fmt::Display for SsaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Block index inside its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    BitNot,
    LogicalNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::BitNot => "~",
            UnaryOp::LogicalNot => "!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    /// Comparisons produce a bool from two operands of the same type.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Mul
                | BinaryOp::And
                | BinaryOp::Or
                | BinaryOp::Xor
                | BinaryOp::Eq
                | BinaryOp::Ne
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
        }
    }
}

/// IR instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrInstruction {
    Const {
        target: SsaValue,
        value: i32,
    },
    BoolConst {
        target: SsaValue,
        value: bool,
    },
    Move {
        target: SsaValue,
        source: SsaValue,
    },
    Unary {
        target: SsaValue,
        op: UnaryOp,
        operand: SsaValue,
    },
    Binary {
        target: SsaValue,
        op: BinaryOp,
        lhs: SsaValue,
        rhs: SsaValue,
    },
    /// One `(value, predecessor)` entry per incoming edge.
    Phi {
        target: SsaValue,
        incoming: Vec<(SsaValue, BlockId)>,
    },
    Jump {
        target: BlockId,
    },
    Branch {
        condition: SsaValue,
        on_true: BlockId,
        on_false: BlockId,
    },
    Return {
        value: SsaValue,
    },
}

impl IrInstruction {
    /// The value this instruction defines, if any.
    pub fn target(&self) -> Option<SsaValue> {
        match self {
            IrInstruction::Const { target, .. }
            | IrInstruction::BoolConst { target, .. }
            | IrInstruction::Move { target, .. }
            | IrInstruction::Unary { target, .. }
            | IrInstruction::Binary { target, .. }
            | IrInstruction::Phi { target, .. } => Some(*target),
            IrInstruction::Jump { .. }
            | IrInstruction::Branch { .. }
            | IrInstruction::Return { .. } => None,
        }
    }

    /// Values read by this instruction, left to right.
    pub fn operands(&self) -> Vec<SsaValue> {
        match self {
            IrInstruction::Const { .. }
            | IrInstruction::BoolConst { .. }
            | IrInstruction::Jump { .. } => Vec::new(),
            IrInstruction::Move { source, .. } => vec![*source],
            IrInstruction::Unary { operand, .. } => vec![*operand],
            IrInstruction::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            IrInstruction::Phi { incoming, .. } => incoming.iter().map(|(v, _)| *v).collect(),
            IrInstruction::Branch { condition, .. } => vec![*condition],
            IrInstruction::Return { value } => vec![*value],
        }
    }

    /// Successor blocks of a terminator; the true edge comes first.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            IrInstruction::Jump { target } => vec![*target],
            IrInstruction::Branch {
                on_true, on_false, ..
            } => vec![*on_true, *on_false],
            _ => Vec::new(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            IrInstruction::Jump { .. } | IrInstruction::Branch { .. } | IrInstruction::Return { .. }
        )
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, IrInstruction::Phi { .. })
    }

    /// Redirect every edge to `from` so it goes to `to`.
    fn retarget(&mut self, from: BlockId, to: BlockId) {
        match self {
            IrInstruction::Jump { target } if *target == from => *target = to,
            IrInstruction::Branch {
                on_true, on_false, ..
            } => {
                if *on_true == from {
                    *on_true = to;
                }
                if *on_false == from {
                    *on_false = to;
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for IrInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrInstruction::Const { target, value } => write!(f, "{target} = const {value}"),
            IrInstruction::BoolConst { target, value } => write!(f, "{target} = const {value}"),
            IrInstruction::Move { target, source } => write!(f, "{target} = mov {source}"),
            IrInstruction::Unary {
                target,
                op,
                operand,
            } => write!(f, "{target} = {}{operand}", op.symbol()),
            IrInstruction::Binary {
                target,
                op,
                lhs,
                rhs,
            } => write!(f, "{target} = {lhs} {} {rhs}", op.symbol()),
            IrInstruction::Phi { target, incoming } => {
                write!(f, "{target} = phi")?;
                for (i, (value, block)) in incoming.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{sep}[{value}, {block}]")?;
                }
                Ok(())
            }
            IrInstruction::Jump { target } => write!(f, "jmp {target}"),
            IrInstruction::Branch {
                condition,
                on_true,
                on_false,
            } => write!(f, "br {condition}, {on_true}, {on_false}"),
            IrInstruction::Return { value } => write!(f, "ret {value}"),
        }
    }
}

/// A basic block.
#[derive(Debug, Clone)]
pub struct IrBlock {
    pub id: BlockId,
    pub label: String,
    pub instructions: Vec<IrInstruction>,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,
}

impl IrBlock {
    pub fn terminator(&self) -> Option<&IrInstruction> {
        self.instructions.last().filter(|inst| inst.is_terminator())
    }

    /// Phi instructions at the head of the block.
    pub fn phis(&self) -> impl Iterator<Item = &IrInstruction> {
        self.instructions.iter().take_while(|inst| inst.is_phi())
    }
}

/// An SSA function.
#[derive(Debug, Clone)]
pub struct IrFunction {
    pub name: String,
    pub start: BlockId,
    pub blocks: Vec<IrBlock>,
    pub is_entry: bool,
    pub return_type: IrType,
    /// Number of values allocated so far; ids are dense below this bound.
    pub value_count: u32,
}

impl IrFunction {
    pub fn new(name: impl Into<String>, return_type: IrType, is_entry: bool) -> Self {
        Self {
            name: name.into(),
            start: BlockId(0),
            blocks: Vec::new(),
            is_entry,
            return_type,
            value_count: 0,
        }
    }

    /// Append a block labelled `<kind>_<id>`.
    pub fn add_block(&mut self, kind: &str) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(IrBlock {
            id,
            label: format!("{kind}_{}", id.0),
            instructions: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
        });
        id
    }

    pub fn block(&self, id: BlockId) -> &IrBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut IrBlock {
        &mut self.blocks[id.index()]
    }

    /// Allocate a fresh value.
    pub fn new_value(&mut self, ty: IrType, symbol: Option<SymbolId>) -> SsaValue {
        let id = ValueId(self.value_count);
        self.value_count += 1;
        SsaValue { id, ty, symbol }
    }

    /// Record the CFG edge `from -> to` on both ends.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        let succs = &mut self.block_mut(from).successors;
        if !succs.contains(&to) {
            succs.push(to);
        }
        let preds = &mut self.block_mut(to).predecessors;
        if !preds.contains(&from) {
            preds.push(from);
        }
    }

    /// Insert a fresh block on the edge `from -> to` and return it.
    ///
    /// The new block keeps `from`'s position in `to`'s predecessor list and
    /// ends in a jump to `to`.
    pub fn split_edge(&mut self, from: BlockId, to: BlockId) -> BlockId {
        let split = self.add_block("split");

        if let Some(term) = self.block_mut(from).instructions.last_mut() {
            term.retarget(to, split);
        }
        for succ in self.block_mut(from).successors.iter_mut() {
            if *succ == to {
                *succ = split;
            }
        }
        for pred in self.block_mut(to).predecessors.iter_mut() {
            if *pred == from {
                *pred = split;
            }
        }

        let block = self.block_mut(split);
        block.predecessors.push(from);
        block.successors.push(to);
        block.instructions.push(IrInstruction::Jump { target: to });
        split
    }

    /// Blocks reachable from the start block in successor-DFS preorder.
    ///
    /// Successors are visited in terminator order, so the true edge of a
    /// branch is laid out first.
    pub fn layout(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut stack = vec![self.start];

        while let Some(block) = stack.pop() {
            if visited[block.index()] {
                continue;
            }
            visited[block.index()] = true;
            order.push(block);

            let succs = self
                .block(block)
                .terminator()
                .map(|term| term.successors())
                .unwrap_or_default();
            for succ in succs.into_iter().rev() {
                if !visited[succ.index()] {
                    stack.push(succ);
                }
            }
        }

        order
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }

    pub fn has_phis(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| b.instructions.iter().any(IrInstruction::is_phi))
    }
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entry = if self.is_entry { " entry" } else { "" };
        writeln!(f, "function {}() -> {}{entry} {{", self.name, self.return_type)?;
        for id in self.layout() {
            let block = self.block(id);
            write!(f, "{id} ({}):", block.label)?;
            if !block.predecessors.is_empty() {
                let preds: Vec<_> = block.predecessors.iter().map(|p| p.to_string()).collect();
                write!(f, "  ; preds {}", preds.join(", "))?;
            }
            writeln!(f)?;
            for inst in &block.instructions {
                writeln!(f, "    {inst}")?;
            }
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> IrFunction {
        let mut func = IrFunction::new("f", IrType::Int, true);
        let entry = func.add_block("entry");
        let then = func.add_block("then");
        let other = func.add_block("else");
        let merge = func.add_block("merge");

        let c = func.new_value(IrType::Bool, None);
        func.block_mut(entry).instructions.extend([
            IrInstruction::BoolConst {
                target: c,
                value: true,
            },
            IrInstruction::Branch {
                condition: c,
                on_true: then,
                on_false: other,
            },
        ]);
        func.add_edge(entry, then);
        func.add_edge(entry, other);
        for arm in [then, other] {
            func.block_mut(arm)
                .instructions
                .push(IrInstruction::Jump { target: merge });
            func.add_edge(arm, merge);
        }
        let r = func.new_value(IrType::Int, None);
        func.block_mut(merge).instructions.extend([
            IrInstruction::Const {
                target: r,
                value: 0,
            },
            IrInstruction::Return { value: r },
        ]);
        func
    }

    #[test]
    fn test_value_identity_ignores_symbol() {
        let a = SsaValue {
            id: ValueId(3),
            ty: IrType::Int,
            symbol: Some(SymbolId(1)),
        };
        let b = SsaValue { symbol: None, ..a };
        let c = SsaValue {
            ty: IrType::Bool,
            ..a
        };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_edges_update_both_sides() {
        let func = diamond();
        let merge = func.block(BlockId(3));
        assert_eq!(merge.predecessors, vec![BlockId(1), BlockId(2)]);
        assert_eq!(func.block(BlockId(0)).successors, vec![BlockId(1), BlockId(2)]);
        assert_eq!(merge.label, "merge_3");
    }

    #[test]
    fn test_layout_is_successor_preorder() {
        let func = diamond();
        assert_eq!(
            func.layout(),
            vec![BlockId(0), BlockId(1), BlockId(3), BlockId(2)]
        );
    }

    #[test]
    fn test_layout_skips_unreachable_blocks() {
        let mut func = diamond();
        func.add_block("dead");
        assert_eq!(func.layout().len(), 4);
    }

    #[test]
    fn test_split_edge() {
        let mut func = diamond();
        let split = func.split_edge(BlockId(0), BlockId(2));

        assert_eq!(func.block(BlockId(0)).successors, vec![BlockId(1), split]);
        assert_eq!(func.block(split).predecessors, vec![BlockId(0)]);
        assert_eq!(func.block(split).successors, vec![BlockId(2)]);
        assert_eq!(func.block(BlockId(2)).predecessors, vec![split]);
        assert_eq!(
            func.block(BlockId(0)).terminator().map(|t| t.successors()),
            Some(vec![BlockId(1), split])
        );
    }

    #[test]
    fn test_instruction_accessors() {
        let func = diamond();
        let entry = func.block(BlockId(0));
        let branch = entry.terminator().cloned();
        let Some(branch) = branch else {
            panic!("entry must end in a terminator");
        };
        assert!(branch.is_terminator());
        assert_eq!(branch.target(), None);
        assert_eq!(branch.operands().len(), 1);
        assert_eq!(branch.to_string(), "br %0, bb1, bb2");
    }
}
