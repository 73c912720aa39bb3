// This module lowers one allocated function into x86-64 instructions. FunctionCodegen walks
// the node sequence block by block in layout order and translates every IR instruction using
// the locations the chordal allocator chose. FunctionFrame records the frame size (one 8-byte
// slot per spilled color plus one spare) and the callee-saved registers the function clobbers,
// which the prologue pushes after reserving the frame and the epilogue pops in reverse before
// releasing it. Values in stack slots are staged through the scratch register whenever an
// instruction needs a register operand, and memory-to-memory moves always go through it.
// Division pins the dividend to %eax and the remainder to %edx, shifts pin the count to %cl,
// and the return value leaves through %eax; none of those registers is ever allocated.
// Jumps to the block laid out next are dropped, and a conditional branch whose true or false
// target falls through turns into a single je/jne.

//! Function code generation.
//!
//! Lowers a phi-free, register-allocated function body into the
//! [`X64Encoder`] with the System V callee-saved discipline for the frame.

use crate::analysis::node_sequence::NodeSequence;
use crate::core::error::{CompileError, CompileResult};
use crate::core::register_file::AsmReg;
use crate::ir::{BinaryOp, BlockId, IrInstruction, SsaValue, UnaryOp};
use crate::regalloc::{Register, RegisterAllocationResult};
use crate::x64::encoder::{JumpCondition, Label, Location, X64Encoder};
use hashbrown::HashMap;
use log::trace;

/// Stack frame layout of one function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionFrame {
    /// Bytes reserved below `%rbp`.
    pub frame_size: i32,
    /// Callee-saved registers pushed by the prologue, in push order.
    pub saved_registers: Vec<AsmReg>,
}

impl FunctionFrame {
    pub fn new(allocation: &RegisterAllocationResult) -> Self {
        Self {
            frame_size: allocation.frame_size(),
            saved_registers: allocation.callee_saved(),
        }
    }
}

/// Assembly label of a function.
pub fn function_label(name: &str) -> String {
    format!("_{name}")
}

/// Assembly label of a block.
pub fn block_label(function: &str, block: &str) -> String {
    format!(".L_{function}_{block}")
}

/// Lowers one function into an encoder.
pub struct FunctionCodegen<'e, 'a> {
    encoder: &'e mut X64Encoder,
    seq: &'e NodeSequence<'a>,
    allocation: &'e RegisterAllocationResult,
    frame: FunctionFrame,
    scratch: AsmReg,
    labels: HashMap<BlockId, Label>,
}

impl<'e, 'a> FunctionCodegen<'e, 'a> {
    pub fn new(
        encoder: &'e mut X64Encoder,
        seq: &'e NodeSequence<'a>,
        allocation: &'e RegisterAllocationResult,
    ) -> Self {
        let function = seq.function();
        let mut labels = HashMap::with_capacity(seq.blocks().len());
        for &block in seq.blocks() {
            let name = block_label(&function.name, &function.block(block).label);
            labels.insert(block, encoder.create_label(name));
        }

        Self {
            encoder,
            seq,
            allocation,
            frame: FunctionFrame::new(allocation),
            scratch: allocation.scratch,
            labels,
        }
    }

    /// Lower the whole function, starting at `entry_label`.
    pub fn compile(mut self, entry_label: Label) -> CompileResult<()> {
        self.encoder.place_label(entry_label);
        self.emit_prologue()?;

        let order = self.seq.blocks().to_vec();
        for (i, &block) in order.iter().enumerate() {
            let next = order.get(i + 1).copied();
            let label = self.label(block)?;
            self.encoder.place_label(label);
            for node in self.seq.block_nodes(block) {
                trace!("lowering `{}`", node.instruction);
                self.lower(block, node.instruction, next)?;
            }
        }
        Ok(())
    }

    /// `push %rbp; mov %rsp,%rbp; sub $frame,%rsp`, then save clobbered callee-saved registers.
    pub fn emit_prologue(&mut self) -> CompileResult<()> {
        self.encoder.emit_prologue(self.frame.frame_size)?;
        for &reg in &self.frame.saved_registers {
            self.encoder.push_reg(reg)?;
        }
        Ok(())
    }

    pub fn emit_epilogue(&mut self) -> CompileResult<()> {
        for &reg in self.frame.saved_registers.iter().rev() {
            self.encoder.pop_reg(reg)?;
        }
        self.encoder.emit_epilogue(self.frame.frame_size)
    }

    fn label(&self, block: BlockId) -> CompileResult<Label> {
        self.labels
            .get(&block)
            .copied()
            .ok_or_else(|| CompileError::MissingLocation {
                value: block.to_string(),
            })
    }

    fn location(&self, value: SsaValue) -> CompileResult<Location> {
        match self.allocation.location(value.id) {
            Some(Register::Gp(reg)) => Ok(Location::Reg(reg)),
            Some(Register::StackSlot(slot)) => Ok(Location::Frame(Register::frame_offset(slot))),
            None => Err(CompileError::MissingLocation {
                value: value.to_string(),
            }),
        }
    }

    /// Register to compute into for `dst`: itself, or the scratch register for a slot.
    fn work_register(&self, dst: Location) -> AsmReg {
        match dst {
            Location::Reg(reg) => reg,
            Location::Frame(_) => self.scratch,
        }
    }

    /// Put `src` into register `reg` unless it is already there.
    fn load(&mut self, reg: AsmReg, src: Location) -> CompileResult<()> {
        if src == Location::Reg(reg) {
            return Ok(());
        }
        self.encoder.mov32_reg_rm(reg, src)
    }

    /// Write register `reg` to `dst` unless it already is `dst`.
    fn store(&mut self, dst: Location, reg: AsmReg) -> CompileResult<()> {
        match dst {
            Location::Reg(d) if d == reg => Ok(()),
            Location::Reg(d) => self.encoder.mov32_reg_reg(d, reg),
            Location::Frame(displacement) => self.encoder.mov32_mem_reg(displacement, reg),
        }
    }

    /// Stage `src` in a register, using the scratch register for slots.
    fn in_register(&mut self, src: Location) -> CompileResult<AsmReg> {
        match src {
            Location::Reg(reg) => Ok(reg),
            Location::Frame(_) => {
                self.load(self.scratch, src)?;
                Ok(self.scratch)
            }
        }
    }

    fn lower(
        &mut self,
        block: BlockId,
        instruction: &IrInstruction,
        next: Option<BlockId>,
    ) -> CompileResult<()> {
        match instruction {
            IrInstruction::Const { target, value } => self.lower_const(*target, *value),
            IrInstruction::BoolConst { target, value } => {
                self.lower_const(*target, i32::from(*value))
            }
            IrInstruction::Move { target, source } => {
                let dst = self.location(*target)?;
                let src = self.location(*source)?;
                if dst == src {
                    return Ok(());
                }
                match dst {
                    Location::Reg(reg) => self.load(reg, src),
                    Location::Frame(_) => {
                        let reg = self.in_register(src)?;
                        self.store(dst, reg)
                    }
                }
            }
            IrInstruction::Unary {
                target,
                op,
                operand,
            } => self.lower_unary(*target, *op, *operand),
            IrInstruction::Binary {
                target,
                op,
                lhs,
                rhs,
            } => self.lower_binary(*target, *op, *lhs, *rhs),
            IrInstruction::Phi { target, .. } => Err(CompileError::UnresolvedPhi {
                stage: "code generation",
                value: target.to_string(),
                block: self.seq.block(block).label.clone(),
            }),
            IrInstruction::Jump { target } => {
                if Some(*target) == next {
                    return Ok(());
                }
                let label = self.label(*target)?;
                self.encoder.jmp_label(label)
            }
            IrInstruction::Branch {
                condition,
                on_true,
                on_false,
            } => {
                let cond = self.location(*condition)?;
                let reg = self.in_register(cond)?;
                self.encoder.cmp32_reg_imm(reg, 0)?;
                if Some(*on_true) == next {
                    let label = self.label(*on_false)?;
                    self.encoder.jcc_label(JumpCondition::Equal, label)
                } else {
                    let label = self.label(*on_true)?;
                    self.encoder.jcc_label(JumpCondition::NotEqual, label)?;
                    if Some(*on_false) == next {
                        return Ok(());
                    }
                    let label = self.label(*on_false)?;
                    self.encoder.jmp_label(label)
                }
            }
            IrInstruction::Return { value } => {
                let src = self.location(*value)?;
                self.load(AsmReg::RAX, src)?;
                self.emit_epilogue()
            }
        }
    }

    fn lower_const(&mut self, target: SsaValue, value: i32) -> CompileResult<()> {
        let dst = self.location(target)?;
        let reg = self.work_register(dst);
        self.encoder.mov32_reg_imm(reg, value)?;
        self.store(dst, reg)
    }

    fn lower_unary(&mut self, target: SsaValue, op: UnaryOp, operand: SsaValue) -> CompileResult<()> {
        let dst = self.location(target)?;
        let src = self.location(operand)?;
        let reg = self.work_register(dst);
        self.load(reg, src)?;
        match op {
            UnaryOp::Neg => self.encoder.neg32_reg(reg)?,
            UnaryOp::BitNot => self.encoder.not32_reg(reg)?,
            UnaryOp::LogicalNot => self.encoder.xor32_reg_imm(reg, 1)?,
        }
        self.store(dst, reg)
    }

    fn lower_binary(
        &mut self,
        target: SsaValue,
        op: BinaryOp,
        lhs: SsaValue,
        rhs: SsaValue,
    ) -> CompileResult<()> {
        let dst = self.location(target)?;
        let left = self.location(lhs)?;
        let right = self.location(rhs)?;

        match op {
            BinaryOp::Div | BinaryOp::Mod => self.lower_division(op, dst, left, right),
            BinaryOp::Shl | BinaryOp::Shr => self.lower_shift(op, dst, left, right),
            op if op.is_comparison() => self.lower_comparison(op, dst, left, right),
            _ => self.lower_arithmetic(op, dst, left, right),
        }
    }

    fn apply(&mut self, op: BinaryOp, dst: AsmReg, src: Location) -> CompileResult<()> {
        match op {
            BinaryOp::Add => self.encoder.add32_reg_rm(dst, src),
            BinaryOp::Sub => self.encoder.sub32_reg_rm(dst, src),
            BinaryOp::Mul => self.encoder.imul32_reg_rm(dst, src),
            BinaryOp::And => self.encoder.and32_reg_rm(dst, src),
            BinaryOp::Or => self.encoder.or32_reg_rm(dst, src),
            _ => self.encoder.xor32_reg_rm(dst, src),
        }
    }

    /// Two-address ALU operations, reusing the destination when it aliases an operand.
    fn lower_arithmetic(
        &mut self,
        op: BinaryOp,
        dst: Location,
        left: Location,
        right: Location,
    ) -> CompileResult<()> {
        if let Location::Reg(d) = dst {
            if dst == left {
                return self.apply(op, d, right);
            }
            if dst == right {
                if op.is_commutative() {
                    return self.apply(op, d, left);
                }
                let scratch = self.scratch;
                self.load(scratch, left)?;
                self.apply(op, scratch, right)?;
                return self.store(dst, scratch);
            }
        }

        let reg = self.work_register(dst);
        self.load(reg, left)?;
        self.apply(op, reg, right)?;
        self.store(dst, reg)
    }

    /// `%eax` holds the dividend, `cltd` fills `%edx`, quotient in `%eax`, remainder in `%edx`.
    fn lower_division(
        &mut self,
        op: BinaryOp,
        dst: Location,
        left: Location,
        right: Location,
    ) -> CompileResult<()> {
        self.load(AsmReg::RAX, left)?;
        self.encoder.cdq();
        let divisor = self.in_register(right)?;
        self.encoder.idiv32_reg(divisor)?;
        let result = if op == BinaryOp::Div {
            AsmReg::RAX
        } else {
            AsmReg::RDX
        };
        self.store(dst, result)
    }

    /// Shift counts go through `%cl`; the hardware masks them to five bits.
    fn lower_shift(
        &mut self,
        op: BinaryOp,
        dst: Location,
        left: Location,
        right: Location,
    ) -> CompileResult<()> {
        self.load(AsmReg::RCX, right)?;
        let reg = self.work_register(dst);
        self.load(reg, left)?;
        if op == BinaryOp::Shl {
            self.encoder.shl32_reg_cl(reg)?;
        } else {
            self.encoder.sar32_reg_cl(reg)?;
        }
        self.store(dst, reg)
    }

    fn lower_comparison(
        &mut self,
        op: BinaryOp,
        dst: Location,
        left: Location,
        right: Location,
    ) -> CompileResult<()> {
        let lhs = self.in_register(left)?;
        self.encoder.cmp32_reg_rm(lhs, right)?;

        let condition = match op {
            BinaryOp::Lt => JumpCondition::Less,
            BinaryOp::Le => JumpCondition::LessEqual,
            BinaryOp::Gt => JumpCondition::Greater,
            BinaryOp::Ge => JumpCondition::GreaterEqual,
            BinaryOp::Eq => JumpCondition::Equal,
            _ => JumpCondition::NotEqual,
        };
        let reg = self.work_register(dst);
        self.encoder.setcc_reg(condition, reg)?;
        self.encoder.movzx_reg8_to_reg32(reg, reg)?;
        self.store(dst, reg)
    }
}
