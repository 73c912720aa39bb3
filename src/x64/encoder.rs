// This module provides the x86-64 instruction layer of the chordc back end on top of the
// iced-x86 library. X64Encoder collects a translation unit as an ordered list of lines: label
// definitions, assembler directives and iced-x86 Instructions. Instructions are built from
// explicit Code values so the emitted form is exactly the one the code generator asked for
// (32-bit ALU operations on value registers, 64-bit frame management, setcc/movzx for
// condition materialization, cltd/idiv for division, shifts by %cl). Branch and call targets
// are label ids stored as fake near-branch addresses; finalize() prints everything with the
// iced-x86 GAS formatter and a SymbolResolver that turns those addresses back into label
// names, producing AT&T text the system assembler accepts. Operands that live in the frame
// are addressed through %rbp with a signed displacement. Memory operands only ever appear
// next to a register operand, so every instruction has an unambiguous operand size.

//! x86-64 instruction encoding using iced-x86.

use crate::core::error::CompileResult;
use crate::core::register_file::AsmReg;
use iced_x86::{
    Code, Formatter, GasFormatter, Instruction, MemoryOperand, NumberBase, OpKind, Register,
    SymbolResolver, SymbolResult,
};

/// Base address given to label ids so they never collide with small immediates.
const LABEL_BASE: u64 = 0x1000;

/// Where an operand lives: a register or a slot addressed off `%rbp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Reg(AsmReg),
    Frame(i64),
}

/// Condition codes used by `setcc` and `jcc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpCondition {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
}

/// Handle to a label created by [`X64Encoder::create_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

#[derive(Debug, Clone)]
enum AsmLine {
    Label(Label),
    Directive(String),
    Instruction(Instruction),
}

/// Resolves fake branch addresses back into label names.
struct LabelResolver {
    names: Vec<String>,
}

impl SymbolResolver for LabelResolver {
    fn symbol(
        &mut self,
        instruction: &Instruction,
        _operand: u32,
        instruction_operand: Option<u32>,
        address: u64,
        _address_size: u32,
    ) -> Option<SymbolResult<'_>> {
        let kind = instruction_operand.map(|op| instruction.op_kind(op));
        if kind != Some(OpKind::NearBranch64) {
            return None;
        }
        let index = address.checked_sub(LABEL_BASE)? as usize;
        let name = self.names.get(index)?;
        Some(SymbolResult::with_string(address, name.clone()))
    }
}

const GP64: [Register; 16] = [
    Register::RAX,
    Register::RCX,
    Register::RDX,
    Register::RBX,
    Register::RSP,
    Register::RBP,
    Register::RSI,
    Register::RDI,
    Register::R8,
    Register::R9,
    Register::R10,
    Register::R11,
    Register::R12,
    Register::R13,
    Register::R14,
    Register::R15,
];

const GP32: [Register; 16] = [
    Register::EAX,
    Register::ECX,
    Register::EDX,
    Register::EBX,
    Register::ESP,
    Register::EBP,
    Register::ESI,
    Register::EDI,
    Register::R8D,
    Register::R9D,
    Register::R10D,
    Register::R11D,
    Register::R12D,
    Register::R13D,
    Register::R14D,
    Register::R15D,
];

const GP8: [Register; 16] = [
    Register::AL,
    Register::CL,
    Register::DL,
    Register::BL,
    Register::SPL,
    Register::BPL,
    Register::SIL,
    Register::DIL,
    Register::R8L,
    Register::R9L,
    Register::R10L,
    Register::R11L,
    Register::R12L,
    Register::R13L,
    Register::R14L,
    Register::R15L,
];

fn gp64(reg: AsmReg) -> Register {
    GP64[usize::from(reg.id & 15)]
}

fn gp32(reg: AsmReg) -> Register {
    GP32[usize::from(reg.id & 15)]
}

fn gp8(reg: AsmReg) -> Register {
    GP8[usize::from(reg.id & 15)]
}

fn frame(displacement: i64) -> MemoryOperand {
    MemoryOperand::with_base_displ(Register::RBP, displacement)
}

/// x86-64 instruction encoder producing AT&T assembly text.
#[derive(Debug, Default)]
pub struct X64Encoder {
    lines: Vec<AsmLine>,
    labels: Vec<String>,
    instruction_count: usize,
}

impl X64Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of machine instructions emitted so far.
    pub fn instruction_count(&self) -> usize {
        self.instruction_count
    }

    pub fn directive(&mut self, text: impl Into<String>) {
        self.lines.push(AsmLine::Directive(text.into()));
    }

    /// Create a named label; it is printed where [`place_label`](Self::place_label) puts it.
    pub fn create_label(&mut self, name: impl Into<String>) -> Label {
        self.labels.push(name.into());
        Label(self.labels.len() - 1)
    }

    pub fn place_label(&mut self, label: Label) {
        self.lines.push(AsmLine::Label(label));
    }

    pub fn label_name(&self, label: Label) -> &str {
        self.labels.get(label.0).map(String::as_str).unwrap_or("")
    }

    fn push(&mut self, instruction: Instruction) {
        self.instruction_count += 1;
        self.lines.push(AsmLine::Instruction(instruction));
    }

    fn label_address(label: Label) -> u64 {
        LABEL_BASE + label.0 as u64
    }

    // ==== MOVES ====

    pub fn mov32_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> CompileResult<()> {
        self.push(Instruction::with2(Code::Mov_r32_rm32, gp32(dst), gp32(src))?);
        Ok(())
    }

    pub fn mov32_reg_imm(&mut self, dst: AsmReg, imm: i32) -> CompileResult<()> {
        self.push(Instruction::with2(Code::Mov_r32_imm32, gp32(dst), imm)?);
        Ok(())
    }

    pub fn mov32_reg_mem(&mut self, dst: AsmReg, displacement: i64) -> CompileResult<()> {
        self.push(Instruction::with2(
            Code::Mov_r32_rm32,
            gp32(dst),
            frame(displacement),
        )?);
        Ok(())
    }

    pub fn mov32_mem_reg(&mut self, displacement: i64, src: AsmReg) -> CompileResult<()> {
        self.push(Instruction::with2(
            Code::Mov_rm32_r32,
            frame(displacement),
            gp32(src),
        )?);
        Ok(())
    }

    /// Load `src` into `dst`, whichever kind of location it is.
    pub fn mov32_reg_rm(&mut self, dst: AsmReg, src: Location) -> CompileResult<()> {
        match src {
            Location::Reg(reg) => self.mov32_reg_reg(dst, reg),
            Location::Frame(displacement) => self.mov32_reg_mem(dst, displacement),
        }
    }

    pub fn mov64_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> CompileResult<()> {
        self.push(Instruction::with2(Code::Mov_r64_rm64, gp64(dst), gp64(src))?);
        Ok(())
    }

    pub fn movzx_reg8_to_reg32(&mut self, dst: AsmReg, src: AsmReg) -> CompileResult<()> {
        self.push(Instruction::with2(Code::Movzx_r32_rm8, gp32(dst), gp8(src))?);
        Ok(())
    }

    // ==== ARITHMETIC ====

    fn alu32(&mut self, code: Code, dst: AsmReg, src: Location) -> CompileResult<()> {
        let instruction = match src {
            Location::Reg(reg) => Instruction::with2(code, gp32(dst), gp32(reg))?,
            Location::Frame(displacement) => {
                Instruction::with2(code, gp32(dst), frame(displacement))?
            }
        };
        self.push(instruction);
        Ok(())
    }

    pub fn add32_reg_rm(&mut self, dst: AsmReg, src: Location) -> CompileResult<()> {
        self.alu32(Code::Add_r32_rm32, dst, src)
    }

    pub fn sub32_reg_rm(&mut self, dst: AsmReg, src: Location) -> CompileResult<()> {
        self.alu32(Code::Sub_r32_rm32, dst, src)
    }

    pub fn imul32_reg_rm(&mut self, dst: AsmReg, src: Location) -> CompileResult<()> {
        self.alu32(Code::Imul_r32_rm32, dst, src)
    }

    pub fn and32_reg_rm(&mut self, dst: AsmReg, src: Location) -> CompileResult<()> {
        self.alu32(Code::And_r32_rm32, dst, src)
    }

    pub fn or32_reg_rm(&mut self, dst: AsmReg, src: Location) -> CompileResult<()> {
        self.alu32(Code::Or_r32_rm32, dst, src)
    }

    pub fn xor32_reg_rm(&mut self, dst: AsmReg, src: Location) -> CompileResult<()> {
        self.alu32(Code::Xor_r32_rm32, dst, src)
    }

    pub fn cmp32_reg_rm(&mut self, left: AsmReg, right: Location) -> CompileResult<()> {
        self.alu32(Code::Cmp_r32_rm32, left, right)
    }

    pub fn cmp32_reg_imm(&mut self, reg: AsmReg, imm: i32) -> CompileResult<()> {
        self.push(Instruction::with2(Code::Cmp_rm32_imm8, gp32(reg), imm)?);
        Ok(())
    }

    pub fn xor32_reg_imm(&mut self, dst: AsmReg, imm: i32) -> CompileResult<()> {
        self.push(Instruction::with2(Code::Xor_rm32_imm8, gp32(dst), imm)?);
        Ok(())
    }

    pub fn neg32_reg(&mut self, dst: AsmReg) -> CompileResult<()> {
        self.push(Instruction::with1(Code::Neg_rm32, gp32(dst))?);
        Ok(())
    }

    pub fn not32_reg(&mut self, dst: AsmReg) -> CompileResult<()> {
        self.push(Instruction::with1(Code::Not_rm32, gp32(dst))?);
        Ok(())
    }

    /// Sign-extend `%eax` into `%edx` (`cltd`).
    pub fn cdq(&mut self) {
        self.push(Instruction::with(Code::Cdq));
    }

    pub fn idiv32_reg(&mut self, divisor: AsmReg) -> CompileResult<()> {
        self.push(Instruction::with1(Code::Idiv_rm32, gp32(divisor))?);
        Ok(())
    }

    pub fn shl32_reg_cl(&mut self, dst: AsmReg) -> CompileResult<()> {
        self.push(Instruction::with2(Code::Shl_rm32_CL, gp32(dst), Register::CL)?);
        Ok(())
    }

    pub fn sar32_reg_cl(&mut self, dst: AsmReg) -> CompileResult<()> {
        self.push(Instruction::with2(Code::Sar_rm32_CL, gp32(dst), Register::CL)?);
        Ok(())
    }

    /// Set the low byte of `dst` from the flags.
    pub fn setcc_reg(&mut self, condition: JumpCondition, dst: AsmReg) -> CompileResult<()> {
        let code = match condition {
            JumpCondition::Equal => Code::Sete_rm8,
            JumpCondition::NotEqual => Code::Setne_rm8,
            JumpCondition::Less => Code::Setl_rm8,
            JumpCondition::Greater => Code::Setg_rm8,
            JumpCondition::LessEqual => Code::Setle_rm8,
            JumpCondition::GreaterEqual => Code::Setge_rm8,
        };
        self.push(Instruction::with1(code, gp8(dst))?);
        Ok(())
    }

    // ==== FRAME ====

    pub fn push_reg(&mut self, reg: AsmReg) -> CompileResult<()> {
        self.push(Instruction::with1(Code::Push_r64, gp64(reg))?);
        Ok(())
    }

    pub fn pop_reg(&mut self, reg: AsmReg) -> CompileResult<()> {
        self.push(Instruction::with1(Code::Pop_r64, gp64(reg))?);
        Ok(())
    }

    pub fn sub64_reg_imm(&mut self, dst: AsmReg, imm: i32) -> CompileResult<()> {
        self.push(Instruction::with2(Code::Sub_rm64_imm32, gp64(dst), imm)?);
        Ok(())
    }

    pub fn add64_reg_imm(&mut self, dst: AsmReg, imm: i32) -> CompileResult<()> {
        self.push(Instruction::with2(Code::Add_rm64_imm32, gp64(dst), imm)?);
        Ok(())
    }

    /// `push %rbp; mov %rsp,%rbp; sub $frame_size,%rsp`.
    pub fn emit_prologue(&mut self, frame_size: i32) -> CompileResult<()> {
        self.push_reg(AsmReg::RBP)?;
        self.mov64_reg_reg(AsmReg::RBP, AsmReg::RSP)?;
        self.sub64_reg_imm(AsmReg::RSP, frame_size)
    }

    /// `add $frame_size,%rsp; pop %rbp; ret`.
    pub fn emit_epilogue(&mut self, frame_size: i32) -> CompileResult<()> {
        self.add64_reg_imm(AsmReg::RSP, frame_size)?;
        self.pop_reg(AsmReg::RBP)?;
        self.ret();
        Ok(())
    }

    // ==== CONTROL FLOW ====

    pub fn ret(&mut self) {
        self.push(Instruction::with(Code::Retnq));
    }

    pub fn syscall(&mut self) {
        self.push(Instruction::with(Code::Syscall));
    }

    pub fn call_label(&mut self, target: Label) -> CompileResult<()> {
        self.push(Instruction::with_branch(
            Code::Call_rel32_64,
            Self::label_address(target),
        )?);
        Ok(())
    }

    pub fn jmp_label(&mut self, target: Label) -> CompileResult<()> {
        self.push(Instruction::with_branch(
            Code::Jmp_rel32_64,
            Self::label_address(target),
        )?);
        Ok(())
    }

    pub fn jcc_label(&mut self, condition: JumpCondition, target: Label) -> CompileResult<()> {
        let code = match condition {
            JumpCondition::Equal => Code::Je_rel32_64,
            JumpCondition::NotEqual => Code::Jne_rel32_64,
            JumpCondition::Less => Code::Jl_rel32_64,
            JumpCondition::Greater => Code::Jg_rel32_64,
            JumpCondition::LessEqual => Code::Jle_rel32_64,
            JumpCondition::GreaterEqual => Code::Jge_rel32_64,
        };
        self.push(Instruction::with_branch(code, Self::label_address(target))?);
        Ok(())
    }

    /// Print every line as AT&T assembly.
    pub fn finalize(self) -> String {
        let resolver = LabelResolver {
            names: self.labels.clone(),
        };
        let mut formatter = GasFormatter::with_options(Some(Box::new(resolver)), None);
        let options = formatter.options_mut();
        options.set_number_base(NumberBase::Decimal);
        options.set_space_after_operand_separator(true);
        options.set_signed_immediate_operands(true);

        let mut out = String::new();
        let mut text = String::new();
        for line in &self.lines {
            match line {
                AsmLine::Label(label) => {
                    out.push_str(self.label_name(*label));
                    out.push_str(":\n");
                }
                AsmLine::Directive(directive) => {
                    out.push('\t');
                    out.push_str(directive);
                    out.push('\n');
                }
                AsmLine::Instruction(instruction) => {
                    text.clear();
                    formatter.format(instruction, &mut text);
                    out.push('\t');
                    out.push_str(&text);
                    out.push('\n');
                }
            }
        }
        out
    }
}
