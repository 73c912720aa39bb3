// This module describes the x86-64 general purpose register file as the chordal allocator and
// the code generator see it. There is a single bank: AsmReg is the hardware register number
// the encoder converts into iced-x86 registers (rax=0 .. r15=15) and RegBitSet is a 16-bit
// mask over those numbers used to track which registers a function ends up touching.
// RegisterFile owns the allocatable pool in color order (rbx, rsi, rdi, r8, r9, r10, r12, r13,
// r14, r15), the scratch register r11 used to stage memory-to-memory moves, and the used set from which the
// prologue decides which callee-saved registers to preserve. rax, rcx and rdx are never handed
// out because division, shifts and the return value pin them, and rsp/rbp frame the stack.
// The pool can be capped to force spilling, which is how tests exercise stack slots.

//! Register file description for the chordal allocator.

/// Hardware register number, `rax = 0` through `r15 = 15`.
pub type RegId = u8;

/// A general purpose register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AsmReg {
    pub id: RegId,
}

impl AsmReg {
    pub const RAX: AsmReg = AsmReg::new(0);
    pub const RCX: AsmReg = AsmReg::new(1);
    pub const RDX: AsmReg = AsmReg::new(2);
    pub const RBX: AsmReg = AsmReg::new(3);
    pub const RSP: AsmReg = AsmReg::new(4);
    pub const RBP: AsmReg = AsmReg::new(5);
    pub const RSI: AsmReg = AsmReg::new(6);
    pub const RDI: AsmReg = AsmReg::new(7);
    pub const R8: AsmReg = AsmReg::new(8);
    pub const R9: AsmReg = AsmReg::new(9);
    pub const R10: AsmReg = AsmReg::new(10);
    pub const R11: AsmReg = AsmReg::new(11);
    pub const R12: AsmReg = AsmReg::new(12);
    pub const R13: AsmReg = AsmReg::new(13);
    pub const R14: AsmReg = AsmReg::new(14);
    pub const R15: AsmReg = AsmReg::new(15);

    /// Register by hardware number; only the low four bits are meaningful.
    pub const fn new(id: RegId) -> Self {
        Self { id: id & 15 }
    }

    /// 64-bit AT&T name without the `%` sigil.
    pub fn name(&self) -> &'static str {
        const NAMES: [&str; 16] = [
            "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11",
            "r12", "r13", "r14", "r15",
        ];
        NAMES[usize::from(self.id & 15)]
    }

    /// Whether the System V ABI requires the callee to preserve this register.
    pub fn is_callee_saved(&self) -> bool {
        matches!(self.id, 3 | 5 | 12..=15)
    }
}

impl std::fmt::Display for AsmReg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.name())
    }
}

/// Set of general purpose registers, one bit per hardware number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegBitSet {
    mask: u16,
}

impl RegBitSet {
    pub const fn new() -> Self {
        Self { mask: 0 }
    }

    pub fn set(&mut self, reg: AsmReg) {
        self.mask |= 1 << (reg.id & 15);
    }

    /// Number of registers in the set.
    pub fn len(&self) -> usize {
        self.mask.count_ones() as usize
    }

    /// Registers in the set, lowest id first.
    pub fn iter(&self) -> impl Iterator<Item = AsmReg> + '_ {
        let mask = self.mask;
        (0..16u8)
            .filter(move |id| mask & (1 << id) != 0)
            .map(AsmReg::new)
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }
}

/// Registers the allocator may hand out, in color order.
pub const ALLOCATION_ORDER: [AsmReg; 10] = [
    AsmReg::RBX,
    AsmReg::RSI,
    AsmReg::RDI,
    AsmReg::R8,
    AsmReg::R9,
    AsmReg::R10,
    AsmReg::R12,
    AsmReg::R13,
    AsmReg::R14,
    AsmReg::R15,
];

/// Register reserved for staging operands that cannot be encoded directly.
pub const SCRATCH_REGISTER: AsmReg = AsmReg::R11;

/// RegisterFile maps allocator colors onto machine registers for one function.
///
/// Colors below the pool size become registers in `ALLOCATION_ORDER`; the
/// caller turns the rest into stack slots.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    /// Registers available for allocation, in color order.
    allocatable: Vec<AsmReg>,
    /// Registers handed out so far.
    used: RegBitSet,
}

impl RegisterFile {
    /// Create a register file over the full pool, or its first `limit` entries.
    pub fn new(limit: Option<usize>) -> Self {
        let size = limit
            .unwrap_or(ALLOCATION_ORDER.len())
            .min(ALLOCATION_ORDER.len());
        Self {
            allocatable: ALLOCATION_ORDER[..size].to_vec(),
            used: RegBitSet::new(),
        }
    }

    /// Number of colors that fit in registers.
    pub fn pool_size(&self) -> usize {
        self.allocatable.len()
    }

    /// Register for `color`, marking it used, or `None` when the color spills.
    pub fn assign_color(&mut self, color: usize) -> Option<AsmReg> {
        let reg = self.allocatable.get(color).copied()?;
        self.used.set(reg);
        Some(reg)
    }

    pub fn scratch(&self) -> AsmReg {
        SCRATCH_REGISTER
    }

    /// Registers handed out so far.
    pub fn used(&self) -> RegBitSet {
        self.used
    }

    /// Reset register file for a new function.
    pub fn reset(&mut self) {
        self.used = RegBitSet::new();
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new(None)
    }
}
