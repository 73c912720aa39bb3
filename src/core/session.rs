// This module provides arena-based compilation session management using the bumpalo crate.
// CompilationSession owns a reference to the arena that backs per-function scratch data whose
// lifetime ends with the session (the linear node sequences consumed by liveness, interference
// and allocation are arena slices) and collects SessionStats while functions move through the
// pipeline. SessionStats tracks how many functions were compiled, how many IR instructions
// the SSA builder produced, how many phis the out-of-SSA pass removed, how many physical
// registers and stack slots the allocator handed out and how many machine instructions the
// emitter printed. The Display implementation renders the summary the driver logs at the
// end of a run.

//! Arena-based compilation session management.
//!
//! All per-function scratch data is tied to the session lifetime, so the
//! stages can hand slices around without owning them.

use bumpalo::Bump;
use std::cell::RefCell;
use std::fmt;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for compilation objects.
    arena: &'arena Bump,

    /// Session statistics.
    stats: RefCell<SessionStats>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Record that a function went through the whole pipeline.
    pub fn record_function_compiled(&self, name: &str, ir_instructions: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_compiled += 1;
        stats.ir_instructions += ir_instructions;
        if ir_instructions >= stats.largest_function_size {
            stats.largest_function_size = ir_instructions;
            stats.largest_function_name = name.to_string();
        }
    }

    /// Record phis removed by the out-of-SSA pass.
    pub fn record_phis_resolved(&self, count: usize) {
        self.stats.borrow_mut().phi_nodes_resolved += count;
    }

    /// Record the outcome of one register allocation.
    pub fn record_allocation(&self, registers: usize, stack_slots: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.registers_allocated += registers;
        stats.spill_slots += stack_slots;
    }

    /// Record machine instructions printed by the emitter.
    pub fn record_instructions_emitted(&self, count: usize) {
        self.stats.borrow_mut().machine_instructions += count;
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of functions compiled.
    pub functions_compiled: usize,

    /// IR instructions produced by the SSA builder.
    pub ir_instructions: usize,

    /// Phi instructions replaced by copies.
    pub phi_nodes_resolved: usize,

    /// Physical registers handed out (summed over functions).
    pub registers_allocated: usize,

    /// Stack slots handed out (summed over functions).
    pub spill_slots: usize,

    /// Machine instructions printed.
    pub machine_instructions: usize,

    /// Size in IR instructions of the largest function.
    pub largest_function_size: usize,

    /// Name of the largest function.
    pub largest_function_name: String,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Functions compiled: {}", self.functions_compiled)?;
        writeln!(f, "  IR instructions: {}", self.ir_instructions)?;
        writeln!(f, "  PHI nodes resolved: {}", self.phi_nodes_resolved)?;
        writeln!(f, "  Registers allocated: {}", self.registers_allocated)?;
        writeln!(f, "  Spill slots: {}", self.spill_slots)?;
        writeln!(f, "  Machine instructions: {}", self.machine_instructions)?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} IR instructions)",
                self.largest_function_name, self.largest_function_size
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_session_creation() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let stats = session.stats();
        assert_eq!(stats.functions_compiled, 0);
        assert_eq!(stats.ir_instructions, 0);
        assert_eq!(stats.phi_nodes_resolved, 0);
    }

    #[test]
    fn test_session_statistics() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_function_compiled("helper", 12);
        session.record_function_compiled("main", 40);
        session.record_phis_resolved(3);
        session.record_allocation(4, 1);
        session.record_instructions_emitted(57);

        let stats = session.stats();
        assert_eq!(stats.functions_compiled, 2);
        assert_eq!(stats.ir_instructions, 52);
        assert_eq!(stats.phi_nodes_resolved, 3);
        assert_eq!(stats.registers_allocated, 4);
        assert_eq!(stats.spill_slots, 1);
        assert_eq!(stats.machine_instructions, 57);
        assert_eq!(stats.largest_function_name, "main");
    }

    #[test]
    fn test_statistics_display() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_function_compiled("main", 9);

        let output = format!("{}", session.stats());
        assert!(output.contains("Functions compiled: 1"));
        assert!(output.contains("IR instructions: 9"));
        assert!(output.contains("main (9 IR instructions)"));
    }
}
