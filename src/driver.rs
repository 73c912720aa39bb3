// This module wires the pipeline stages together. Compiler owns the CompileOptions and runs a
// typed program through SSA construction, phi resolution, linearization, chordal allocation
// and emission, collecting SessionStats in a CompilationSession whose arena backs the node
// sequences. Functions are first built and resolved (the only stage that mutates them), then
// borrowed immutably for the analysis and code generation stages. compile_source adds the
// front end in front of that, and DriverError joins front end diagnostics and core failures so
// the command line tool can map any failure to its exit status.

//! Compilation driver.

use crate::analysis::node_sequence::linearize;
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::{CompilationSession, SessionStats};
use crate::frontend::{self, FrontendError, TypedProgram};
use crate::ir::builder::build_function;
use crate::ir::phi_resolver::resolve_phis;
use crate::ir::IrFunction;
use crate::regalloc::ChordalAllocator;
use crate::x64::{emit, AllocatedFunction};
use bumpalo::Bump;
use log::{debug, info};
use thiserror::Error;

/// Exit status for failures inside the compiler itself.
pub const EXIT_INTERNAL_ERROR: i32 = 1;

/// Knobs for one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Cap on the allocatable register pool; colors beyond it spill.
    pub register_limit: Option<usize>,
    /// Name recorded in the `.file` directive.
    pub source_name: Option<String>,
    /// Keep a textual dump of the SSA form.
    pub dump_ir: bool,
}

impl CompileOptions {
    fn source_name(&self) -> &str {
        self.source_name.as_deref().unwrap_or("input")
    }
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Frontend(#[from] FrontendError),

    #[error("internal compiler error: {0}")]
    Compile(#[from] CompileError),
}

impl DriverError {
    pub fn exit_code(&self) -> i32 {
        match self {
            DriverError::Frontend(err) => err.exit_code(),
            DriverError::Compile(_) => EXIT_INTERNAL_ERROR,
        }
    }
}

/// Result of compiling one program.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub assembly: String,
    pub stats: SessionStats,
    /// SSA form of every function before phi resolution, when requested.
    pub ir_dump: Option<String>,
}

pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Compile source text, front end included.
    pub fn compile_source(&self, source: &str) -> Result<CompiledUnit, DriverError> {
        let program = frontend::check_program(source)?;
        Ok(self.compile_program(&program)?)
    }

    /// Compile an already checked program.
    pub fn compile_program(&self, program: &TypedProgram) -> CompileResult<CompiledUnit> {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let mut ir_dump = self.options.dump_ir.then(String::new);
        let mut functions: Vec<IrFunction> = Vec::with_capacity(program.functions.len());
        for typed in &program.functions {
            let mut function = build_function(typed)?;
            if let Some(dump) = ir_dump.as_mut() {
                dump.push_str(&function.to_string());
            }
            session.record_function_compiled(&function.name, function.instruction_count());
            let phis = resolve_phis(&mut function)?;
            session.record_phis_resolved(phis);
            functions.push(function);
        }
        if !functions.iter().any(|f| f.is_entry) {
            return Err(CompileError::NoEntryPoint);
        }

        let mut allocator = ChordalAllocator::new(self.options.register_limit);
        let mut allocated = Vec::with_capacity(functions.len());
        for function in &functions {
            let seq = linearize(&session, function);
            let allocation = allocator.allocate(&seq)?;
            session.record_allocation(
                allocation.used.len(),
                allocation.stack_slots as usize,
            );
            debug!(
                "`{}`: {} colors, frame {} bytes",
                function.name,
                allocation.color_count,
                allocation.frame_size()
            );
            allocated.push(AllocatedFunction { seq, allocation });
        }

        let mut out = Vec::new();
        let summary = emit(&allocated, self.options.source_name(), &mut out)?;
        session.record_instructions_emitted(summary.machine_instructions);
        let assembly = String::from_utf8_lossy(&out).into_owned();

        let stats = session.stats();
        info!("{}", stats.to_string().trim_end());
        Ok(CompiledUnit {
            assembly,
            stats,
            ir_dump,
        })
    }
}

/// Compile `source` to assembly text.
pub fn compile_source(source: &str, options: &CompileOptions) -> Result<String, DriverError> {
    Compiler::new(options.clone())
        .compile_source(source)
        .map(|unit| unit.assembly)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_source_produces_translation_unit() {
        let _ = env_logger::builder().is_test(true).try_init();
        let options = CompileOptions {
            source_name: Some("sum.l1".to_string()),
            ..Default::default()
        };
        let asm = compile_source(
            "int main() { int i = 0; int s = 0; while (i < 3) { s += 1; i++; } return s; }",
            &options,
        )
        .unwrap();
        assert!(asm.contains(".file \"sum.l1\""));
        assert!(asm.contains("_main:"));
        assert!(asm.contains("syscall"));
    }

    #[test]
    fn test_stats_and_dump() {
        let compiler = Compiler::new(CompileOptions {
            dump_ir: true,
            ..Default::default()
        });
        let unit = compiler
            .compile_source("int main() { int x; if (true) { x = 2; } else { x = 3; } return x; }")
            .unwrap();
        assert_eq!(unit.stats.functions_compiled, 1);
        assert_eq!(unit.stats.phi_nodes_resolved, 1);
        assert!(unit.stats.machine_instructions > 0);
        let dump = unit.ir_dump.unwrap();
        assert!(dump.contains("phi"));
        assert!(!unit.assembly.contains("phi"));
    }

    #[test]
    fn test_errors_map_to_exit_codes() {
        let compiler = Compiler::new(CompileOptions::default());
        let err = compiler.compile_source("int main() { return 1 }").unwrap_err();
        assert_eq!(err.exit_code(), 42);
        let err = compiler
            .compile_source("int main() { return true; }")
            .unwrap_err();
        assert_eq!(err.exit_code(), 7);
        let err = DriverError::from(CompileError::NoEntryPoint);
        assert_eq!(err.exit_code(), EXIT_INTERNAL_ERROR);
    }

    #[test]
    fn test_register_limit_forces_spills() {
        let compiler = Compiler::new(CompileOptions {
            register_limit: Some(1),
            ..Default::default()
        });
        let unit = compiler
            .compile_source("int main() { int a = 1; int b = 2; int c = 3; return a * b + c; }")
            .unwrap();
        assert!(unit.stats.spill_slots > 0);
        assert!(unit.assembly.contains("(%rbp)"));
    }
}
