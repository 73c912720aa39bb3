// This module assembles a complete translation unit from the allocated functions. The header
// names the source file, exports main and every compiled function and opens the text
// section. main is a stub that calls the entry-point function, moves its 32-bit result into the
// first syscall argument register and issues the exit syscall (60), so the program's return
// value becomes the process exit status. Each function is then lowered by FunctionCodegen into
// the shared encoder, and the trailer marks the stack as non-executable. The text is written
// to the caller's writer in one piece once every function has lowered successfully.

//! Translation unit emission.

use super::encoder::X64Encoder;
use super::function_codegen::{function_label, FunctionCodegen};
use crate::analysis::node_sequence::NodeSequence;
use crate::core::error::{CompileError, CompileResult};
use crate::core::register_file::AsmReg;
use crate::regalloc::RegisterAllocationResult;
use log::debug;
use std::io::Write;

/// Linux `exit` system call number.
pub const SYS_EXIT: i32 = 0x3C;

/// A function ready for lowering.
pub struct AllocatedFunction<'a> {
    pub seq: NodeSequence<'a>,
    pub allocation: RegisterAllocationResult,
}

/// Summary of one emitted translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitSummary {
    pub functions: usize,
    pub machine_instructions: usize,
}

/// Emit `functions` as one AT&T translation unit into `writer`.
pub fn emit<W: Write>(
    functions: &[AllocatedFunction<'_>],
    source_name: &str,
    writer: &mut W,
) -> CompileResult<EmitSummary> {
    let entry = functions
        .iter()
        .position(|f| f.seq.function().is_entry)
        .ok_or(CompileError::NoEntryPoint)?;

    let mut encoder = X64Encoder::new();
    encoder.directive(format!(".file \"{source_name}\""));
    encoder.directive(".globl main");
    for function in functions {
        encoder.directive(format!(".globl {}", function_label(&function.seq.function().name)));
    }
    encoder.directive(".text");

    let labels: Vec<_> = functions
        .iter()
        .map(|f| encoder.create_label(function_label(&f.seq.function().name)))
        .collect();
    let main = encoder.create_label("main");

    encoder.place_label(main);
    encoder.call_label(labels[entry])?;
    encoder.mov32_reg_reg(AsmReg::RDI, AsmReg::RAX)?;
    encoder.mov32_reg_imm(AsmReg::RAX, SYS_EXIT)?;
    encoder.syscall();

    for (function, &label) in functions.iter().zip(&labels) {
        FunctionCodegen::new(&mut encoder, &function.seq, &function.allocation).compile(label)?;
        debug!("lowered `{}`", function.seq.function().name);
    }

    encoder.directive(".section .note.GNU-stack,\"\",@progbits");

    let machine_instructions = encoder.instruction_count();
    let text = encoder.finalize();
    writer.write_all(text.as_bytes())?;
    debug!(
        "emitted {} function(s), {machine_instructions} instructions, {} bytes",
        functions.len(),
        text.len()
    );

    Ok(EmitSummary {
        functions: functions.len(),
        machine_instructions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::node_sequence::linearize;
    use crate::core::session::CompilationSession;
    use crate::frontend::check_program;
    use crate::ir::builder::build_program;
    use crate::ir::phi_resolver::resolve_phis;
    use crate::regalloc::allocate;
    use bumpalo::Bump;

    #[test]
    fn test_translation_unit_layout() {
        let _ = env_logger::builder().is_test(true).try_init();
        let program = check_program(
            "int helper() { return 7; } int main() { return 3; }",
        )
        .unwrap();
        let mut functions = build_program(&program).unwrap();
        for function in &mut functions {
            resolve_phis(function).unwrap();
        }

        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let allocated: Vec<_> = functions
            .iter()
            .map(|f| {
                let seq = linearize(&session, f);
                let allocation = allocate(&seq, None).unwrap();
                AllocatedFunction { seq, allocation }
            })
            .collect();

        let mut out = Vec::new();
        let summary = emit(&allocated, "prog.l1", &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().map(str::trim).collect();

        assert_eq!(summary.functions, 2);
        assert_eq!(lines[0], ".file \"prog.l1\"");
        assert_eq!(lines[1], ".globl main");
        assert_eq!(lines[2], ".globl _helper");
        assert_eq!(lines[3], ".globl _main");
        assert_eq!(lines[4], ".text");
        assert_eq!(lines[5], "main:");
        assert!(lines[6].starts_with("call") && lines[6].ends_with("_main"));
        assert_eq!(lines[7], "mov %eax, %edi");
        assert!(lines[8].contains("$60") && lines[8].contains("%eax"));
        assert_eq!(lines[9], "syscall");
        assert!(text.contains("_helper:"));
        assert_eq!(
            lines.last().copied(),
            Some(".section .note.GNU-stack,\"\",@progbits")
        );
    }

    #[test]
    fn test_missing_entry_point() {
        let mut out = Vec::new();
        assert!(matches!(
            emit(&[], "x", &mut out),
            Err(CompileError::NoEntryPoint)
        ));
        assert!(out.is_empty());
    }
}
