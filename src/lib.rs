//! chordc - SSA compilation with chordal register allocation.
//!
//! chordc compiles a small C-like language with `int` and `bool` to x86-64
//! AT&T assembly. Functions are lowered into SSA form, phis are resolved
//! into copies, and registers are assigned by coloring the interference
//! graph along a maximum cardinality search order.
//!
//! # Primary Usage
//!
//! ```
//! use chordc::driver::{compile_source, CompileOptions};
//!
//! let asm = compile_source("int main() { return 17 % 5; }", &CompileOptions::default())?;
//! assert!(asm.contains("idiv"));
//! # Ok::<(), chordc::driver::DriverError>(())
//! ```
//!
//! # Architecture
//!
//! - [`frontend`] - Lexing, parsing and semantic analysis into a typed tree
//! - [`ir`] - SSA data model, builder, phi resolution and a reference evaluator
//! - [`analysis`] - Node sequence, liveness and interference graph
//! - [`regalloc`] - Chordal coloring onto registers and stack slots
//! - [`x64`] - x86-64 encoding and translation unit emission
//! - [`core`] - Shared infrastructure (session, register file, errors)
//! - [`driver`] - The pipeline end to end

pub mod analysis;
pub mod core;
pub mod driver;
pub mod frontend;
pub mod ir;
pub mod regalloc;
pub mod x64;

pub use core::{
    AsmReg, CompilationSession, CompileError, CompileResult, RegBitSet, RegisterFile,
    SessionStats,
};
pub use driver::{compile_source, CompileOptions, Compiler, DriverError};
