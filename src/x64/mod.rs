//! x86-64 architecture-specific components.
//!
//! This module contains all x86-64 specific code:
//! - Instruction encoding and AT&T printing using iced-x86
//! - Per-function lowering with frame and callee-saved handling
//! - Translation unit emission with the `main` stub

pub mod emitter;
pub mod encoder;
pub mod function_codegen;

pub use emitter::{emit, AllocatedFunction, EmitSummary};
pub use encoder::{JumpCondition, Label, Location, X64Encoder};
pub use function_codegen::{FunctionCodegen, FunctionFrame};
