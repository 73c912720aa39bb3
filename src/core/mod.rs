// This module serves as the hub for the infrastructure shared by every stage of chordc:
// the compilation session (arena-backed scratch storage and statistics collected while
// functions move through the pipeline), the register file description the allocator and the
// code generator agree on (allocatable pool, scratch register, used-register tracking), and
// the error type every core stage reports invariant failures through.

//! Core infrastructure shared across the pipeline stages.
//!
//! # Key Components
//!
//! ## Session Management (`session`)
//! - Arena-based memory allocation using `bumpalo`
//! - Compilation statistics
//!
//! ## Register File (`register_file`)
//! - Allocatable pool in color order plus the scratch register
//! - Bitset tracking of registers in use
//!
//! ## Errors (`error`)
//! - `CompileError` / `CompileResult`

pub mod error;
pub mod register_file;
pub mod session;

pub use error::{CompileError, CompileResult};
pub use register_file::{AsmReg, RegBitSet, RegisterFile, ALLOCATION_ORDER, SCRATCH_REGISTER};
pub use session::{CompilationSession, SessionStats};
