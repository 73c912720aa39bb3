//! Register allocation.

pub mod chordal;

pub use chordal::{allocate, ChordalAllocator, Register, RegisterAllocationResult};
