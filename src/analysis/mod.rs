//! Analyses over linearized IR functions.
//!
//! [`node_sequence`] fixes the instruction order, [`liveness`] computes the
//! values live after every node and [`interference`] turns that into the graph
//! the register allocator colors.

pub mod interference;
pub mod liveness;
pub mod node_sequence;

pub use interference::InterferenceGraph;
pub use liveness::{LiveSet, Liveness};
pub use node_sequence::{linearize, Node, NodeSequence};
