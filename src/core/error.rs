// This module defines the error type shared by every stage of the chordc back end using the
// thiserror crate. CompileError covers the internal invariant failures the pipeline can hit:
// unbound variables and empty loop stacks while building SSA, missing return paths, phis that
// survive into liveness or code generation, graph edges that name unknown nodes or connect a
// node to itself, phis without an entry for one of their predecessors, values that reach the
// emitter without a location, and failures from the instruction encoder or the output writer.
// Each variant carries the value, block or function involved so a failing compilation can be
// traced back to the stage that produced the bad input. CompileResult<T> is the convenience
// alias used throughout the crate.

//! Error types for the chordc back end.
//!
//! Every variant describes a programmer-error-class failure: the front end
//! reports user mistakes on its own, so anything that reaches these variants
//! indicates a defect in an earlier stage.

use thiserror::Error;

/// Main error type for the SSA, analysis, allocation and emission stages.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("variable `{name}` has no reaching binding in block {block}")]
    UnboundVariable { name: String, block: String },

    #[error("`{statement}` outside of any loop context")]
    EmptyLoopContext { statement: &'static str },

    #[error("function `{function}` can fall off its end without returning")]
    MissingReturn { function: String },

    #[error("phi defining {value} in block {block} reached {stage}")]
    UnresolvedPhi {
        stage: &'static str,
        value: String,
        block: String,
    },

    #[error("phi {phi} in block {block} has no incoming value for predecessor {predecessor}")]
    MissingPhiIncoming {
        phi: String,
        block: String,
        predecessor: String,
    },

    #[error("value {value} is not a node of the interference graph")]
    NodeNotFound { value: String },

    #[error("refusing to add a self-edge on {value}")]
    SelfEdge { value: String },

    #[error("value {value} has no register or stack slot")]
    MissingLocation { value: String },

    #[error("no function is flagged as the program entry point")]
    NoEntryPoint,

    #[error("instruction encoding failed: {0}")]
    Encoding(#[from] iced_x86::IcedError),

    #[error("failed to write assembly: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
