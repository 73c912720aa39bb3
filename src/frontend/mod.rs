// This module is the front end of chordc: it turns source text into the typed program tree
// the SSA builder consumes. The lexer produces tokens with line/column spans, the parser
// builds an untyped syntax tree by recursive descent with precedence climbing (desugaring
// the short-circuit operators into ternaries on the way), and semantic analysis resolves
// every identifier to a unique symbol, checks types, definite assignment, return on every
// path and loop placement of break/continue, and rewrites compound assignments and
// increments into plain assignments. Failures are reported as FrontendError values whose
// exit_code method gives the process status the command line tool exits with.

//! Lexing, parsing and semantic analysis.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod sema;
pub mod typed;

use std::fmt;
use thiserror::Error;

pub use typed::TypedProgram;

/// Exit status for lexical and syntactic errors.
pub const EXIT_PARSE_ERROR: i32 = 42;

/// Exit status for semantic errors.
pub const EXIT_SEMANTIC_ERROR: i32 = 7;

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// User-facing front end diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrontendError {
    #[error("{span}: lexical error: {message}")]
    Lex { span: Span, message: String },

    #[error("{span}: parse error: {message}")]
    Parse { span: Span, message: String },

    #[error("{span}: semantic error: {message}")]
    Semantic { span: Span, message: String },
}

impl FrontendError {
    pub fn span(&self) -> Span {
        match self {
            FrontendError::Lex { span, .. }
            | FrontendError::Parse { span, .. }
            | FrontendError::Semantic { span, .. } => *span,
        }
    }

    /// Process exit status for this diagnostic.
    pub fn exit_code(&self) -> i32 {
        match self {
            FrontendError::Lex { .. } | FrontendError::Parse { .. } => EXIT_PARSE_ERROR,
            FrontendError::Semantic { .. } => EXIT_SEMANTIC_ERROR,
        }
    }
}

/// Lex, parse and check `source`.
pub fn check_program(source: &str) -> Result<TypedProgram, FrontendError> {
    let tokens = lexer::tokenize(source)?;
    log::trace!("lexed {} tokens", tokens.len());
    let program = parser::parse(&tokens)?;
    log::debug!("parsed {} function(s)", program.functions.len());
    sema::analyze(&program)
}
