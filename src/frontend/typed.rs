//! Typed program tree.
//!
//! This is the contract between the front end and the SSA builder: every
//! identifier is resolved to a unique `Symbol`, every expression carries its
//! type, `for` loops are already split into an initializer and a `While`
//! with a step, and compound assignments, `++`/`--`, `&&` and `||` have been
//! rewritten into plain assignments and ternaries.

pub use crate::ir::{BinaryOp, UnaryOp};

/// Unique id of a declared variable within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Bool,
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedProgram {
    pub functions: Vec<TypedFunction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedFunction {
    pub name: String,
    pub return_type: Type,
    pub body: Vec<TypedStmt>,
    /// Set on the function the `main` stub calls.
    pub is_entry: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedStmt {
    Declare {
        symbol: Symbol,
        init: Option<TypedExpr>,
    },
    Assign {
        symbol: Symbol,
        value: TypedExpr,
    },
    If {
        condition: TypedExpr,
        then_branch: Vec<TypedStmt>,
        else_branch: Option<Vec<TypedStmt>>,
    },
    /// `for` loops carry their step; `continue` runs it before the condition.
    While {
        condition: TypedExpr,
        body: Vec<TypedStmt>,
        step: Option<Vec<TypedStmt>>,
    },
    Break,
    Continue,
    Return(TypedExpr),
    Block(Vec<TypedStmt>),
    Expr(TypedExpr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedExpr {
    pub ty: Type,
    pub kind: TypedExprKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedExprKind {
    IntLiteral(i32),
    BoolLiteral(bool),
    Variable(Symbol),
    Unary {
        op: UnaryOp,
        operand: Box<TypedExpr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<TypedExpr>,
        rhs: Box<TypedExpr>,
    },
    Ternary {
        condition: Box<TypedExpr>,
        then_value: Box<TypedExpr>,
        else_value: Box<TypedExpr>,
    },
}

impl TypedExpr {
    pub fn int(value: i32) -> Self {
        Self {
            ty: Type::Int,
            kind: TypedExprKind::IntLiteral(value),
        }
    }

    pub fn bool(value: bool) -> Self {
        Self {
            ty: Type::Bool,
            kind: TypedExprKind::BoolLiteral(value),
        }
    }

    pub fn var(symbol: &Symbol) -> Self {
        Self {
            ty: symbol.ty,
            kind: TypedExprKind::Variable(symbol.clone()),
        }
    }

    pub fn unary(op: UnaryOp, operand: TypedExpr) -> Self {
        Self {
            ty: operand.ty,
            kind: TypedExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
        }
    }

    pub fn binary(op: BinaryOp, lhs: TypedExpr, rhs: TypedExpr) -> Self {
        let ty = if op.is_comparison() { Type::Bool } else { lhs.ty };
        Self {
            ty,
            kind: TypedExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        }
    }

    /// Whether this expression is a bare reference to `id`.
    pub fn is_variable(&self, id: SymbolId) -> bool {
        matches!(&self.kind, TypedExprKind::Variable(symbol) if symbol.id == id)
    }

    pub fn ternary(condition: TypedExpr, then_value: TypedExpr, else_value: TypedExpr) -> Self {
        Self {
            ty: then_value.ty,
            kind: TypedExprKind::Ternary {
                condition: Box::new(condition),
                then_value: Box::new(then_value),
                else_value: Box::new(else_value),
            },
        }
    }
}
