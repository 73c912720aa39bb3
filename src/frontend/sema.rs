//! Semantic analysis.
//!
//! Resolves names to unique symbols, checks types, definite assignment,
//! `break`/`continue` placement and return on every path, and lowers the
//! syntax tree into the typed tree. Compound assignments and `++`/`--` are
//! rewritten as `x = x op e` here.

use super::ast::{Expr, ExprKind, Function, Program, Stmt, StmtKind};
use super::typed::{Symbol, SymbolId, Type, TypedExpr, TypedFunction, TypedProgram, TypedStmt};
use super::{FrontendError, Span};
use crate::ir::{BinaryOp, UnaryOp};
use hashbrown::{HashMap, HashSet};

const ENTRY_FUNCTION: &str = "main";

/// Check `program` and produce the typed tree.
pub fn analyze(program: &Program) -> Result<TypedProgram, FrontendError> {
    let mut seen: HashMap<&str, Span> = HashMap::new();
    for function in &program.functions {
        if seen.insert(function.name.as_str(), function.span).is_some() {
            return Err(semantic(
                function.span,
                format!("function `{}` is defined more than once", function.name),
            ));
        }
    }

    let Some(main) = program
        .functions
        .iter()
        .find(|f| f.name == ENTRY_FUNCTION)
    else {
        return Err(semantic(Span::new(1, 1), "program has no `main` function"));
    };
    if main.return_type != Type::Int {
        return Err(semantic(main.span, "`main` must return int"));
    }

    let functions = program
        .functions
        .iter()
        .map(|f| FunctionChecker::new(f.return_type).check(f))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TypedProgram { functions })
}

fn semantic(span: Span, message: impl Into<String>) -> FrontendError {
    FrontendError::Semantic {
        span,
        message: message.into(),
    }
}

/// Definite assignment state at a program point.
#[derive(Debug, Clone)]
struct Flow {
    assigned: HashSet<SymbolId>,
    /// False after `return`, `break` or `continue`: the point is unreachable
    /// and every variable counts as assigned.
    live: bool,
}

impl Flow {
    fn new() -> Self {
        Self {
            assigned: HashSet::new(),
            live: true,
        }
    }

    fn dead() -> Self {
        Self {
            assigned: HashSet::new(),
            live: false,
        }
    }

    fn join(a: Flow, b: Flow) -> Flow {
        match (a.live, b.live) {
            (false, _) => b,
            (_, false) => a,
            _ => Flow {
                assigned: a.assigned.intersection(&b.assigned).copied().collect(),
                live: true,
            },
        }
    }

    fn is_assigned(&self, id: SymbolId) -> bool {
        !self.live || self.assigned.contains(&id)
    }
}

/// Flow states that reach the step of the innermost loop through `continue`.
#[derive(Debug, Default)]
struct LoopFrame {
    continues: Vec<Flow>,
}

struct FunctionChecker {
    scopes: Vec<HashMap<String, Symbol>>,
    next_symbol: u32,
    return_type: Type,
    loops: Vec<LoopFrame>,
}

impl FunctionChecker {
    fn new(return_type: Type) -> Self {
        Self {
            scopes: Vec::new(),
            next_symbol: 0,
            return_type,
            loops: Vec::new(),
        }
    }

    fn check(mut self, function: &Function) -> Result<TypedFunction, FrontendError> {
        let mut flow = Flow::new();
        let body = self.check_block(&function.body, &mut flow)?;
        if flow.live {
            return Err(semantic(
                function.span,
                format!("function `{}` may finish without returning", function.name),
            ));
        }
        Ok(TypedFunction {
            name: function.name.clone(),
            return_type: function.return_type,
            body,
            is_entry: function.name == ENTRY_FUNCTION,
        })
    }

    fn lookup(&self, name: &str, span: Span) -> Result<Symbol, FrontendError> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
            .ok_or_else(|| semantic(span, format!("undeclared variable `{name}`")))
    }

    fn declare(&mut self, name: &str, ty: Type, span: Span) -> Result<Symbol, FrontendError> {
        if self.scopes.iter().any(|scope| scope.contains_key(name)) {
            return Err(semantic(span, format!("variable `{name}` is already declared")));
        }
        let symbol = Symbol {
            id: SymbolId(self.next_symbol),
            name: name.to_string(),
            ty,
        };
        self.next_symbol += 1;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), symbol.clone());
        }
        Ok(symbol)
    }

    fn check_block(
        &mut self,
        stmts: &[Stmt],
        flow: &mut Flow,
    ) -> Result<Vec<TypedStmt>, FrontendError> {
        self.scopes.push(HashMap::new());
        let result = stmts
            .iter()
            .map(|stmt| self.check_stmt(stmt, flow))
            .collect::<Result<Vec<_>, _>>();
        self.scopes.pop();
        result
    }

    /// Check a nested statement in its own scope.
    fn check_scoped(&mut self, stmt: &Stmt, flow: &mut Flow) -> Result<Vec<TypedStmt>, FrontendError> {
        match &stmt.kind {
            StmtKind::Block(stmts) => self.check_block(stmts, flow),
            _ => self.check_block(std::slice::from_ref(stmt), flow),
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt, flow: &mut Flow) -> Result<TypedStmt, FrontendError> {
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Declare { ty, name, init } => {
                let init = match init {
                    Some(expr) => Some(self.check_typed(expr, *ty, flow)?),
                    None => None,
                };
                let symbol = self.declare(name, *ty, span)?;
                if init.is_some() {
                    flow.assigned.insert(symbol.id);
                }
                Ok(TypedStmt::Declare { symbol, init })
            }
            StmtKind::Assign { name, op, value } => {
                let symbol = self.lookup(name, span)?;
                let value = match op {
                    None => self.check_typed(value, symbol.ty, flow)?,
                    Some(op) => {
                        let rhs = self.check_expr(value, flow)?;
                        self.compound(&symbol, *op, rhs, span, flow)?
                    }
                };
                flow.assigned.insert(symbol.id);
                Ok(TypedStmt::Assign { symbol, value })
            }
            StmtKind::Increment { name, delta } => {
                let symbol = self.lookup(name, span)?;
                let op = if *delta > 0 {
                    BinaryOp::Add
                } else {
                    BinaryOp::Sub
                };
                let value = self.compound(&symbol, op, TypedExpr::int(1), span, flow)?;
                flow.assigned.insert(symbol.id);
                Ok(TypedStmt::Assign { symbol, value })
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.check_typed(condition, Type::Bool, flow)?;

                let mut then_flow = flow.clone();
                let then_branch = self.check_scoped(then_branch, &mut then_flow)?;

                let mut else_flow = flow.clone();
                let else_branch = match else_branch {
                    Some(stmt) => Some(self.check_scoped(stmt, &mut else_flow)?),
                    None => None,
                };

                *flow = Flow::join(then_flow, else_flow);
                Ok(TypedStmt::If {
                    condition,
                    then_branch,
                    else_branch,
                })
            }
            StmtKind::While { condition, body } => {
                let condition = self.check_typed(condition, Type::Bool, flow)?;
                let (body, _) = self.check_loop_body(body, flow)?;
                Ok(TypedStmt::While {
                    condition,
                    body,
                    step: None,
                })
            }
            StmtKind::For {
                init,
                condition,
                step,
                body,
            } => {
                self.scopes.push(HashMap::new());
                let result = self.check_for(init.as_deref(), condition, step.as_deref(), body, flow);
                self.scopes.pop();
                result
            }
            StmtKind::Break | StmtKind::Continue => {
                let is_break = matches!(stmt.kind, StmtKind::Break);
                let keyword = if is_break { "break" } else { "continue" };
                let Some(frame) = self.loops.last_mut() else {
                    return Err(semantic(span, format!("`{keyword}` outside of a loop")));
                };
                if !is_break {
                    frame.continues.push(flow.clone());
                }
                *flow = Flow::dead();
                Ok(if is_break {
                    TypedStmt::Break
                } else {
                    TypedStmt::Continue
                })
            }
            StmtKind::Return(expr) => {
                let value = self.check_typed(expr, self.return_type, flow)?;
                *flow = Flow::dead();
                Ok(TypedStmt::Return(value))
            }
            StmtKind::Block(stmts) => Ok(TypedStmt::Block(self.check_block(stmts, flow)?)),
            StmtKind::Expr(expr) => Ok(TypedStmt::Expr(self.check_expr(expr, flow)?)),
        }
    }

    fn check_for(
        &mut self,
        init: Option<&Stmt>,
        condition: &Expr,
        step: Option<&Stmt>,
        body: &Stmt,
        flow: &mut Flow,
    ) -> Result<TypedStmt, FrontendError> {
        let init = match init {
            Some(stmt) => Some(self.check_stmt(stmt, flow)?),
            None => None,
        };
        let condition = self.check_typed(condition, Type::Bool, flow)?;
        let (body, mut step_flow) = self.check_loop_body(body, flow)?;
        let step = match step {
            Some(stmt) => Some(vec![self.check_stmt(stmt, &mut step_flow)?]),
            None => None,
        };

        let looped = TypedStmt::While {
            condition,
            body,
            step,
        };
        Ok(TypedStmt::Block(init.into_iter().chain([looped]).collect()))
    }

    /// Check a loop body; returns it with the flow state that reaches the
    /// end of an iteration (fall-through joined with every `continue`).
    fn check_loop_body(
        &mut self,
        body: &Stmt,
        flow: &Flow,
    ) -> Result<(Vec<TypedStmt>, Flow), FrontendError> {
        self.loops.push(LoopFrame::default());
        let mut body_flow = flow.clone();
        let result = self.check_scoped(body, &mut body_flow);
        let frame = self.loops.pop().unwrap_or_default();
        let body = result?;

        let end_flow = frame.continues.into_iter().fold(body_flow, Flow::join);
        Ok((body, end_flow))
    }

    /// Build `symbol op rhs` for compound assignment.
    fn compound(
        &self,
        symbol: &Symbol,
        op: BinaryOp,
        rhs: TypedExpr,
        span: Span,
        flow: &Flow,
    ) -> Result<TypedExpr, FrontendError> {
        if symbol.ty != Type::Int || rhs.ty != Type::Int {
            return Err(semantic(
                span,
                format!("compound assignment to `{}` requires int operands", symbol.name),
            ));
        }
        if !flow.is_assigned(symbol.id) {
            return Err(unassigned(symbol, span));
        }
        Ok(TypedExpr::binary(op, TypedExpr::var(symbol), rhs))
    }

    fn check_typed(&self, expr: &Expr, expected: Type, flow: &Flow) -> Result<TypedExpr, FrontendError> {
        let typed = self.check_expr(expr, flow)?;
        if typed.ty != expected {
            return Err(semantic(
                expr.span,
                format!("expected {expected} expression but found {}", typed.ty),
            ));
        }
        Ok(typed)
    }

    fn check_expr(&self, expr: &Expr, flow: &Flow) -> Result<TypedExpr, FrontendError> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Int(value) => Ok(TypedExpr::int(*value)),
            ExprKind::Bool(value) => Ok(TypedExpr::bool(*value)),
            ExprKind::Var(name) => {
                let symbol = self.lookup(name, span)?;
                if !flow.is_assigned(symbol.id) {
                    return Err(unassigned(&symbol, span));
                }
                Ok(TypedExpr::var(&symbol))
            }
            ExprKind::Unary { op, operand } => {
                let expected = match op {
                    UnaryOp::Neg | UnaryOp::BitNot => Type::Int,
                    UnaryOp::LogicalNot => Type::Bool,
                };
                let operand = self.check_typed(operand, expected, flow)?;
                Ok(TypedExpr::unary(*op, operand))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.check_expr(lhs, flow)?;
                let rhs = self.check_expr(rhs, flow)?;
                let ok = match op {
                    BinaryOp::Eq | BinaryOp::Ne => lhs.ty == rhs.ty,
                    _ => lhs.ty == Type::Int && rhs.ty == Type::Int,
                };
                if !ok {
                    return Err(semantic(
                        span,
                        format!(
                            "operator `{}` cannot be applied to {} and {}",
                            op.symbol(),
                            lhs.ty,
                            rhs.ty
                        ),
                    ));
                }
                Ok(TypedExpr::binary(*op, lhs, rhs))
            }
            ExprKind::Ternary {
                condition,
                then_value,
                else_value,
            } => {
                let condition = self.check_typed(condition, Type::Bool, flow)?;
                let then_value = self.check_expr(then_value, flow)?;
                let else_value = self.check_typed(else_value, then_value.ty, flow)?;
                Ok(TypedExpr::ternary(condition, then_value, else_value))
            }
        }
    }
}

fn unassigned(symbol: &Symbol, span: Span) -> FrontendError {
    semantic(
        span,
        format!("variable `{}` may be used before it is assigned", symbol.name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::check_program;
    use crate::frontend::typed::TypedExprKind;

    fn semantic_error(source: &str) -> String {
        match check_program(source) {
            Err(err @ FrontendError::Semantic { .. }) => {
                assert_eq!(err.exit_code(), 7);
                err.to_string()
            }
            other => panic!("expected semantic error, got {other:?}"),
        }
    }

    #[test]
    fn test_well_formed_program() {
        let program = check_program(
            "int helper() { return 1; }
             int main() {
                 int sum = 0;
                 for (int i = 0; i < 4; i++) { sum += i; }
                 bool done = sum > 3 && true;
                 return done ? sum : 0;
             }",
        )
        .unwrap();
        assert_eq!(program.functions.len(), 2);
        assert!(!program.functions[0].is_entry);
        assert!(program.functions[1].is_entry);
    }

    #[test]
    fn test_compound_assignment_is_desugared() {
        let program = check_program("int main() { int x = 1; x *= 3; return x; }").unwrap();
        let TypedStmt::Assign { symbol, value } = &program.functions[0].body[1] else {
            panic!("expected assignment");
        };
        let TypedExprKind::Binary { op, lhs, .. } = &value.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Mul);
        assert!(lhs.is_variable(symbol.id));
    }

    #[test]
    fn test_for_loop_becomes_block_with_step() {
        let program =
            check_program("int main() { for (int i = 0; i < 2; i++) {} return 0; }").unwrap();
        let TypedStmt::Block(stmts) = &program.functions[0].body[0] else {
            panic!("expected block");
        };
        assert!(matches!(stmts[0], TypedStmt::Declare { .. }));
        assert!(matches!(stmts[1], TypedStmt::While { step: Some(_), .. }));
    }

    #[test]
    fn test_type_errors() {
        semantic_error("int main() { return true; }");
        semantic_error("int main() { int x = 1 + false; return x; }");
        semantic_error("int main() { if (1) return 1; return 0; }");
        semantic_error("int main() { bool b = true; b += 1; return 0; }");
        semantic_error("bool main() { return true; }");
    }

    #[test]
    fn test_scoping_errors() {
        assert!(semantic_error("int main() { return y; }").contains("undeclared"));
        assert!(semantic_error("int main() { int x = 1; { int x = 2; } return x; }")
            .contains("already declared"));
        semantic_error("int main() { { int z = 1; } return z; }");
        semantic_error("int f() { return 0; } int f() { return 1; } int main() { return 0; }");
        semantic_error("int f() { return 0; }");
    }

    #[test]
    fn test_definite_assignment() {
        assert!(semantic_error("int main() { int x; return x; }").contains("before it is assigned"));
        semantic_error("int main() { int x; if (true) x = 1; return x; }");
        semantic_error("int main() { int x; while (false) { x = 1; } return x; }");

        check_program("int main() { int x; if (true) x = 1; else x = 2; return x; }").unwrap();
        check_program("int main() { int x; if (true) x = 1; else return 2; return x; }").unwrap();
    }

    #[test]
    fn test_control_flow_errors() {
        assert!(semantic_error("int main() { break; return 0; }").contains("outside of a loop"));
        semantic_error("int main() { int x = 0; if (x > 0) return 1; }");
        semantic_error("int main() { while (true) { return 1; } }");
        check_program("int main() { while (true) { break; } return 0; }").unwrap();
    }
}
