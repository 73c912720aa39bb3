//! Recursive descent parser.
//!
//! Binary operators are parsed by precedence climbing. `a && b` becomes
//! `a ? b : false` and `a || b` becomes `a ? true : b`, so later stages only
//! ever see ternaries for short-circuit evaluation.

use super::ast::{Expr, ExprKind, Function, Program, Stmt, StmtKind};
use super::lexer::{Token, TokenKind};
use super::typed::Type;
use super::{FrontendError, Span};
use crate::ir::{BinaryOp, UnaryOp};

/// Parse a token stream ending in `Eof`.
pub fn parse(tokens: &[Token]) -> Result<Program, FrontendError> {
    Parser::new(tokens).parse_program()
}

/// Binary operator token, with its precedence (higher binds tighter).
#[derive(Debug, Clone, Copy)]
enum InfixOp {
    LogicalOr,
    LogicalAnd,
    Binary(BinaryOp),
}

fn infix_op(kind: &TokenKind) -> Option<(InfixOp, u8)> {
    let op = match kind {
        TokenKind::PipePipe => return Some((InfixOp::LogicalOr, 1)),
        TokenKind::AmpAmp => return Some((InfixOp::LogicalAnd, 2)),
        TokenKind::Pipe => (BinaryOp::Or, 3),
        TokenKind::Caret => (BinaryOp::Xor, 4),
        TokenKind::Amp => (BinaryOp::And, 5),
        TokenKind::EqEq => (BinaryOp::Eq, 6),
        TokenKind::Ne => (BinaryOp::Ne, 6),
        TokenKind::Lt => (BinaryOp::Lt, 7),
        TokenKind::Le => (BinaryOp::Le, 7),
        TokenKind::Gt => (BinaryOp::Gt, 7),
        TokenKind::Ge => (BinaryOp::Ge, 7),
        TokenKind::Shl => (BinaryOp::Shl, 8),
        TokenKind::Shr => (BinaryOp::Shr, 8),
        TokenKind::Plus => (BinaryOp::Add, 9),
        TokenKind::Minus => (BinaryOp::Sub, 9),
        TokenKind::Star => (BinaryOp::Mul, 10),
        TokenKind::Slash => (BinaryOp::Div, 10),
        TokenKind::Percent => (BinaryOp::Mod, 10),
        _ => return None,
    };
    Some((InfixOp::Binary(op.0), op.1))
}

/// Assignment operator token, `None` inside for plain `=`.
fn assign_op(kind: &TokenKind) -> Option<Option<BinaryOp>> {
    Some(match kind {
        TokenKind::Assign => None,
        TokenKind::PlusAssign => Some(BinaryOp::Add),
        TokenKind::MinusAssign => Some(BinaryOp::Sub),
        TokenKind::StarAssign => Some(BinaryOp::Mul),
        TokenKind::SlashAssign => Some(BinaryOp::Div),
        TokenKind::PercentAssign => Some(BinaryOp::Mod),
        TokenKind::ShlAssign => Some(BinaryOp::Shl),
        TokenKind::ShrAssign => Some(BinaryOp::Shr),
        TokenKind::AmpAssign => Some(BinaryOp::And),
        TokenKind::PipeAssign => Some(BinaryOp::Or),
        TokenKind::CaretAssign => Some(BinaryOp::Xor),
        _ => return None,
    })
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let index = (self.pos + offset).min(self.tokens.len().saturating_sub(1));
        self.tokens
            .get(index)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn bump(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> FrontendError {
        FrontendError::Parse {
            span: self.span(),
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), FrontendError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {kind:?} but found {:?}", self.peek())))
        }
    }

    fn expect_ident(&mut self) -> Result<String, FrontendError> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.bump();
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier but found {other:?}"))),
        }
    }

    fn parse_type(&mut self) -> Option<Type> {
        let ty = match self.peek() {
            TokenKind::Int => Type::Int,
            TokenKind::Bool => Type::Bool,
            _ => return None,
        };
        self.bump();
        Some(ty)
    }

    fn parse_program(mut self) -> Result<Program, FrontendError> {
        let mut functions = Vec::new();
        while self.peek() != &TokenKind::Eof {
            functions.push(self.parse_function()?);
        }
        Ok(Program { functions })
    }

    fn parse_function(&mut self) -> Result<Function, FrontendError> {
        let span = self.span();
        let return_type = self
            .parse_type()
            .ok_or_else(|| self.error(format!("expected return type but found {:?}", self.peek())))?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::LParen)?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block_body()?;
        Ok(Function {
            name,
            return_type,
            body,
            span,
        })
    }

    fn parse_block_body(&mut self) -> Result<Vec<Stmt>, FrontendError> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            if self.peek() == &TokenKind::Eof {
                return Err(self.error("unexpected end of input inside block"));
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, FrontendError> {
        let span = self.span();
        let kind = match self.peek() {
            TokenKind::LBrace => StmtKind::Block(self.parse_block_body()?),
            TokenKind::If => {
                self.bump();
                let condition = self.parse_paren_expr()?;
                let then_branch = Box::new(self.parse_stmt()?);
                let else_branch = if self.eat(&TokenKind::Else) {
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                StmtKind::If {
                    condition,
                    then_branch,
                    else_branch,
                }
            }
            TokenKind::While => {
                self.bump();
                let condition = self.parse_paren_expr()?;
                let body = Box::new(self.parse_stmt()?);
                StmtKind::While { condition, body }
            }
            TokenKind::For => {
                self.bump();
                self.expect(TokenKind::LParen)?;
                let init = if self.peek() == &TokenKind::Semi {
                    None
                } else {
                    Some(Box::new(self.parse_simple()?))
                };
                self.expect(TokenKind::Semi)?;
                let condition = self.parse_expr()?;
                self.expect(TokenKind::Semi)?;
                let step = if self.peek() == &TokenKind::RParen {
                    None
                } else {
                    let step = self.parse_simple()?;
                    if matches!(step.kind, StmtKind::Declare { .. }) {
                        return Err(FrontendError::Parse {
                            span: step.span,
                            message: "declaration not allowed as for-loop step".into(),
                        });
                    }
                    Some(Box::new(step))
                };
                self.expect(TokenKind::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                StmtKind::For {
                    init,
                    condition,
                    step,
                    body,
                }
            }
            TokenKind::Break => {
                self.bump();
                self.expect(TokenKind::Semi)?;
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.bump();
                self.expect(TokenKind::Semi)?;
                StmtKind::Continue
            }
            TokenKind::Return => {
                self.bump();
                let value = self.parse_expr()?;
                self.expect(TokenKind::Semi)?;
                StmtKind::Return(value)
            }
            _ => {
                let stmt = self.parse_simple()?;
                self.expect(TokenKind::Semi)?;
                return Ok(stmt);
            }
        };
        Ok(Stmt { kind, span })
    }

    /// Declaration, assignment, increment or expression statement.
    fn parse_simple(&mut self) -> Result<Stmt, FrontendError> {
        let span = self.span();

        if let Some(ty) = self.parse_type() {
            let name = self.expect_ident()?;
            let init = if self.eat(&TokenKind::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            return Ok(Stmt {
                kind: StmtKind::Declare { ty, name, init },
                span,
            });
        }

        if let TokenKind::Ident(name) = self.peek().clone() {
            let next = self.peek_at(1).clone();
            if let Some(op) = assign_op(&next) {
                self.bump();
                self.bump();
                let value = self.parse_expr()?;
                return Ok(Stmt {
                    kind: StmtKind::Assign { name, op, value },
                    span,
                });
            }
            let delta = match next {
                TokenKind::PlusPlus => Some(1),
                TokenKind::MinusMinus => Some(-1),
                _ => None,
            };
            if let Some(delta) = delta {
                self.bump();
                self.bump();
                return Ok(Stmt {
                    kind: StmtKind::Increment { name, delta },
                    span,
                });
            }
        }

        let expr = self.parse_expr()?;
        Ok(Stmt {
            kind: StmtKind::Expr(expr),
            span,
        })
    }

    fn parse_paren_expr(&mut self) -> Result<Expr, FrontendError> {
        self.expect(TokenKind::LParen)?;
        let expr = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(expr)
    }

    fn parse_expr(&mut self) -> Result<Expr, FrontendError> {
        let span = self.span();
        let condition = self.parse_binary(1)?;
        if !self.eat(&TokenKind::Question) {
            return Ok(condition);
        }
        let then_value = self.parse_expr()?;
        self.expect(TokenKind::Colon)?;
        let else_value = self.parse_expr()?;
        Ok(Expr {
            kind: ExprKind::Ternary {
                condition: Box::new(condition),
                then_value: Box::new(then_value),
                else_value: Box::new(else_value),
            },
            span,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, FrontendError> {
        let mut lhs = self.parse_unary()?;

        while let Some((op, prec)) = infix_op(self.peek()) {
            if prec < min_prec {
                break;
            }
            let span = self.span();
            self.bump();
            let rhs = self.parse_binary(prec + 1)?;
            let literal = |value| Expr {
                kind: ExprKind::Bool(value),
                span,
            };
            let kind = match op {
                InfixOp::LogicalAnd => ExprKind::Ternary {
                    condition: Box::new(lhs),
                    then_value: Box::new(rhs),
                    else_value: Box::new(literal(false)),
                },
                InfixOp::LogicalOr => ExprKind::Ternary {
                    condition: Box::new(lhs),
                    then_value: Box::new(literal(true)),
                    else_value: Box::new(rhs),
                },
                InfixOp::Binary(op) => ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            };
            lhs = Expr { kind, span };
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, FrontendError> {
        let span = self.span();
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::Bang => UnaryOp::LogicalNot,
            _ => return self.parse_primary(),
        };
        self.bump();
        let operand = self.parse_unary()?;
        Ok(Expr {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, FrontendError> {
        let span = self.span();
        let kind = match self.bump() {
            TokenKind::Number(value) => ExprKind::Int(value),
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::Ident(name) => ExprKind::Var(name),
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            other => {
                return Err(FrontendError::Parse {
                    span,
                    message: format!("expected expression but found {other:?}"),
                })
            }
        };
        Ok(Expr { kind, span })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::tokenize;

    fn parse_source(source: &str) -> Result<Program, FrontendError> {
        parse(&tokenize(source)?)
    }

    fn return_expr(source: &str) -> ExprKind {
        let program = parse_source(&format!("int main() {{ return {source}; }}")).unwrap();
        match &program.functions[0].body[0].kind {
            StmtKind::Return(expr) => expr.kind.clone(),
            other => panic!("expected return, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let ExprKind::Binary { op, rhs, .. } = return_expr("2 + 3 * 4") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_left_associativity() {
        let ExprKind::Binary { op, lhs, .. } = return_expr("10 - 4 - 3") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Sub);
        assert!(matches!(
            lhs.kind,
            ExprKind::Binary {
                op: BinaryOp::Sub,
                ..
            }
        ));
    }

    #[test]
    fn test_short_circuit_desugars_to_ternary() {
        let ExprKind::Ternary { else_value, .. } = return_expr("a && b") else {
            panic!("expected ternary");
        };
        assert_eq!(else_value.kind, ExprKind::Bool(false));

        let ExprKind::Ternary { then_value, .. } = return_expr("a || b") else {
            panic!("expected ternary");
        };
        assert_eq!(then_value.kind, ExprKind::Bool(true));
    }

    #[test]
    fn test_ternary_is_right_associative() {
        let ExprKind::Ternary { else_value, .. } = return_expr("a ? 1 : b ? 2 : 3") else {
            panic!("expected ternary");
        };
        assert!(matches!(else_value.kind, ExprKind::Ternary { .. }));
    }

    #[test]
    fn test_statements() {
        let program = parse_source(
            "int main() {
                int x = 0;
                x += 2;
                x++;
                for (int i = 0; i < 3; i++) { continue; }
                while (x < 10) { if (x == 5) break; else x = x + 1; }
                return x;
            }",
        )
        .unwrap();
        let body = &program.functions[0].body;
        assert_eq!(body.len(), 6);
        assert!(matches!(
            body[1].kind,
            StmtKind::Assign {
                op: Some(BinaryOp::Add),
                ..
            }
        ));
        assert!(matches!(body[2].kind, StmtKind::Increment { delta: 1, .. }));
        assert!(matches!(body[3].kind, StmtKind::For { .. }));
        assert!(matches!(body[4].kind, StmtKind::While { .. }));
    }

    #[test]
    fn test_parse_errors() {
        let err = parse_source("int main() { return 1 }").unwrap_err();
        assert!(matches!(err, FrontendError::Parse { .. }));
        assert_eq!(err.exit_code(), 42);

        assert!(parse_source("int main() { return (1; }").is_err());
        assert!(parse_source("int main() {").is_err());
        assert!(parse_source("main() { return 0; }").is_err());
        assert!(parse_source("int main() { for (;;) {} }").is_err());
    }
}
