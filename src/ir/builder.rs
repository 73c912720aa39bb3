// This module lowers typed functions into SSA form in a single walk over the typed tree.
// SsaBuilder is the per-function context: it owns the IrFunction under construction, the
// current insertion block (None once control has left through a terminator, after which
// statements are dead and skipped), the bindings from source symbols to the SSA values that
// currently hold them, the bindings that reach each not-yet-entered block along every
// incoming edge, and the stack of loop contexts that break and continue resolve against.
// Entering a block merges the bindings of its incoming edges: symbols bound to the same value
// on every edge keep it, symbols bound to different values get a phi at the top of the block,
// and symbols missing on some edge go out of scope. Loops are lowered with a guarding test
// before the loop and the condition re-evaluated at the bottom (body, optional post block for
// the step of a for loop, cond, exit); variables the loop may rebind that were bound before
// it get their phis at the top of the body up front, and the latch fills in the second entry
// once the bottom test has been lowered. Ternaries use the same branch/merge shape with
// exactly one phi for the result.

//! Typed tree to SSA lowering.

use super::{BlockId, IrFunction, IrInstruction, IrType, SsaValue};
use crate::core::error::{CompileError, CompileResult};
use crate::frontend::typed::{SymbolId, TypedExpr, TypedExprKind, TypedFunction, TypedProgram, TypedStmt};
use hashbrown::HashMap;
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};

/// Symbol bindings; ordered so phis come out in a stable order.
type Bindings = BTreeMap<SymbolId, SsaValue>;

/// Active loop targets for `break` and `continue`.
#[derive(Debug, Clone, Copy)]
struct LoopContext {
    continue_target: BlockId,
    break_target: BlockId,
}

/// Lower every function of `program`.
pub fn build_program(program: &TypedProgram) -> CompileResult<Vec<IrFunction>> {
    program.functions.iter().map(build_function).collect()
}

/// Lower one typed function into an SSA function.
pub fn build_function(function: &TypedFunction) -> CompileResult<IrFunction> {
    let mut builder = SsaBuilder::new(function);
    builder.lower_stmts(&function.body)?;
    if builder.current.is_some() {
        return Err(CompileError::MissingReturn {
            function: function.name.clone(),
        });
    }

    let function = builder.function;
    debug!(
        "built SSA for `{}`: {} blocks, {} values, {} instructions",
        function.name,
        function.blocks.len(),
        function.value_count,
        function.instruction_count()
    );
    trace!("\n{function}");
    Ok(function)
}

/// Per-function SSA construction state.
pub struct SsaBuilder {
    function: IrFunction,
    current: Option<BlockId>,
    bindings: Bindings,
    /// Bindings reaching each block along every edge recorded so far.
    incoming: HashMap<BlockId, Vec<(BlockId, Bindings)>>,
    loops: Vec<LoopContext>,
}

impl SsaBuilder {
    fn new(typed: &TypedFunction) -> Self {
        let mut function = IrFunction::new(
            typed.name.clone(),
            IrType::from(typed.return_type),
            typed.is_entry,
        );
        let start = function.add_block("entry");
        function.start = start;
        Self {
            function,
            current: Some(start),
            bindings: Bindings::new(),
            incoming: HashMap::new(),
            loops: Vec::new(),
        }
    }

    fn emit(&mut self, inst: IrInstruction) {
        if let Some(block) = self.current {
            self.function.block_mut(block).instructions.push(inst);
        }
    }

    /// Emit a value-producing instruction into a fresh target.
    fn define(
        &mut self,
        ty: IrType,
        symbol: Option<SymbolId>,
        make: impl FnOnce(SsaValue) -> IrInstruction,
    ) -> SsaValue {
        let target = self.function.new_value(ty, symbol);
        self.emit(make(target));
        target
    }

    fn current_label(&self) -> String {
        self.current
            .map(|b| self.function.block(b).label.clone())
            .unwrap_or_else(|| "<unreachable>".to_string())
    }

    fn record_edge(&mut self, from: BlockId, to: BlockId) {
        self.function.add_edge(from, to);
        self.incoming
            .entry(to)
            .or_default()
            .push((from, self.bindings.clone()));
    }

    fn jump(&mut self, target: BlockId) {
        let Some(from) = self.current else {
            return;
        };
        self.emit(IrInstruction::Jump { target });
        self.record_edge(from, target);
        self.current = None;
    }

    fn branch(&mut self, condition: SsaValue, on_true: BlockId, on_false: BlockId) {
        let Some(from) = self.current else {
            return;
        };
        self.emit(IrInstruction::Branch {
            condition,
            on_true,
            on_false,
        });
        self.record_edge(from, on_true);
        self.record_edge(from, on_false);
        self.current = None;
    }

    /// Make `block` current, merging the bindings of its incoming edges.
    ///
    /// A block without incoming edges is unreachable and leaves the builder
    /// without a current block.
    fn enter(&mut self, block: BlockId) {
        let incoming = self.incoming.remove(&block).unwrap_or_default();
        if incoming.is_empty() {
            self.current = None;
            self.bindings.clear();
            return;
        }
        self.current = Some(block);
        self.bindings = self.merge_into(block, incoming);
    }

    fn merge_into(&mut self, block: BlockId, mut incoming: Vec<(BlockId, Bindings)>) -> Bindings {
        if incoming.len() == 1 {
            return incoming.pop().map(|(_, b)| b).unwrap_or_default();
        }

        let mut merged = Bindings::new();
        let mut phis = Vec::new();
        for (&symbol, &first) in &incoming[0].1 {
            let values: Option<Vec<(SsaValue, BlockId)>> = incoming
                .iter()
                .map(|(pred, bindings)| bindings.get(&symbol).map(|v| (*v, *pred)))
                .collect();
            let Some(values) = values else {
                continue;
            };

            if values.iter().all(|(v, _)| *v == first) {
                merged.insert(symbol, first);
                continue;
            }

            let target = self.function.new_value(first.ty, Some(symbol));
            trace!("phi {target} for symbol {} in {block}", symbol.0);
            phis.push(IrInstruction::Phi {
                target,
                incoming: values,
            });
            merged.insert(symbol, target);
        }

        let instructions = &mut self.function.block_mut(block).instructions;
        instructions.splice(0..0, phis);
        merged
    }

    fn lower_stmts(&mut self, stmts: &[TypedStmt]) -> CompileResult<()> {
        for stmt in stmts {
            if self.current.is_none() {
                break;
            }
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &TypedStmt) -> CompileResult<()> {
        match stmt {
            TypedStmt::Declare { symbol, init } => {
                if let Some(init) = init {
                    self.assign(symbol.id, init)?;
                }
            }
            TypedStmt::Assign { symbol, value } => self.assign(symbol.id, value)?,
            TypedStmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.lower_expr(condition)?;
                let then_block = self.function.add_block("then");
                let else_block = else_branch.as_ref().map(|_| self.function.add_block("else"));
                let merge = self.function.add_block("merge");

                self.branch(condition, then_block, else_block.unwrap_or(merge));

                self.enter(then_block);
                self.lower_stmts(then_branch)?;
                self.jump(merge);

                if let (Some(block), Some(stmts)) = (else_block, else_branch) {
                    self.enter(block);
                    self.lower_stmts(stmts)?;
                    self.jump(merge);
                }

                self.enter(merge);
            }
            TypedStmt::While {
                condition,
                body,
                step,
            } => self.lower_loop(condition, body, step.as_deref())?,
            TypedStmt::Break => {
                let context = self.loops.last().copied().ok_or(CompileError::EmptyLoopContext {
                    statement: "break",
                })?;
                self.jump(context.break_target);
            }
            TypedStmt::Continue => {
                let context = self.loops.last().copied().ok_or(CompileError::EmptyLoopContext {
                    statement: "continue",
                })?;
                self.jump(context.continue_target);
            }
            TypedStmt::Return(expr) => {
                let value = self.lower_expr(expr)?;
                self.emit(IrInstruction::Return { value });
                self.current = None;
            }
            TypedStmt::Block(stmts) => self.lower_stmts(stmts)?,
            TypedStmt::Expr(expr) => {
                self.lower_expr(expr)?;
            }
        }
        Ok(())
    }

    /// Evaluate `value` and bind it to `symbol` through a fresh move.
    fn assign(&mut self, symbol: SymbolId, value: &TypedExpr) -> CompileResult<()> {
        let source = self.lower_expr(value)?;
        let target = self.define(source.ty, Some(symbol), |target| IrInstruction::Move {
            target,
            source,
        });
        self.bindings.insert(symbol, target);
        Ok(())
    }

    fn lower_loop(
        &mut self,
        condition: &TypedExpr,
        body: &[TypedStmt],
        step: Option<&[TypedStmt]>,
    ) -> CompileResult<()> {
        let guard = self.lower_expr(condition)?;
        let Some(pre) = self.current else {
            return Ok(());
        };

        let body_block = self.function.add_block("body");
        let post_block = step.map(|_| self.function.add_block("post"));
        let cond_block = self.function.add_block("cond");
        let exit_block = self.function.add_block("exit");

        // Symbols a pass over body and step may rebind that already hold a value.
        let mut assigned = BTreeSet::new();
        collect_assigned(body, &mut assigned);
        if let Some(step) = step {
            collect_assigned(step, &mut assigned);
        }
        let carried: Vec<(SymbolId, SsaValue)> = assigned
            .into_iter()
            .filter_map(|symbol| self.bindings.get(&symbol).map(|v| (symbol, *v)))
            .collect();

        // The body edge is wired by hand: its phis exist before the latch does.
        self.emit(IrInstruction::Branch {
            condition: guard,
            on_true: body_block,
            on_false: exit_block,
        });
        self.function.add_edge(pre, body_block);
        self.record_edge(pre, exit_block);

        self.current = Some(body_block);
        let mut header = Vec::with_capacity(carried.len());
        for (symbol, value) in carried {
            let target = self.define(value.ty, Some(symbol), |target| IrInstruction::Phi {
                target,
                incoming: vec![(value, pre)],
            });
            self.bindings.insert(symbol, target);
            header.push((symbol, target));
        }

        let continue_target = post_block.unwrap_or(cond_block);
        self.loops.push(LoopContext {
            continue_target,
            break_target: exit_block,
        });
        let lowered = self.lower_stmts(body);
        self.loops.pop();
        lowered?;
        self.jump(continue_target);

        if let (Some(post), Some(step)) = (post_block, step) {
            self.enter(post);
            self.lower_stmts(step)?;
            self.jump(cond_block);
        }

        self.enter(cond_block);
        if self.current.is_some() {
            let condition = self.lower_expr(condition)?;
            let Some(latch) = self.current else {
                return Ok(());
            };
            for (symbol, phi) in header {
                let value = self.lookup(symbol)?;
                self.add_phi_incoming(body_block, phi, value, latch);
            }
            self.emit(IrInstruction::Branch {
                condition,
                on_true: body_block,
                on_false: exit_block,
            });
            self.function.add_edge(latch, body_block);
            self.record_edge(latch, exit_block);
            self.current = None;
        }

        self.enter(exit_block);
        Ok(())
    }

    fn add_phi_incoming(&mut self, block: BlockId, phi: SsaValue, value: SsaValue, pred: BlockId) {
        for inst in &mut self.function.block_mut(block).instructions {
            if let IrInstruction::Phi { target, incoming } = inst {
                if *target == phi {
                    incoming.push((value, pred));
                    return;
                }
            }
        }
    }

    fn lookup(&self, symbol: SymbolId) -> CompileResult<SsaValue> {
        self.bindings
            .get(&symbol)
            .copied()
            .ok_or_else(|| CompileError::UnboundVariable {
                name: format!("#{}", symbol.0),
                block: self.current_label(),
            })
    }

    fn lower_expr(&mut self, expr: &TypedExpr) -> CompileResult<SsaValue> {
        let ty = IrType::from(expr.ty);
        let value = match &expr.kind {
            TypedExprKind::IntLiteral(value) => {
                let value = *value;
                self.define(ty, None, |target| IrInstruction::Const { target, value })
            }
            TypedExprKind::BoolLiteral(value) => {
                let value = *value;
                self.define(ty, None, |target| IrInstruction::BoolConst { target, value })
            }
            TypedExprKind::Variable(symbol) => {
                self.bindings
                    .get(&symbol.id)
                    .copied()
                    .ok_or_else(|| CompileError::UnboundVariable {
                        name: symbol.name.clone(),
                        block: self.current_label(),
                    })?
            }
            TypedExprKind::Unary { op, operand } => {
                let operand = self.lower_expr(operand)?;
                let op = *op;
                self.define(ty, None, |target| IrInstruction::Unary {
                    target,
                    op,
                    operand,
                })
            }
            TypedExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.lower_expr(lhs)?;
                let rhs = self.lower_expr(rhs)?;
                let op = *op;
                self.define(ty, None, |target| IrInstruction::Binary {
                    target,
                    op,
                    lhs,
                    rhs,
                })
            }
            TypedExprKind::Ternary {
                condition,
                then_value,
                else_value,
            } => self.lower_ternary(ty, condition, then_value, else_value)?,
        };
        Ok(value)
    }

    fn lower_ternary(
        &mut self,
        ty: IrType,
        condition: &TypedExpr,
        then_value: &TypedExpr,
        else_value: &TypedExpr,
    ) -> CompileResult<SsaValue> {
        let condition = self.lower_expr(condition)?;
        let true_block = self.function.add_block("tern_true");
        let false_block = self.function.add_block("tern_false");
        let merge = self.function.add_block("tern_merge");
        self.branch(condition, true_block, false_block);

        let mut arms = Vec::with_capacity(2);
        for (block, expr) in [(true_block, then_value), (false_block, else_value)] {
            self.enter(block);
            let value = self.lower_expr(expr)?;
            if let Some(end) = self.current {
                arms.push((value, end));
            }
            self.jump(merge);
        }

        self.enter(merge);
        let target = self.function.new_value(ty, None);
        let instructions = &mut self.function.block_mut(merge).instructions;
        let position = instructions.iter().take_while(|i| i.is_phi()).count();
        instructions.insert(
            position,
            IrInstruction::Phi {
                target,
                incoming: arms,
            },
        );
        Ok(target)
    }
}

/// Symbols assigned anywhere in `stmts`, nested statements included.
fn collect_assigned(stmts: &[TypedStmt], out: &mut BTreeSet<SymbolId>) {
    for stmt in stmts {
        match stmt {
            TypedStmt::Declare {
                symbol,
                init: Some(_),
            }
            | TypedStmt::Assign { symbol, .. } => {
                out.insert(symbol.id);
            }
            TypedStmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                collect_assigned(then_branch, out);
                if let Some(stmts) = else_branch {
                    collect_assigned(stmts, out);
                }
            }
            TypedStmt::While { body, step, .. } => {
                collect_assigned(body, out);
                if let Some(stmts) = step {
                    collect_assigned(stmts, out);
                }
            }
            TypedStmt::Block(stmts) => collect_assigned(stmts, out),
            _ => {}
        }
    }
}
