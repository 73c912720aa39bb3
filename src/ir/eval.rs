//! Reference interpreter for IR functions.
//!
//! Runs a function in SSA form (phis read their operands in parallel on
//! block entry) or after phi resolution, with the same 32-bit semantics the
//! emitted machine code has: wrapping arithmetic, shift counts masked to five
//! bits and a trap on division by zero or `i32::MIN / -1`.

use super::{BinaryOp, BlockId, IrFunction, IrInstruction, SsaValue, UnaryOp};
use thiserror::Error;

/// Instructions executed before evaluation gives up.
pub const DEFAULT_STEP_LIMIT: u64 = 10_000_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("division overflow")]
    DivisionOverflow,

    #[error("value {0} read before it was defined")]
    UndefinedValue(String),

    #[error("block {0} has no incoming phi value for its predecessor")]
    MissingPhiIncoming(String),

    #[error("block {0} does not end in a terminator")]
    MissingTerminator(String),

    #[error("step limit of {0} instructions exceeded")]
    StepLimit(u64),
}

/// Run `function` and return its result.
pub fn evaluate(function: &IrFunction) -> Result<i32, EvalError> {
    evaluate_with_limit(function, DEFAULT_STEP_LIMIT)
}

pub fn evaluate_with_limit(function: &IrFunction, limit: u64) -> Result<i32, EvalError> {
    let mut values: Vec<Option<i32>> = vec![None; function.value_count as usize];
    let mut block = function.start;
    let mut prev: Option<BlockId> = None;
    let mut steps = 0u64;

    loop {
        let current = function.block(block);

        // Phis read the state as it was on the incoming edge.
        let mut phi_values = Vec::new();
        for inst in current.phis() {
            if let IrInstruction::Phi { target, incoming } = inst {
                let source = incoming
                    .iter()
                    .find(|(_, from)| Some(*from) == prev)
                    .map(|(value, _)| *value)
                    .ok_or_else(|| EvalError::MissingPhiIncoming(current.label.clone()))?;
                phi_values.push((*target, read(&values, source)?));
            }
        }
        for (target, value) in phi_values {
            write(&mut values, target, value);
        }

        let mut next = None;
        for inst in current.instructions.iter().skip_while(|i| i.is_phi()) {
            steps += 1;
            if steps > limit {
                return Err(EvalError::StepLimit(limit));
            }

            match inst {
                IrInstruction::Const { target, value } => write(&mut values, *target, *value),
                IrInstruction::BoolConst { target, value } => {
                    write(&mut values, *target, i32::from(*value))
                }
                IrInstruction::Move { target, source } => {
                    let value = read(&values, *source)?;
                    write(&mut values, *target, value);
                }
                IrInstruction::Unary {
                    target,
                    op,
                    operand,
                } => {
                    let value = unary(*op, read(&values, *operand)?);
                    write(&mut values, *target, value);
                }
                IrInstruction::Binary {
                    target,
                    op,
                    lhs,
                    rhs,
                } => {
                    let value = binary(*op, read(&values, *lhs)?, read(&values, *rhs)?)?;
                    write(&mut values, *target, value);
                }
                IrInstruction::Phi { .. } => {}
                IrInstruction::Jump { target } => {
                    next = Some(*target);
                    break;
                }
                IrInstruction::Branch {
                    condition,
                    on_true,
                    on_false,
                } => {
                    next = Some(if read(&values, *condition)? != 0 {
                        *on_true
                    } else {
                        *on_false
                    });
                    break;
                }
                IrInstruction::Return { value } => return read(&values, *value),
            }
        }

        let Some(target) = next else {
            return Err(EvalError::MissingTerminator(current.label.clone()));
        };
        prev = Some(block);
        block = target;
    }
}

fn read(values: &[Option<i32>], value: SsaValue) -> Result<i32, EvalError> {
    values
        .get(value.id.0 as usize)
        .copied()
        .flatten()
        .ok_or_else(|| EvalError::UndefinedValue(value.to_string()))
}

fn write(values: &mut Vec<Option<i32>>, target: SsaValue, value: i32) {
    let index = target.id.0 as usize;
    if index >= values.len() {
        values.resize(index + 1, None);
    }
    values[index] = Some(value);
}

pub fn unary(op: UnaryOp, value: i32) -> i32 {
    match op {
        UnaryOp::Neg => value.wrapping_neg(),
        UnaryOp::BitNot => !value,
        UnaryOp::LogicalNot => value ^ 1,
    }
}

pub fn binary(op: BinaryOp, lhs: i32, rhs: i32) -> Result<i32, EvalError> {
    let value = match op {
        BinaryOp::Add => lhs.wrapping_add(rhs),
        BinaryOp::Sub => lhs.wrapping_sub(rhs),
        BinaryOp::Mul => lhs.wrapping_mul(rhs),
        BinaryOp::Div | BinaryOp::Mod => {
            if rhs == 0 {
                return Err(EvalError::DivisionByZero);
            }
            if lhs == i32::MIN && rhs == -1 {
                return Err(EvalError::DivisionOverflow);
            }
            if op == BinaryOp::Div {
                lhs / rhs
            } else {
                lhs % rhs
            }
        }
        BinaryOp::Shl => lhs.wrapping_shl(rhs as u32),
        BinaryOp::Shr => lhs.wrapping_shr(rhs as u32),
        BinaryOp::Lt => i32::from(lhs < rhs),
        BinaryOp::Le => i32::from(lhs <= rhs),
        BinaryOp::Gt => i32::from(lhs > rhs),
        BinaryOp::Ge => i32::from(lhs >= rhs),
        BinaryOp::Eq => i32::from(lhs == rhs),
        BinaryOp::Ne => i32::from(lhs != rhs),
        BinaryOp::And => lhs & rhs,
        BinaryOp::Or => lhs | rhs,
        BinaryOp::Xor => lhs ^ rhs,
    };
    Ok(value)
}
