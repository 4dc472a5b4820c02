use std::collections::HashMap;

use crate::codegen::Backend;
use crate::error::IrError;
use crate::ir::{BlockId, Opcode, Trace, ValueRef};

/// [`Backend`] wrapper around [`interpret`], for call sites that want to
/// pick a backend dynamically (e.g. a test that runs both and compares).
pub struct Interpreter<'a>(pub &'a Trace);

impl Backend for Interpreter<'_> {
    fn run(&self, args: &[i64]) -> Result<i64, IrError> {
        interpret(self.0, args)
    }
}

fn eval_binop(opcode: Opcode, a: i64, b: i64) -> i64 {
    match opcode {
        Opcode::Add => a + b,
        Opcode::Sub => a - b,
        Opcode::Mul => a * b,
        Opcode::Div => a / b,
        Opcode::And => a & b,
        Opcode::Or => a | b,
        Opcode::Equals => i64::from(a == b),
        Opcode::LessThan => i64::from(a < b),
        other => unreachable!("{other:?} is not a binary operation"),
    }
}

/// Tree-walks `trace` to completion, starting at the entry block with
/// `args` bound to its formal parameters, and returns the value passed to
/// the first `RETURN` reached.
pub fn interpret(trace: &Trace, args: &[i64]) -> Result<i64, IrError> {
    let mut env: HashMap<ValueRef, i64> = HashMap::new();
    let mut current = trace.entry().id();
    bind_params(trace, current, args, &mut env)?;

    loop {
        let block = trace.block(current).ok_or(IrError::MissingBlock { block: current })?;
        for op in &block.ops {
            match op.opcode {
                crate::ir::Opcode::Const => {
                    let result = op.result.expect("Const always produces a value");
                    env.insert(result, op.const_value.expect("Const always carries a value"));
                }
                crate::ir::Opcode::Add
                | crate::ir::Opcode::Sub
                | crate::ir::Opcode::Mul
                | crate::ir::Opcode::Div
                | crate::ir::Opcode::And
                | crate::ir::Opcode::Or
                | crate::ir::Opcode::Equals
                | crate::ir::Opcode::LessThan => {
                    let a = env[&op.operands[0]];
                    let b = env[&op.operands[1]];
                    let result = op.result.expect("binary op always produces a value");
                    env.insert(result, eval_binop(op.opcode, a, b));
                }
                crate::ir::Opcode::Negate => {
                    let a = env[&op.operands[0]];
                    let result = op.result.expect("Negate always produces a value");
                    env.insert(result, -a);
                }
                crate::ir::Opcode::Cmp => {
                    let cond = env[&op.operands[0]];
                    let chosen = if cond != 0 { &op.targets[0] } else { &op.targets[1] };
                    let next_args: Vec<i64> = chosen.args.iter().map(|r| env[r]).collect();
                    let next = chosen.target;
                    let mut next_env = HashMap::new();
                    bind_params(trace, next, &next_args, &mut next_env)?;
                    env = next_env;
                    current = next;
                    break;
                }
                crate::ir::Opcode::Jmp => {
                    let target = &op.targets[0];
                    let next_args: Vec<i64> = target.args.iter().map(|r| env[r]).collect();
                    let next = target.target;
                    let mut next_env = HashMap::new();
                    bind_params(trace, next, &next_args, &mut next_env)?;
                    env = next_env;
                    current = next;
                    break;
                }
                crate::ir::Opcode::Return => {
                    return Ok(env[&op.operands[0]]);
                }
            }
        }
    }
}

fn bind_params(
    trace: &Trace,
    block: BlockId,
    args: &[i64],
    env: &mut HashMap<ValueRef, i64>,
) -> Result<(), IrError> {
    let b = trace.block(block).ok_or(IrError::MissingBlock { block })?;
    if b.params.len() != args.len() {
        return Err(IrError::BlockArgArityMismatch {
            block,
            supplied: args.len(),
            expected: b.params.len(),
        });
    }
    for (param, value) in b.params.iter().zip(args) {
        env.insert(*param, *value);
    }
    Ok(())
}
