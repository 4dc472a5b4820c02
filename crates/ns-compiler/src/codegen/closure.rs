//! The "native" backend: each block is lowered, once, into a boxed
//! closure chain ahead of any call to `run`, rather than being
//! re-interpreted opcode-by-opcode on every invocation the way
//! [`super::interpreter::interpret`] does it.

use std::collections::HashMap;

use crate::codegen::Backend;
use crate::error::IrError;
use crate::ir::{BlockId, Opcode, Trace, ValueRef};

impl Backend for CompiledProgram {
    fn run(&self, args: &[i64]) -> Result<i64, IrError> {
        CompiledProgram::run(self, args)
    }
}

enum Outcome {
    Jump(BlockId, Vec<i64>),
    Return(i64),
}

type StepFn = Box<dyn Fn(&mut HashMap<ValueRef, i64>)>;

struct CompiledBlock {
    params: Vec<ValueRef>,
    steps: Vec<StepFn>,
    terminator: Box<dyn Fn(&HashMap<ValueRef, i64>) -> Outcome>,
}

pub struct CompiledProgram {
    entry: BlockId,
    blocks: HashMap<BlockId, CompiledBlock>,
}

impl CompiledProgram {
    pub fn run(&self, args: &[i64]) -> Result<i64, IrError> {
        let mut current = self.entry;
        let mut pending_args = args.to_vec();
        loop {
            let block = self
                .blocks
                .get(&current)
                .ok_or(IrError::MissingBlock { block: current })?;
            if block.params.len() != pending_args.len() {
                return Err(IrError::BlockArgArityMismatch {
                    block: current,
                    supplied: pending_args.len(),
                    expected: block.params.len(),
                });
            }
            let mut env: HashMap<ValueRef, i64> = block
                .params
                .iter()
                .copied()
                .zip(pending_args.iter().copied())
                .collect();
            for step in &block.steps {
                step(&mut env);
            }
            match (block.terminator)(&env) {
                Outcome::Return(v) => return Ok(v),
                Outcome::Jump(target, next_args) => {
                    current = target;
                    pending_args = next_args;
                }
            }
        }
    }
}

fn fold_binop(opcode: Opcode, a: i64, b: i64) -> i64 {
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

/// Lowers every block of `trace` into a `CompiledBlock` up front. Returns an
/// `IrError` if the trace is not well-formed SSA (callers should usually run
/// [`crate::ssa::validate`] first; this performs the same missing-terminator
/// check as a defense in depth).
pub fn compile(trace: &Trace) -> Result<CompiledProgram, IrError> {
    let mut blocks = HashMap::new();
    for block in &trace.blocks {
        let mut steps: Vec<StepFn> = Vec::new();
        for op in &block.ops {
            match op.opcode {
                Opcode::Const => {
                    let result = op.result.expect("Const produces a value");
                    let value = op.const_value.expect("Const carries a value");
                    steps.push(Box::new(move |env| {
                        env.insert(result, value);
                    }));
                }
                Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::And
                | Opcode::Or
                | Opcode::Equals
                | Opcode::LessThan => {
                    let a = op.operands[0];
                    let b = op.operands[1];
                    let result = op.result.expect("binary op produces a value");
                    let opcode = op.opcode;
                    steps.push(Box::new(move |env| {
                        let lhs = env[&a];
                        let rhs = env[&b];
                        env.insert(result, fold_binop(opcode, lhs, rhs));
                    }));
                }
                Opcode::Negate => {
                    let a = op.operands[0];
                    let result = op.result.expect("Negate produces a value");
                    steps.push(Box::new(move |env| {
                        let v = env[&a];
                        env.insert(result, -v);
                    }));
                }
                Opcode::Cmp | Opcode::Jmp | Opcode::Return => {
                    // terminators are handled below, not as steps.
                }
            }
        }

        let terminator: Box<dyn Fn(&HashMap<ValueRef, i64>) -> Outcome> = match block
            .ops
            .last()
            .map(|op| op.opcode)
        {
            Some(Opcode::Return) => {
                let value = block.ops.last().unwrap().operands[0];
                Box::new(move |env| Outcome::Return(env[&value]))
            }
            Some(Opcode::Jmp) => {
                let target = block.ops.last().unwrap().targets[0].clone();
                Box::new(move |env| {
                    let args = target.args.iter().map(|r| env[r]).collect();
                    Outcome::Jump(target.target, args)
                })
            }
            Some(Opcode::Cmp) => {
                let op = block.ops.last().unwrap();
                let cond = op.operands[0];
                let then_ref = op.targets[0].clone();
                let else_ref = op.targets[1].clone();
                Box::new(move |env| {
                    let chosen = if env[&cond] != 0 { &then_ref } else { &else_ref };
                    let args = chosen.args.iter().map(|r| env[r]).collect();
                    Outcome::Jump(chosen.target, args)
                })
            }
            _ => {
                return Err(IrError::MissingTerminator { block: block.id() });
            }
        };

        blocks.insert(
            block.id(),
            CompiledBlock {
                params: block.params.clone(),
                steps,
                terminator,
            },
        );
    }

    Ok(CompiledProgram {
        entry: trace.entry().id(),
        blocks,
    })
}
