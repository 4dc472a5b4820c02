//! `Value<i64>`/`Cond`: the tagged concrete-or-symbolic handles operator
//! implementations compute with. SPEC_FULL.md §9 re-architecture note:
//! "model `Value<T>` as a tagged variant (concrete T plus
//! `Symbolic(valueRef)`) ... that, if the execution is symbolic, push an op
//! and return a fresh symbolic value; else compute the concrete result (for
//! tests running untraced)".
//!
//! Only `i64` arithmetic is modeled, matching spec.md §8 invariant 2 ("for
//! all integer arithmetic `e` constructible in the tracer").

use crate::context::TraceContext;
use crate::error::TraceError;
use crate::ir::{BlockRef, Opcode, ValueRef};

/// Ceiling on how many times a loop with a concrete condition may unroll
/// while tracing, so a runaway concrete loop cannot hang trace construction
/// instead of producing a diagnosable [`TraceError`].
const MAX_UNROLL_ITERATIONS: usize = 10_000;

#[derive(Clone)]
pub enum Value {
    Concrete(i64),
    Symbolic(ValueRef, TraceContext),
}

impl Value {
    #[must_use]
    pub fn concrete(v: i64) -> Self {
        Value::Concrete(v)
    }

    #[must_use]
    pub fn symbolic(ctx: &TraceContext, v: i64) -> Self {
        let r = ctx.emit_const(v);
        Value::Symbolic(r, ctx.clone())
    }

    fn ctx(&self) -> Option<&TraceContext> {
        match self {
            Value::Concrete(_) => None,
            Value::Symbolic(_, ctx) => Some(ctx),
        }
    }

    fn as_concrete(&self) -> Option<i64> {
        match self {
            Value::Concrete(v) => Some(*v),
            Value::Symbolic(..) => None,
        }
    }

    fn as_ref(&self, fallback_ctx: &TraceContext) -> ValueRef {
        match self {
            Value::Concrete(v) => fallback_ctx.emit_const(*v),
            Value::Symbolic(r, _) => *r,
        }
    }

    fn binop(&self, other: &Value, opcode: Opcode, concrete: impl Fn(i64, i64) -> i64) -> Value {
        match (self.as_concrete(), other.as_concrete()) {
            (Some(a), Some(b)) => Value::Concrete(concrete(a, b)),
            _ => {
                let ctx = self.ctx().or_else(|| other.ctx()).expect("one side is symbolic").clone();
                let a = self.as_ref(&ctx);
                let b = other.as_ref(&ctx);
                let result = ctx.emit_binop(opcode, a, b);
                Value::Symbolic(result, ctx)
            }
        }
    }

    #[must_use]
    pub fn add(&self, other: &Value) -> Value {
        self.binop(other, Opcode::Add, |a, b| a + b)
    }

    #[must_use]
    pub fn sub(&self, other: &Value) -> Value {
        self.binop(other, Opcode::Sub, |a, b| a - b)
    }

    #[must_use]
    pub fn mul(&self, other: &Value) -> Value {
        self.binop(other, Opcode::Mul, |a, b| a * b)
    }

    #[must_use]
    pub fn div(&self, other: &Value) -> Value {
        self.binop(other, Opcode::Div, |a, b| a / b)
    }

    #[must_use]
    pub fn bitand(&self, other: &Value) -> Value {
        self.binop(other, Opcode::And, |a, b| a & b)
    }

    #[must_use]
    pub fn bitor(&self, other: &Value) -> Value {
        self.binop(other, Opcode::Or, |a, b| a | b)
    }

    #[must_use]
    pub fn negate(&self) -> Value {
        match self.as_concrete() {
            Some(a) => Value::Concrete(-a),
            None => {
                let ctx = self.ctx().expect("symbolic").clone();
                let a = self.as_ref(&ctx);
                let result = ctx.emit_unop(Opcode::Negate, a);
                Value::Symbolic(result, ctx)
            }
        }
    }

    #[must_use]
    pub fn equals(&self, other: &Value) -> Cond {
        self.compare(other, Opcode::Equals, |a, b| a == b)
    }

    #[must_use]
    pub fn less_than(&self, other: &Value) -> Cond {
        self.compare(other, Opcode::LessThan, |a, b| a < b)
    }

    fn compare(&self, other: &Value, opcode: Opcode, concrete: impl Fn(i64, i64) -> bool) -> Cond {
        match (self.as_concrete(), other.as_concrete()) {
            (Some(a), Some(b)) => Cond::Concrete(concrete(a, b)),
            _ => {
                let ctx = self.ctx().or_else(|| other.ctx()).expect("one side is symbolic").clone();
                let a = self.as_ref(&ctx);
                let b = other.as_ref(&ctx);
                let result = ctx.emit_binop(opcode, a, b);
                Cond::Symbolic(result, ctx)
            }
        }
    }

    /// Finalizes the trace with a `RETURN` of this value. No-op for concrete
    /// values (there is no trace to finalize).
    pub fn trace_return(&self) {
        if let Value::Symbolic(r, ctx) = self {
            ctx.emit_return(*r);
        }
    }

    #[must_use]
    pub fn into_concrete(self) -> Option<i64> {
        self.as_concrete()
    }
}

/// A boolean condition, produced by `Value::equals`/`less_than`, that drives
/// `if_then_else`/`while_loop`.
#[derive(Clone)]
pub enum Cond {
    Concrete(bool),
    Symbolic(ValueRef, TraceContext),
}

impl Cond {
    /// Traces `if (cond) then_branch() else else_branch()`, producing the
    /// four-block pattern spec.md §4.2 specifies: "condition block with
    /// `CMP`, then-block ending in `JMP`, else-block ending in `JMP`,
    /// join-block". When `self` is concrete, both branches are *not* traced
    /// at all — only the taken one runs, matching the untraced/concrete
    /// evaluation path.
    pub fn if_then_else(
        &self,
        then_branch: impl FnOnce() -> Value,
        else_branch: impl FnOnce() -> Value,
    ) -> Value {
        match self {
            Cond::Concrete(true) => then_branch(),
            Cond::Concrete(false) => else_branch(),
            Cond::Symbolic(cond_ref, ctx) => {
                let then_block = ctx.new_block();
                let else_block = ctx.new_block();
                let join_block = ctx.new_block();
                let join_param = ctx.add_block_param(join_block);

                ctx.emit_branch(
                    *cond_ref,
                    BlockRef {
                        target: then_block,
                        args: Vec::new(),
                    },
                    BlockRef {
                        target: else_block,
                        args: Vec::new(),
                    },
                );

                ctx.set_current_block(then_block);
                let then_value = then_branch();
                let then_ref = then_value_ref(&then_value, ctx);
                ctx.emit_jmp(BlockRef {
                    target: join_block,
                    args: vec![then_ref],
                });

                ctx.set_current_block(else_block);
                let else_value = else_branch();
                let else_ref = then_value_ref(&else_value, ctx);
                ctx.emit_jmp(BlockRef {
                    target: join_block,
                    args: vec![else_ref],
                });

                ctx.set_current_block(join_block);
                Value::Symbolic(join_param, ctx.clone())
            }
        }
    }
}

fn then_value_ref(value: &Value, ctx: &TraceContext) -> ValueRef {
    match value {
        Value::Concrete(v) => ctx.emit_const(*v),
        Value::Symbolic(r, _) => *r,
    }
}

/// Traces the loop pattern spec.md §4.2 names: a header block that
/// re-evaluates `cond` against the current loop-carried value and branches
/// to either the body or the exit, a body block that runs one iteration and
/// jumps back to the header with the updated carried value, and an exit
/// block whose own block argument receives the carried value once the
/// condition goes false — the same "join pattern with block arguments
/// carrying the loop-carried values" `if_then_else` uses for its join block.
///
/// When `initial` is concrete, the loop is run directly in Rust rather than
/// traced at all (mirroring `if_then_else`'s untraced/concrete path),
/// bounded by [`MAX_UNROLL_ITERATIONS`] so a non-terminating concrete loop
/// fails fast instead of hanging trace construction.
pub fn while_loop(
    initial: Value,
    cond: impl Fn(&Value) -> Cond,
    body: impl Fn(Value) -> Value,
) -> Result<Value, TraceError> {
    match initial.ctx() {
        None => {
            let mut state = initial;
            let mut iterations = 0usize;
            loop {
                match cond(&state) {
                    Cond::Concrete(true) => {
                        state = body(state);
                        iterations += 1;
                        if iterations > MAX_UNROLL_ITERATIONS {
                            return Err(TraceError::LoopIterationBoundExceeded {
                                bound: MAX_UNROLL_ITERATIONS,
                            });
                        }
                    }
                    Cond::Concrete(false) => return Ok(state),
                    Cond::Symbolic(..) => {
                        unreachable!("loop condition turned symbolic on a concrete carried value")
                    }
                }
            }
        }
        Some(ctx) => {
            let ctx = ctx.clone();
            let header_block = ctx.new_block();
            let body_block = ctx.new_block();
            let exit_block = ctx.new_block();
            let header_param = ctx.add_block_param(header_block);
            let exit_param = ctx.add_block_param(exit_block);

            let initial_ref = then_value_ref(&initial, &ctx);
            ctx.emit_jmp(BlockRef {
                target: header_block,
                args: vec![initial_ref],
            });

            ctx.set_current_block(header_block);
            let header_value = Value::Symbolic(header_param, ctx.clone());
            let cond_ref = match cond(&header_value) {
                Cond::Symbolic(r, _) => r,
                Cond::Concrete(..) => {
                    unreachable!("loop condition turned concrete on a symbolic carried value")
                }
            };
            ctx.emit_branch(
                cond_ref,
                BlockRef {
                    target: body_block,
                    args: Vec::new(),
                },
                BlockRef {
                    target: exit_block,
                    args: vec![header_param],
                },
            );

            ctx.set_current_block(body_block);
            let body_result = body(header_value);
            let body_ref = then_value_ref(&body_result, &ctx);
            ctx.emit_jmp(BlockRef {
                target: header_block,
                args: vec![body_ref],
            });

            ctx.set_current_block(exit_block);
            Ok(Value::Symbolic(exit_param, ctx))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::interpret;

    #[test]
    fn concrete_arithmetic_matches_untraced_evaluation() {
        let a = Value::concrete(3);
        let b = Value::concrete(4);
        let result = a.add(&b).mul(&Value::concrete(2));
        assert_eq!(result.into_concrete(), Some(14));
    }

    #[test]
    fn traced_arithmetic_interprets_to_same_result_as_concrete() {
        // spec.md §8 invariant 2: interpreting the compiled IR and
        // interpreting the untraced function on identical inputs must agree.
        let untraced = {
            let a = Value::concrete(3);
            let b = Value::concrete(4);
            a.add(&b).mul(&Value::concrete(2)).into_concrete().unwrap()
        };

        let ctx = TraceContext::new();
        let a = Value::symbolic(&ctx, 3);
        let b = Value::symbolic(&ctx, 4);
        let result = a.add(&b).mul(&Value::symbolic(&ctx, 2));
        result.trace_return();
        let trace = ctx.into_trace();

        let interpreted = interpret(&trace, &[]).unwrap();
        assert_eq!(interpreted, untraced);
    }

    #[test]
    fn traced_if_then_else_matches_both_backends() {
        let ctx = TraceContext::new();
        let x = Value::symbolic(&ctx, 10);
        let cond = x.less_than(&Value::symbolic(&ctx, 5));
        let result = cond.if_then_else(
            || Value::symbolic(&ctx, 1),
            || Value::symbolic(&ctx, 2),
        );
        result.trace_return();
        let trace = ctx.into_trace();

        let interpreted = interpret(&trace, &[]).unwrap();
        assert_eq!(interpreted, 2);

        let compiled = crate::codegen::closure::compile(&trace).unwrap();
        assert_eq!(compiled.run(&[]).unwrap(), interpreted);
    }

    #[test]
    fn traced_while_loop_counts_a_symbolic_value_down_to_zero_on_both_backends() {
        let ctx = TraceContext::new();
        let n = Value::symbolic(&ctx, 5);
        let result = while_loop(
            n,
            |n| Value::symbolic(&ctx, 0).less_than(n),
            |n| n.sub(&Value::symbolic(&ctx, 1)),
        )
        .unwrap();
        result.trace_return();
        let trace = ctx.into_trace();

        let interpreted = interpret(&trace, &[]).unwrap();
        assert_eq!(interpreted, 0);

        let compiled = crate::codegen::closure::compile(&trace).unwrap();
        assert_eq!(compiled.run(&[]).unwrap(), interpreted);
    }

    #[test]
    fn concrete_while_loop_runs_without_tracing() {
        let result = while_loop(
            Value::concrete(5),
            |n| Value::concrete(0).less_than(n),
            |n| n.sub(&Value::concrete(1)),
        )
        .unwrap();
        assert_eq!(result.into_concrete(), Some(0));
    }

    #[test]
    fn concrete_while_loop_exceeding_the_unroll_bound_errors() {
        let result = while_loop(
            Value::concrete(0),
            |_| Cond::Concrete(true),
            |n| n.add(&Value::concrete(1)),
        );
        match result {
            Err(crate::error::TraceError::LoopIterationBoundExceeded { bound }) => {
                assert_eq!(bound, MAX_UNROLL_ITERATIONS);
            }
            _ => panic!("expected LoopIterationBoundExceeded"),
        }
    }
}
