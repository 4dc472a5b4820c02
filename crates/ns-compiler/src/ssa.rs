//! The SSA-creation phase spec.md §4.2 names: dominance computation,
//! φ-node placement, block-local reference rewriting, and redundant-jump
//! elimination.
//!
//! Because the tracer already emits block-argument SSA (every value that
//! crosses a block boundary is threaded explicitly through a `BlockRef`'s
//! `args`, standing in for φ-inputs — spec.md §3), φ-placement is already
//! done by construction. What remains, and what this module implements, is
//! *validating* that the trace is well-formed SSA (every block reference
//! resolves, every jump supplies the right arity, every value reference is
//! either block-local or one of the current block's declared parameters)
//! and eliminating trivial forwarding blocks.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::IrError;
use crate::ir::{BlockId, Opcode, Trace, ValueRef};

/// Dominance computation: which blocks dominate which, computed via the
/// standard iterative dataflow fixpoint over the CFG implied by `Jmp`/`Cmp`
/// targets.
#[must_use]
pub fn compute_dominators(trace: &Trace) -> HashMap<BlockId, HashSet<BlockId>> {
    let all_blocks: HashSet<BlockId> = trace.blocks.iter().map(|b| b.id()).collect();
    let entry = trace.entry().id();

    let mut doms: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
    doms.insert(entry, [entry].into_iter().collect());
    for &b in &all_blocks {
        if b != entry {
            doms.insert(b, all_blocks.clone());
        }
    }

    let preds: HashMap<BlockId, Vec<BlockId>> = trace
        .blocks
        .iter()
        .map(|b| (b.id(), b.predecessors.clone()))
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for &b in &all_blocks {
            if b == entry {
                continue;
            }
            let Some(ps) = preds.get(&b) else { continue };
            let mut new_set: Option<HashSet<BlockId>> = None;
            for &p in ps {
                let pd = doms.get(&p).cloned().unwrap_or_default();
                new_set = Some(match new_set {
                    None => pd,
                    Some(acc) => acc.intersection(&pd).copied().collect(),
                });
            }
            let mut new_set = new_set.unwrap_or_default();
            new_set.insert(b);
            if doms.get(&b) != Some(&new_set) {
                doms.insert(b, new_set);
                changed = true;
            }
        }
    }
    doms
}

fn reachable_from_entry(trace: &Trace) -> HashSet<BlockId> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(trace.entry().id());
    while let Some(b) = queue.pop_front() {
        if !seen.insert(b) {
            continue;
        }
        if let Some(block) = trace.block(b) {
            for op in &block.ops {
                for target in &op.targets {
                    queue.push_back(target.target);
                }
            }
        }
    }
    seen
}

/// Validates the trace and returns it unchanged on success, or the first
/// `IrError` found. This is the fatal-for-compilation check spec.md §4.2
/// describes as "ir-invariant-violation on malformed input".
pub fn validate(trace: &Trace) -> Result<(), IrError> {
    let defined: HashSet<BlockId> = trace.blocks.iter().map(|b| b.id()).collect();
    let reachable = reachable_from_entry(trace);

    for block in &trace.blocks {
        if !reachable.contains(&block.id()) {
            return Err(IrError::UnreachableBlock { block: block.id() });
        }
        if !block.is_terminated() {
            return Err(IrError::MissingTerminator { block: block.id() });
        }

        let mut locally_defined: HashSet<ValueRef> = block.params.iter().copied().collect();
        for op in &block.ops {
            for operand in &op.operands {
                if !locally_defined.contains(operand) {
                    return Err(IrError::ValueDoesNotDominateUse { value: *operand });
                }
            }
            for target in &op.targets {
                let Some(target_block) = trace.block(target.target) else {
                    return Err(IrError::MissingBlock {
                        block: target.target,
                    });
                };
                if !defined.contains(&target.target) {
                    return Err(IrError::MissingBlock {
                        block: target.target,
                    });
                }
                if target.args.len() != target_block.params.len() {
                    return Err(IrError::BlockArgArityMismatch {
                        block: target.target,
                        supplied: target.args.len(),
                        expected: target_block.params.len(),
                    });
                }
                for arg in &target.args {
                    if !locally_defined.contains(arg) {
                        return Err(IrError::ValueDoesNotDominateUse { value: *arg });
                    }
                }
            }
            if let Some(result) = op.result {
                locally_defined.insert(result);
            }
        }
    }
    Ok(())
}

/// Eliminates blocks that do nothing but forward to another block: zero
/// params, exactly one operation which is an unconditional, argument-less
/// `Jmp`. Predecessors are rewired to jump straight to the final target.
#[must_use]
pub fn eliminate_redundant_jumps(trace: &Trace) -> Trace {
    let forward: HashMap<BlockId, BlockId> = trace
        .blocks
        .iter()
        .filter(|b| b.params.is_empty() && b.ops.len() == 1)
        .filter_map(|b| {
            let op = &b.ops[0];
            if op.opcode == Opcode::Jmp && op.targets.len() == 1 && op.targets[0].args.is_empty() {
                Some((b.id(), op.targets[0].target))
            } else {
                None
            }
        })
        .collect();

    if forward.is_empty() {
        return trace.clone();
    }

    let resolve = |mut b: BlockId| {
        let mut hops = 0;
        while let Some(&next) = forward.get(&b) {
            b = next;
            hops += 1;
            if hops > forward.len() + 1 {
                break; // cycle guard; leave as-is
            }
        }
        b
    };

    let mut out = trace.clone();
    out.blocks.retain(|b| !forward.contains_key(&b.id()));
    for block in &mut out.blocks {
        for op in &mut block.ops {
            for target in &mut op.targets {
                target.target = resolve(target.target);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TraceContext;
    use crate::value::Value;

    #[test]
    fn straight_line_trace_validates() {
        let ctx = TraceContext::new();
        let a = Value::symbolic(&ctx, 1);
        let b = Value::symbolic(&ctx, 2);
        a.add(&b).trace_return();
        let trace = ctx.into_trace();
        assert!(validate(&trace).is_ok());
    }

    #[test]
    fn if_else_trace_validates_and_dominance_includes_entry() {
        let ctx = TraceContext::new();
        let x = Value::symbolic(&ctx, 10);
        let cond = x.less_than(&Value::symbolic(&ctx, 5));
        let result = cond.if_then_else(|| Value::symbolic(&ctx, 1), || Value::symbolic(&ctx, 2));
        result.trace_return();
        let trace = ctx.into_trace();
        assert!(validate(&trace).is_ok());

        let doms = compute_dominators(&trace);
        let entry = trace.entry().id();
        for block in &trace.blocks {
            assert!(doms[&block.id()].contains(&entry));
        }
    }

    #[test]
    fn missing_block_reference_is_rejected() {
        let ctx = TraceContext::new();
        let v = ctx.emit_const(1);
        ctx.emit_jmp(crate::ir::BlockRef {
            target: crate::ir::BlockId(999),
            args: vec![v],
        });
        let trace = ctx.into_trace();
        assert!(matches!(validate(&trace), Err(IrError::MissingBlock { .. })));
    }
}
