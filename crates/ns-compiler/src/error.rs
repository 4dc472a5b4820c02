use snafu::Snafu;

use crate::ir::BlockId;

/// Trace construction failed — spec.md §4.2: "trace construction fails with
/// a *trace-error* if an unsupported operation appears". Fatal for
/// compilation of the affected pipeline.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum TraceError {
    #[snafu(display("unsupported operation traced: {what}"))]
    UnsupportedOperation { what: String },
    #[snafu(display("trace exceeded the maximum unrolled loop iteration bound ({bound})"))]
    LoopIterationBoundExceeded { bound: usize },
    #[snafu(display("value {value:?} was used outside of the trace that produced it"))]
    ValueEscapedTrace { value: crate::ir::ValueRef },
}

/// SSA construction failed — spec.md §4.2: "SSA construction fails with an
/// *ir-invariant-violation* on malformed input (missing block refs,
/// unreachable joins)". Fatal for the affected pipeline.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum IrError {
    #[snafu(display("block {block:?} is referenced but was never defined"))]
    MissingBlock { block: BlockId },
    #[snafu(display("block {block:?} is unreachable from the entry block"))]
    UnreachableBlock { block: BlockId },
    #[snafu(display(
        "jump to block {block:?} supplies {supplied} arguments but it declares {expected}"
    ))]
    BlockArgArityMismatch {
        block: BlockId,
        supplied: usize,
        expected: usize,
    },
    #[snafu(display("value {value:?} is used before it dominates the use site"))]
    ValueDoesNotDominateUse { value: crate::ir::ValueRef },
    #[snafu(display("block {block:?} has no terminator operation"))]
    MissingTerminator { block: BlockId },
}
