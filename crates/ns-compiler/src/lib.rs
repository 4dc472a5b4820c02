//! Nautilus-style trace-based compilation: operator implementations are
//! traced once against symbolic [`Value`]s, the raw trace is rewritten into
//! SSA form, and the result is handed to one of two code generator
//! back-ends (spec.md §4.2).
//!
//! There is no analogue of this subsystem in `vector` — its pipelines are
//! interpreted transforms, not compiled ones — so this crate is grounded
//! instead in the functional-IR shape common to dataflow query engines in
//! the wider pack (`differential-dataflow`'s operator composition, and
//! `noir`'s trace-free operator chaining), adapted to the block-argument
//! SSA style spec.md §3/§4.2 describes for Nautilus's IR.

#![deny(clippy::all)]

pub mod codegen;
pub mod context;
pub mod error;
pub mod ir;
pub mod ssa;
pub mod value;

pub use context::TraceContext;
pub use error::{IrError, TraceError};
pub use ir::{BasicBlock, BlockId, Opcode, Operation, Trace, ValueRef};
pub use value::{while_loop, Cond, Value};
