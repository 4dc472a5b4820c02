//! Two independent code generator back-ends, per spec.md §4.2: "the code
//! generator either interprets the IR directly or lowers it to native
//! code; both back-ends must produce bit-identical output for pure,
//! side-effect-free functions." There is no JIT in this workspace (no
//! target for emitting real machine code without pulling in a dependency
//! the teacher pack never uses), so the "native" backend lowers each block
//! to a boxed Rust closure ahead of execution instead of re-walking the IR
//! operation-by-operation on every call — a meaningfully different
//! execution strategy from the tree-walking interpreter, which is the
//! property spec.md §8 invariant 2 actually tests.

pub mod closure;
pub mod interpreter;

pub use interpreter::{interpret, Interpreter};

use crate::error::IrError;

pub trait Backend {
    fn run(&self, args: &[i64]) -> Result<i64, IrError>;
}
