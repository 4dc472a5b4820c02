//! The thread-local-in-spirit trace context. SPEC_FULL.md §9 notes the
//! original design passes this via a thread-local because the same operator
//! code runs both from the tracer and from compiled code; here it is a
//! plain value threaded explicitly (an `Rc<RefCell<_>>` so `Value::if_then_else`
//! and friends can mutate it without every call site needing `&mut`), which
//! is the systems-language rewrite spec.md §9 calls for.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ir::{
    binop, cmp_op, const_op, jmp_op, return_op, unop, BasicBlock, BlockId, BlockRef, Opcode,
    Trace, ValueRef,
};

#[derive(Default)]
struct Inner {
    trace: Trace,
    next_value: u32,
    next_block: u32,
    current: Option<BlockId>,
}

/// A handle to the in-progress trace. Cheap to clone; all clones observe the
/// same underlying trace.
#[derive(Clone)]
pub struct TraceContext {
    inner: Rc<RefCell<Inner>>,
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceContext {
    #[must_use]
    pub fn new() -> Self {
        let ctx = Self {
            inner: Rc::new(RefCell::new(Inner::default())),
        };
        let entry = ctx.new_block();
        ctx.inner.borrow_mut().current = Some(entry);
        ctx
    }

    #[must_use]
    pub fn entry_block(&self) -> BlockId {
        self.inner.borrow().trace.blocks[0].id()
    }

    #[must_use]
    pub fn current_block(&self) -> BlockId {
        self.inner.borrow().current.expect("context always has a current block")
    }

    pub fn set_current_block(&self, id: BlockId) {
        self.inner.borrow_mut().current = Some(id);
    }

    /// Creates a new, empty block with no predecessors or params yet and
    /// returns its id without switching to it.
    pub fn new_block(&self) -> BlockId {
        let mut inner = self.inner.borrow_mut();
        let id = BlockId(inner.next_block);
        inner.next_block += 1;
        inner.trace.blocks.push(BasicBlock {
            id_: Some(id),
            predecessors: Vec::new(),
            params: Vec::new(),
            ops: Vec::new(),
        });
        id
    }

    /// Declares a formal parameter on `block`, returning its `ValueRef`.
    pub fn add_block_param(&self, block: BlockId) -> ValueRef {
        let value = self.fresh_value();
        let mut inner = self.inner.borrow_mut();
        let b = inner.trace.block_mut(block).expect("block exists");
        b.params.push(value);
        value
    }

    fn fresh_value(&self) -> ValueRef {
        let mut inner = self.inner.borrow_mut();
        let v = ValueRef(inner.next_value);
        inner.next_value += 1;
        v
    }

    fn push_op(&self, op: crate::ir::Operation) {
        let mut inner = self.inner.borrow_mut();
        let current = inner.current.expect("context always has a current block");
        let block = inner.trace.block_mut(current).expect("current block exists");
        block.ops.push(op);
    }

    pub fn emit_const(&self, value: i64) -> ValueRef {
        let result = self.fresh_value();
        self.push_op(const_op(result, value));
        result
    }

    pub fn emit_binop(&self, opcode: Opcode, a: ValueRef, b: ValueRef) -> ValueRef {
        let result = self.fresh_value();
        self.push_op(binop(opcode, a, b, result));
        result
    }

    pub fn emit_unop(&self, opcode: Opcode, a: ValueRef) -> ValueRef {
        let result = self.fresh_value();
        self.push_op(unop(opcode, a, result));
        result
    }

    /// Emits the `CMP` terminator of a condition block and records the
    /// branch targets' predecessor edges.
    pub fn emit_branch(&self, cond: ValueRef, then_ref: BlockRef, else_ref: BlockRef) {
        let current = self.current_block();
        self.add_predecessor(then_ref.target, current);
        self.add_predecessor(else_ref.target, current);
        self.push_op(cmp_op(cond, then_ref, else_ref));
    }

    pub fn emit_jmp(&self, target_ref: BlockRef) {
        let current = self.current_block();
        self.add_predecessor(target_ref.target, current);
        self.push_op(jmp_op(target_ref));
    }

    pub fn emit_return(&self, value: ValueRef) {
        self.push_op(return_op(value));
    }

    fn add_predecessor(&self, block: BlockId, pred: BlockId) {
        let mut inner = self.inner.borrow_mut();
        let b = inner.trace.block_mut(block).expect("block exists");
        if !b.predecessors.contains(&pred) {
            b.predecessors.push(pred);
        }
    }

    /// Consumes the context, returning the finished trace. Callers normally
    /// do this once, after emitting a `RETURN` in every terminal block.
    #[must_use]
    pub fn into_trace(self) -> Trace {
        Rc::try_unwrap(self.inner)
            .unwrap_or_else(|rc| RefCell::new(rc.borrow().clone_for_shared_owner()))
            .into_inner()
            .trace
    }
}

impl Inner {
    fn clone_for_shared_owner(&self) -> Inner {
        Inner {
            trace: self.trace.clone(),
            next_value: self.next_value,
            next_block: self.next_block,
            current: self.current,
        }
    }
}
