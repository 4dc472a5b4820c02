//! The fixed-size pooled byte regions that every other crate in the
//! workspace moves data around in.
//!
//! This plays the role `vector_buffers` plays for `vector`: unlike that
//! crate, which buffers `Event`s in an in-memory or on-disk channel, this one
//! buffers raw bytes (`TupleBuffer`) in a fixed-capacity, fixed-count pool —
//! the lower-level primitive spec.md §4.1 describes, that `Schema`/`Layout`
//! and the raw-input scan are built on top of.

#![deny(clippy::all)]

#[macro_use]
extern crate tracing;

pub mod buffer;
pub mod pool;

pub use buffer::TupleBuffer;
pub use pool::{BufferPool, PoolError};
