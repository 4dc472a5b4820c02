//! Windowed aggregation and join runtime (spec.md §4.4): slice assignment,
//! the lift/combine/lower aggregation contract, watermark-driven
//! triggering, and the nested-loop join's slicing strategy.

#![deny(clippy::all)]

#[macro_use]
extern crate tracing;

pub mod aggregate;
pub mod error;
pub mod join;
pub mod lifecycle;
pub mod paged_hash_map;
pub mod paged_vector;
pub mod record;
pub mod slice;
pub mod slice_store;
pub mod trigger;
pub mod window;

pub use aggregate::{AggregateResult, Aggregator, Avg, Count, Max, Min, ReservoirSample, Sum};
pub use error::RuntimeError;
pub use join::NestedLoopJoin;
pub use paged_hash_map::PagedHashMap;
pub use paged_vector::PagedVector;
pub use record::Record;
pub use slice::Slice;
pub use slice_store::{SliceState, WorkerSliceStore};
pub use trigger::{TriggeredSlice, WindowOperator};
pub use window::WindowAssigner;
