//! Schema and memory layout: maps a logical tuple (named, typed fields) to a
//! byte layout over a `ns_buffers::TupleBuffer`, the way spec.md §3/§4.1
//! describe.

#![deny(clippy::all)]

pub mod field;
pub mod layout;
pub mod schema;

pub use field::{DataType, Field};
pub use layout::{BoundLayout, ColumnLayout, LayoutError, LayoutKind, RowLayout};
pub use schema::Schema;
