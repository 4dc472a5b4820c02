//! Identity and sizing primitives shared by every crate in the workspace.
//!
//! This mirrors the role `vector_common` plays for `vector`: small,
//! dependency-light types that every other crate needs and that otherwise
//! would get redefined (badly) in each of them.

#![deny(clippy::all)]

pub mod ids;
pub mod size;
pub mod time;

pub use ids::{
    ChunkNumber, NesPartition, OperatorId, OriginId, PartitionId, QueryId, QuerySubPlanId,
    SequenceNumber, SubpartitionId, WorkerId,
};
pub use size::ByteSizeOf;
pub use time::Timestamp;
