//! Newtype identifiers threaded through buffers, partitions and pipelines.
//!
//! Keeping these as distinct types (rather than bare `u64`) is what lets
//! `NesPartition` and friends catch "origin id passed where sequence number
//! expected" mistakes at compile time instead of at 3am.

use std::fmt;

macro_rules! id_newtype {
    ($name:ident, $repr:ty) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $repr);

        impl $name {
            #[must_use]
            pub const fn new(value: $repr) -> Self {
                Self(value)
            }

            #[must_use]
            pub const fn get(self) -> $repr {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$repr> for $name {
            fn from(value: $repr) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(OriginId, u64);
id_newtype!(SequenceNumber, u64);
id_newtype!(ChunkNumber, u32);
id_newtype!(QueryId, u64);
id_newtype!(QuerySubPlanId, u64);
id_newtype!(OperatorId, u64);
id_newtype!(PartitionId, u32);
id_newtype!(SubpartitionId, u32);
id_newtype!(WorkerId, u64);

impl SequenceNumber {
    /// The first sequence number an origin ever issues.
    pub const FIRST: SequenceNumber = SequenceNumber(1);

    #[must_use]
    pub fn next(self) -> Self {
        SequenceNumber(self.0 + 1)
    }
}

/// `NesPartition` from spec.md §3: the addressing tuple a `NetworkSource`
/// registers and a `NetworkSink` targets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct NesPartition {
    pub query_id: QueryId,
    pub operator_id: OperatorId,
    pub partition_id: PartitionId,
    pub subpartition_id: SubpartitionId,
}

impl fmt::Display for NesPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}::{}::{}",
            self.query_id, self.operator_id, self.partition_id, self.subpartition_id
        )
    }
}
