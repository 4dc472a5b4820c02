//! Raw-input format scanning and the sequence shredder (spec.md §4.3):
//! turning a stream of fixed-size raw buffers, arriving in any order,
//! into an ordered stream of delimited records — including the ones that
//! happen to straddle a buffer boundary.

#![deny(clippy::all)]

#[macro_use]
extern crate tracing;

pub mod error;
pub mod indexer;
pub mod ring;
pub mod scan;
pub mod shredder;
pub mod staged;

pub use error::{ScanError, ShredderError};
pub use indexer::{index_delimiters, DelimiterIndex};
pub use ring::RingShredder;
pub use scan::{RawInputFormatScan, ScannedRecord};
pub use shredder::{ResolvedChain, SequenceShredder};
pub use staged::StagedBuffer;
