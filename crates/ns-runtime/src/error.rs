//! Runtime failure modes (spec.md §7): all data-dependent, none of them
//! panic-worthy, matching `ns_buffers::PoolError`/`ns_input::ShredderError`.

use ns_common::Timestamp;
use snafu::Snafu;

#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum RuntimeError {
    #[snafu(display(
        "record timestamp {ts} is older than the allowed-lateness floor {floor}"
    ))]
    TooLate { ts: Timestamp, floor: Timestamp },

    #[snafu(display("reservoir capacity must be nonzero"))]
    EmptyReservoir,

    #[snafu(display("join slice {slice_start} was concurrently removed mid-probe"))]
    SliceEvicted { slice_start: i64 },
}
