use ns_common::SequenceNumber;
use snafu::Snafu;

/// Errors surfaced by [`crate::shredder::SequenceShredder`] and
/// [`crate::ring::RingShredder`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ShredderError {
    #[snafu(display(
        "sequence number {sequence} is outside the active window [{window_start}, {window_end})"
    ))]
    OutsideWindow {
        sequence: SequenceNumber,
        window_start: SequenceNumber,
        window_end: SequenceNumber,
    },

    #[snafu(display("sequence number {sequence} was already submitted"))]
    DuplicateSubmission { sequence: SequenceNumber },

    #[snafu(display(
        "ring slot for sequence {sequence} is still claimed by generation {held_generation}"
    ))]
    SlotContended {
        sequence: SequenceNumber,
        held_generation: u32,
    },
}

/// Errors surfaced while scanning a raw buffer for record boundaries.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ScanError {
    #[snafu(display("buffer carried no recognizable delimiter and exceeds the spanning-record limit of {limit} bytes"))]
    RecordTooLarge { limit: usize },

    #[snafu(display("field {field_index} of a reconstructed record is malformed: {reason}"))]
    MalformedField { field_index: usize, reason: String },
}
