//! Errors surfaced by the network sink/source layer (spec.md §7's "Channel
//! error" and "Invariant violation" kinds, scoped to the transport edge).

use ns_common::NesPartition;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum NetworkError {
    #[snafu(display("partition {partition} is not registered"))]
    PartitionNotRegistered { partition: NesPartition },

    #[snafu(display("failed to connect to {host}:{port}: {source}"))]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    #[snafu(display("i/o error writing to network transport: {source}"))]
    Io { source: std::io::Error },

    #[snafu(display("failed to encode wire message: {source}"))]
    Encode { source: serde_json::Error },

    #[snafu(display("failed to decode wire message: {source}"))]
    Decode { source: serde_json::Error },

    #[snafu(display("network sink has stopped and cannot accept more buffers"))]
    SinkStopped,
}
