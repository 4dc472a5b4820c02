//! Wire protocol between workers (spec.md §6): one `WireMessage` per frame,
//! framed length-delimited (`tokio_util::codec::LengthDelimitedCodec`) and
//! encoded with `serde_json` — spec.md names a wire encoding only for the
//! compiled-pipeline cache (`.pb`, `prost`); the inter-worker messages get
//! the lighter encoding since no format is named for them.

use bytes::Bytes;
use ns_common::NesPartition;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::error::{DecodeSnafu, EncodeSnafu, NetworkError};

/// `DATA`'s header: `(sequenceNumber, chunkNumber, originId, tupleCount,
/// tupleWidth, watermark, creationTs, lastChunkFlag)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataHeader {
    pub sequence_number: u64,
    pub chunk_number: u32,
    pub origin_id: u64,
    pub tuple_count: u32,
    pub tuple_width: u32,
    pub watermark: i64,
    pub creation_ts: i64,
    pub last_chunk: bool,
}

/// A buffer ready to be written to (or just read from) the wire: header
/// plus the raw tuple bytes in the buffer's layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBuffer {
    pub header: DataHeader,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorType {
    PartitionNotRegistered,
    Decode,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    RegisterPartition {
        partition: NesPartition,
    },
    RegisterAck {
        partition: NesPartition,
        ok: bool,
    },
    Data {
        partition: NesPartition,
        header: DataHeader,
        payload: Vec<u8>,
    },
    Eos {
        partition: NesPartition,
        graceful: bool,
    },
    QueryReconfig {
        partition: NesPartition,
        to_replace: Vec<(u64, u64)>,
        to_start: Vec<u64>,
        to_stop: Vec<u64>,
    },
    Error {
        partition: NesPartition,
        error_type: ErrorType,
        details: String,
    },
}

pub fn encode_message(message: &WireMessage) -> Result<Bytes, NetworkError> {
    let bytes = serde_json::to_vec(message).context(EncodeSnafu)?;
    Ok(Bytes::from(bytes))
}

pub fn decode_message(bytes: &[u8]) -> Result<WireMessage, NetworkError> {
    serde_json::from_slice(bytes).context(DecodeSnafu)
}
