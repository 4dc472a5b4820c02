//! Network sink/source with asynchronous reconnect (spec.md §4.5): the
//! wire protocol between workers, the sink's connect/buffer/reconnect
//! state machine, and the source's partition-addressed dispatch.

#![deny(clippy::all)]

#[macro_use]
extern crate tracing;

pub mod error;
pub mod message;
pub mod sink;
pub mod source;
pub mod transport;

pub use error::NetworkError;
pub use message::{decode_message, encode_message, DataBuffer, DataHeader, ErrorType, WireMessage};
pub use sink::{NetworkSink, SinkState, Target};
pub use source::{NetworkSource, OperatorEvent, PartitionManager};
pub use transport::{Connector, SinkTransport, TcpConnector, TcpTransport};
