//! Transport abstraction the sink actor drives: a [`Connector`] produces a
//! [`SinkTransport`] for a given [`Target`], and the transport writes one
//! [`WireMessage`] at a time. Generic over both so the sink's state machine
//! is exercised against a deterministic in-memory transport in tests and a
//! real `tokio::net::TcpStream` in production, the way `ns-runtime`'s
//! `Aggregator` trait keeps its trigger loop generic over the aggregation
//! kind instead of reaching for dynamic dispatch.

use async_trait::async_trait;
use futures::SinkExt;
use snafu::ResultExt;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::{ConnectSnafu, IoSnafu, NetworkError};
use crate::message::{encode_message, WireMessage};
use crate::sink::Target;

#[async_trait]
pub trait SinkTransport: Send + 'static {
    async fn send(&mut self, message: &WireMessage) -> Result<(), NetworkError>;
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: SinkTransport;

    async fn connect(&self, target: &Target) -> Result<Self::Transport, NetworkError>;
}

pub struct TcpTransport {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

#[async_trait]
impl SinkTransport for TcpTransport {
    async fn send(&mut self, message: &WireMessage) -> Result<(), NetworkError> {
        let bytes = encode_message(message)?;
        self.framed.send(bytes).await.context(IoSnafu)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Transport = TcpTransport;

    async fn connect(&self, target: &Target) -> Result<TcpTransport, NetworkError> {
        let stream = TcpStream::connect((target.host.as_str(), target.port))
            .await
            .context(ConnectSnafu {
                host: target.host.clone(),
                port: target.port,
            })?;
        Ok(TcpTransport {
            framed: Framed::new(stream, LengthDelimitedCodec::new()),
        })
    }
}
