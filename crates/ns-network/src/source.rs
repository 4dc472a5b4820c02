//! `NetworkSource` (spec.md §4.5): registers a `NesPartition` with the
//! partition manager and hands incoming buffers to the query manager for
//! the operator whose input corresponds to that partition.

use std::collections::HashMap;
use std::sync::Arc;

use ns_common::NesPartition;
use parking_lot::Mutex;
use snafu::OptionExt;
use tokio::sync::mpsc;

use crate::error::{NetworkError, PartitionNotRegisteredSnafu};
use crate::message::{DataBuffer, WireMessage};

/// What a `NetworkSource` hands to the query manager for a registered
/// operator: either a data buffer or the EOS token spec.md §4.5 describes
/// as injected "into the query-manager task queue keyed to its target
/// operator."
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorEvent {
    Data(DataBuffer),
    Eos { graceful: bool },
}

/// Tracks which operator channel each registered partition feeds.
#[derive(Default)]
pub struct PartitionManager {
    registered: Mutex<HashMap<NesPartition, mpsc::Sender<OperatorEvent>>>,
}

impl PartitionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, partition: NesPartition, sender: mpsc::Sender<OperatorEvent>) {
        self.registered.lock().insert(partition, sender);
    }

    pub fn unregister(&self, partition: &NesPartition) {
        self.registered.lock().remove(partition);
    }

    #[must_use]
    pub fn is_registered(&self, partition: &NesPartition) -> bool {
        self.registered.lock().contains_key(partition)
    }

    /// Hands `event` to the channel registered for `partition`, blocking
    /// (back-pressuring the caller) if that operator's channel is full.
    /// Dropping the lock before awaiting the send keeps the registry
    /// available to other partitions while this one is back-pressured.
    pub async fn dispatch(&self, partition: &NesPartition, event: OperatorEvent) -> Result<(), NetworkError> {
        let sender = {
            let registered = self.registered.lock();
            registered
                .get(partition)
                .cloned()
                .context(PartitionNotRegisteredSnafu { partition: *partition })?
        };
        // The receiving operator having gone away is not this source's
        // concern to report; the query manager already knows its own
        // pipeline is torn down.
        let _ = sender.send(event).await;
        Ok(())
    }
}

pub struct NetworkSource {
    manager: Arc<PartitionManager>,
}

impl NetworkSource {
    #[must_use]
    pub fn new(manager: Arc<PartitionManager>) -> Self {
        Self { manager }
    }

    /// Routes one incoming wire message to its registered operator.
    /// `RegisterPartition`/`RegisterAck` are handled by the registration
    /// handshake, not here; anything else not covered by spec.md §4.5's
    /// control-message list is logged and dropped.
    pub async fn handle_message(&self, message: WireMessage) -> Result<(), NetworkError> {
        match message {
            WireMessage::Data { partition, header, payload } => {
                self.manager
                    .dispatch(&partition, OperatorEvent::Data(DataBuffer { header, payload }))
                    .await?;
            }
            WireMessage::Eos { partition, graceful } => {
                self.manager.dispatch(&partition, OperatorEvent::Eos { graceful }).await?;
            }
            WireMessage::QueryReconfig { partition, .. } => {
                debug!(%partition, "query reconfiguration message received");
            }
            WireMessage::Error {
                partition,
                error_type,
                details,
            } => {
                warn!(%partition, ?error_type, %details, "network error message received");
            }
            WireMessage::RegisterPartition { .. } | WireMessage::RegisterAck { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DataHeader, ErrorType};
    use ns_common::{OperatorId, PartitionId, QueryId, SubpartitionId};

    fn partition() -> NesPartition {
        NesPartition {
            query_id: QueryId::new(1),
            operator_id: OperatorId::new(2),
            partition_id: PartitionId::new(3),
            subpartition_id: SubpartitionId::new(0),
        }
    }

    #[tokio::test]
    async fn data_for_a_registered_partition_reaches_its_operator_channel() {
        let manager = Arc::new(PartitionManager::new());
        let (tx, mut rx) = mpsc::channel(8);
        manager.register(partition(), tx);
        let source = NetworkSource::new(Arc::clone(&manager));

        source
            .handle_message(WireMessage::Data {
                partition: partition(),
                header: DataHeader {
                    sequence_number: 1,
                    chunk_number: 0,
                    origin_id: 1,
                    tuple_count: 1,
                    tuple_width: 8,
                    watermark: 0,
                    creation_ts: 0,
                    last_chunk: true,
                },
                payload: vec![9, 9],
            })
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, OperatorEvent::Data(buffer) if buffer.payload == vec![9, 9]));
    }

    #[tokio::test]
    async fn eos_injects_an_eos_token_for_the_target_operator() {
        let manager = Arc::new(PartitionManager::new());
        let (tx, mut rx) = mpsc::channel(8);
        manager.register(partition(), tx);
        let source = NetworkSource::new(Arc::clone(&manager));

        source
            .handle_message(WireMessage::Eos {
                partition: partition(),
                graceful: true,
            })
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), OperatorEvent::Eos { graceful: true });
    }

    #[tokio::test]
    async fn data_for_an_unregistered_partition_is_rejected() {
        let manager = Arc::new(PartitionManager::new());
        let source = NetworkSource::new(manager);
        let result = source
            .handle_message(WireMessage::Eos {
                partition: partition(),
                graceful: false,
            })
            .await;
        assert!(matches!(result, Err(NetworkError::PartitionNotRegistered { .. })));
    }

    #[tokio::test]
    async fn error_messages_are_surfaced_without_failing_the_handler() {
        let manager = Arc::new(PartitionManager::new());
        let source = NetworkSource::new(manager);
        source
            .handle_message(WireMessage::Error {
                partition: partition(),
                error_type: ErrorType::Decode,
                details: "malformed frame".to_string(),
            })
            .await
            .unwrap();
    }
}
