//! RPC transport adapter
//!
//! Moves envelopes to a specific neighbor cell by casting them onto
//! that cell's own broker, using connection parameters derived from
//! the neighbor's catalog record.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use crate::context::RequestContext;

use super::domain_types::{CellRecord, ConnectionParams, TopicName, WireMessage};
use super::traits::{BrokerClient, CellTransport, TransportError};

/// Derives broker connection parameters from a neighbor record,
/// renaming catalog fields to transport fields and omitting empties.
#[must_use]
pub fn connection_params(cell: &CellRecord) -> ConnectionParams {
    fn nonempty(value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    }

    ConnectionParams {
        username: nonempty(&cell.connection.username),
        password: nonempty(&cell.connection.password),
        hostname: nonempty(&cell.connection.rpc_host),
        port: cell.connection.rpc_port,
        virtual_host: nonempty(&cell.connection.rpc_virtual_host),
    }
}

/// Sends fabric envelopes over the message broker.
pub struct RpcCellTransport {
    broker: Arc<dyn BrokerClient>,
    cells_topic: TopicName,
}

impl RpcCellTransport {
    /// Creates an adapter casting onto `cells_topic` at each neighbor.
    pub fn new(broker: Arc<dyn BrokerClient>, cells_topic: TopicName) -> Self {
        Self {
            broker,
            cells_topic,
        }
    }

    fn encode(message: &WireMessage) -> Result<Value, TransportError> {
        Ok(serde_json::to_value(message)?)
    }
}

#[async_trait]
impl CellTransport for RpcCellTransport {
    async fn send_to_cell(
        &self,
        ctx: &RequestContext,
        cell: &CellRecord,
        message: &WireMessage,
    ) -> Result<(), TransportError> {
        let params = connection_params(cell);
        trace!(cell = %cell.name, "casting envelope to cell");
        self.broker
            .cast_to_server(ctx, &params, &self.cells_topic, Self::encode(message)?)
            .await
    }

    async fn fanout_to_cell(
        &self,
        ctx: &RequestContext,
        cell: &CellRecord,
        message: &WireMessage,
    ) -> Result<(), TransportError> {
        let params = connection_params(cell);
        trace!(cell = %cell.name, "fanout-casting envelope to cell");
        self.broker
            .fanout_cast_to_server(ctx, &params, &self.cells_topic, Self::encode(message)?)
            .await
    }

    async fn cast_local(
        &self,
        ctx: &RequestContext,
        topic: &TopicName,
        payload: Value,
    ) -> Result<(), TransportError> {
        self.broker.cast(ctx, topic, payload).await
    }
}
