//! Trait seams and error taxonomy for the cell fabric
//!
//! The fabric's external collaborators (catalog, broker, service APIs)
//! and its internal extension points (message handlers, periodic tasks)
//! are all reached through these interfaces, keeping the routing core
//! testable against in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::context::RequestContext;

use super::domain_types::{
    CatalogCellEntry, CellRecord, ConnectionParams, Fields, MethodArgs, MethodName, ResultInfo,
    RoutePath, TopicName, WireMessage,
};

/// A failure that happened at another cell, rebuilt from the wire
/// `[class, message, detail]` triple.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("remote error {class}: {message}")]
pub struct RemoteError {
    pub class: String,
    pub message: String,
    pub detail: String,
}

impl RemoteError {
    /// Rebuilds a remote failure from a response's `result` payload.
    ///
    /// A malformed payload still produces an error carrying the raw
    /// text rather than dropping the failure on the floor.
    #[must_use]
    pub fn from_result(result: &Value) -> Self {
        let as_str = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_owned);
        match result.as_array() {
            Some(triple) => Self {
                class: as_str(triple.first()).unwrap_or_else(|| "RemoteError".to_owned()),
                message: as_str(triple.get(1)).unwrap_or_default(),
                detail: as_str(triple.get(2)).unwrap_or_default(),
            },
            None => Self {
                class: "RemoteError".to_owned(),
                message: result.to_string(),
                detail: String::new(),
            },
        }
    }
}

/// Errors from the cell catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("instance {uuid} not found")]
    InstanceNotFound { uuid: String },

    #[error("catalog unavailable: {source}")]
    Unavailable {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Errors from the broker transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("broker cast failed: {source}")]
    Broker {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("envelope encoding failed: {source}")]
    Encode {
        #[from]
        source: serde_json::Error,
    },
}

impl TransportError {
    /// Wraps any broker-side failure.
    pub fn broker(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Broker {
            source: source.into(),
        }
    }
}

/// Errors from a bound service API.
#[derive(Debug, Error)]
pub enum ServiceApiError {
    #[error("service API method not found: {detail}")]
    MethodNotFound { detail: String },

    #[error("service API call failed: {source}")]
    Failed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl ServiceApiError {
    /// Wraps any failure raised inside an invoked API method.
    pub fn failed(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Failed {
            source: source.into(),
        }
    }
}

/// Errors from a locally-dispatched cell message handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("unknown cell message method: {method}")]
    UnknownMethod { method: MethodName },

    #[error("bad arguments for {method}: {reason}")]
    BadArgs { method: MethodName, reason: String },

    #[error(transparent)]
    ServiceApi(#[from] ServiceApiError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("{source}")]
    Failed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl HandlerError {
    /// Wraps any failure raised inside a handler.
    pub fn failed(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Failed {
            source: source.into(),
        }
    }
}

/// Errors surfaced by the routing core.
#[derive(Debug, Error)]
pub enum FabricError {
    #[error("routing inconsistency: {reason}")]
    RoutingInconsistency { reason: String },

    #[error("no response within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error("cell fabric is disabled")]
    Disabled,

    #[error("response channel closed before delivery")]
    ResponseChannelClosed,
}

impl FabricError {
    /// The class name used in a failure triple on the wire.
    #[must_use]
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::RoutingInconsistency { .. } => "RoutingInconsistency",
            Self::Timeout { .. } => "Timeout",
            Self::Remote(_) => "RemoteError",
            Self::Transport(_) => "TransportError",
            Self::Handler(HandlerError::ServiceApi(ServiceApiError::MethodNotFound { .. })) => {
                "ServiceAPIMethodNotFound"
            }
            Self::Handler(HandlerError::ServiceApi(_)) => "ServiceAPIError",
            Self::Handler(HandlerError::Catalog(_)) => "CatalogError",
            Self::Handler(_) => "HandlerError",
            Self::Disabled => "Disabled",
            Self::ResponseChannelClosed => "ResponseChannelClosed",
        }
    }

    /// Packages this error as a failure [`ResultInfo`] for the wire.
    #[must_use]
    pub fn to_result_info(&self) -> ResultInfo {
        ResultInfo::failure(self.class_name(), &self.to_string(), &format!("{self:?}"))
    }
}

/// The external catalog of cells and replicated instance records.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Lists every cell adjacent to this one, parents and children.
    async fn list_cells(&self, ctx: &RequestContext) -> Result<Vec<CatalogCellEntry>, CatalogError>;

    /// Fetches one instance record by uuid.
    async fn instance_get_by_uuid(
        &self,
        ctx: &RequestContext,
        uuid: &str,
    ) -> Result<Fields, CatalogError>;

    /// Updates an existing instance record.
    async fn instance_update(
        &self,
        ctx: &RequestContext,
        uuid: &str,
        fields: Fields,
    ) -> Result<(), CatalogError>;

    /// Creates a new instance record.
    async fn instance_create(
        &self,
        ctx: &RequestContext,
        fields: Fields,
    ) -> Result<(), CatalogError>;

    /// Deletes an instance record by uuid.
    async fn instance_destroy(&self, ctx: &RequestContext, uuid: &str) -> Result<(), CatalogError>;

    /// Replaces the network info cache attached to an instance.
    async fn instance_info_cache_update(
        &self,
        ctx: &RequestContext,
        uuid: &str,
        cache: Value,
    ) -> Result<(), CatalogError>;
}

/// The message broker the fabric casts envelopes through.
///
/// `payload` is the already-serialized wire form; the broker does not
/// interpret it.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Casts to a topic on the local broker.
    async fn cast(
        &self,
        ctx: &RequestContext,
        topic: &TopicName,
        payload: Value,
    ) -> Result<(), TransportError>;

    /// Casts to a topic on another cell's broker.
    async fn cast_to_server(
        &self,
        ctx: &RequestContext,
        params: &ConnectionParams,
        topic: &TopicName,
        payload: Value,
    ) -> Result<(), TransportError>;

    /// Fanout-casts to every consumer of a topic on another cell's
    /// broker.
    async fn fanout_cast_to_server(
        &self,
        ctx: &RequestContext,
        params: &ConnectionParams,
        topic: &TopicName,
        payload: Value,
    ) -> Result<(), TransportError>;
}

/// Sends envelopes to specific neighbor cells.
#[async_trait]
pub trait CellTransport: Send + Sync {
    /// Unicast-sends an envelope to one neighbor.
    async fn send_to_cell(
        &self,
        ctx: &RequestContext,
        cell: &CellRecord,
        message: &WireMessage,
    ) -> Result<(), TransportError>;

    /// Fanout-sends an envelope to every consumer at one neighbor.
    async fn fanout_to_cell(
        &self,
        ctx: &RequestContext,
        cell: &CellRecord,
        message: &WireMessage,
    ) -> Result<(), TransportError>;

    /// Casts a raw payload to a topic on the local broker.
    async fn cast_local(
        &self,
        ctx: &RequestContext,
        topic: &TopicName,
        payload: Value,
    ) -> Result<(), TransportError>;
}

/// A per-domain service API reachable through the bridge by method
/// name.
#[async_trait]
pub trait ServiceApi: Send + Sync {
    /// Invokes a named method with positional and keyword arguments.
    ///
    /// Implementations reject unknown names with
    /// [`ServiceApiError::MethodNotFound`].
    async fn invoke(
        &self,
        ctx: &RequestContext,
        method: &str,
        args: Vec<Value>,
        kwargs: MethodArgs,
    ) -> Result<Value, ServiceApiError>;
}

/// The typed slice of the compute API the placement forwarder needs.
#[async_trait]
pub trait ComputeProvisioning: Send + Sync {
    /// Creates the local database entry for an instance about to be
    /// scheduled, returning the stored record.
    async fn create_db_entry_for_new_instance(
        &self,
        ctx: &RequestContext,
        request_spec: &super::scheduler::RequestSpec,
    ) -> Result<Fields, ServiceApiError>;
}

/// A terminal sink for locally-processed cell messages.
#[async_trait]
pub trait CellMessageHandler: Send + Sync {
    /// Handles one message delivered to this cell.
    async fn handle(
        &self,
        ctx: &RequestContext,
        args: MethodArgs,
        routing_path: &RoutePath,
    ) -> Result<Value, HandlerError>;
}

/// A background task invoked on a fixed cadence.
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    /// Task name, for logs.
    fn name(&self) -> &'static str;

    /// Runs the task once under a fresh administrative context.
    async fn run(
        &self,
        ctx: &RequestContext,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
