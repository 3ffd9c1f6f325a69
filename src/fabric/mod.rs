//! Cell routing and broadcast fabric
//!
//! Each cell in the deployment tree runs one [`CellFabric`]. It knows
//! its position in the tree through the [`TopologyCache`], routes
//! point-to-point envelopes toward any named cell, floods broadcasts
//! to ancestors or descendants with loop protection, dispatches
//! locally-terminated messages into a frozen handler registry, and
//! forwards scheduling requests toward a randomly-chosen child.
//!
//! ## Components
//!
//! - [`CellFabric`]: routing core, response correlation, broadcasts
//! - [`TopologyCache`]: parents/children, refreshed from the catalog
//! - [`ServiceApiBridge`]: per-domain API dispatch by method name
//! - [`PlacementScheduler`]: `schedule_run_instance` forwarding
//! - [`PeriodicRunner`]: fixed-cadence background maintenance
//!
//! ## Message flow
//!
//! ```text
//! Broker -> CellFabric -> find_next_hop -> Transport -> neighbor cell
//!              |                                |
//!              v                                v
//!        HandlerRegistry                 ConnectionParams
//!              |
//!              v
//!   send_response / instance_update / service APIs / scheduler
//! ```
//!
//! Delivery is at-most-once and unordered; correlation ids tie
//! responses to pending calls, and every originating call carries a
//! deadline.

pub mod bridge;
pub mod config;
pub mod domain_types;
pub mod handlers;
pub mod messages;
pub mod periodic;
pub mod router;
pub mod scheduler;
pub mod topology;
pub mod traits;
pub mod transport;

pub use bridge::{MethodCallInfo, ServiceApiBridge, ServiceName};
pub use config::{
    ConfigError, FabricConfig, FabricConfigBuilder, PlacementPolicy, TransportDriver,
};
pub use domain_types::{
    BroadcastEnvelope, CallTimeoutMs, CatalogCellEntry, CellConnection, CellName, CellRecord,
    ConnectionParams, Direction, Fields, MaxHopCount, MethodArgs, MethodCall, MethodName,
    PathError, RefreshIntervalSecs, ResponseId, ResultInfo, RoutePath, RoutedEnvelope, TopicName,
    WireMessage,
};
pub use periodic::{PeriodicError, PeriodicRunner, TopologyRefreshTask};
pub use router::{CellFabric, CellFabricBuilder};
pub use scheduler::{PlacementScheduler, RequestSpec};
pub use topology::{CellOverview, TopologyCache, TopologySnapshot};
pub use traits::{
    BrokerClient, Catalog, CatalogError, CellMessageHandler, CellTransport, ComputeProvisioning,
    FabricError, HandlerError, PeriodicTask, RemoteError, ServiceApi, ServiceApiError,
    TransportError,
};
pub use transport::{RpcCellTransport, connection_params};
