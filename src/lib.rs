//! # Cellfab - Cell Routing and Broadcast Fabric
//!
//! Cellfab federates a large compute deployment into a tree of
//! autonomous cells, each running its own control plane. This crate is
//! the per-cell router: it knows the cell's position in the tree,
//! routes request/response messages to any named cell along the tree,
//! broadcasts to all ancestors or descendants, dispatches terminal
//! messages into handler APIs, and forwards instance scheduling
//! requests toward a chosen child.
//!
//! The REST surface, the message broker, and persistent storage are
//! external collaborators reached through the [`fabric::Catalog`],
//! [`fabric::BrokerClient`], and [`fabric::ServiceApi`] traits.
//!
//! ```no_run
//! use std::sync::Arc;
//! use cellfab::context::RequestContext;
//! use cellfab::fabric::{
//!     CellFabric, CellName, Direction, FabricConfig, MethodArgs, MethodName, RoutePath,
//!     TopicName,
//! };
//!
//! # async fn example(
//! #     catalog: Arc<dyn cellfab::fabric::Catalog>,
//! #     broker: Arc<dyn cellfab::fabric::BrokerClient>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = FabricConfig::builder()
//!     .cell_name(CellName::try_new("api".to_string())?)
//!     .cells_topic(TopicName::try_new("cells".to_string())?)
//!     .enabled(true)
//!     .build()?;
//!
//! let fabric = CellFabric::builder()
//!     .config(config)
//!     .catalog(catalog)
//!     .broker(broker)
//!     .build()?;
//!
//! let ctx = RequestContext::admin();
//! fabric.start(&ctx).await;
//!
//! let result = fabric
//!     .call(
//!         &ctx,
//!         RoutePath::parse("api.child1")?,
//!         Direction::Down,
//!         MethodName::of("run_service_api_method"),
//!         MethodArgs::new(),
//!         None,
//!     )
//!     .await?;
//! println!("child answered: {result}");
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod fabric;

pub use context::RequestContext;
pub use fabric::{
    BrokerClient, Catalog, CellFabric, CellFabricBuilder, CellName, Direction, FabricConfig,
    FabricError, MethodArgs, MethodName, RemoteError, RoutePath, TopicName, WireMessage,
};
