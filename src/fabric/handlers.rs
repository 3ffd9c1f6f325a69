//! Local handler registry and built-in terminal handlers
//!
//! The registry is populated once while the fabric is built and frozen
//! from then on; unknown method names are rejected at dispatch time.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::context::RequestContext;

use super::bridge::{MethodCallInfo, ServiceApiBridge};
use super::domain_types::{Fields, MethodArgs, MethodName, ResponseId, ResultInfo, RoutePath};
use super::router::CellFabric;
use super::scheduler::PlacementScheduler;
use super::traits::{CatalogError, CellMessageHandler, HandlerError};

/// Immutable map from method name to terminal handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<MethodName, Arc<dyn CellMessageHandler>>,
}

impl HandlerRegistry {
    /// Registers a handler. Only called while the fabric is being
    /// built; later registrations replace earlier ones.
    pub fn register(&mut self, method: MethodName, handler: Arc<dyn CellMessageHandler>) {
        self.handlers.insert(method, handler);
    }

    /// Looks up the handler for a method.
    #[must_use]
    pub fn get(&self, method: &MethodName) -> Option<Arc<dyn CellMessageHandler>> {
        self.handlers.get(method).cloned()
    }

    /// Registered method names, for diagnostics.
    pub fn methods(&self) -> impl Iterator<Item = &MethodName> {
        self.handlers.keys()
    }
}

fn upgrade(fabric: &Weak<CellFabric>) -> Result<Arc<CellFabric>, HandlerError> {
    fabric
        .upgrade()
        .ok_or_else(|| HandlerError::failed("cell fabric is shutting down"))
}

fn required_arg<T: DeserializeOwned>(
    method: &str,
    args: &MethodArgs,
    key: &str,
) -> Result<T, HandlerError> {
    let value = args.get(key).ok_or_else(|| HandlerError::BadArgs {
        method: MethodName::of(method),
        reason: format!("missing argument {key:?}"),
    })?;
    serde_json::from_value(value.clone()).map_err(|err| HandlerError::BadArgs {
        method: MethodName::of(method),
        reason: format!("argument {key:?}: {err}"),
    })
}

/// Whether an instance replication message is actionable here: only
/// the top of the tree applies writes, and only for messages that did
/// not originate locally.
fn replication_applies(fabric: &CellFabric, routing_path: &RoutePath) -> bool {
    let snapshot = fabric.topology().snapshot();
    !snapshot.has_parents() && *routing_path != RoutePath::single(fabric.self_name())
}

/// Completes a pending call when another cell's response arrives.
pub struct SendResponseHandler {
    fabric: Weak<CellFabric>,
}

impl SendResponseHandler {
    pub fn new(fabric: Weak<CellFabric>) -> Self {
        Self { fabric }
    }
}

#[async_trait]
impl CellMessageHandler for SendResponseHandler {
    async fn handle(
        &self,
        _ctx: &RequestContext,
        args: MethodArgs,
        _routing_path: &RoutePath,
    ) -> Result<Value, HandlerError> {
        let fabric = upgrade(&self.fabric)?;
        let response_uuid: ResponseId = required_arg("send_response", &args, "response_uuid")?;
        let result_info: ResultInfo = required_arg("send_response", &args, "result_info")?;
        fabric.deliver_response(response_uuid, result_info);
        Ok(Value::Null)
    }
}

/// Upserts a replicated instance record at the top of the tree.
pub struct InstanceUpdateHandler {
    fabric: Weak<CellFabric>,
}

impl InstanceUpdateHandler {
    pub fn new(fabric: Weak<CellFabric>) -> Self {
        Self { fabric }
    }
}

#[async_trait]
impl CellMessageHandler for InstanceUpdateHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        args: MethodArgs,
        routing_path: &RoutePath,
    ) -> Result<Value, HandlerError> {
        let fabric = upgrade(&self.fabric)?;
        if !replication_applies(&fabric, routing_path) {
            return Ok(Value::Null);
        }

        let mut instance_info: Fields = required_arg("instance_update", &args, "instance_info")?;
        let uuid = instance_info
            .get("uuid")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::BadArgs {
                method: MethodName::of("instance_update"),
                reason: "instance_info has no uuid".to_owned(),
            })?
            .to_owned();

        // Record which subtree owns the instance.
        instance_info.insert(
            "cell_name".to_owned(),
            Value::String(routing_path.reversed().to_string()),
        );
        let info_cache = instance_info.remove("info_cache");

        debug!(%uuid, "got update for instance");
        match fabric
            .catalog()
            .instance_update(ctx, &uuid, instance_info.clone())
            .await
        {
            Ok(()) => {}
            Err(CatalogError::InstanceNotFound { .. }) => {
                fabric.catalog().instance_create(ctx, instance_info).await?;
            }
            Err(err) => return Err(err.into()),
        }

        if let Some(cache) = info_cache {
            if !cache.is_null() {
                fabric
                    .catalog()
                    .instance_info_cache_update(ctx, &uuid, cache)
                    .await?;
            }
        }
        Ok(Value::Null)
    }
}

/// Deletes a replicated instance record at the top of the tree.
pub struct InstanceDestroyHandler {
    fabric: Weak<CellFabric>,
}

impl InstanceDestroyHandler {
    pub fn new(fabric: Weak<CellFabric>) -> Self {
        Self { fabric }
    }
}

#[async_trait]
impl CellMessageHandler for InstanceDestroyHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        args: MethodArgs,
        routing_path: &RoutePath,
    ) -> Result<Value, HandlerError> {
        let fabric = upgrade(&self.fabric)?;
        if !replication_applies(&fabric, routing_path) {
            return Ok(Value::Null);
        }

        let instance_info: Fields = required_arg("instance_destroy", &args, "instance_info")?;
        let uuid = instance_info
            .get("uuid")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::BadArgs {
                method: MethodName::of("instance_destroy"),
                reason: "instance_info has no uuid".to_owned(),
            })?;

        debug!(%uuid, "got update to delete instance");
        match fabric.catalog().instance_destroy(ctx, uuid).await {
            // Already gone is fine.
            Ok(()) | Err(CatalogError::InstanceNotFound { .. }) => Ok(Value::Null),
            Err(err) => Err(err.into()),
        }
    }
}

/// Bridges `run_service_api_method` into the bound per-domain APIs.
pub struct RunServiceApiMethodHandler {
    bridge: Arc<ServiceApiBridge>,
}

impl RunServiceApiMethodHandler {
    pub fn new(bridge: Arc<ServiceApiBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl CellMessageHandler for RunServiceApiMethodHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        args: MethodArgs,
        _routing_path: &RoutePath,
    ) -> Result<Value, HandlerError> {
        let service_name: String = required_arg("run_service_api_method", &args, "service_name")?;
        let method_info: MethodCallInfo =
            required_arg("run_service_api_method", &args, "method_info")?;
        let result = self
            .bridge
            .run_method(ctx, &service_name, method_info)
            .await?;
        Ok(result)
    }
}

/// Hands `schedule_run_instance` to the placement forwarder.
pub struct ScheduleRunInstanceHandler {
    fabric: Weak<CellFabric>,
    scheduler: Arc<PlacementScheduler>,
}

impl ScheduleRunInstanceHandler {
    pub fn new(fabric: Weak<CellFabric>, scheduler: Arc<PlacementScheduler>) -> Self {
        Self { fabric, scheduler }
    }
}

#[async_trait]
impl CellMessageHandler for ScheduleRunInstanceHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        args: MethodArgs,
        _routing_path: &RoutePath,
    ) -> Result<Value, HandlerError> {
        let fabric = upgrade(&self.fabric)?;
        self.scheduler
            .schedule_run_instance(&fabric, ctx, args)
            .await?;
        Ok(Value::Null)
    }
}
