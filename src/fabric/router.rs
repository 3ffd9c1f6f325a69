//! Router core
//!
//! The per-cell process that knows its place in the tree, routes
//! point-to-point envelopes toward any named cell, floods broadcasts
//! up or down, dispatches locally-terminated messages into the handler
//! registry, and correlates responses back to waiting callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::context::RequestContext;

use super::bridge::ServiceApiBridge;
use super::config::{ConfigError, FabricConfig, PlacementPolicy, TransportDriver};
use super::domain_types::{
    BroadcastEnvelope, Direction, MethodArgs, MethodCall, MethodName, ResponseId, ResultInfo,
    RoutePath, RoutedEnvelope, WireMessage,
};
use super::handlers::{
    HandlerRegistry, InstanceDestroyHandler, InstanceUpdateHandler, RunServiceApiMethodHandler,
    ScheduleRunInstanceHandler, SendResponseHandler,
};
use super::messages;
use super::scheduler::PlacementScheduler;
use super::topology::{CellOverview, TopologyCache, TopologySnapshot};
use super::traits::{
    BrokerClient, Catalog, CellMessageHandler, CellTransport, ComputeProvisioning, FabricError,
    HandlerError, RemoteError, ServiceApi,
};
use super::transport::RpcCellTransport;
use super::periodic::{PeriodicRunner, TopologyRefreshTask};

/// Where an envelope goes next.
#[derive(Debug, Clone)]
pub(crate) enum NextHop {
    /// This cell is the destination.
    Local,
    /// Forward to this neighbor.
    Forward(super::domain_types::CellRecord),
}

/// Computes the next hop for `dest` given the path walked so far.
///
/// The destination must extend the routing path by at least one label;
/// depth grows strictly along the path, which is what keeps routed
/// envelopes off cycles.
pub(crate) fn find_next_hop(
    snapshot: &TopologySnapshot,
    dest: &RoutePath,
    routing_path: &RoutePath,
    direction: Direction,
) -> Result<NextHop, FabricError> {
    if dest == routing_path {
        return Ok(NextHop::Local);
    }
    let current_hops = routing_path.hop_count();
    let next_hop_num = current_hops + 1;
    if dest.hop_count() < current_hops || !dest.starts_with_labels(routing_path, next_hop_num) {
        return Err(FabricError::RoutingInconsistency {
            reason: format!("destination is {dest} but routing path is {routing_path}"),
        });
    }
    let next_hop_name = dest.label_at(next_hop_num).ok_or_else(|| {
        FabricError::RoutingInconsistency {
            reason: format!("destination is {dest} but routing path is {routing_path}"),
        }
    })?;
    match snapshot.neighbor(direction, next_hop_name) {
        Some(record) => Ok(NextHop::Forward(record.clone())),
        None => Err(FabricError::RoutingInconsistency {
            reason: format!(
                "unknown {} at hop {next_hop_num} when routing to {dest}",
                direction.role_label()
            ),
        }),
    }
}

/// One caller waiting on a correlated response.
struct PendingCall {
    sender: oneshot::Sender<Result<Value, RemoteError>>,
    #[allow(dead_code)]
    created_at: Instant,
}

/// The cell router: one per process, shared behind an [`Arc`].
pub struct CellFabric {
    config: FabricConfig,
    topology: Arc<TopologyCache>,
    catalog: Arc<dyn Catalog>,
    transport: Arc<dyn CellTransport>,
    handlers: HandlerRegistry,
    pending: DashMap<ResponseId, PendingCall>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl CellFabric {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> CellFabricBuilder {
        CellFabricBuilder::default()
    }

    /// This cell's own name.
    #[must_use]
    pub fn self_name(&self) -> &super::domain_types::CellName {
        self.topology.self_name()
    }

    /// The fabric configuration, frozen at startup.
    #[must_use]
    pub fn config(&self) -> &FabricConfig {
        &self.config
    }

    pub(crate) fn topology(&self) -> &Arc<TopologyCache> {
        &self.topology
    }

    pub(crate) fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub(crate) fn transport(&self) -> &Arc<dyn CellTransport> {
        &self.transport
    }

    /// Describes every known neighbor, children first.
    #[must_use]
    pub fn known_cells(&self) -> Vec<CellOverview> {
        self.topology.cell_overview()
    }

    /// Refreshes topology once and spawns the periodic runner.
    pub async fn start(&self, ctx: &RequestContext) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("cell fabric already started");
            return;
        }
        if let Err(err) = self.topology.refresh(ctx).await {
            error!(error = %err, "initial topology refresh failed; starting with empty cache");
        }
        let mut runner = PeriodicRunner::new(
            self.config.refresh_interval.as_duration(),
            self.config.strict_periodic_tasks,
        );
        runner.register(Arc::new(TopologyRefreshTask::new(self.topology.clone())));
        let handle = runner.spawn();
        *lock_ignoring_poison(&self.refresh_task) = Some(handle);
        debug!(cell = %self.self_name(), "cell fabric started");
    }

    /// Stops background maintenance. In-flight envelopes finish.
    pub fn shutdown(&self) {
        if let Some(handle) = lock_ignoring_poison(&self.refresh_task).take() {
            handle.abort();
        }
        self.started.store(false, Ordering::SeqCst);
    }

    fn ensure_enabled(&self) -> Result<(), FabricError> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(FabricError::Disabled)
        }
    }

    /// Sends a request to `dest` and waits for its response.
    ///
    /// `timeout` bounds the wait; when it elapses the pending entry is
    /// dropped and any late response is discarded on arrival.
    pub async fn call(
        &self,
        ctx: &RequestContext,
        dest: RoutePath,
        direction: Direction,
        method: MethodName,
        args: MethodArgs,
        timeout: Option<Duration>,
    ) -> Result<Value, FabricError> {
        self.ensure_enabled()?;
        let envelope = messages::routed_with_response(dest, direction, method, args);
        let deadline = timeout.unwrap_or_else(|| self.config.call_timeout.as_duration());
        let result = self.route_message_inner(ctx, envelope, deadline).await?;
        Ok(result.unwrap_or(Value::Null))
    }

    /// Sends a request to `dest` without waiting for a response.
    pub async fn cast(
        &self,
        ctx: &RequestContext,
        dest: RoutePath,
        direction: Direction,
        method: MethodName,
        args: MethodArgs,
    ) -> Result<(), FabricError> {
        self.ensure_enabled()?;
        let envelope = messages::routed(dest, direction, method, args, None, None);
        let deadline = self.config.call_timeout.as_duration();
        self.route_message_inner(ctx, envelope, deadline).await?;
        Ok(())
    }

    /// Originates a broadcast from this cell.
    pub async fn broadcast(
        &self,
        ctx: &RequestContext,
        direction: Direction,
        method: MethodName,
        args: MethodArgs,
        fanout: bool,
    ) -> Result<(), FabricError> {
        self.ensure_enabled()?;
        let envelope = messages::broadcast(direction, method, args, None, 0, fanout);
        self.broadcast_message(ctx, envelope).await;
        Ok(())
    }

    /// Entry point for envelopes delivered by the transport.
    pub async fn handle_message(&self, ctx: &RequestContext, message: WireMessage) {
        match message {
            WireMessage::RouteMessage(envelope) => {
                let deadline = self.config.call_timeout.as_duration();
                if let Err(err) = self.route_message_inner(ctx, envelope, deadline).await {
                    error!(error = %err, "received exception during cell routing");
                }
            }
            WireMessage::BroadcastMessage(envelope) => {
                self.broadcast_message(ctx, envelope).await;
            }
        }
    }

    /// Routes one envelope: dispatch locally or forward to the next
    /// hop, emitting a response (success or failure) whenever a
    /// correlation id is attached.
    ///
    /// Returns the local result for an envelope that terminated here
    /// without needing a response, or the correlated response when the
    /// envelope originated here with `need_response`.
    pub(crate) async fn route_message_inner(
        &self,
        ctx: &RequestContext,
        envelope: RoutedEnvelope,
        deadline: Duration,
    ) -> Result<Option<Value>, FabricError> {
        let routing_path = self.extend_path(envelope.routing_path.as_ref());
        let resp_direction = envelope.direction.opposite();

        // An originating call parks on a single-slot channel; the
        // response comes back through the send_response handler.
        let mut waiter = None;
        let mut response_uuid = envelope.response_uuid;
        if envelope.need_response.unwrap_or(false) {
            let id = ResponseId::generate();
            let (sender, receiver) = oneshot::channel();
            self.pending.insert(
                id,
                PendingCall {
                    sender,
                    created_at: Instant::now(),
                },
            );
            response_uuid = Some(id);
            waiter = Some((id, receiver));
        }

        let mut local_result = None;
        let outcome = self
            .dispatch_or_forward(
                ctx,
                &envelope,
                &routing_path,
                response_uuid,
                resp_direction,
                &mut local_result,
            )
            .await;

        if let Err(err) = outcome {
            error!(error = %err, path = %routing_path, "received exception during cell routing");
            let Some(id) = response_uuid else {
                return Err(err);
            };
            debug!(path = %routing_path, "sending failure back along routing path");
            let failure = err.to_result_info();
            if let Err(resp_err) = self
                .send_response(ctx, id, &routing_path, resp_direction, failure)
                .await
            {
                error!(error = %resp_err, "could not deliver failure response");
            }
        }

        if let Some((id, receiver)) = waiter {
            return match tokio::time::timeout(deadline, receiver).await {
                Ok(Ok(Ok(value))) => Ok(Some(value)),
                Ok(Ok(Err(remote))) => Err(FabricError::Remote(remote)),
                Ok(Err(_closed)) => {
                    self.pending.remove(&id);
                    Err(FabricError::ResponseChannelClosed)
                }
                Err(_elapsed) => {
                    self.pending.remove(&id);
                    Err(FabricError::Timeout {
                        timeout_ms: deadline.as_millis() as u64,
                    })
                }
            };
        }
        Ok(local_result)
    }

    async fn dispatch_or_forward(
        &self,
        ctx: &RequestContext,
        envelope: &RoutedEnvelope,
        routing_path: &RoutePath,
        response_uuid: Option<ResponseId>,
        resp_direction: Direction,
        local_result: &mut Option<Value>,
    ) -> Result<(), FabricError> {
        let snapshot = self.topology.snapshot();
        match find_next_hop(
            &snapshot,
            &envelope.dest_cell_name,
            routing_path,
            envelope.direction,
        )? {
            NextHop::Local => {
                let result = self
                    .process_message_for_me(ctx, &envelope.message, routing_path)
                    .await?;
                match response_uuid {
                    None => *local_result = Some(result),
                    Some(id) => {
                        self.send_response(
                            ctx,
                            id,
                            routing_path,
                            resp_direction,
                            ResultInfo::success(result),
                        )
                        .await?;
                    }
                }
            }
            NextHop::Forward(next_hop) => {
                let forwarded = RoutedEnvelope {
                    dest_cell_name: envelope.dest_cell_name.clone(),
                    routing_path: Some(routing_path.clone()),
                    direction: envelope.direction,
                    message: envelope.message.clone(),
                    response_uuid,
                    need_response: None,
                };
                self.transport
                    .send_to_cell(ctx, &next_hop, &WireMessage::RouteMessage(forwarded))
                    .await?;
            }
        }
        Ok(())
    }

    /// Floods a broadcast onward and then processes it locally.
    pub async fn broadcast_message(&self, ctx: &RequestContext, envelope: BroadcastEnvelope) {
        let routing_path = self.extend_path(envelope.routing_path.as_ref());
        let max_hops = self.config.max_broadcast_hops.as_u32();

        if envelope.hopcount > max_hops {
            error!(
                method = %envelope.message.method,
                hopcount = envelope.hopcount,
                max_hops,
                "broadcast message reached max hop count"
            );
            return;
        }

        let next_hopcount = envelope.hopcount + 1;
        if next_hopcount > max_hops {
            debug!(
                method = %envelope.message.method,
                "broadcast hop ceiling reached, not forwarding"
            );
        } else {
            let forwarded = WireMessage::BroadcastMessage(messages::broadcast(
                envelope.direction,
                envelope.message.method.clone(),
                envelope.message.args.clone(),
                Some(routing_path.clone()),
                next_hopcount,
                envelope.fanout,
            ));
            let snapshot = self.topology.snapshot();
            for cell in snapshot.neighbors(envelope.direction) {
                let sent = if envelope.fanout {
                    self.transport.fanout_to_cell(ctx, cell, &forwarded).await
                } else {
                    self.transport.send_to_cell(ctx, cell, &forwarded).await
                };
                if let Err(err) = sent {
                    error!(cell = %cell.name, error = %err, "error sending broadcast to cell");
                }
            }
        }

        // Broadcasts have no responses: local failures end here.
        if let Err(err) = self
            .process_message_for_me(ctx, &envelope.message, &routing_path)
            .await
        {
            error!(
                method = %envelope.message.method,
                error = %err,
                "broadcast handler failed locally"
            );
        }
    }

    /// Dispatches a locally-terminated message into the handler
    /// registry.
    async fn process_message_for_me(
        &self,
        ctx: &RequestContext,
        message: &MethodCall,
        routing_path: &RoutePath,
    ) -> Result<Value, FabricError> {
        let handler =
            self.handlers
                .get(&message.method)
                .ok_or_else(|| HandlerError::UnknownMethod {
                    method: message.method.clone(),
                })?;
        handler
            .handle(ctx, message.args.clone(), routing_path)
            .await
            .map_err(FabricError::from)
    }

    /// Sends a response back to the cell at the start of
    /// `routing_path`, delivering locally when that cell is us.
    pub(crate) async fn send_response(
        &self,
        ctx: &RequestContext,
        response_uuid: ResponseId,
        routing_path: &RoutePath,
        direction: Direction,
        result_info: ResultInfo,
    ) -> Result<(), FabricError> {
        let dest_cell = routing_path.reversed();
        let resp_routing_path = RoutePath::single(self.self_name());
        let snapshot = self.topology.snapshot();
        match find_next_hop(&snapshot, &dest_cell, &resp_routing_path, direction)? {
            NextHop::Local => {
                // Response was for us: deliver straight to the waiter.
                self.deliver_response(response_uuid, result_info);
                Ok(())
            }
            NextHop::Forward(next_hop) => {
                let mut args = MethodArgs::new();
                args.insert(
                    "response_uuid".to_owned(),
                    serde_json::to_value(response_uuid).map_err(super::traits::TransportError::from)?,
                );
                args.insert(
                    "result_info".to_owned(),
                    serde_json::to_value(result_info).map_err(super::traits::TransportError::from)?,
                );
                let envelope = messages::routed(
                    dest_cell,
                    direction,
                    MethodName::of("send_response"),
                    args,
                    Some(resp_routing_path),
                    None,
                );
                self.transport
                    .send_to_cell(ctx, &next_hop, &WireMessage::RouteMessage(envelope))
                    .await
                    .map_err(FabricError::from)
            }
        }
    }

    /// Completes a pending call with an arrived response. Responses
    /// with no waiter are dropped: the process restarted, or the
    /// caller gave up.
    pub(crate) fn deliver_response(&self, response_uuid: ResponseId, result_info: ResultInfo) {
        let Some((_, call)) = self.pending.remove(&response_uuid) else {
            debug!(%response_uuid, "dropping response with no pending call");
            return;
        };
        let outcome = if result_info.failure {
            Err(RemoteError::from_result(&result_info.result))
        } else {
            Ok(result_info.result)
        };
        if call.sender.send(outcome).is_err() {
            debug!(%response_uuid, "pending caller went away before response delivery");
        }
    }

    /// Number of calls currently awaiting responses.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Appends our name to the path; no path means the envelope
    /// originated here.
    fn extend_path(&self, routing_path: Option<&RoutePath>) -> RoutePath {
        match routing_path {
            Some(path) => path.appended(self.self_name()),
            None => RoutePath::single(self.self_name()),
        }
    }
}

impl Drop for CellFabric {
    fn drop(&mut self) {
        if let Some(handle) = lock_ignoring_poison(&self.refresh_task).take() {
            handle.abort();
        }
    }
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Wires a [`CellFabric`] together from its collaborators.
#[derive(Default)]
pub struct CellFabricBuilder {
    config: Option<FabricConfig>,
    catalog: Option<Arc<dyn Catalog>>,
    broker: Option<Arc<dyn BrokerClient>>,
    compute_api: Option<Arc<dyn ServiceApi>>,
    network_api: Option<Arc<dyn ServiceApi>>,
    volume_api: Option<Arc<dyn ServiceApi>>,
    provisioning: Option<Arc<dyn ComputeProvisioning>>,
    extra_handlers: Vec<(MethodName, Arc<dyn CellMessageHandler>)>,
}

impl CellFabricBuilder {
    #[must_use]
    pub fn config(mut self, config: FabricConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    #[must_use]
    pub fn broker(mut self, broker: Arc<dyn BrokerClient>) -> Self {
        self.broker = Some(broker);
        self
    }

    #[must_use]
    pub fn compute_api(mut self, api: Arc<dyn ServiceApi>) -> Self {
        self.compute_api = Some(api);
        self
    }

    #[must_use]
    pub fn network_api(mut self, api: Arc<dyn ServiceApi>) -> Self {
        self.network_api = Some(api);
        self
    }

    #[must_use]
    pub fn volume_api(mut self, api: Arc<dyn ServiceApi>) -> Self {
        self.volume_api = Some(api);
        self
    }

    #[must_use]
    pub fn compute_provisioning(mut self, provisioning: Arc<dyn ComputeProvisioning>) -> Self {
        self.provisioning = Some(provisioning);
        self
    }

    /// Registers an extra terminal handler before the registry
    /// freezes. Later registrations win on name collisions.
    #[must_use]
    pub fn handler(mut self, method: MethodName, handler: Arc<dyn CellMessageHandler>) -> Self {
        self.extra_handlers.push((method, handler));
        self
    }

    /// Builds the fabric. The handler registry is frozen from here on.
    pub fn build(self) -> Result<Arc<CellFabric>, ConfigError> {
        let config = self.config.ok_or(ConfigError::MissingComponent {
            component: "config",
        })?;
        config.validate()?;
        let catalog = self.catalog.ok_or(ConfigError::MissingComponent {
            component: "catalog",
        })?;
        let broker = self.broker.ok_or(ConfigError::MissingComponent {
            component: "broker",
        })?;

        let transport: Arc<dyn CellTransport> = match config.transport_driver {
            TransportDriver::Rpc => Arc::new(RpcCellTransport::new(
                broker,
                config.cells_topic.clone(),
            )),
        };

        let topology = Arc::new(TopologyCache::new(
            config.cell_name.clone(),
            config.parsed_capabilities()?,
            catalog.clone(),
        ));

        let bridge = Arc::new(ServiceApiBridge::new(
            catalog.clone(),
            self.compute_api,
            self.network_api,
            self.volume_api,
        ));

        let scheduler = match config.placement {
            PlacementPolicy::RandomChild => Arc::new(PlacementScheduler::new(
                self.provisioning,
                config.scheduler_topic.clone(),
            )),
        };

        let extra_handlers = self.extra_handlers;
        Ok(Arc::new_cyclic(|weak: &Weak<CellFabric>| {
            let mut handlers = HandlerRegistry::default();
            handlers.register(
                MethodName::of("send_response"),
                Arc::new(SendResponseHandler::new(weak.clone())),
            );
            handlers.register(
                MethodName::of("instance_update"),
                Arc::new(InstanceUpdateHandler::new(weak.clone())),
            );
            handlers.register(
                MethodName::of("instance_destroy"),
                Arc::new(InstanceDestroyHandler::new(weak.clone())),
            );
            handlers.register(
                MethodName::of("run_service_api_method"),
                Arc::new(RunServiceApiMethodHandler::new(bridge)),
            );
            handlers.register(
                MethodName::of("schedule_run_instance"),
                Arc::new(ScheduleRunInstanceHandler::new(weak.clone(), scheduler)),
            );
            for (method, handler) in extra_handlers {
                handlers.register(method, handler);
            }

            CellFabric {
                config,
                topology,
                catalog,
                transport,
                handlers,
                pending: DashMap::new(),
                refresh_task: Mutex::new(None),
                started: AtomicBool::new(false),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabric::domain_types::{CellConnection, CellName, CellRecord};
    use std::collections::HashMap;
    use std::time::SystemTime;

    fn name(label: &str) -> CellName {
        CellName::try_new(label.to_string()).unwrap()
    }

    fn record(label: &str, is_parent: bool) -> CellRecord {
        CellRecord {
            name: name(label),
            is_parent,
            capabilities: HashMap::new(),
            connection: CellConnection::default(),
            last_seen: SystemTime::now(),
        }
    }

    fn snapshot(parents: &[&str], children: &[&str]) -> TopologySnapshot {
        let records = parents
            .iter()
            .map(|parent| record(parent, true))
            .chain(children.iter().map(|child| record(child, false)));
        TopologySnapshot::from_records(records)
    }

    fn path(s: &str) -> RoutePath {
        RoutePath::parse(s).unwrap()
    }

    #[test]
    fn next_hop_is_local_when_dest_equals_path() {
        let snap = snapshot(&[], &[]);
        for direction in [Direction::Up, Direction::Down] {
            assert!(matches!(
                find_next_hop(&snap, &path("a.b.c"), &path("a.b.c"), direction).unwrap(),
                NextHop::Local
            ));
            assert!(matches!(
                find_next_hop(&snap, &path("a"), &path("a"), direction).unwrap(),
                NextHop::Local
            ));
        }
    }

    #[test]
    fn next_hop_rejects_shallower_destination() {
        let snap = snapshot(&["mom"], &["kid"]);
        for direction in [Direction::Up, Direction::Down] {
            let err = find_next_hop(&snap, &path("a.b"), &path("a.b.c"), direction).unwrap_err();
            assert!(matches!(err, FabricError::RoutingInconsistency { .. }));
        }
    }

    #[test]
    fn next_hop_rejects_diverging_destination() {
        let snap = snapshot(&["mom"], &["kid"]);
        for direction in [Direction::Up, Direction::Down] {
            let err = find_next_hop(&snap, &path("a.b.d"), &path("a.b.c"), direction).unwrap_err();
            assert!(matches!(err, FabricError::RoutingInconsistency { .. }));
        }
    }

    #[test]
    fn next_hop_rejects_unknown_neighbor() {
        let snap = snapshot(&["mom"], &["kid"]);
        for direction in [Direction::Up, Direction::Down] {
            let err =
                find_next_hop(&snap, &path("me.notfound"), &path("me"), direction).unwrap_err();
            let FabricError::RoutingInconsistency { reason } = err else {
                panic!("wrong error kind");
            };
            assert!(reason.contains(direction.role_label()));
        }
    }

    #[test]
    fn next_hop_selects_direct_child() {
        let snap = snapshot(&[], &["kid"]);
        let NextHop::Forward(record) =
            find_next_hop(&snap, &path("me.kid"), &path("me"), Direction::Down).unwrap()
        else {
            panic!("expected forward");
        };
        assert_eq!(record.name.as_str(), "kid");
    }

    #[test]
    fn next_hop_selects_child_on_longer_route() {
        let snap = snapshot(&[], &["kid"]);
        let NextHop::Forward(record) =
            find_next_hop(&snap, &path("me.kid.grandkid"), &path("me"), Direction::Down).unwrap()
        else {
            panic!("expected forward");
        };
        assert_eq!(record.name.as_str(), "kid");
    }

    #[test]
    fn next_hop_selects_parent_going_up() {
        let snap = snapshot(&["mom"], &[]);
        let NextHop::Forward(record) =
            find_next_hop(&snap, &path("me.mom"), &path("me"), Direction::Up).unwrap()
        else {
            panic!("expected forward");
        };
        assert_eq!(record.name.as_str(), "mom");

        // Deep route, mid-tree: the path already has history.
        let NextHop::Forward(record) = find_next_hop(
            &snap,
            &path("a.b.me.mom.grandmom"),
            &path("a.b.me"),
            Direction::Up,
        )
        .unwrap()
        else {
            panic!("expected forward");
        };
        assert_eq!(record.name.as_str(), "mom");
    }
}
