//! In-memory cell tree harness
//!
//! Builds a real multi-cell topology where every cell runs its own
//! fabric and the broker delivers serialized wire messages straight
//! into the target cell's router.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use cellfab::context::RequestContext;
use cellfab::fabric::{
    BrokerClient, Catalog, CatalogCellEntry, CatalogError, CellConnection, CellFabric,
    CellMessageHandler, CellName, ComputeProvisioning, ConnectionParams, FabricConfig, Fields,
    HandlerError, MaxHopCount, MethodArgs, MethodName, RequestSpec, RoutePath, ServiceApi,
    ServiceApiError, TopicName, TransportError, WireMessage,
};

pub const TEST_METHOD_RESULT: &str = "test_method_expected_result";

/// One recorded broker send to a specific cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRecord {
    pub target: String,
    pub fanout: bool,
    pub wire_method: String,
    pub method: String,
}

/// Broker that hands wire messages to the registered target fabric.
///
/// Delivery is nested by default so tests observe deterministic send
/// ordering; spawned mode detaches delivery for timeout scenarios.
pub struct InMemoryBroker {
    cells: Mutex<HashMap<String, Arc<CellFabric>>>,
    records: Mutex<Vec<SendRecord>>,
    topic_casts: Mutex<Vec<(String, Value)>>,
    broken_hosts: Mutex<HashSet<String>>,
    spawn_delivery: AtomicBool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
            records: Mutex::new(Vec::new()),
            topic_casts: Mutex::new(Vec::new()),
            broken_hosts: Mutex::new(HashSet::new()),
            spawn_delivery: AtomicBool::new(false),
        }
    }

    pub fn register(&self, host: &str, fabric: Arc<CellFabric>) {
        self.cells.lock().unwrap().insert(host.to_owned(), fabric);
    }

    pub fn break_host(&self, host: &str) {
        self.broken_hosts.lock().unwrap().insert(host.to_owned());
    }

    pub fn set_spawn_delivery(&self, spawn: bool) {
        self.spawn_delivery.store(spawn, Ordering::SeqCst);
    }

    pub fn sends(&self) -> Vec<SendRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn clear_sends(&self) {
        self.records.lock().unwrap().clear();
    }

    pub fn topic_casts(&self) -> Vec<(String, Value)> {
        self.topic_casts.lock().unwrap().clone()
    }

    async fn deliver(
        &self,
        ctx: &RequestContext,
        params: &ConnectionParams,
        payload: Value,
        fanout: bool,
    ) -> Result<(), TransportError> {
        let host = params
            .hostname
            .clone()
            .ok_or_else(|| TransportError::broker("connection params carry no hostname"))?;
        if self.broken_hosts.lock().unwrap().contains(&host) {
            return Err(TransportError::broker(format!("cell {host} unreachable")));
        }

        let message: WireMessage = serde_json::from_value(payload)?;
        let (wire_method, method) = match &message {
            WireMessage::RouteMessage(envelope) => {
                ("route_message", envelope.message.method.to_string())
            }
            WireMessage::BroadcastMessage(envelope) => {
                ("broadcast_message", envelope.message.method.to_string())
            }
        };
        self.records.lock().unwrap().push(SendRecord {
            target: host.clone(),
            fanout,
            wire_method: wire_method.to_owned(),
            method,
        });

        let fabric = self
            .cells
            .lock()
            .unwrap()
            .get(&host)
            .cloned()
            .ok_or_else(|| TransportError::broker(format!("no cell registered at {host}")))?;

        if self.spawn_delivery.load(Ordering::SeqCst) {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                fabric.handle_message(&ctx, message).await;
            });
        } else {
            fabric.handle_message(ctx, message).await;
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn cast(
        &self,
        _ctx: &RequestContext,
        topic: &TopicName,
        payload: Value,
    ) -> Result<(), TransportError> {
        self.topic_casts
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn cast_to_server(
        &self,
        ctx: &RequestContext,
        params: &ConnectionParams,
        _topic: &TopicName,
        payload: Value,
    ) -> Result<(), TransportError> {
        self.deliver(ctx, params, payload, false).await
    }

    async fn fanout_cast_to_server(
        &self,
        ctx: &RequestContext,
        params: &ConnectionParams,
        _topic: &TopicName,
        payload: Value,
    ) -> Result<(), TransportError> {
        self.deliver(ctx, params, payload, true).await
    }
}

/// Catalog fake with per-call recording.
pub struct InMemoryCatalog {
    cells: Mutex<Vec<CatalogCellEntry>>,
    pub instances: Mutex<HashMap<String, Fields>>,
    pub updates: Mutex<Vec<(String, Fields)>>,
    pub creates: Mutex<Vec<Fields>>,
    pub destroys: Mutex<Vec<String>>,
    pub cache_updates: Mutex<Vec<(String, Value)>>,
}

impl InMemoryCatalog {
    pub fn new(cells: Vec<CatalogCellEntry>) -> Self {
        Self {
            cells: Mutex::new(cells),
            instances: Mutex::new(HashMap::new()),
            updates: Mutex::new(Vec::new()),
            creates: Mutex::new(Vec::new()),
            destroys: Mutex::new(Vec::new()),
            cache_updates: Mutex::new(Vec::new()),
        }
    }

    pub fn seed_instance(&self, uuid: &str, fields: Fields) {
        self.instances
            .lock()
            .unwrap()
            .insert(uuid.to_owned(), fields);
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn create_count(&self) -> usize {
        self.creates.lock().unwrap().len()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn list_cells(
        &self,
        _ctx: &RequestContext,
    ) -> Result<Vec<CatalogCellEntry>, CatalogError> {
        Ok(self.cells.lock().unwrap().clone())
    }

    async fn instance_get_by_uuid(
        &self,
        _ctx: &RequestContext,
        uuid: &str,
    ) -> Result<Fields, CatalogError> {
        self.instances
            .lock()
            .unwrap()
            .get(uuid)
            .cloned()
            .ok_or_else(|| CatalogError::InstanceNotFound {
                uuid: uuid.to_owned(),
            })
    }

    async fn instance_update(
        &self,
        _ctx: &RequestContext,
        uuid: &str,
        fields: Fields,
    ) -> Result<(), CatalogError> {
        let mut instances = self.instances.lock().unwrap();
        let Some(existing) = instances.get_mut(uuid) else {
            return Err(CatalogError::InstanceNotFound {
                uuid: uuid.to_owned(),
            });
        };
        existing.extend(fields.clone());
        self.updates.lock().unwrap().push((uuid.to_owned(), fields));
        Ok(())
    }

    async fn instance_create(
        &self,
        _ctx: &RequestContext,
        fields: Fields,
    ) -> Result<(), CatalogError> {
        if let Some(uuid) = fields.get("uuid").and_then(Value::as_str) {
            self.instances
                .lock()
                .unwrap()
                .insert(uuid.to_owned(), fields.clone());
        }
        self.creates.lock().unwrap().push(fields);
        Ok(())
    }

    async fn instance_destroy(
        &self,
        _ctx: &RequestContext,
        uuid: &str,
    ) -> Result<(), CatalogError> {
        if self.instances.lock().unwrap().remove(uuid).is_none() {
            return Err(CatalogError::InstanceNotFound {
                uuid: uuid.to_owned(),
            });
        }
        self.destroys.lock().unwrap().push(uuid.to_owned());
        Ok(())
    }

    async fn instance_info_cache_update(
        &self,
        _ctx: &RequestContext,
        uuid: &str,
        cache: Value,
    ) -> Result<(), CatalogError> {
        self.cache_updates
            .lock()
            .unwrap()
            .push((uuid.to_owned(), cache));
        Ok(())
    }
}

/// Compute API fake covering both the bridge and the provisioning
/// seam.
pub struct FakeComputeApi {
    pub created: Mutex<Vec<RequestSpec>>,
    pub invoked: Mutex<Vec<(String, Vec<Value>, MethodArgs)>>,
    uuid_counter: AtomicU64,
}

impl FakeComputeApi {
    pub fn new() -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            invoked: Mutex::new(Vec::new()),
            uuid_counter: AtomicU64::new(0),
        }
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl ServiceApi for FakeComputeApi {
    async fn invoke(
        &self,
        _ctx: &RequestContext,
        method: &str,
        args: Vec<Value>,
        kwargs: MethodArgs,
    ) -> Result<Value, ServiceApiError> {
        if method != "confirm_resize" {
            return Err(ServiceApiError::MethodNotFound {
                detail: format!("unknown method '{method}' in compute API"),
            });
        }
        self.invoked
            .lock()
            .unwrap()
            .push((method.to_owned(), args, kwargs));
        Ok(Value::Null)
    }
}

#[async_trait]
impl ComputeProvisioning for FakeComputeApi {
    async fn create_db_entry_for_new_instance(
        &self,
        _ctx: &RequestContext,
        request_spec: &RequestSpec,
    ) -> Result<Fields, ServiceApiError> {
        self.created.lock().unwrap().push(request_spec.clone());
        let serial = self.uuid_counter.fetch_add(1, Ordering::SeqCst);
        let mut instance = request_spec.instance_properties.clone();
        instance.entry("uuid".to_owned()).or_insert_with(|| {
            Value::String(format!("fake-instance-{serial}"))
        });
        instance.insert("id".to_owned(), json!(serial + 1));
        Ok(instance)
    }
}

/// Terminal handler recording which cell ran it.
struct RecordingHandler {
    cell: String,
    calls: Arc<Mutex<Vec<(String, MethodArgs)>>>,
}

#[async_trait]
impl CellMessageHandler for RecordingHandler {
    async fn handle(
        &self,
        _ctx: &RequestContext,
        args: MethodArgs,
        _routing_path: &RoutePath,
    ) -> Result<Value, HandlerError> {
        self.calls.lock().unwrap().push((self.cell.clone(), args));
        Ok(json!(TEST_METHOD_RESULT))
    }
}

/// Terminal handler that always fails.
struct ExplodingHandler;

#[async_trait]
impl CellMessageHandler for ExplodingHandler {
    async fn handle(
        &self,
        _ctx: &RequestContext,
        _args: MethodArgs,
        _routing_path: &RoutePath,
    ) -> Result<Value, HandlerError> {
        Err(HandlerError::failed("boom"))
    }
}

/// Terminal handler that outlives any caller deadline.
struct SleepyHandler;

#[async_trait]
impl CellMessageHandler for SleepyHandler {
    async fn handle(
        &self,
        _ctx: &RequestContext,
        _args: MethodArgs,
        _routing_path: &RoutePath,
    ) -> Result<Value, HandlerError> {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        Ok(Value::Null)
    }
}

pub struct TestCell {
    pub fabric: Arc<CellFabric>,
    pub catalog: Arc<InMemoryCatalog>,
    pub compute: Arc<FakeComputeApi>,
}

pub struct CellTree {
    pub broker: Arc<InMemoryBroker>,
    pub cells: HashMap<String, TestCell>,
    calls: Arc<Mutex<Vec<(String, MethodArgs)>>>,
}

impl CellTree {
    pub fn fabric(&self, name: &str) -> &Arc<CellFabric> {
        &self.cells[name].fabric
    }

    pub fn catalog(&self, name: &str) -> &Arc<InMemoryCatalog> {
        &self.cells[name].catalog
    }

    pub fn compute(&self, name: &str) -> &Arc<FakeComputeApi> {
        &self.cells[name].compute
    }

    pub fn sends(&self) -> Vec<SendRecord> {
        self.broker.sends()
    }

    pub fn send_targets(&self) -> Vec<String> {
        self.sends().into_iter().map(|record| record.target).collect()
    }

    pub fn calls_at(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(cell, _)| cell == name)
            .count()
    }

    pub fn recorded_args(&self) -> Vec<(String, MethodArgs)> {
        self.calls.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct CellTreeBuilder {
    cells: Vec<String>,
    links: Vec<(String, String)>,
    max_broadcast_hops: Option<u32>,
    disabled: bool,
    exploding_cells: HashSet<String>,
    sleepy_cells: HashSet<String>,
}

impl CellTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell(mut self, name: &str) -> Self {
        if !self.cells.iter().any(|cell| cell == name) {
            self.cells.push(name.to_owned());
        }
        self
    }

    /// Adds a parent-child edge, registering both cells.
    pub fn link(mut self, parent: &str, child: &str) -> Self {
        self = self.cell(parent).cell(child);
        self.links.push((parent.to_owned(), child.to_owned()));
        self
    }

    pub fn max_broadcast_hops(mut self, hops: u32) -> Self {
        self.max_broadcast_hops = Some(hops);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// `test_method` at this cell fails with "boom".
    pub fn exploding_test_method(mut self, cell: &str) -> Self {
        self.exploding_cells.insert(cell.to_owned());
        self
    }

    /// `test_method` at this cell sleeps past any reasonable deadline.
    pub fn sleepy_test_method(mut self, cell: &str) -> Self {
        self.sleepy_cells.insert(cell.to_owned());
        self
    }

    pub async fn build(self) -> CellTree {
        let broker = Arc::new(InMemoryBroker::new());
        let calls = Arc::new(Mutex::new(Vec::new()));
        let ctx = RequestContext::admin();
        let mut cells = HashMap::new();

        for name in &self.cells {
            let entries: Vec<CatalogCellEntry> = self
                .links
                .iter()
                .filter_map(|(parent, child)| {
                    if child == name {
                        Some(catalog_entry(parent, true))
                    } else if parent == name {
                        Some(catalog_entry(child, false))
                    } else {
                        None
                    }
                })
                .collect();

            let catalog = Arc::new(InMemoryCatalog::new(entries));
            let compute = Arc::new(FakeComputeApi::new());

            let mut config = FabricConfig::builder()
                .cell_name(CellName::try_new(name.clone()).unwrap())
                .cells_topic(TopicName::try_new("cells".to_string()).unwrap())
                .enabled(!self.disabled);
            if let Some(hops) = self.max_broadcast_hops {
                config = config.max_broadcast_hops(MaxHopCount::try_new(hops).unwrap());
            }

            let test_handler: Arc<dyn CellMessageHandler> =
                if self.exploding_cells.contains(name) {
                    Arc::new(ExplodingHandler)
                } else if self.sleepy_cells.contains(name) {
                    Arc::new(SleepyHandler)
                } else {
                    Arc::new(RecordingHandler {
                        cell: name.clone(),
                        calls: calls.clone(),
                    })
                };

            let fabric = CellFabric::builder()
                .config(config.build().unwrap())
                .catalog(catalog.clone())
                .broker(broker.clone())
                .compute_api(compute.clone())
                .compute_provisioning(compute.clone())
                .handler(MethodName::of("test_method"), test_handler)
                .build()
                .unwrap();

            broker.register(name, fabric.clone());
            fabric.start(&ctx).await;

            cells.insert(
                name.clone(),
                TestCell {
                    fabric,
                    catalog,
                    compute,
                },
            );
        }

        CellTree {
            broker,
            cells,
            calls,
        }
    }
}

fn catalog_entry(name: &str, is_parent: bool) -> CatalogCellEntry {
    CatalogCellEntry {
        name: CellName::try_new(name.to_string()).unwrap(),
        is_parent,
        capabilities: HashMap::new(),
        connection: CellConnection {
            username: Some("cellfab".to_owned()),
            password: None,
            rpc_host: Some(name.to_owned()),
            rpc_port: Some(5672),
            rpc_virtual_host: None,
        },
    }
}

pub fn path(p: &str) -> RoutePath {
    RoutePath::parse(p).unwrap()
}

pub fn args(pairs: &[(&str, Value)]) -> MethodArgs {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), value.clone()))
        .collect()
}
