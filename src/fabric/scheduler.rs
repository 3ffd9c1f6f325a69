//! Placement forwarder
//!
//! Handles `schedule_run_instance` by picking a child cell at random
//! and pushing the request one level down the tree, or placing the
//! instance here when this cell has no children.

use std::sync::Arc;

use rand::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::context::RequestContext;

use super::domain_types::{
    CellRecord, Direction, Fields, MethodArgs, MethodName, RoutePath, TopicName,
};
use super::messages;
use super::router::CellFabric;
use super::traits::{ComputeProvisioning, HandlerError};

/// The scheduling request carried by `schedule_run_instance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub instance_properties: Fields,
    pub instance_type: Value,
    pub image: Value,
    #[serde(default)]
    pub security_group: Value,
    #[serde(default)]
    pub block_device_mapping: Value,
}

enum Candidate {
    Local,
    Cell(CellRecord),
}

impl Candidate {
    fn describe(&self) -> String {
        match self {
            Self::Local => "self".to_owned(),
            Self::Cell(cell) => cell.name.to_string(),
        }
    }
}

/// Random-child placement.
pub struct PlacementScheduler {
    provisioning: Option<Arc<dyn ComputeProvisioning>>,
    scheduler_topic: TopicName,
}

impl PlacementScheduler {
    /// Creates the scheduler. Without a bound provisioning API this
    /// cell can forward but never place locally.
    pub fn new(
        provisioning: Option<Arc<dyn ComputeProvisioning>>,
        scheduler_topic: TopicName,
    ) -> Self {
        Self {
            provisioning,
            scheduler_topic,
        }
    }

    /// Picks candidates and tries them in order until one send
    /// attempt does not fail synchronously. Placement errors past the
    /// send are not retried across children, and no reply is issued.
    pub async fn schedule_run_instance(
        &self,
        fabric: &Arc<CellFabric>,
        ctx: &RequestContext,
        args: MethodArgs,
    ) -> Result<(), HandlerError> {
        let request_spec: RequestSpec = parse_request_spec(&args)?;

        let mut candidates: Vec<Candidate> = fabric
            .topology()
            .snapshot()
            .neighbors(Direction::Down)
            .cloned()
            .map(Candidate::Cell)
            .collect();
        if candidates.is_empty() {
            // No more children: this cell is the only choice.
            candidates.push(Candidate::Local);
        } else {
            candidates.shuffle(&mut thread_rng());
        }

        for candidate in candidates {
            let attempt = match &candidate {
                Candidate::Local => self.run_here(fabric, ctx, &request_spec, &args).await,
                Candidate::Cell(cell) => Self::forward_to_cell(fabric, ctx, cell, &args).await,
            };
            match attempt {
                Ok(()) => return Ok(()),
                Err(err) => {
                    error!(
                        cell = %candidate.describe(),
                        error = %err,
                        "couldn't communicate with cell"
                    );
                }
            }
        }
        error!("couldn't communicate with any cells");
        Ok(())
    }

    /// Places the instance here: create the local record, replicate
    /// it upward, then hand off to the local scheduler service.
    async fn run_here(
        &self,
        fabric: &Arc<CellFabric>,
        ctx: &RequestContext,
        request_spec: &RequestSpec,
        args: &MethodArgs,
    ) -> Result<(), HandlerError> {
        let provisioning = self
            .provisioning
            .as_ref()
            .ok_or_else(|| HandlerError::failed("no compute provisioning API bound"))?;
        let instance = provisioning
            .create_db_entry_for_new_instance(ctx, request_spec)
            .await?;
        debug!(cell = %fabric.self_name(), "created instance entry for local placement");

        let update = messages::instance_update_broadcast(&instance);
        fabric.broadcast_message(ctx, update).await;

        let payload = json!({
            "method": "run_instance",
            "args": Value::Object(args.clone()),
        });
        fabric
            .transport()
            .cast_local(ctx, &self.scheduler_topic, payload)
            .await
            .map_err(HandlerError::failed)
    }

    /// Forwards the original request one hop down to `cell`.
    async fn forward_to_cell(
        fabric: &Arc<CellFabric>,
        ctx: &RequestContext,
        cell: &CellRecord,
        args: &MethodArgs,
    ) -> Result<(), HandlerError> {
        let dest = RoutePath::single(fabric.self_name()).appended(&cell.name);
        let envelope = messages::routed(
            dest,
            Direction::Down,
            MethodName::of("schedule_run_instance"),
            args.clone(),
            None,
            None,
        );
        let deadline = fabric.config().call_timeout.as_duration();
        fabric
            .route_message_inner(ctx, envelope, deadline)
            .await
            .map(|_| ())
            .map_err(HandlerError::failed)
    }
}

fn parse_request_spec(args: &MethodArgs) -> Result<RequestSpec, HandlerError> {
    let value = args
        .get("request_spec")
        .ok_or_else(|| HandlerError::BadArgs {
            method: MethodName::of("schedule_run_instance"),
            reason: "missing argument \"request_spec\"".to_owned(),
        })?;
    serde_json::from_value(value.clone()).map_err(|err| HandlerError::BadArgs {
        method: MethodName::of("schedule_run_instance"),
        reason: format!("argument \"request_spec\": {err}"),
    })
}
