//! Periodic runner
//!
//! Invokes registered tasks on a fixed cadence under a fresh
//! administrative context. One task's failure does not stop the
//! others unless strict mode is set.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{debug, error};

use crate::context::RequestContext;

use super::topology::TopologyCache;
use super::traits::PeriodicTask;

/// A strict-mode sweep abort.
#[derive(Debug, Error)]
#[error("periodic task {task} failed: {source}")]
pub struct PeriodicError {
    pub task: &'static str,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// Runs registered tasks on a fixed cadence.
pub struct PeriodicRunner {
    tasks: Vec<Arc<dyn PeriodicTask>>,
    interval: Duration,
    strict: bool,
}

impl PeriodicRunner {
    /// Creates a runner. With `strict` set, the first task failure
    /// aborts the whole sweep.
    #[must_use]
    pub fn new(interval: Duration, strict: bool) -> Self {
        Self {
            tasks: Vec::new(),
            interval,
            strict,
        }
    }

    /// Registers a task; only called before [`spawn`](Self::spawn).
    pub fn register(&mut self, task: Arc<dyn PeriodicTask>) {
        self.tasks.push(task);
    }

    /// Runs every task once.
    pub async fn run_once(&self, ctx: &RequestContext) -> Result<(), PeriodicError> {
        for task in &self.tasks {
            debug!(task = task.name(), "running periodic task");
            if let Err(err) = task.run(ctx).await {
                if self.strict {
                    return Err(PeriodicError {
                        task: task.name(),
                        source: err,
                    });
                }
                error!(task = task.name(), error = %err, "error during periodic task");
            }
        }
        Ok(())
    }

    /// Spawns the cadenced loop. The first sweep runs immediately.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let ctx = RequestContext::admin();
                if let Err(err) = self.run_once(&ctx).await {
                    error!(error = %err, "periodic sweep aborted");
                }
            }
        })
    }
}

/// The canonical periodic task: reconcile the topology cache against
/// the catalog.
pub struct TopologyRefreshTask {
    topology: Arc<TopologyCache>,
}

impl TopologyRefreshTask {
    #[must_use]
    pub fn new(topology: Arc<TopologyCache>) -> Self {
        Self { topology }
    }
}

#[async_trait]
impl PeriodicTask for TopologyRefreshTask {
    fn name(&self) -> &'static str {
        "refresh_cells_from_catalog"
    }

    async fn run(
        &self,
        ctx: &RequestContext,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.topology.refresh(ctx).await?;
        Ok(())
    }
}
