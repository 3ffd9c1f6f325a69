//! Fabric configuration
//!
//! Builder-constructed and validated before the fabric starts; nothing
//! here changes after startup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::domain_types::{CallTimeoutMs, CellName, MaxHopCount, RefreshIntervalSecs, TopicName};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("missing required configuration: {field}")]
    Missing { field: &'static str },

    #[error("fabric component not supplied: {component}")]
    MissingComponent { component: &'static str },
}

/// Which transport adapter moves envelopes between cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDriver {
    /// Cast envelopes through the neighbor's message broker.
    #[default]
    Rpc,
}

/// Which placement policy the scheduling forwarder applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementPolicy {
    /// Uniformly random child, self when childless.
    #[default]
    RandomChild,
}

/// Complete fabric configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    /// This cell's identity in the tree.
    pub cell_name: CellName,

    /// Capabilities exported to neighbors, as `key=value` strings.
    pub capabilities: Vec<String>,

    /// Topology refresh cadence.
    pub refresh_interval: RefreshIntervalSecs,

    /// Broadcast hop ceiling.
    pub max_broadcast_hops: MaxHopCount,

    /// Topic neighbor cells consume fabric envelopes on.
    pub cells_topic: TopicName,

    /// Topic the local scheduler service consumes on.
    pub scheduler_topic: TopicName,

    /// Transport adapter selector.
    pub transport_driver: TransportDriver,

    /// Placement policy selector.
    pub placement: PlacementPolicy,

    /// Gates whether this process participates in the fabric.
    pub enabled: bool,

    /// Default deadline for originating calls.
    pub call_timeout: CallTimeoutMs,

    /// When set, a periodic task failure aborts the whole sweep.
    pub strict_periodic_tasks: bool,
}

impl FabricConfig {
    /// Starts a builder. `cell_name` and `cells_topic` are required.
    #[must_use]
    pub fn builder() -> FabricConfigBuilder {
        FabricConfigBuilder::default()
    }

    /// Parses the configured `key=value` capability strings.
    pub fn parsed_capabilities(&self) -> Result<HashMap<String, String>, ConfigError> {
        self.capabilities
            .iter()
            .map(|entry| {
                entry
                    .split_once('=')
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .ok_or_else(|| ConfigError::Validation {
                        field: "capabilities".to_owned(),
                        reason: format!("{entry:?} is not of the form key=value"),
                    })
            })
            .collect()
    }

    /// Validates cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_capabilities()?;
        if self.cells_topic == self.scheduler_topic {
            return Err(ConfigError::Validation {
                field: "scheduler_topic".to_owned(),
                reason: "must differ from cells_topic".to_owned(),
            });
        }
        Ok(())
    }
}

/// Builder for [`FabricConfig`].
#[derive(Debug, Default)]
pub struct FabricConfigBuilder {
    cell_name: Option<CellName>,
    capabilities: Vec<String>,
    refresh_interval: Option<RefreshIntervalSecs>,
    max_broadcast_hops: Option<MaxHopCount>,
    cells_topic: Option<TopicName>,
    scheduler_topic: Option<TopicName>,
    transport_driver: TransportDriver,
    placement: PlacementPolicy,
    enabled: bool,
    call_timeout: Option<CallTimeoutMs>,
    strict_periodic_tasks: bool,
}

impl FabricConfigBuilder {
    #[must_use]
    pub fn cell_name(mut self, name: CellName) -> Self {
        self.cell_name = Some(name);
        self
    }

    #[must_use]
    pub fn capability(mut self, entry: impl Into<String>) -> Self {
        self.capabilities.push(entry.into());
        self
    }

    #[must_use]
    pub fn capabilities(mut self, entries: Vec<String>) -> Self {
        self.capabilities = entries;
        self
    }

    #[must_use]
    pub fn refresh_interval(mut self, interval: RefreshIntervalSecs) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn max_broadcast_hops(mut self, hops: MaxHopCount) -> Self {
        self.max_broadcast_hops = Some(hops);
        self
    }

    #[must_use]
    pub fn cells_topic(mut self, topic: TopicName) -> Self {
        self.cells_topic = Some(topic);
        self
    }

    #[must_use]
    pub fn scheduler_topic(mut self, topic: TopicName) -> Self {
        self.scheduler_topic = Some(topic);
        self
    }

    #[must_use]
    pub fn transport_driver(mut self, driver: TransportDriver) -> Self {
        self.transport_driver = driver;
        self
    }

    #[must_use]
    pub fn placement(mut self, policy: PlacementPolicy) -> Self {
        self.placement = policy;
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn call_timeout(mut self, timeout: CallTimeoutMs) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn strict_periodic_tasks(mut self, strict: bool) -> Self {
        self.strict_periodic_tasks = strict;
        self
    }

    /// Finalizes and validates the configuration.
    pub fn build(self) -> Result<FabricConfig, ConfigError> {
        let cell_name = self
            .cell_name
            .ok_or(ConfigError::Missing { field: "cell_name" })?;
        let cells_topic = self.cells_topic.ok_or(ConfigError::Missing {
            field: "cells_topic",
        })?;
        let scheduler_topic = match self.scheduler_topic {
            Some(topic) => topic,
            None => {
                TopicName::try_new("scheduler".to_owned()).map_err(|_| ConfigError::Validation {
                    field: "scheduler_topic".to_owned(),
                    reason: "default topic rejected".to_owned(),
                })?
            }
        };
        let config = FabricConfig {
            cell_name,
            capabilities: self.capabilities,
            refresh_interval: self.refresh_interval.unwrap_or_default(),
            max_broadcast_hops: self.max_broadcast_hops.unwrap_or_default(),
            cells_topic,
            scheduler_topic,
            transport_driver: self.transport_driver,
            placement: self.placement,
            enabled: self.enabled,
            call_timeout: self.call_timeout.unwrap_or_default(),
            strict_periodic_tasks: self.strict_periodic_tasks,
        };
        config.validate()?;
        Ok(config)
    }
}
