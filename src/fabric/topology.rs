//! Topology cache
//!
//! Tracks this cell's parents and children, reconciled against the
//! catalog on a timer. Readers take an immutable snapshot; a refresh
//! builds a whole new snapshot and swaps it in, so routing decisions
//! never observe a half-updated cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::RequestContext;

use super::domain_types::{CatalogCellEntry, CellName, CellRecord, Direction};
use super::traits::{Catalog, CatalogError};

/// An immutable view of the neighbor tree at one instant.
#[derive(Debug, Clone, Default)]
pub struct TopologySnapshot {
    parents: HashMap<CellName, CellRecord>,
    children: HashMap<CellName, CellRecord>,
}

impl TopologySnapshot {
    /// Neighbors reachable in `direction`: up selects parents, down
    /// selects children.
    pub fn neighbors(&self, direction: Direction) -> impl Iterator<Item = &CellRecord> {
        match direction {
            Direction::Up => self.parents.values(),
            Direction::Down => self.children.values(),
        }
    }

    /// Looks up one neighbor by name in `direction`.
    #[must_use]
    pub fn neighbor(&self, direction: Direction, name: &str) -> Option<&CellRecord> {
        let side = match direction {
            Direction::Up => &self.parents,
            Direction::Down => &self.children,
        };
        side.iter()
            .find_map(|(cell, record)| (cell.as_str() == name).then_some(record))
    }

    /// Looks up a neighbor by name on either side.
    #[must_use]
    pub fn lookup(&self, name: &CellName) -> Option<&CellRecord> {
        self.parents.get(name).or_else(|| self.children.get(name))
    }

    /// Whether this cell has any parents, i.e. is not the top of the
    /// tree.
    #[must_use]
    pub fn has_parents(&self) -> bool {
        !self.parents.is_empty()
    }

    /// Number of known neighbors on both sides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parents.len() + self.children.len()
    }

    /// Whether no neighbors are known at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty() && self.children.is_empty()
    }

    pub(crate) fn from_records(records: impl IntoIterator<Item = CellRecord>) -> Self {
        let mut snapshot = Self::default();
        for record in records {
            let side = if record.is_parent {
                &mut snapshot.parents
            } else {
                &mut snapshot.children
            };
            side.insert(record.name.clone(), record);
        }
        snapshot
    }
}

/// A redacted description of one known cell, for operator surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellOverview {
    pub name: CellName,
    pub is_parent: bool,
    pub capabilities: HashMap<String, String>,
    pub username: Option<String>,
    pub rpc_host: Option<String>,
    pub rpc_port: Option<u16>,
}

impl CellOverview {
    fn from_record(record: &CellRecord) -> Self {
        Self {
            name: record.name.clone(),
            is_parent: record.is_parent,
            capabilities: record.capabilities.clone(),
            username: record.connection.username.clone(),
            rpc_host: record.connection.rpc_host.clone(),
            rpc_port: record.connection.rpc_port,
        }
    }
}

/// The process-wide neighbor cache.
pub struct TopologyCache {
    self_name: CellName,
    self_capabilities: HashMap<String, String>,
    catalog: Arc<dyn Catalog>,
    snapshot: RwLock<Arc<TopologySnapshot>>,
}

impl TopologyCache {
    /// Creates an empty cache; call [`refresh`](Self::refresh) to
    /// populate it.
    pub fn new(
        self_name: CellName,
        self_capabilities: HashMap<String, String>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self {
            self_name,
            self_capabilities,
            catalog,
            snapshot: RwLock::new(Arc::new(TopologySnapshot::default())),
        }
    }

    /// This cell's own name.
    #[must_use]
    pub fn self_name(&self) -> &CellName {
        &self.self_name
    }

    /// Capabilities this cell exports to neighbors.
    #[must_use]
    pub fn self_capabilities(&self) -> &HashMap<String, String> {
        &self.self_capabilities
    }

    /// Takes the current snapshot. Hold it for one envelope at most;
    /// a concurrent refresh replaces the published snapshot without
    /// touching outstanding ones.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TopologySnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Reconciles the cache against the catalog.
    ///
    /// Records whose role is unchanged pick up the freshly-listed
    /// connection and capabilities and get their last-seen time
    /// re-stamped; records whose role changed or that vanished are
    /// dropped; new records start with empty capabilities. Idempotent,
    /// and leaves the cache intact on catalog failure.
    pub async fn refresh(&self, ctx: &RequestContext) -> Result<(), CatalogError> {
        let entries = self.catalog.list_cells(ctx).await?;
        let current = self.snapshot();

        let mut next = TopologySnapshot::default();
        for entry in entries {
            if entry.name == self.self_name {
                warn!(cell = %entry.name, "catalog lists this cell as its own neighbor; skipping");
                continue;
            }
            let record = reconcile_record(&current, &entry);
            let side = if entry.is_parent {
                &mut next.parents
            } else {
                &mut next.children
            };
            side.insert(entry.name, record);
        }

        debug!(
            parents = next.parents.len(),
            children = next.children.len(),
            "updated cell cache from catalog"
        );
        let mut published = self
            .snapshot
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *published = Arc::new(next);
        Ok(())
    }

    /// Describes every known cell, children first, then parents.
    #[must_use]
    pub fn cell_overview(&self) -> Vec<CellOverview> {
        let snapshot = self.snapshot();
        snapshot
            .neighbors(Direction::Down)
            .chain(snapshot.neighbors(Direction::Up))
            .map(CellOverview::from_record)
            .collect()
    }
}

/// Carries an existing record forward when the role matches, otherwise
/// starts fresh. A carried-forward record takes the entry's current
/// metadata and a fresh last-seen stamp.
fn reconcile_record(current: &TopologySnapshot, entry: &CatalogCellEntry) -> CellRecord {
    let side = if entry.is_parent {
        &current.parents
    } else {
        &current.children
    };
    match side.get(&entry.name) {
        Some(existing) => CellRecord {
            capabilities: entry.capabilities.clone(),
            connection: entry.connection.clone(),
            last_seen: SystemTime::now(),
            ..existing.clone()
        },
        None => CellRecord::from_catalog(entry),
    }
}
