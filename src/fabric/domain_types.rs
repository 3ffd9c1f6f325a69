//! Domain types for the cell fabric
//!
//! Strongly-typed values for cell identity, routing paths, and the wire
//! envelope forms, to keep primitive obsession out of the routing core.

use std::collections::HashMap;
use std::time::SystemTime;

use nutype::nutype;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Positional + keyword arguments carried by a cell message.
pub type MethodArgs = serde_json::Map<String, Value>;

/// A loose bag of record fields, as the catalog stores them.
pub type Fields = serde_json::Map<String, Value>;

fn is_cell_label(name: &str) -> bool {
    !name.is_empty() && !name.contains('.')
}

/// A single cell's name: one non-empty label, never dotted.
#[nutype(
    validate(predicate = is_cell_label),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        Deref,
        TryFrom,
        Into
    )
)]
pub struct CellName(String);

/// Name of a cell message method, the key into the handler registry.
#[nutype(derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    Deref,
    From,
    Into
))]
pub struct MethodName(String);

impl MethodName {
    /// Convenience constructor from any string-ish value.
    #[must_use]
    pub fn of(name: impl Into<String>) -> Self {
        Self::new(name.into())
    }
}

/// A broker topic name.
#[nutype(
    validate(len_char_min = 1, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        Deref,
        TryFrom,
        Into
    )
)]
pub struct TopicName(String);

/// Correlation id tying a response back to its pending request.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct ResponseId(Uuid);

impl ResponseId {
    /// Creates a new random response id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Broadcast hop ceiling.
#[nutype(
    validate(less_or_equal = 255),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 10
)]
pub struct MaxHopCount(u32);

impl MaxHopCount {
    /// Gets the ceiling as a plain count.
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.into_inner()
    }
}

/// Topology refresh cadence in seconds.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 86_400),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 60
)]
pub struct RefreshIntervalSecs(u64);

impl RefreshIntervalSecs {
    /// Converts to a Duration.
    #[must_use]
    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.into_inner())
    }
}

/// Default deadline for an originating call, in milliseconds.
#[nutype(
    validate(greater_or_equal = 100, less_or_equal = 3_600_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 30_000
)]
pub struct CallTimeoutMs(u64);

impl CallTimeoutMs {
    /// Converts to a Duration.
    #[must_use]
    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.into_inner())
    }

    /// Gets the value in milliseconds.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.into_inner()
    }
}

/// Errors from parsing a routing path off the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("routing path is empty")]
    Empty,

    #[error("routing path {path:?} contains an empty label")]
    EmptyLabel { path: String },
}

/// A dotted list of cell names, oldest first.
///
/// Doubles as a fully-qualified destination (`a.b.c`) and as the
/// record of cells an envelope has traversed so far.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoutePath(String);

impl RoutePath {
    /// A path containing a single cell.
    #[must_use]
    pub fn single(name: &CellName) -> Self {
        Self(name.to_string())
    }

    /// Parses a dotted path, rejecting empty labels.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        if path.split('.').any(str::is_empty) {
            return Err(PathError::EmptyLabel {
                path: path.to_owned(),
            });
        }
        Ok(Self(path.to_owned()))
    }

    /// Number of hops recorded so far: the number of dots.
    #[must_use]
    pub fn hop_count(&self) -> usize {
        self.0.matches('.').count()
    }

    /// The labels of the path, oldest first.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// The label at `index`, if the path is that deep.
    #[must_use]
    pub fn label_at(&self, index: usize) -> Option<&str> {
        self.labels().nth(index)
    }

    /// Returns this path with `name` appended as the newest cell.
    #[must_use]
    pub fn appended(&self, name: &CellName) -> Self {
        Self(format!("{}.{}", self.0, name))
    }

    /// Reverses the path, used to address responses back upstream.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let mut labels: Vec<&str> = self.labels().collect();
        labels.reverse();
        Self(labels.join("."))
    }

    /// Whether the first `count` labels of `self` spell out `other`.
    #[must_use]
    pub fn starts_with_labels(&self, other: &RoutePath, count: usize) -> bool {
        self.labels().take(count).eq(other.labels())
    }

    /// Borrows the dotted form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoutePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoutePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoutePath> for String {
    fn from(path: RoutePath) -> Self {
        path.0
    }
}

/// Which way an envelope travels through the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Toward ancestors.
    Up,
    /// Toward descendants.
    Down,
}

impl Direction {
    /// The direction a response to this envelope travels.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    /// The neighbor role this direction selects.
    #[must_use]
    pub fn role_label(self) -> &'static str {
        match self {
            Self::Up => "parent",
            Self::Down => "child",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
        }
    }
}

/// Broker credentials and endpoint for one neighbor, as the catalog
/// stores them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellConnection {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub rpc_host: Option<String>,
    #[serde(default)]
    pub rpc_port: Option<u16>,
    #[serde(default)]
    pub rpc_virtual_host: Option<String>,
}

/// One row of the cell catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCellEntry {
    pub name: CellName,
    pub is_parent: bool,
    /// Capabilities the listed cell exports, as last published to the
    /// catalog. Catalogs that track none leave this empty.
    #[serde(default)]
    pub capabilities: HashMap<String, String>,
    #[serde(flatten)]
    pub connection: CellConnection,
}

/// A neighbor cell as the topology cache tracks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellRecord {
    pub name: CellName,
    pub is_parent: bool,
    pub capabilities: HashMap<String, String>,
    pub connection: CellConnection,
    pub last_seen: SystemTime,
}

impl CellRecord {
    /// Creates a fresh record for a newly-listed cell. Capabilities
    /// start empty; the next reconciliation fills them in.
    #[must_use]
    pub fn from_catalog(entry: &CatalogCellEntry) -> Self {
        Self {
            name: entry.name.clone(),
            is_parent: entry.is_parent,
            capabilities: HashMap::new(),
            connection: entry.connection.clone(),
            last_seen: SystemTime::now(),
        }
    }
}

/// Transport-facing connection parameters, derived from a
/// [`CellRecord`] with empty values omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_host: Option<String>,
}

/// The inner method call an envelope delivers at its terminal cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: MethodName,
    #[serde(default)]
    pub args: MethodArgs,
}

/// A point-to-point envelope addressed to one cell in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedEnvelope {
    pub dest_cell_name: RoutePath,
    #[serde(default)]
    pub routing_path: Option<RoutePath>,
    pub direction: Direction,
    pub message: MethodCall,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_uuid: Option<ResponseId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub need_response: Option<bool>,
}

/// A direction-bounded flood envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    pub direction: Direction,
    pub message: MethodCall,
    #[serde(default)]
    pub routing_path: Option<RoutePath>,
    #[serde(default)]
    pub hopcount: u32,
    #[serde(default)]
    pub fanout: bool,
}

/// The wire form: a map of `method` and `args` as the broker carries it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
pub enum WireMessage {
    RouteMessage(RoutedEnvelope),
    BroadcastMessage(BroadcastEnvelope),
}

/// Result payload of a completed call, success or failure.
///
/// A failure carries `result` as the `[class, message, detail]` triple
/// the remote end rebuilds into a
/// [`RemoteError`](super::traits::RemoteError).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultInfo {
    pub result: Value,
    #[serde(default)]
    pub failure: bool,
}

impl ResultInfo {
    /// Wraps a successful result.
    #[must_use]
    pub fn success(result: Value) -> Self {
        Self {
            result,
            failure: false,
        }
    }

    /// Packages an error as the failure triple.
    #[must_use]
    pub fn failure(class: &str, message: &str, detail: &str) -> Self {
        Self {
            result: Value::Array(vec![
                Value::String(class.to_owned()),
                Value::String(message.to_owned()),
                Value::String(detail.to_owned()),
            ]),
            failure: true,
        }
    }
}
