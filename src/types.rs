//! Core types shared by collections, the tree adapter and delta scripts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a record, independent of its current position.
///
/// Servers send either numeric or textual ids; the two never compare equal.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    /// Interpret a JSON value as an id. `null` means "no id".
    pub fn from_json(value: &serde_json::Value) -> Option<Option<Self>> {
        match value {
            serde_json::Value::Null => Some(None),
            serde_json::Value::Number(n) => n.as_i64().map(|i| Some(RecordId::Int(i))),
            serde_json::Value::String(s) => Some(Some(RecordId::Text(s.clone()))),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RecordId::Int(i) => serde_json::Value::from(*i),
            RecordId::Text(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(i) => write!(f, "RecordId({})", i),
            RecordId::Text(s) => write!(f, "RecordId({:?})", s),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(i) => write!(f, "{}", i),
            RecordId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Int(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId::Text(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        RecordId::Text(id)
    }
}

/// Contents of one addressable position of a collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot<T> {
    /// Known to exist, not fetched yet (or explicitly cleared).
    NotLoaded,
    Loaded(T),
}

impl<T> Slot<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Slot::Loaded(_))
    }

    /// Convert to an option, treating not-loaded as `None`.
    pub fn loaded(self) -> Option<T> {
        match self {
            Slot::Loaded(item) => Some(item),
            Slot::NotLoaded => None,
        }
    }
}

/// How a delta entry names the record it applies to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Address {
    pub id: Option<RecordId>,
    pub position: Option<usize>,
}

impl Address {
    pub fn id(id: impl Into<RecordId>) -> Self {
        Self {
            id: Some(id.into()),
            position: None,
        }
    }

    pub fn position(position: usize) -> Self {
        Self {
            id: None,
            position: Some(position),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.id, self.position) {
            (Some(id), Some(pos)) => write!(f, "id {} @{}", id, pos),
            (Some(id), None) => write!(f, "id {}", id),
            (None, Some(pos)) => write!(f, "@{}", pos),
            (None, None) => write!(f, "<unaddressed>"),
        }
    }
}

/// An insert entry: a record and the position it should end up at.
#[derive(Clone, Debug, PartialEq)]
pub struct Placed<T> {
    pub position: usize,
    pub record: T,
}

impl<T> Placed<T> {
    pub fn new(position: usize, record: T) -> Self {
        Self { position, record }
    }
}

/// An update or rewrite entry: a record and where it goes.
#[derive(Clone, Debug, PartialEq)]
pub struct Addressed<T> {
    pub address: Address,
    pub record: T,
}

impl<T> Addressed<T> {
    pub fn new(address: Address, record: T) -> Self {
        Self { address, record }
    }
}

/// A condition that was recovered from silently while applying an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// The entry named a record that is not present.
    UnresolvedAddress(Address),
    /// A position at or beyond the collection length was discarded.
    OutOfRange { position: usize, length: usize },
    /// The same position was listed more than once.
    DuplicatePosition(usize),
    /// An insert carried an id that already exists.
    DuplicateIdentity(RecordId),
    /// A field switched between scalar and collection; it was overwritten.
    ShapeMismatch { field: String },
    /// A delta's target path did not resolve to a collection.
    UnresolvedTarget(String),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnresolvedAddress(addr) => write!(f, "no record at {}", addr),
            Diagnostic::OutOfRange { position, length } => {
                write!(f, "position {} out of range (length {})", position, length)
            }
            Diagnostic::DuplicatePosition(pos) => write!(f, "duplicate position {}", pos),
            Diagnostic::DuplicateIdentity(id) => write!(f, "id {} already present", id),
            Diagnostic::ShapeMismatch { field } => {
                write!(f, "field {:?} changed shape, overwritten", field)
            }
            Diagnostic::UnresolvedTarget(path) => write!(f, "target {} not found", path),
        }
    }
}

/// Outcome of one collection operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OpReport {
    /// Number of entries (or positions) that took effect.
    pub applied: usize,
    /// Everything that was skipped or coerced along the way.
    pub diagnostics: Vec<Diagnostic>,
}

impl OpReport {
    pub fn changed(&self) -> bool {
        self.applied > 0
    }

    pub(crate) fn note(&mut self, diagnostic: Diagnostic) {
        tracing::debug!(%diagnostic, "recovered from delta entry");
        self.diagnostics.push(diagnostic);
    }

    /// Fold another report into this one.
    pub fn absorb(&mut self, other: OpReport) {
        self.applied += other.applied;
        self.diagnostics.extend(other.diagnostics);
    }
}
