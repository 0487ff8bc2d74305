//! Wire types for delta scripts.

use crate::error::{Result, SyncError};
use crate::types::RecordId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of a path from the root collection to a nested collection.
///
/// Record selectors (`id`, `at`) and `field` steps alternate, and a path
/// always ends on a `field`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStep {
    /// Select the record with this id.
    Id(RecordId),
    /// Select the loaded record at this position.
    At(usize),
    /// Descend into this collection attribute of the selected record.
    Field(String),
}

impl PathStep {
    pub fn id(id: impl Into<RecordId>) -> Self {
        PathStep::Id(id.into())
    }

    pub fn field(name: impl Into<String>) -> Self {
        PathStep::Field(name.into())
    }
}

/// Render a path for log lines.
pub(crate) fn describe_path(path: &[PathStep]) -> String {
    let mut out = String::from("root");
    for step in path {
        match step {
            PathStep::Id(id) => out.push_str(&format!("[id={}]", id)),
            PathStep::At(position) => out.push_str(&format!("[{}]", position)),
            PathStep::Field(name) => out.push_str(&format!(".{}", name)),
        }
    }
    out
}

/// Operation carried by a delta.
///
/// Entries stay raw JSON on the wire; they are validated and turned into
/// typed records when the script is compiled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DeltaOp {
    /// Insert records; each entry carries its target position.
    Insert { entries: Vec<serde_json::Value> },

    /// Delete positions. Negative positions are ignored.
    Remove { positions: Vec<i64> },

    /// Merge partial records, addressed by id or position.
    Update { entries: Vec<serde_json::Value> },

    /// Replace whole records, addressed by id or position.
    Rewrite { entries: Vec<serde_json::Value> },

    /// Unload everything and set the length to zero.
    Clear,

    /// Set the declared length. Negative lengths clamp to zero.
    SetLength { length: i64 },

    /// Fire the change notification.
    Notify,
}

impl DeltaOp {
    pub fn name(&self) -> &'static str {
        match self {
            DeltaOp::Insert { .. } => "insert",
            DeltaOp::Remove { .. } => "remove",
            DeltaOp::Update { .. } => "update",
            DeltaOp::Rewrite { .. } => "rewrite",
            DeltaOp::Clear => "clear",
            DeltaOp::SetLength { .. } => "set_length",
            DeltaOp::Notify => "notify",
        }
    }

    /// Fold `other` into this batch if both are the same batchable kind.
    ///
    /// Returns `other` back when it cannot be folded.
    pub(crate) fn merge_batch(&mut self, other: DeltaOp) -> Option<DeltaOp> {
        match (self, other) {
            (DeltaOp::Insert { entries }, DeltaOp::Insert { entries: more })
            | (DeltaOp::Update { entries }, DeltaOp::Update { entries: more })
            | (DeltaOp::Rewrite { entries }, DeltaOp::Rewrite { entries: more }) => {
                entries.extend(more);
                None
            }
            (DeltaOp::Remove { positions }, DeltaOp::Remove { positions: more }) => {
                positions.extend(more);
                None
            }
            (_, other) => Some(other),
        }
    }
}

/// A single operation aimed at one collection of the tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Path to the target collection; empty means the root.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target: Vec<PathStep>,

    #[serde(flatten)]
    pub op: DeltaOp,
}

impl Delta {
    /// A delta aimed at the root collection.
    pub fn root(op: DeltaOp) -> Self {
        Self {
            target: Vec::new(),
            op,
        }
    }

    pub fn at(target: Vec<PathStep>, op: DeltaOp) -> Self {
        Self { target, op }
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", describe_path(&self.target), self.op.name())
    }
}

/// An ordered list of deltas delivered together.
///
/// On the wire a script is a plain array of deltas:
///
/// ```json
/// [
///   {"op": "clear", "target": [{"id": 5}, {"field": "details"}]},
///   {"op": "rewrite", "target": [{"id": 5}, {"field": "details"}],
///    "entries": [{"_": 0, "taskid": 1, "status": "done"}]},
///   {"op": "notify"}
/// ]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Script {
    pub deltas: Vec<Delta>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: Delta) {
        self.deltas.push(delta);
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delta> {
        self.deltas.iter()
    }

    /// Decode a JSON-encoded script.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| SyncError::Serialization(e.to_string()))
    }

    /// Decode a MessagePack-encoded script (map encoding).
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }
}

impl From<Vec<Delta>> for Script {
    fn from(deltas: Vec<Delta>) -> Self {
        Self { deltas }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_json_script() {
        let bytes = serde_json::to_vec(&json!([
            {"op": "insert", "entries": [{"_": 0, "id": 1}]},
            {"op": "remove", "positions": [3, -1]},
            {"op": "clear", "target": [{"id": 5}, {"field": "details"}]},
            {"op": "set_length", "length": 4},
            {"op": "notify"}
        ]))
        .unwrap();

        let script = Script::from_json(&bytes).unwrap();

        assert_eq!(script.len(), 5);
        assert_eq!(
            script.deltas[2],
            Delta::at(
                vec![PathStep::id(5), PathStep::field("details")],
                DeltaOp::Clear
            )
        );
        assert_eq!(script.deltas[1].op, DeltaOp::Remove { positions: vec![3, -1] });
        assert_eq!(script.deltas[4], Delta::root(DeltaOp::Notify));
    }

    #[test]
    fn test_unknown_op_rejected() {
        let result = Script::from_json(br#"[{"op": "eval", "code": "alert(1)"}]"#);
        assert!(matches!(result, Err(SyncError::Deserialization(_))));
    }

    #[test]
    fn test_msgpack_round_trip() {
        let script = Script::from(vec![
            Delta::at(
                vec![PathStep::id("run-7"), PathStep::field("details")],
                DeltaOp::Rewrite {
                    entries: vec![json!({"_": 0, "status": "done"})],
                },
            ),
            Delta::root(DeltaOp::SetLength { length: -2 }),
        ]);

        let bytes = script.to_msgpack().unwrap();
        assert_eq!(Script::from_msgpack(&bytes).unwrap(), script);
    }

    #[test]
    fn test_json_omits_empty_target() {
        let bytes = Script::from(vec![Delta::root(DeltaOp::Notify)]).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!([{"op": "notify"}]));
    }

    #[test]
    fn test_merge_batch() {
        let mut op = DeltaOp::Remove { positions: vec![1] };
        assert!(op.merge_batch(DeltaOp::Remove { positions: vec![4] }).is_none());
        assert_eq!(op, DeltaOp::Remove { positions: vec![1, 4] });

        let rejected = op.merge_batch(DeltaOp::Clear);
        assert_eq!(rejected, Some(DeltaOp::Clear));
    }

    #[test]
    fn test_describe_path() {
        let path = vec![PathStep::id(5), PathStep::field("details"), PathStep::At(2)];
        assert_eq!(describe_path(&path), "root[id=5].details[2]");
    }
}
