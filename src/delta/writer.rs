//! Server-side script producer.

use serde_json::Value;

use super::types::{Delta, DeltaOp, PathStep, Script};

/// Builds a [`Script`], packing consecutive calls of the same operation on
/// the same target into a single delta.
///
/// ```ignore
/// let mut writer = ScriptWriter::new();
/// writer.insert(&[], json!({"_": 0, "id": 1}));
/// writer.insert(&[], json!({"_": 1, "id": 2}));   // same delta as above
/// writer.clear(&details);
/// writer.rewrite(&details, json!({"_": 0, "taskid": 4}));
/// let script = writer.finish();                   // ends with a root notify
/// ```
#[derive(Debug, Default)]
pub struct ScriptWriter {
    deltas: Vec<Delta>,
    /// Batch still open for more entries.
    pending: Option<Delta>,
}

impl ScriptWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: &[PathStep], entry: Value) -> &mut Self {
        self.batch(target, DeltaOp::Insert { entries: vec![entry] })
    }

    pub fn update(&mut self, target: &[PathStep], entry: Value) -> &mut Self {
        self.batch(target, DeltaOp::Update { entries: vec![entry] })
    }

    pub fn rewrite(&mut self, target: &[PathStep], entry: Value) -> &mut Self {
        self.batch(target, DeltaOp::Rewrite { entries: vec![entry] })
    }

    pub fn remove(&mut self, target: &[PathStep], position: usize) -> &mut Self {
        let position = i64::try_from(position).unwrap_or(i64::MAX);
        self.batch(target, DeltaOp::Remove { positions: vec![position] })
    }

    pub fn clear(&mut self, target: &[PathStep]) -> &mut Self {
        self.single(target, DeltaOp::Clear)
    }

    pub fn set_length(&mut self, target: &[PathStep], length: usize) -> &mut Self {
        let length = i64::try_from(length).unwrap_or(i64::MAX);
        self.single(target, DeltaOp::SetLength { length })
    }

    pub fn notify(&mut self, target: &[PathStep]) -> &mut Self {
        self.single(target, DeltaOp::Notify)
    }

    /// Number of deltas written so far, counting an open batch.
    pub fn len(&self) -> usize {
        self.deltas.len() + usize::from(self.pending.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the script with a root notification.
    pub fn finish(mut self) -> Script {
        self.flush();
        self.deltas.push(Delta::root(DeltaOp::Notify));
        Script::from(self.deltas)
    }

    fn batch(&mut self, target: &[PathStep], op: DeltaOp) -> &mut Self {
        let op = match self.pending.as_mut() {
            Some(open) if open.target == target => match open.op.merge_batch(op) {
                None => return self,
                Some(rejected) => rejected,
            },
            _ => op,
        };
        self.flush();
        self.pending = Some(Delta::at(target.to_vec(), op));
        self
    }

    fn single(&mut self, target: &[PathStep], op: DeltaOp) -> &mut Self {
        self.flush();
        self.deltas.push(Delta::at(target.to_vec(), op));
        self
    }

    fn flush(&mut self) {
        if let Some(open) = self.pending.take() {
            self.deltas.push(open);
        }
    }
}
