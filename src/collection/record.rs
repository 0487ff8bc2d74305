//! Records: the items stored in a collection tree.

use crate::notify::ChangeHub;
use crate::types::{Diagnostic, OpReport, RecordId};
use std::collections::BTreeMap;

use super::sparse::{Item, SparseCollection};

/// Value of one record attribute.
///
/// Whether an attribute is a nested collection is decided when the record is
/// built, never by probing it later.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Scalar(serde_json::Value),
    Collection(SparseCollection<Record>),
}

impl FieldValue {
    pub fn is_collection(&self) -> bool {
        matches!(self, FieldValue::Collection(_))
    }

    pub fn as_scalar(&self) -> Option<&serde_json::Value> {
        match self {
            FieldValue::Scalar(value) => Some(value),
            FieldValue::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&SparseCollection<Record>> {
        match self {
            FieldValue::Collection(collection) => Some(collection),
            FieldValue::Scalar(_) => None,
        }
    }

    pub fn as_collection_mut(&mut self) -> Option<&mut SparseCollection<Record>> {
        match self {
            FieldValue::Collection(collection) => Some(collection),
            FieldValue::Scalar(_) => None,
        }
    }

    fn adopt(&mut self, hub: &ChangeHub) {
        if let FieldValue::Collection(collection) = self {
            collection.hub().link_upstream(hub);
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        FieldValue::Scalar(value)
    }
}

impl From<SparseCollection<Record>> for FieldValue {
    fn from(collection: SparseCollection<Record>) -> Self {
        FieldValue::Collection(collection)
    }
}

/// A server-described record with an optional identity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    pub id: Option<RecordId>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<RecordId>) -> Self {
        Self {
            id: Some(id.into()),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn scalar(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name).and_then(FieldValue::as_scalar)
    }

    pub fn collection(&self, name: &str) -> Option<&SparseCollection<Record>> {
        self.fields.get(name).and_then(FieldValue::as_collection)
    }

    pub fn collection_mut(&mut self, name: &str) -> Option<&mut SparseCollection<Record>> {
        self.fields.get_mut(name).and_then(FieldValue::as_collection_mut)
    }

    /// Set an attribute, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.fields.insert(name.into(), value.into())
    }
}

impl Item for Record {
    fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    /// Field-by-field merge.
    ///
    /// A collection field patched with a collection is merged in place, so
    /// the target keeps its hub, listeners and already-loaded children.
    /// Anything else is overwritten.
    fn merge(&mut self, patch: Self, hub: &ChangeHub, report: &mut OpReport) {
        if let Some(id) = patch.id {
            self.id = Some(id);
        }

        for (name, value) in patch.fields {
            match self.fields.get_mut(&name) {
                Some(FieldValue::Collection(target)) if value.is_collection() => {
                    if let FieldValue::Collection(source) = value {
                        target.merge_from(source);
                    }
                }
                existing => {
                    if existing.is_some_and(|old| old.is_collection() != value.is_collection()) {
                        report.note(Diagnostic::ShapeMismatch { field: name.clone() });
                    }
                    let mut value = value;
                    value.adopt(hub);
                    self.fields.insert(name, value);
                }
            }
        }
    }

    fn adopt(&mut self, hub: &ChangeHub) {
        for value in self.fields.values_mut() {
            value.adopt(hub);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, Addressed, Placed, Slot};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn task(id: i64, title: &str) -> Record {
        Record::with_id(id).field("title", json!(title))
    }

    fn run_with_details(id: i64, tasks: Vec<Record>, total: usize) -> Record {
        let details = SparseCollection::from_snapshot(total, tasks.into_iter().enumerate());
        Record::with_id(id)
            .field("title", json!("run"))
            .field("details", details)
    }

    #[test]
    fn test_merge_overwrites_scalars_and_keeps_others() {
        let mut runs = SparseCollection::from_snapshot(
            1,
            vec![(0, Record::with_id(1).field("ok", json!(1)).field("title", json!("t")))],
        );

        runs.update(vec![Addressed::new(
            Address::id(1),
            Record::with_id(1).field("ok", json!(5)),
        )]);

        let run = runs.lookup_by_id(&RecordId::Int(1)).unwrap();
        assert_eq!(run.scalar("ok"), Some(&json!(5)));
        assert_eq!(run.scalar("title"), Some(&json!("t")));
    }

    #[test]
    fn test_merge_nested_collection_in_place() {
        let mut runs = SparseCollection::from_snapshot(
            1,
            vec![(0, run_with_details(1, vec![task(100, "a"), task(101, "b")], 3))],
        );

        let nested_hub = runs
            .lookup_by_id(&RecordId::Int(1))
            .unwrap()
            .collection("details")
            .unwrap()
            .hub()
            .clone();

        // Patch only position 1 of the nested table
        let patch_details = SparseCollection::from_snapshot(3, vec![(1, task(101, "B"))]);
        let report = runs.update(vec![Addressed::new(
            Address::id(1),
            Record::with_id(1).field("details", patch_details),
        )]);
        assert_eq!(report.applied, 1);
        assert!(report.diagnostics.is_empty());

        let details = runs.lookup_by_id(&RecordId::Int(1)).unwrap().collection("details").unwrap();
        assert!(details.hub().same_as(&nested_hub));
        assert_eq!(details.len(), 3);
        assert_eq!(details.get(0), Some(Slot::Loaded(&task(100, "a"))));
        assert_eq!(details.get(1), Some(Slot::Loaded(&task(101, "B"))));
        assert_eq!(details.get(2), Some(Slot::NotLoaded));
    }

    #[test]
    fn test_merge_shape_mismatch_overwrites() {
        let mut runs = SparseCollection::from_snapshot(1, vec![(0, run_with_details(1, vec![], 2))]);

        let report = runs.update(vec![Addressed::new(
            Address::id(1),
            Record::with_id(1).field("details", json!("gone")),
        )]);

        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::ShapeMismatch {
                field: "details".into()
            }]
        );
        let run = runs.lookup_by_id(&RecordId::Int(1)).unwrap();
        assert_eq!(run.scalar("details"), Some(&json!("gone")));
    }

    #[test]
    fn test_update_never_changes_length() {
        let mut runs = SparseCollection::from_snapshot(4, vec![(0, task(1, "a"))]);
        runs.update(vec![Addressed::new(Address::position(0), task(1, "b"))]);
        assert_eq!(runs.len(), 4);
    }

    #[test]
    fn test_rewrite_discards_old_fields() {
        let mut runs = SparseCollection::from_snapshot(
            2,
            vec![
                (0, task(1, "a")),
                (1, Record::with_id(2).field("title", json!("b")).field("extra", json!(true))),
            ],
        );

        runs.rewrite(vec![Addressed::new(
            Address::id(2),
            Record::with_id(2).field("value", json!("new")),
        )]);

        let rewritten = runs.get(1).unwrap().loaded().unwrap();
        assert_eq!(rewritten.scalar("value"), Some(&json!("new")));
        assert!(rewritten.get("extra").is_none());
        assert!(rewritten.get("title").is_none());
    }

    #[test]
    fn test_nested_change_reaches_root() {
        let mut runs: SparseCollection<Record> = SparseCollection::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        runs.on_change(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        runs.insert(vec![Placed::new(0, run_with_details(1, vec![], 0))]);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let details = runs
            .lookup_by_id_mut(&RecordId::Int(1))
            .unwrap()
            .collection_mut("details")
            .unwrap();
        details.insert(vec![Placed::new(0, task(100, "t"))]);

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_patch_collection_over_scalar_is_linked() {
        let mut runs = SparseCollection::from_snapshot(1, vec![(0, Record::with_id(1))]);
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        runs.on_change(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        runs.update(vec![Addressed::new(
            Address::id(1),
            Record::with_id(1).field("details", SparseCollection::<Record>::new()),
        )]);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        runs.get_mut(0)
            .unwrap()
            .collection_mut("details")
            .unwrap()
            .notify_changed();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
