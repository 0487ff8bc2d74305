//! Script compilation and application.

use crate::collection::{Record, SparseCollection};
use crate::error::{Result, SyncError};
use crate::tree::Adapter;
use crate::types::{Addressed, Diagnostic, OpReport, Placed};

use super::types::{describe_path, Delta, DeltaOp, PathStep, Script};

/// A delta whose entries have been validated and typed.
#[derive(Clone, Debug)]
pub(crate) struct CompiledDelta {
    target: Vec<PathStep>,
    command: Command,
}

#[derive(Clone, Debug)]
enum Command {
    Insert(Vec<Placed<Record>>),
    Remove(Vec<usize>),
    Update(Vec<Addressed<Record>>),
    Rewrite(Vec<Addressed<Record>>),
    Clear,
    SetLength(usize),
    Notify,
}

/// Outcome of applying a script.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Deltas whose target resolved.
    pub deltas_applied: usize,
    /// Deltas skipped because their target did not resolve.
    pub deltas_skipped: usize,
    /// Entries that took effect across all deltas.
    pub changes: usize,
    /// Every silently recovered condition, in order.
    pub diagnostics: Vec<Diagnostic>,
}

impl ApplyReport {
    fn record(&mut self, report: OpReport) {
        self.deltas_applied += 1;
        self.changes += report.applied;
        self.diagnostics.extend(report.diagnostics);
    }
}

/// Validate a whole script and type its entries.
///
/// Fails on the first malformed delta; nothing has been applied yet.
pub(crate) fn compile(script: &Script, adapter: &Adapter) -> Result<Vec<CompiledDelta>> {
    script
        .iter()
        .map(|delta| compile_delta(delta, adapter))
        .collect()
}

fn compile_delta(delta: &Delta, adapter: &Adapter) -> Result<CompiledDelta> {
    validate_path(&delta.target)?;

    let command = match &delta.op {
        DeltaOp::Insert { entries } => Command::Insert(
            entries
                .iter()
                .map(|entry| adapter.placed_from_value(entry))
                .collect::<Result<_>>()?,
        ),
        DeltaOp::Remove { positions } => Command::Remove(
            positions
                .iter()
                .filter_map(|&position| {
                    if position < 0 {
                        tracing::debug!(position, "ignoring negative remove position");
                    }
                    usize::try_from(position).ok()
                })
                .collect(),
        ),
        DeltaOp::Update { entries } => Command::Update(
            entries
                .iter()
                .map(|entry| adapter.addressed_from_value(entry))
                .collect::<Result<_>>()?,
        ),
        DeltaOp::Rewrite { entries } => Command::Rewrite(
            entries
                .iter()
                .map(|entry| adapter.addressed_from_value(entry))
                .collect::<Result<_>>()?,
        ),
        DeltaOp::Clear => Command::Clear,
        DeltaOp::SetLength { length } => Command::SetLength(usize::try_from(*length).unwrap_or(0)),
        DeltaOp::Notify => Command::Notify,
    };

    Ok(CompiledDelta {
        target: delta.target.clone(),
        command,
    })
}

fn validate_path(path: &[PathStep]) -> Result<()> {
    if path.len() % 2 != 0 {
        return Err(SyncError::InvalidPath(format!(
            "{} does not end on a field",
            describe_path(path)
        )));
    }
    for pair in path.chunks(2) {
        match (&pair[0], &pair[1]) {
            (PathStep::Id(_) | PathStep::At(_), PathStep::Field(_)) => {}
            _ => {
                return Err(SyncError::InvalidPath(format!(
                    "{} must alternate record selectors and fields",
                    describe_path(path)
                )))
            }
        }
    }
    Ok(())
}

/// Walk a validated path down from `root`.
pub(crate) fn resolve_mut<'a>(
    root: &'a mut SparseCollection<Record>,
    path: &[PathStep],
) -> Option<&'a mut SparseCollection<Record>> {
    let mut current = root;
    for pair in path.chunks(2) {
        let record = match &pair[0] {
            PathStep::Id(id) => current.lookup_by_id_mut(id)?,
            PathStep::At(position) => current.get_mut(*position)?,
            PathStep::Field(_) => return None,
        };
        let PathStep::Field(name) = &pair[1] else {
            return None;
        };
        current = record.collection_mut(name)?;
    }
    Some(current)
}

/// Read-only counterpart of [`resolve_mut`].
pub(crate) fn resolve<'a>(
    root: &'a SparseCollection<Record>,
    path: &[PathStep],
) -> Option<&'a SparseCollection<Record>> {
    let mut current = root;
    for pair in path.chunks(2) {
        let record = match &pair[0] {
            PathStep::Id(id) => current.lookup_by_id(id)?,
            PathStep::At(position) => current.get(*position)?.loaded()?,
            PathStep::Field(_) => return None,
        };
        let PathStep::Field(name) = pair.get(1)? else {
            return None;
        };
        current = record.collection(name)?;
    }
    Some(current)
}

/// Apply a script to a collection tree.
///
/// The script is compiled first, so a malformed script leaves the tree
/// untouched. Deltas whose target cannot be found are skipped. The root's
/// change notifications are held for the duration and delivered at most
/// once at the end.
pub fn apply_script(
    root: &mut SparseCollection<Record>,
    script: &Script,
    adapter: &Adapter,
) -> Result<ApplyReport> {
    let compiled = compile(script, adapter)?;
    let notify_on_update = adapter.config().notify_on_update;

    let _hold = root.hub().hold();
    let mut report = ApplyReport::default();

    for delta in compiled {
        let Some(collection) = resolve_mut(root, &delta.target) else {
            let path = describe_path(&delta.target);
            tracing::debug!(target_path = %path, "delta target not found, skipping");
            report.deltas_skipped += 1;
            report.diagnostics.push(Diagnostic::UnresolvedTarget(path));
            continue;
        };
        let op_report = execute(collection, delta.command, notify_on_update);
        report.record(op_report);
    }

    tracing::trace!(
        applied = report.deltas_applied,
        skipped = report.deltas_skipped,
        changes = report.changes,
        "applied script"
    );
    Ok(report)
}

fn execute(
    collection: &mut SparseCollection<Record>,
    command: Command,
    notify_on_update: bool,
) -> OpReport {
    match command {
        Command::Insert(entries) => collection.insert(entries),
        Command::Remove(positions) => collection.remove(positions),
        Command::Update(entries) => {
            let report = collection.update(entries);
            if notify_on_update && report.changed() {
                collection.notify_changed();
            }
            report
        }
        Command::Rewrite(entries) => collection.rewrite(entries),
        Command::Clear => {
            let applied = usize::from(!collection.is_empty());
            collection.clear();
            OpReport {
                applied,
                diagnostics: Vec::new(),
            }
        }
        Command::SetLength(length) => {
            let applied = usize::from(collection.len() != length);
            collection.set_length(length);
            OpReport {
                applied,
                diagnostics: Vec::new(),
            }
        }
        Command::Notify => {
            collection.notify_changed();
            OpReport::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::SyncConfig;
    use crate::types::{RecordId, Slot};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn adapter() -> Adapter {
        Adapter::new(SyncConfig::default())
    }

    fn runs() -> SparseCollection<Record> {
        adapter()
            .collection_from_value(&json!({
                "total": 2,
                "_0": {"id": 1, "title": "a", "details": {"total": 2, "_0": {"taskid": 9}}},
                "_1": {"id": 2, "title": "b", "details": {"total": 0}}
            }))
            .unwrap()
    }

    fn script(value: serde_json::Value) -> Script {
        serde_json::from_value(value).unwrap()
    }

    fn counter(collection: &SparseCollection<Record>) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        collection.on_change(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path(&[]).is_ok());
        assert!(validate_path(&[PathStep::id(1), PathStep::field("details")]).is_ok());
        assert!(validate_path(&[PathStep::id(1)]).is_err());
        assert!(validate_path(&[PathStep::field("details"), PathStep::id(1)]).is_err());
    }

    #[test]
    fn test_nested_clear_and_rewrite() {
        let mut root = runs();
        let count = counter(&root);

        let report = apply_script(
            &mut root,
            &script(json!([
                {"op": "clear", "target": [{"id": 1}, {"field": "details"}]},
                {"op": "rewrite", "target": [{"id": 1}, {"field": "details"}],
                 "entries": [{"_": 0, "taskid": 20}, {"_": 1, "taskid": 21}]},
                {"op": "notify"}
            ])),
            &adapter(),
        )
        .unwrap();

        assert_eq!(report.deltas_applied, 3);
        assert_eq!(report.changes, 3);

        let details = root
            .lookup_by_id(&RecordId::Int(1))
            .unwrap()
            .collection("details")
            .unwrap();
        assert_eq!(details.len(), 2);
        assert_eq!(
            details.get(1).unwrap().loaded().unwrap().scalar("taskid"),
            Some(&json!(21))
        );

        // Held for the whole script: a single delivery
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unresolved_target_skipped() {
        let mut root = runs();

        let report = apply_script(
            &mut root,
            &script(json!([
                {"op": "clear", "target": [{"id": 99}, {"field": "details"}]},
                {"op": "clear", "target": [{"at": 0}, {"field": "title"}]},
                {"op": "remove", "positions": [0]}
            ])),
            &adapter(),
        )
        .unwrap();

        assert_eq!(report.deltas_skipped, 2);
        assert_eq!(report.deltas_applied, 1);
        assert_eq!(root.len(), 1);
    }

    #[test]
    fn test_malformed_script_applies_nothing() {
        let mut root = runs();

        let result = apply_script(
            &mut root,
            &script(json!([
                {"op": "remove", "positions": [0]},
                {"op": "insert", "entries": [{"id": 5}]}
            ])),
            &adapter(),
        );

        assert!(matches!(result, Err(SyncError::MalformedEntry(_))));
        assert_eq!(root.len(), 2);
    }

    #[test]
    fn test_update_notification_policy() {
        let mut root = runs();
        let count = counter(&root);
        let update = script(json!([{"op": "update", "entries": [{"id": 2, "title": "B"}]}]));

        apply_script(&mut root, &update, &adapter()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let eager = Adapter::new(SyncConfig {
            notify_on_update: true,
            ..Default::default()
        });
        apply_script(&mut root, &update, &eager).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_update_merges_nested_table() {
        let mut root = runs();

        apply_script(
            &mut root,
            &script(json!([{"op": "update", "entries": [
                {"id": 1, "ok": 4, "details": {"total": 3, "_2": {"taskid": 11}}}
            ]}])),
            &adapter(),
        )
        .unwrap();

        let run = root.lookup_by_id(&RecordId::Int(1)).unwrap();
        assert_eq!(run.scalar("ok"), Some(&json!(4)));
        assert_eq!(run.scalar("title"), Some(&json!("a")));

        let details = run.collection("details").unwrap();
        assert_eq!(details.len(), 3);
        assert!(details.get(0).unwrap().is_loaded());
        assert_eq!(details.get(1), Some(Slot::NotLoaded));
        assert!(details.get(2).unwrap().is_loaded());
    }

    #[test]
    fn test_set_length_and_negative_positions() {
        let mut root = runs();

        let report = apply_script(
            &mut root,
            &script(json!([
                {"op": "remove", "positions": [-3]},
                {"op": "set_length", "length": -5}
            ])),
            &adapter(),
        )
        .unwrap();

        assert_eq!(report.changes, 1);
        assert!(root.is_empty());
    }

    #[test]
    fn test_insert_nested_records_are_linked() {
        let mut root = runs();
        let count = counter(&root);

        apply_script(
            &mut root,
            &script(json!([{"op": "insert", "entries": [
                {"_": 0, "id": 3, "details": {"total": 1}}
            ]}])),
            &adapter(),
        )
        .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let path = [PathStep::id(3), PathStep::field("details")];
        resolve_mut(&mut root, &path)
            .unwrap()
            .rewrite(vec![Addressed::new(
                crate::types::Address::position(0),
                Record::with_id(30),
            )]);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        assert_eq!(resolve(&root, &path).unwrap().populated_len(), 1);
    }
}
