//! Sparse, position-addressed collection with batched mutations.

use crate::notify::{ChangeHub, ChangeSubscription};
use crate::types::{Addressed, Diagnostic, OpReport, Placed, RecordId, Slot};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::record::Record;

/// Something a [`SparseCollection`] can hold.
pub trait Item: Sized {
    /// Identity used to address the item across deltas.
    fn id(&self) -> Option<&RecordId>;

    /// Apply a partial update onto this item.
    ///
    /// The default replaces the item wholesale.
    fn merge(&mut self, patch: Self, _hub: &ChangeHub, _report: &mut OpReport) {
        *self = patch;
    }

    /// Link any nested collections to the hub of the owning collection.
    fn adopt(&mut self, _hub: &ChangeHub) {}
}

/// An ordered, partially populated collection.
///
/// `len()` is the declared number of positions; only some of them hold a
/// loaded item. Positions at or beyond `len()` are never stored.
pub struct SparseCollection<T = Record> {
    /// Declared total number of positions.
    length: usize,

    /// Loaded items by position. Missing keys below `length` are not loaded.
    slots: BTreeMap<usize, T>,

    /// Change notification for this collection.
    hub: ChangeHub,
}

impl<T: Item> SparseCollection<T> {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self {
            length: 0,
            slots: BTreeMap::new(),
            hub: ChangeHub::new(),
        }
    }

    /// Create a collection of `length` positions with some of them loaded.
    ///
    /// Items positioned at or beyond `length` are discarded.
    pub fn from_snapshot(length: usize, items: impl IntoIterator<Item = (usize, T)>) -> Self {
        let mut collection = Self::new();
        collection.length = length;
        for (position, mut item) in items {
            if position >= length {
                tracing::debug!(position, length, "dropping snapshot item past the end");
                continue;
            }
            item.adopt(&collection.hub);
            collection.slots.insert(position, item);
        }
        collection
    }

    // --- Inspection ---

    /// Declared number of positions.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of loaded positions.
    pub fn populated_len(&self) -> usize {
        self.slots.len()
    }

    /// Item at `position`, `Slot::NotLoaded` for a hole, `None` past the end.
    pub fn get(&self, position: usize) -> Option<Slot<&T>> {
        if position >= self.length {
            return None;
        }
        Some(match self.slots.get(&position) {
            Some(item) => Slot::Loaded(item),
            None => Slot::NotLoaded,
        })
    }

    /// Mutable access to a loaded item.
    pub fn get_mut(&mut self, position: usize) -> Option<&mut T> {
        self.slots.get_mut(&position)
    }

    /// Position of the first item carrying `id`.
    ///
    /// Linear in the number of loaded items.
    pub fn position_of_id(&self, id: &RecordId) -> Option<usize> {
        self.slots
            .iter()
            .find(|(_, item)| item.id() == Some(id))
            .map(|(position, _)| *position)
    }

    pub fn lookup_by_id(&self, id: &RecordId) -> Option<&T> {
        self.slots.values().find(|item| item.id() == Some(id))
    }

    pub fn lookup_by_id_mut(&mut self, id: &RecordId) -> Option<&mut T> {
        self.slots.values_mut().find(|item| item.id() == Some(id))
    }

    /// Loaded items in position order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.slots.iter().map(|(position, item)| (*position, item))
    }

    /// Every position in order, loaded or not.
    pub fn slots(&self) -> impl Iterator<Item = Slot<&T>> + '_ {
        (0..self.length).map(move |position| match self.slots.get(&position) {
            Some(item) => Slot::Loaded(item),
            None => Slot::NotLoaded,
        })
    }

    // --- Notification ---

    pub fn hub(&self) -> &ChangeHub {
        &self.hub
    }

    /// Register a change callback on this collection.
    pub fn on_change<F>(&self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.hub.on_change(callback);
    }

    /// Subscribe to changes through a bounded channel.
    pub fn subscribe(&self, buffer: usize) -> ChangeSubscription {
        self.hub.subscribe(buffer)
    }

    /// Fire the change notification unconditionally.
    pub fn notify_changed(&self) -> &Self {
        self.hub.fire();
        self
    }

    // --- Mutation ---

    /// Set the declared length, unloading everything past a shrunk end.
    ///
    /// Does not notify.
    pub fn set_length(&mut self, length: usize) {
        if length < self.length {
            self.slots.split_off(&length);
        }
        self.length = length;
    }

    /// Delete positions, shifting later items down.
    ///
    /// Out-of-range and repeated positions are skipped. Runs over loaded
    /// items only, so long runs of holes cost nothing.
    pub fn remove(&mut self, positions: impl IntoIterator<Item = usize>) -> OpReport {
        let mut report = OpReport::default();

        let mut sorted: Vec<usize> = positions.into_iter().collect();
        sorted.sort_unstable();

        let mut doomed = Vec::with_capacity(sorted.len());
        for position in sorted {
            if position >= self.length {
                report.note(Diagnostic::OutOfRange {
                    position,
                    length: self.length,
                });
            } else if doomed.last() == Some(&position) {
                report.note(Diagnostic::DuplicatePosition(position));
            } else {
                doomed.push(position);
            }
        }

        if doomed.is_empty() {
            return report;
        }

        let old = std::mem::take(&mut self.slots);
        let mut cursor = doomed.iter().copied().peekable();
        let mut shift = 0;
        for (position, item) in old {
            while let Some(removed) = cursor.peek().copied() {
                if removed >= position {
                    break;
                }
                shift += 1;
                cursor.next();
            }
            if cursor.peek() == Some(&position) {
                continue;
            }
            self.slots.insert(position - shift, item);
        }

        self.length -= doomed.len();
        report.applied = doomed.len();
        tracing::trace!(removed = doomed.len(), length = self.length, "remove");

        self.hub.fire();
        report
    }

    /// Insert items at requested positions, shifting later items up.
    ///
    /// Each inserted item ends up at its requested position. Items sharing
    /// a position are placed one after another in batch order.
    ///
    /// Items asking for a position past the grown end keep that position
    /// rather than being packed onto the end; the gap is left as not-loaded
    /// holes. `A B C D` plus `X@0 Y@3 Z@7` gives `X A B Y C D _ Z`, length 8.
    ///
    /// Items whose id is already present (or repeated in the batch) are
    /// skipped. Items that cannot be placed without the length overflowing
    /// `usize` are skipped as out of range.
    pub fn insert(&mut self, entries: impl IntoIterator<Item = Placed<T>>) -> OpReport {
        let mut report = OpReport::default();

        let mut accepted: Vec<Placed<T>> = Vec::new();
        {
            let mut seen: HashSet<RecordId> = self.slots.values().filter_map(|item| item.id().cloned()).collect();
            for entry in entries {
                if let Some(id) = entry.record.id() {
                    if !seen.insert(id.clone()) {
                        report.note(Diagnostic::DuplicateIdentity(id.clone()));
                        continue;
                    }
                }
                accepted.push(entry);
            }
        }

        if accepted.is_empty() {
            return report;
        }

        accepted.sort_by_key(|entry| entry.position);

        // Every existing item moves up by at most the number inserted, so
        // that count is bounded by the room left below usize::MAX.
        let room = usize::MAX - self.length;
        let mut placed = Vec::with_capacity(accepted.len());
        let mut targets = Vec::with_capacity(accepted.len());
        let mut next_free = 0;
        for entry in accepted {
            let target = entry.position.max(next_free);
            match target.checked_add(1) {
                Some(end) if placed.len() < room => {
                    if target != entry.position {
                        report.note(Diagnostic::DuplicatePosition(entry.position));
                    }
                    targets.push(target);
                    placed.push(entry);
                    next_free = end;
                }
                _ => report.note(Diagnostic::OutOfRange {
                    position: entry.position,
                    length: self.length,
                }),
            }
        }

        if placed.is_empty() {
            return report;
        }

        // An existing item at old position p lands at p + k, where k counts
        // the inserted items placed at or before its new position.
        let inserted = placed.len();
        let old = std::mem::take(&mut self.slots);
        let mut k = 0;
        for (position, item) in old {
            while k < inserted && targets[k] <= position + k {
                k += 1;
            }
            self.slots.insert(position + k, item);
        }

        let new_length = (self.length + inserted).max(next_free);
        for (entry, target) in placed.into_iter().zip(targets) {
            let mut record = entry.record;
            record.adopt(&self.hub);
            self.slots.insert(target, record);
        }

        self.length = new_length;
        report.applied = inserted;
        tracing::trace!(inserted, length = self.length, "insert");

        self.hub.fire();
        report
    }

    /// Merge partial items onto existing ones.
    ///
    /// Entries with an id resolve by id only; entries without one resolve by
    /// position. Unresolved entries are skipped. Never changes the length
    /// and never notifies.
    pub fn update(&mut self, entries: impl IntoIterator<Item = Addressed<T>>) -> OpReport {
        let mut report = OpReport::default();

        for Addressed { address, record } in entries {
            let target = match (&address.id, address.position) {
                (Some(id), _) => self.position_of_id(id),
                (None, Some(position)) => Some(position),
                (None, None) => None,
            };

            match target.and_then(|position| self.slots.get_mut(&position)) {
                Some(existing) => {
                    existing.merge(record, &self.hub, &mut report);
                    report.applied += 1;
                }
                None => report.note(Diagnostic::UnresolvedAddress(address)),
            }
        }

        tracing::trace!(updated = report.applied, "update");
        report
    }

    /// Replace whole items.
    ///
    /// Entries resolve by id first, then by position. Rewriting past the end
    /// grows the collection; nothing else is removed or shifted.
    pub fn rewrite(&mut self, entries: impl IntoIterator<Item = Addressed<T>>) -> OpReport {
        let mut report = OpReport::default();
        let mut required = 0;

        for Addressed { address, mut record } in entries {
            let target = address
                .id
                .as_ref()
                .and_then(|id| self.position_of_id(id))
                .or(address.position);

            let Some(position) = target else {
                report.note(Diagnostic::UnresolvedAddress(address));
                continue;
            };
            let Some(end) = position.checked_add(1) else {
                report.note(Diagnostic::OutOfRange {
                    position,
                    length: self.length,
                });
                continue;
            };

            record.adopt(&self.hub);
            self.slots.insert(position, record);
            required = required.max(end);
            report.applied += 1;
        }

        if required > self.length {
            self.length = required;
        }

        if report.changed() {
            tracing::trace!(rewritten = report.applied, length = self.length, "rewrite");
            self.hub.fire();
        }
        report
    }

    /// Unload everything and set the length to zero.
    pub fn clear(&mut self) -> &mut Self {
        let had_content = self.length > 0;
        self.slots.clear();
        self.length = 0;
        if had_content {
            self.hub.fire();
        }
        self
    }

    /// Fold a nested collection from an update into this one.
    ///
    /// Length follows the source; loaded source items replace ours; items
    /// the source does not mention are kept.
    pub(crate) fn merge_from(&mut self, source: SparseCollection<T>) {
        self.set_length(source.length);
        for (position, mut item) in source.slots {
            item.adopt(&self.hub);
            self.slots.insert(position, item);
        }
    }
}

impl<T: Item> Default for SparseCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clones get a fresh hub with no listeners.
impl<T: Item + Clone> Clone for SparseCollection<T> {
    fn clone(&self) -> Self {
        let hub = ChangeHub::new();
        let mut slots = self.slots.clone();
        for item in slots.values_mut() {
            item.adopt(&hub);
        }
        Self {
            length: self.length,
            slots,
            hub,
        }
    }
}

impl<T: PartialEq> PartialEq for SparseCollection<T> {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.slots == other.slots
    }
}

impl<T: fmt::Debug> fmt::Debug for SparseCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseCollection")
            .field("length", &self.length)
            .field("slots", &self.slots)
            .finish()
    }
}
