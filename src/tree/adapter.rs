//! Conversion between plain JSON record graphs and collection trees.

use crate::collection::{FieldValue, Record, SparseCollection};
use crate::error::{Result, SyncError};
use crate::notify::ChangeHub;
use crate::replica::SyncConfig;
use crate::types::{Address, Addressed, Placed, RecordId};
use serde_json::{Map, Value};

/// Turns JSON objects into typed records and collections, and back.
///
/// An object is a collection when it carries the configured count attribute
/// (`"total"` by default). Its loaded slots are the keys made of the
/// position prefix and a number (`"_0"`, `"_12"`, ...).
#[derive(Clone, Debug, Default)]
pub struct Adapter {
    config: SyncConfig,
}

impl Adapter {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Whether a JSON value describes a collection.
    pub fn looks_like_collection(&self, value: &Value) -> bool {
        value
            .as_object()
            .and_then(|obj| obj.get(&self.config.count_field))
            .is_some_and(Value::is_u64)
    }

    // --- Adapting ---

    /// Give a value collection behaviour.
    ///
    /// Values without a count attribute come back untouched. With
    /// `recursive`, collection-shaped attributes of loaded records are
    /// adapted as well, depth first; otherwise they stay raw until
    /// [`adapt_fields`](Self::adapt_fields) reaches them. Adapting an
    /// already adapted collection only re-binds its nested links.
    pub fn adapt(&self, value: FieldValue, recursive: bool) -> Result<FieldValue> {
        self.adapt_at(value, recursive, 0)
    }

    /// Adapt the collection-shaped attributes of a single record and link
    /// them under `hub`.
    pub fn adapt_fields(&self, record: &mut Record, hub: &ChangeHub) -> Result<()> {
        self.adapt_fields_at(record, hub, false, 0)
    }

    fn adapt_at(&self, value: FieldValue, recursive: bool, depth: usize) -> Result<FieldValue> {
        self.check_depth(depth)?;
        match value {
            FieldValue::Scalar(raw) if self.looks_like_collection(&raw) => {
                let collection = self.collection_at(&raw, recursive, depth)?;
                Ok(FieldValue::Collection(collection))
            }
            FieldValue::Collection(mut collection) if recursive => {
                let hub = collection.hub().clone();
                let positions: Vec<usize> = collection.iter().map(|(position, _)| position).collect();
                for position in positions {
                    if let Some(record) = collection.get_mut(position) {
                        self.adapt_fields_at(record, &hub, true, depth + 1)?;
                    }
                }
                Ok(FieldValue::Collection(collection))
            }
            other => Ok(other),
        }
    }

    fn adapt_fields_at(
        &self,
        record: &mut Record,
        hub: &ChangeHub,
        recursive: bool,
        depth: usize,
    ) -> Result<()> {
        self.check_depth(depth)?;
        for value in record.fields.values_mut() {
            let current = std::mem::replace(value, FieldValue::Scalar(Value::Null));
            let mut adapted = self.adapt_at(current, recursive, depth + 1)?;
            if let FieldValue::Collection(collection) = &mut adapted {
                collection.hub().link_upstream(hub);
            }
            *value = adapted;
        }
        Ok(())
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.config.max_depth {
            return Err(SyncError::DepthExceeded(self.config.max_depth));
        }
        Ok(())
    }

    // --- Decoding ---

    /// Build a fully adapted collection from a snapshot object.
    pub fn collection_from_value(&self, value: &Value) -> Result<SparseCollection<Record>> {
        if !self.looks_like_collection(value) {
            return Err(SyncError::NotACollection(format!(
                "expected an object with a numeric {:?} attribute",
                self.config.count_field
            )));
        }
        self.collection_at(value, true, 0)
    }

    fn collection_at(&self, value: &Value, recursive: bool, depth: usize) -> Result<SparseCollection<Record>> {
        self.check_depth(depth)?;
        let obj = value
            .as_object()
            .ok_or_else(|| SyncError::NotACollection(value.to_string()))?;
        let length = obj
            .get(&self.config.count_field)
            .and_then(Value::as_u64)
            .ok_or_else(|| SyncError::NotACollection(value.to_string()))?;
        let length = usize::try_from(length).unwrap_or(usize::MAX);

        let mut items = Vec::new();
        for (key, slot) in obj {
            let Some(position) = self.slot_position(key) else {
                continue;
            };
            if slot.is_null() {
                continue;
            }
            let (_, record) = self.record_at(slot, recursive, depth + 1)?;
            items.push((position, record));
        }

        Ok(SparseCollection::from_snapshot(length, items))
    }

    fn slot_position(&self, key: &str) -> Option<usize> {
        let digits = key.strip_prefix(self.config.position_field.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Decode one record, returning its position attribute if present.
    ///
    /// Collection-shaped attributes are adapted all the way down.
    pub fn record_from_value(&self, value: &Value) -> Result<(Option<usize>, Record)> {
        self.record_at(value, true, 0)
    }

    fn record_at(&self, value: &Value, recursive: bool, depth: usize) -> Result<(Option<usize>, Record)> {
        self.check_depth(depth)?;
        let obj = value
            .as_object()
            .ok_or_else(|| SyncError::MalformedEntry(format!("record must be an object, got {}", value)))?;

        let mut record = Record::new();
        let mut position = None;
        for (key, field) in obj {
            if *key == self.config.id_field {
                record.id = RecordId::from_json(field)
                    .ok_or_else(|| SyncError::InvalidRecordId(field.to_string()))?;
            } else if *key == self.config.position_field {
                position = self.position_value(field)?;
            } else if recursive && self.looks_like_collection(field) {
                let nested = self.collection_at(field, true, depth + 1)?;
                record.fields.insert(key.clone(), FieldValue::Collection(nested));
            } else {
                record.fields.insert(key.clone(), FieldValue::Scalar(field.clone()));
            }
        }

        Ok((position, record))
    }

    fn position_value(&self, value: &Value) -> Result<Option<usize>> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => match n.as_i64() {
                // Negative positions mean "no position" on the wire.
                Some(p) if p < 0 => Ok(None),
                Some(p) => Ok(Some(usize::try_from(p).unwrap_or(usize::MAX))),
                None => Err(SyncError::MalformedEntry(format!("position {} is not an integer", n))),
            },
            other => Err(SyncError::MalformedEntry(format!("position {} is not a number", other))),
        }
    }

    /// Decode an insert entry. The position attribute is required.
    pub fn placed_from_value(&self, value: &Value) -> Result<Placed<Record>> {
        let (position, record) = self.record_from_value(value)?;
        let position = position.ok_or_else(|| {
            SyncError::MalformedEntry(format!(
                "insert entry without {:?} position",
                self.config.position_field
            ))
        })?;
        Ok(Placed::new(position, record))
    }

    /// Decode an update or rewrite entry.
    ///
    /// An entry with neither id nor position is kept; applying it resolves
    /// to nothing.
    pub fn addressed_from_value(&self, value: &Value) -> Result<Addressed<Record>> {
        let (position, record) = self.record_from_value(value)?;
        let address = Address {
            id: record.id.clone(),
            position,
        };
        Ok(Addressed::new(address, record))
    }

    // --- Encoding ---

    /// Render a collection in snapshot shape.
    pub fn to_value(&self, collection: &SparseCollection<Record>) -> Value {
        let mut obj = Map::new();
        obj.insert(self.config.count_field.clone(), Value::from(collection.len()));
        for (position, record) in collection.iter() {
            obj.insert(
                format!("{}{}", self.config.position_field, position),
                self.record_to_value(record),
            );
        }
        Value::Object(obj)
    }

    /// Render a record as a plain object.
    pub fn record_to_value(&self, record: &Record) -> Value {
        let mut obj = Map::new();
        if let Some(id) = &record.id {
            obj.insert(self.config.id_field.clone(), id.to_json());
        }
        for (name, field) in &record.fields {
            let value = match field {
                FieldValue::Scalar(value) => value.clone(),
                FieldValue::Collection(collection) => self.to_value(collection),
            };
            obj.insert(name.clone(), value);
        }
        Value::Object(obj)
    }

    /// Render a record as a delta entry, optionally carrying its position.
    pub fn entry_value(&self, position: Option<usize>, record: &Record) -> Value {
        let mut value = self.record_to_value(record);
        if let (Some(position), Value::Object(obj)) = (position, &mut value) {
            obj.insert(self.config.position_field.clone(), Value::from(position));
        }
        value
    }
}
