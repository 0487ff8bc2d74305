//! Client-side replica tying the collection tree, adapter and deltas together.

use crate::collection::{Record, SparseCollection};
use crate::delta::{apply_script, resolve, ApplyReport, PathStep, Script};
use crate::error::Result;
use crate::notify::ChangeSubscription;
use crate::tree::Adapter;

/// Replica configuration.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Identity attribute name in wire records.
    pub id_field: String,

    /// Count attribute that marks an object as a collection.
    pub count_field: String,

    /// Position attribute in delta entries, and slot key prefix in snapshots.
    pub position_field: String,

    /// Deepest nesting accepted when adapting JSON.
    pub max_depth: usize,

    /// Whether an applied `update` delta fires the change notification.
    pub notify_on_update: bool,

    /// Buffer size for channel subscriptions.
    pub subscription_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            count_field: "total".to_string(),
            position_field: "_".to_string(),
            max_depth: 64,
            notify_on_update: false,
            subscription_buffer: 16,
        }
    }
}

/// A client's copy of a server-described collection tree.
///
/// Deltas are applied in the order they are handed in; the replica does not
/// buffer or reorder them.
pub struct Replica {
    adapter: Adapter,
    root: SparseCollection<Record>,
}

impl Replica {
    /// Create an empty replica.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            adapter: Adapter::new(config),
            root: SparseCollection::new(),
        }
    }

    /// Create a replica from an initial snapshot.
    pub fn from_snapshot(config: SyncConfig, snapshot: &serde_json::Value) -> Result<Self> {
        let adapter = Adapter::new(config);
        let root = adapter.collection_from_value(snapshot)?;
        Ok(Self { adapter, root })
    }

    pub fn config(&self) -> &SyncConfig {
        self.adapter.config()
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn root(&self) -> &SparseCollection<Record> {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut SparseCollection<Record> {
        &mut self.root
    }

    /// Find a nested collection by path. An empty path is the root.
    pub fn collection(&self, path: &[PathStep]) -> Option<&SparseCollection<Record>> {
        resolve(&self.root, path)
    }

    // --- Deltas ---

    /// Apply a script.
    pub fn apply(&mut self, script: &Script) -> Result<ApplyReport> {
        apply_script(&mut self.root, script, &self.adapter)
    }

    /// Decode and apply a JSON-encoded script.
    pub fn apply_json(&mut self, bytes: &[u8]) -> Result<ApplyReport> {
        let script = Script::from_json(bytes)?;
        self.apply(&script)
    }

    /// Decode and apply a MessagePack-encoded script.
    pub fn apply_msgpack(&mut self, bytes: &[u8]) -> Result<ApplyReport> {
        let script = Script::from_msgpack(bytes)?;
        self.apply(&script)
    }

    // --- Observers ---

    /// Register a callback fired after the tree changes.
    pub fn on_change<F>(&self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.root.on_change(callback);
    }

    /// Subscribe to tree changes through a channel.
    pub fn subscribe(&self) -> ChangeSubscription {
        self.root.subscribe(self.config().subscription_buffer)
    }

    /// Render the whole tree in snapshot shape.
    pub fn to_value(&self) -> serde_json::Value {
        self.adapter.to_value(&self.root)
    }

    /// Drop all content, keeping observers.
    pub fn reset(&mut self) {
        self.root.clear();
    }
}

impl Default for Replica {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}
