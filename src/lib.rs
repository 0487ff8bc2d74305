//! # Sparse Sync
//!
//! Client-side replicas of large, tree-shaped, partially loaded tables that
//! a server keeps current with batched deltas.
//!
//! ## Core Concepts
//!
//! - **Collections**: a declared length plus a sparse set of loaded records
//! - **Records**: optional identity plus attributes, some of which are
//!   themselves collections (a tree of tables)
//! - **Deltas**: insert / remove / update / rewrite batches addressed by
//!   position or identity, delivered as structured scripts
//! - **Notifications**: change signals that bubble from nested tables to
//!   the root
//!
//! ## Example
//!
//! ```ignore
//! use sparse_sync::{Replica, SyncConfig};
//!
//! let mut replica = Replica::from_snapshot(SyncConfig::default(), &json!({
//!     "total": 40,
//!     "_0": {"id": 7, "title": "Run 7", "details": {"total": 12}}
//! }))?;
//!
//! replica.on_change(|| println!("re-render"));
//!
//! replica.apply_json(br#"[
//!     {"op": "insert", "entries": [{"_": 0, "id": 8, "title": "Run 8"}]},
//!     {"op": "update", "entries": [{"id": 7, "ok": 3}]},
//!     {"op": "notify"}
//! ]"#)?;
//! ```

pub mod collection;
pub mod delta;
pub mod error;
pub mod notify;
pub mod replica;
pub mod tree;
pub mod types;

// Re-exports
pub use collection::{FieldValue, Item, Record, SparseCollection};
pub use delta::{apply_script, ApplyReport, Delta, DeltaOp, PathStep, Script, ScriptWriter};
pub use error::{Result, SyncError};
pub use notify::{ChangeHub, ChangeSubscription, HoldGuard};
pub use replica::{Replica, SyncConfig};
pub use tree::Adapter;
pub use types::*;
