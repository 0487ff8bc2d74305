//! Structured delta scripts.
//!
//! A script is an ordered list of deltas, each aimed at one collection of the
//! tree by a path of record selectors and field names:
//! - `insert` / `remove` / `update` / `rewrite` batches
//! - `clear`, `set_length` and `notify`
//!
//! Scripts are plain data (JSON or MessagePack). They are fully validated
//! before the first delta touches the tree.

mod apply;
mod types;
mod writer;

pub use apply::{apply_script, ApplyReport};
pub(crate) use apply::resolve;
pub use types::{Delta, DeltaOp, PathStep, Script};
pub use writer::ScriptWriter;
