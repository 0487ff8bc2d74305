//! Sparse collections and the records they hold.

mod record;
mod sparse;

pub use record::{FieldValue, Record};
pub use sparse::{Item, SparseCollection};
