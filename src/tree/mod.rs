//! Collection tree adapter.
//!
//! Servers describe tables as plain JSON: an object carrying a count
//! attribute is a collection, its `_<n>` keys are the loaded slots, and any
//! record attribute that is itself collection-shaped is a child table. The
//! [`Adapter`] turns such graphs into a tree of [`SparseCollection`]s whose
//! change hubs are linked child to parent.
//!
//! [`SparseCollection`]: crate::collection::SparseCollection

mod adapter;

pub use adapter::Adapter;
