//! Storage for rollup state.
//!
//! Two layers live here:
//! - [`tree::Tree`], a fixed-depth keccak merkle tree whose unwritten nodes
//!   are implicit zero hashes, so a depth-32 tree costs only what is written.
//! - [`engine::StorageEngine`], the item store that executors stage their
//!   writes into. Writes are journaled, can be rolled back to a
//!   [`engine::Checkpoint`], and only reach the tree root on commit.
//!
//! [`engine::MemoryEngine`] is the in-memory implementation.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod engine;
pub mod tree;

#[cfg(test)]
pub(crate) mod testing_utils;

pub use engine::{
    Checkpoint, Hashable, MemoryEngine, StorageEngine, StorageError, StorageResult,
    VacantSubtree, WithWitness,
};
pub use tree::Tree;
