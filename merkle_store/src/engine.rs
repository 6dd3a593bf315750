//! Staged item storage backed by a [`Tree`].
//!
//! Writes never touch the tree directly. They are appended to an ordered
//! overlay that readers see immediately, and are folded into the tree (and
//! so into [`StorageEngine::root`]) only on [`StorageEngine::commit`]. A
//! [`Checkpoint`] is a position in that overlay, which makes rolling back the
//! writes of a single failed operation a truncation.

use std::collections::HashMap;

use ethereum_types::H256;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tree::Tree;

/// Stores the result of storage operations. Returns a [`StorageError`] upon
/// failure.
pub type StorageResult<T> = Result<T, StorageError>;

/// An error type for storage operations.
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum StorageError {
    /// The item id does not address a leaf of the tree.
    #[error("Want item {item_id} but the tree has only {capacity} leaves")]
    OutOfBounds {
        /// Requested item.
        item_id: u64,
        /// Number of leaves in the tree.
        capacity: u64,
    },

    /// Neither the overlay nor the committed items hold the id.
    #[error("Item {0} does not exist")]
    NotFound(u64),

    /// `create` was called on a slot that already holds a committed item.
    #[error("Item {0} already exists")]
    AlreadyExists(u64),

    /// Every subtree at the level is either occupied or staged.
    #[error("Tree at level {level} is full, no room for a subtree of depth {subtree_depth}")]
    SubtreeFull {
        /// Level of the subtree roots that were searched.
        level: usize,
        /// Requested subtree depth.
        subtree_depth: usize,
    },

    /// A subtree can't be deeper than the tree containing it.
    #[error("Subtree depth {subtree_depth} exceeds the tree depth {depth}")]
    InvalidSubtreeDepth {
        /// Requested subtree depth.
        subtree_depth: usize,
        /// Depth of the tree.
        depth: usize,
    },

    /// More items were given than a subtree has leaves.
    #[error("{count} items do not fit in a subtree of depth {depth}")]
    SubtreeOverflow {
        /// Number of items given.
        count: usize,
        /// Depth of the target subtree.
        depth: usize,
    },
}

/// Anything that can live in a leaf of the tree.
pub trait Hashable {
    /// The leaf value committed to the tree for this item.
    fn hash(&self) -> H256;
}

/// Position in the staging overlay. Only meaningful for the engine that
/// produced it, and only until the next [`StorageEngine::commit`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Checkpoint(usize);

/// An item along with its sibling path at the last committed root.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WithWitness<Item> {
    pub item: Item,
    pub witness: Vec<H256>,
}

/// A run of unoccupied leaves found by
/// [`StorageEngine::find_vacant_subtree`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VacantSubtree {
    /// Index of the subtree root within its level.
    pub path: u64,
    /// Sibling path of the subtree root, needed to graft a new subtree there.
    pub witness: Vec<H256>,
}

/// The storage contract shared by every engine, in-memory or persistent.
///
/// Implementations are single-writer: staging, [`revert`](Self::revert) and
/// [`commit`](Self::commit) must be serialised by the owner.
pub trait StorageEngine<Item> {
    /// Root of the committed state. Staged writes are not reflected.
    fn root(&self) -> H256;

    /// Depth of the underlying tree.
    fn depth(&self) -> usize;

    /// Number of addressable items.
    fn capacity(&self) -> u64 {
        1 << self.depth()
    }

    /// Returns the latest staged write for `item_id`, or else its committed
    /// value.
    fn get(&self, item_id: u64) -> StorageResult<Item>;

    /// Like [`get`](Self::get), with the witness of the leaf at the last
    /// committed root.
    fn get_with_witness(&self, item_id: u64) -> StorageResult<WithWitness<Item>>;

    /// Stages a new item. Fails if a committed item already occupies the
    /// slot.
    fn create(&mut self, item_id: u64, item: Item) -> StorageResult<()>;

    /// Stages a write, whether or not the slot is occupied.
    fn update(&mut self, item_id: u64, item: Item) -> StorageResult<()>;

    fn checkpoint(&self) -> Checkpoint;

    /// Discards every write staged after `checkpoint` was taken.
    fn revert(&mut self, checkpoint: Checkpoint);

    /// Applies all staged writes in order and clears the overlay.
    fn commit(&mut self);

    /// Finds the first subtree of `subtree_depth` whose leaves are all empty,
    /// both in committed and in staged state.
    fn find_vacant_subtree(&self, subtree_depth: usize) -> StorageResult<VacantSubtree>;

    /// Stages `items[i]` at `path * 2^depth + i`. `path` must address a
    /// subtree of `depth`, otherwise this fails with
    /// [`StorageError::OutOfBounds`] carrying the number of such subtrees.
    fn update_batch(&mut self, path: u64, depth: usize, items: Vec<Item>) -> StorageResult<()> {
        if depth > self.depth() {
            return Err(StorageError::InvalidSubtreeDepth {
                subtree_depth: depth,
                depth: self.depth(),
            });
        }
        if items.len() as u64 > 1 << depth {
            return Err(StorageError::SubtreeOverflow {
                count: items.len(),
                depth,
            });
        }
        let subtrees = 1u64 << (self.depth() - depth);
        if path >= subtrees {
            return Err(StorageError::OutOfBounds {
                item_id: path,
                capacity: subtrees,
            });
        }
        for (i, item) in items.into_iter().enumerate() {
            self.update((path << depth) + i as u64, item)?;
        }
        Ok(())
    }
}

/// An in-memory [`StorageEngine`].
#[derive(Clone, Debug)]
pub struct MemoryEngine<Item> {
    tree: Tree,
    items: HashMap<u64, Item>,
    overlay: Vec<(u64, Item)>,
}

impl<Item> MemoryEngine<Item> {
    /// Creates an empty engine over a tree of `depth`.
    ///
    /// # Panics
    /// - If `depth` is greater than [`MAX_TREE_DEPTH`](crate::tree::MAX_TREE_DEPTH).
    pub fn new(depth: usize) -> Self {
        Self {
            tree: Tree::new(depth),
            items: HashMap::new(),
            overlay: Vec::new(),
        }
    }

    /// The committed tree.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Number of staged writes.
    pub fn staged_len(&self) -> usize {
        self.overlay.len()
    }

    fn check_size(&self, item_id: u64) -> StorageResult<()> {
        match item_id < self.tree.set_size() {
            true => Ok(()),
            false => Err(StorageError::OutOfBounds {
                item_id,
                capacity: self.tree.set_size(),
            }),
        }
    }
}

impl<Item: Clone + Hashable> StorageEngine<Item> for MemoryEngine<Item> {
    fn root(&self) -> H256 {
        self.tree.root()
    }

    fn depth(&self) -> usize {
        self.tree.depth()
    }

    fn get(&self, item_id: u64) -> StorageResult<Item> {
        self.check_size(item_id)?;
        self.overlay
            .iter()
            .rev()
            .find(|(id, _)| *id == item_id)
            .map(|(_, item)| item)
            .or_else(|| self.items.get(&item_id))
            .cloned()
            .ok_or(StorageError::NotFound(item_id))
    }

    fn get_with_witness(&self, item_id: u64) -> StorageResult<WithWitness<Item>> {
        let item = self.get(item_id)?;
        let witness = self.tree.witness(item_id, self.tree.depth());
        Ok(WithWitness { item, witness })
    }

    fn create(&mut self, item_id: u64, item: Item) -> StorageResult<()> {
        if self.items.contains_key(&item_id) {
            return Err(StorageError::AlreadyExists(item_id));
        }
        self.update(item_id, item)
    }

    fn update(&mut self, item_id: u64, item: Item) -> StorageResult<()> {
        self.check_size(item_id)?;
        trace!("Staging write #{} to item {}", self.overlay.len(), item_id);
        self.overlay.push((item_id, item));
        Ok(())
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.overlay.len())
    }

    fn revert(&mut self, checkpoint: Checkpoint) {
        trace!(
            "Reverting {} staged writes",
            self.overlay.len().saturating_sub(checkpoint.0)
        );
        self.overlay.truncate(checkpoint.0);
    }

    fn commit(&mut self) {
        let staged = self.overlay.len();
        for (item_id, item) in self.overlay.drain(..) {
            self.tree.update_single(item_id, item.hash());
            self.items.insert(item_id, item);
        }
        debug!(
            "Committed {} staged writes, root is now {:x}",
            staged,
            self.tree.root()
        );
    }

    fn find_vacant_subtree(&self, subtree_depth: usize) -> StorageResult<VacantSubtree> {
        let depth = self.tree.depth();
        if subtree_depth > depth {
            return Err(StorageError::InvalidSubtreeDepth {
                subtree_depth,
                depth,
            });
        }
        let level = depth - subtree_depth;
        let zero = self.tree.zero(level);

        for path in 0..(1u64 << level) {
            if self.tree.get_node(level, path) != zero {
                continue;
            }
            if self
                .overlay
                .iter()
                .any(|(item_id, _)| item_id >> subtree_depth == path)
            {
                continue;
            }
            return Ok(VacantSubtree {
                path,
                witness: self.tree.witness(path, level),
            });
        }

        Err(StorageError::SubtreeFull {
            level,
            subtree_depth,
        })
    }
}
