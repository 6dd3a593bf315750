//! Fixed-depth binary merkle tree over keccak-256.
//!
//! Levels are numbered from the root: level `0` holds the root and level
//! `depth` holds the leaves. Nodes that were never written are implicitly
//! equal to the zero hash of their level, so only written nodes are stored.

use std::collections::HashMap;

use ethereum_types::H256;
use keccak_hash::keccak;
use log::trace;

/// The deepest tree we allow. Item ids travel as 4-byte integers on the wire,
/// so a deeper tree could never be addressed completely.
pub const MAX_TREE_DEPTH: usize = 32;

/// The value of an unoccupied leaf.
pub const ZERO_LEAF: H256 = H256::zero();

/// Hashes two sibling nodes into their parent.
pub fn hash_pair(left: &H256, right: &H256) -> H256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_bytes());
    buf[32..].copy_from_slice(right.as_bytes());
    keccak(buf)
}

/// Returns the zero hash for each level of a tree of `depth`, indexed by
/// level (so `zeros[depth]` is [`ZERO_LEAF`] and `zeros[0]` is the empty
/// root).
pub fn zeros(depth: usize) -> Vec<H256> {
    let mut zeros = vec![ZERO_LEAF; depth + 1];
    for level in (0..depth).rev() {
        zeros[level] = hash_pair(&zeros[level + 1], &zeros[level + 1]);
    }
    zeros
}

/// Recomputes the root committed to by `leaf` at `index`, given its sibling
/// path ordered from the leaf upwards.
pub fn compute_root(leaf: H256, index: u64, witness: &[H256]) -> H256 {
    let mut node = leaf;
    let mut index = index;
    for sibling in witness {
        node = match index & 1 == 0 {
            true => hash_pair(&node, sibling),
            false => hash_pair(sibling, &node),
        };
        index >>= 1;
    }
    node
}

/// A sparse, fixed-depth merkle tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tree {
    depth: usize,
    zeros: Vec<H256>,
    /// `levels[l]` maps a node index at level `l` to its hash. Nodes equal to
    /// `zeros[l]` are never stored.
    levels: Vec<HashMap<u64, H256>>,
}

impl Tree {
    /// Creates an empty tree.
    ///
    /// # Panics
    /// - If `depth` is greater than [`MAX_TREE_DEPTH`].
    pub fn new(depth: usize) -> Self {
        assert!(
            depth <= MAX_TREE_DEPTH,
            "tree depth {depth} exceeds the maximum of {MAX_TREE_DEPTH}"
        );
        Self {
            depth,
            zeros: zeros(depth),
            levels: vec![HashMap::new(); depth + 1],
        }
    }

    /// Builds the smallest tree that holds all `leaves`, in order.
    pub fn merklize(leaves: &[H256]) -> Self {
        let depth = leaves.len().next_power_of_two().trailing_zeros() as usize;
        let mut tree = Self::new(depth);
        for (index, leaf) in leaves.iter().enumerate() {
            tree.update_single(index as u64, *leaf);
        }
        tree
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of leaves.
    pub fn set_size(&self) -> u64 {
        1 << self.depth
    }

    pub fn root(&self) -> H256 {
        self.get_node(0, 0)
    }

    /// Zero hash of `level`.
    pub fn zero(&self, level: usize) -> H256 {
        self.zeros[level]
    }

    pub fn get_node(&self, level: usize, index: u64) -> H256 {
        self.levels[level]
            .get(&index)
            .copied()
            .unwrap_or(self.zeros[level])
    }

    fn set_node(&mut self, level: usize, index: u64, node: H256) {
        if node == self.zeros[level] {
            self.levels[level].remove(&index);
        } else {
            self.levels[level].insert(index, node);
        }
    }

    /// Writes `leaf` at `index` and rehashes the path up to the root.
    ///
    /// # Panics
    /// - If `index` is outside of the tree.
    pub fn update_single(&mut self, index: u64, leaf: H256) {
        assert!(
            index < self.set_size(),
            "leaf {index} is outside of a tree with {} leaves",
            self.set_size()
        );
        trace!("Updating leaf {} to {:x}", index, leaf);

        self.set_node(self.depth, index, leaf);
        let mut index = index;
        for level in (0..self.depth).rev() {
            index >>= 1;
            let left = self.get_node(level + 1, index << 1);
            let right = self.get_node(level + 1, (index << 1) | 1);
            self.set_node(level, index, hash_pair(&left, &right));
        }
    }

    /// Sibling path of the node at (`level`, `index`), ordered bottom-up.
    /// Use `level == depth` for a leaf witness.
    pub fn witness(&self, index: u64, level: usize) -> Vec<H256> {
        let mut nodes = Vec::with_capacity(level);
        let mut index = index;
        for i in 0..level {
            nodes.push(self.get_node(level - i, index ^ 1));
            index >>= 1;
        }
        nodes
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;
    use crate::testing_utils::common_setup;

    #[test]
    fn empty_root_is_zero_of_level_zero() {
        common_setup();
        let tree = Tree::new(4);
        assert_eq!(tree.root(), zeros(4)[0]);
        assert_eq!(tree.zero(4), ZERO_LEAF);
        assert_eq!(tree.zero(3), hash_pair(&ZERO_LEAF, &ZERO_LEAF));
    }

    #[test]
    fn zero_hashes_match_known_values() {
        let zeros = zeros(2);
        assert_eq!(
            zeros[1],
            H256(hex!(
                "ad3228b676f7d3cd4284a5443f17f1962b36e491b30a40b2405849e597ba5fb5"
            ))
        );
        assert_eq!(
            zeros[0],
            H256(hex!(
                "b4c11951957c6f8f642c4af61cd6b24640fec6dc7fc607ee8206a99e92410d30"
            ))
        );
    }

    #[test]
    fn depth_zero_tree_root_is_its_only_leaf() {
        common_setup();
        let mut tree = Tree::new(0);
        let leaf = keccak([7u8]);
        tree.update_single(0, leaf);
        assert_eq!(tree.root(), leaf);
        assert!(tree.witness(0, 0).is_empty());
    }

    #[test]
    fn two_leaf_root_matches_manual_hash() {
        common_setup();
        let mut tree = Tree::new(1);
        let (a, b) = (keccak([1u8]), keccak([2u8]));
        tree.update_single(0, a);
        tree.update_single(1, b);
        assert_eq!(tree.root(), hash_pair(&a, &b));
    }

    #[test]
    fn witnesses_recompute_the_root() {
        common_setup();
        let mut rng = StdRng::seed_from_u64(17);
        let mut tree = Tree::new(6);
        for _ in 0..40 {
            let index = rng.gen_range(0..tree.set_size());
            tree.update_single(index, H256(rng.gen()));
        }
        for index in 0..tree.set_size() {
            let leaf = tree.get_node(6, index);
            assert_eq!(compute_root(leaf, index, &tree.witness(index, 6)), tree.root());
        }
    }

    #[test]
    fn subtree_witness_recomputes_the_root() {
        common_setup();
        let mut tree = Tree::new(5);
        tree.update_single(9, keccak([9u8]));
        tree.update_single(30, keccak([30u8]));

        let level = 3;
        for index in 0..(1 << level) {
            let node = tree.get_node(level, index);
            assert_eq!(
                compute_root(node, index, &tree.witness(index, level)),
                tree.root()
            );
        }
    }

    #[test]
    fn clearing_a_leaf_restores_the_empty_root() {
        common_setup();
        let mut tree = Tree::new(3);
        tree.update_single(5, keccak([5u8]));
        assert_ne!(tree.root(), tree.zero(0));
        tree.update_single(5, ZERO_LEAF);
        assert_eq!(tree.root(), tree.zero(0));
        assert_eq!(tree, Tree::new(3));
    }

    #[test]
    fn merklize_pads_to_a_power_of_two() {
        common_setup();
        let leaves: Vec<_> = (0u8..3).map(|i| keccak([i])).collect();
        let tree = Tree::merklize(&leaves);
        assert_eq!(tree.depth(), 2);
        assert_eq!(
            tree.root(),
            hash_pair(
                &hash_pair(&leaves[0], &leaves[1]),
                &hash_pair(&leaves[2], &ZERO_LEAF)
            )
        );

        let single = Tree::merklize(&leaves[..1]);
        assert_eq!(single.depth(), 0);
        assert_eq!(single.root(), leaves[0]);
    }

    #[test]
    #[should_panic]
    fn writing_outside_of_the_tree_panics() {
        Tree::new(2).update_single(4, ZERO_LEAF);
    }
}
