// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! Structural consistency checks over a [`Tree`].

use iavl_storage::{KvStore, NodeDbError, NodeRef};

use crate::{Key, Tree};

/// A violated structural invariant
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CheckerError {
    /// Leaves are not in strictly ascending key order
    #[error("key {} follows key {}", hex::encode(.key), hex::encode(.previous))]
    KeyOrder {
        /// The previous leaf key
        previous: Key,
        /// The offending leaf key
        key: Key,
    },

    /// The children of an inner node differ in height by more than one
    #[error("node {} is unbalanced: left height {left}, right height {right}", hex::encode(.key))]
    Unbalanced {
        /// Key of the inner node
        key: Key,
        /// Height of the left child
        left: u8,
        /// Height of the right child
        right: u8,
    },

    /// A node's stored height does not match its children
    #[error("node {} has height {stored}, expected {computed}", hex::encode(.key))]
    HeightMismatch {
        /// Key of the node
        key: Key,
        /// The stored height
        stored: u8,
        /// The height computed from the children
        computed: u8,
    },

    /// A node's stored size does not match its children
    #[error("node {} has size {stored}, expected {computed}", hex::encode(.key))]
    SizeMismatch {
        /// Key of the node
        key: Key,
        /// The stored size
        stored: u64,
        /// The size computed from the children
        computed: u64,
    },

    /// An inner node's key is not the smallest key of its right subtree
    #[error("separator {} should be {}", hex::encode(.key), hex::encode(.expected))]
    SeparatorKey {
        /// The stored separator
        key: Key,
        /// The smallest key of the right subtree
        expected: Key,
    },

    /// A node could not be loaded
    #[error(transparent)]
    NodeDb(#[from] NodeDbError),
}

/// Shape of a tree that passed [`Tree::check`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Number of leaves, that is keys
    pub leaves: u64,
    /// Number of inner nodes
    pub inner_nodes: u64,
    /// Height of the root
    pub height: u8,
}

struct Subtree {
    height: u8,
    size: u64,
    min_key: Key,
}

impl<S: KvStore> Tree<S> {
    /// Walk the whole working tree and verify its invariants: keys ascend,
    /// heights and sizes are consistent, every inner node is balanced and
    /// its key is the smallest key of its right subtree.
    ///
    /// # Errors
    ///
    /// Returns the first violation found, or the error from loading a node.
    pub fn check(&self) -> Result<TreeStats, CheckerError> {
        let mut stats = TreeStats::default();
        let Some(root) = self.root_ref() else {
            return Ok(stats);
        };
        let mut last_key = None;
        let subtree = self.check_subtree(root, &mut stats, &mut last_key)?;
        stats.height = subtree.height;
        Ok(stats)
    }

    fn check_subtree(
        &self,
        node_ref: NodeRef,
        stats: &mut TreeStats,
        last_key: &mut Option<Key>,
    ) -> Result<Subtree, CheckerError> {
        let node = self.node(node_ref)?;
        let key: Key = Box::from(node.key());

        let Some((left, right)) = node.children() else {
            if let Some(previous) = last_key.take() {
                if previous >= key {
                    return Err(CheckerError::KeyOrder { previous, key });
                }
            }
            *last_key = Some(key.clone());
            stats.leaves = stats.leaves.saturating_add(1);
            return Ok(Subtree {
                height: 0,
                size: 1,
                min_key: key,
            });
        };
        let (stored_height, stored_size) = (node.height(), node.size());

        let left = self.check_subtree(left, stats, last_key)?;
        let right = self.check_subtree(right, stats, last_key)?;
        stats.inner_nodes = stats.inner_nodes.saturating_add(1);

        if left.height.abs_diff(right.height) > 1 {
            return Err(CheckerError::Unbalanced {
                key,
                left: left.height,
                right: right.height,
            });
        }
        let computed = left.height.max(right.height).saturating_add(1);
        if stored_height != computed {
            return Err(CheckerError::HeightMismatch {
                key,
                stored: stored_height,
                computed,
            });
        }
        let size = left.size.saturating_add(right.size);
        if stored_size != size {
            return Err(CheckerError::SizeMismatch {
                key,
                stored: stored_size,
                computed: size,
            });
        }
        if key != right.min_key {
            return Err(CheckerError::SeparatorKey {
                key,
                expected: right.min_key,
            });
        }

        Ok(Subtree {
            height: computed,
            size,
            min_key: left.min_key,
        })
    }
}
