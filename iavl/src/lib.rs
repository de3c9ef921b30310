// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

#![warn(missing_debug_implementations, rust_2018_idioms, missing_docs)]
#![deny(unsafe_code)]

//! # iavl: a persistent, versioned, authenticated AVL+ tree
//!
//! Keys and values are arbitrary byte strings. Values live only in leaves;
//! inner nodes hold a separator key equal to the smallest key of their right
//! subtree. Every node is addressed by the sha256 hash of a canonical
//! preimage, so a version's root hash commits to its entire contents.
//!
//! A [`Tree`] is a working copy of one version. Mutations copy the path from
//! the root to each touched leaf; everything else stays shared with the
//! previous version. [`Tree::save_version`] hashes the new nodes and commits
//! them, along with the version's root and the list of nodes it orphaned,
//! through a [`NodeDb`] in a single atomic batch.
//!
//! ```
//! use std::sync::Arc;
//! use iavl::{MemStore, NodeDb, NodeDbConfig, Tree};
//!
//! let db = Arc::new(NodeDb::new(MemStore::new(), NodeDbConfig::default())?);
//! let mut tree = Tree::new(Arc::clone(&db), None)?;
//! tree.set(b"hello", b"world")?;
//! let (root, version) = tree.save_version()?;
//! assert_eq!(version, 1);
//! assert!(root.is_some());
//!
//! let reopened = Tree::new(db, Some(1))?;
//! assert_eq!(reopened.get(b"hello")?.as_deref(), Some(&b"world"[..]));
//! # Ok::<(), iavl::NodeDbError>(())
//! ```

mod balance;
mod changeset;
mod checker;
mod iter;
mod tree;
mod working;

/// A key stored in the tree
pub type Key = Box<[u8]>;
/// A value stored in the tree
pub type Value = Box<[u8]>;

pub use changeset::{Change, ChangeOp};
pub use checker::{CheckerError, TreeStats};
pub use iter::TreeIter;
pub use tree::Tree;

// re-export the storage layer so most users only depend on this crate
#[cfg(feature = "fjall")]
pub use iavl_storage::FjallStore;
pub use iavl_storage::{
    CacheReadStrategy, ErrorKind, KvOp, KvPair, KvStore, MemStore, NodeDb, NodeDbConfig,
    NodeDbError, NodeHash, Orphan, StoreError, Version, store_prefix,
};
