// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

#![warn(missing_debug_implementations, rust_2018_idioms, missing_docs)]
#![deny(unsafe_code)]

//! # iavl-storage implements the persisted side of an IAVL tree
//!
//! A [Node] is either a leaf holding a key and value, or an inner node that
//! routes by a separator key to two children. Persisted nodes are addressed by
//! their [`NodeHash`], computed by [`hash_node`] over a canonical preimage.
//!
//! The [`NodeDb`] stores nodes by hash in a [`KvStore`], keeps the registry of
//! version roots, records orphaned nodes per version and caches recently read
//! nodes in memory.

use std::fmt::{Display, Formatter, Result};

mod codec;
mod hash;
mod hashednode;
mod keys;
mod kvstore;
mod node;
mod nodedb;

/// Logger module for handling logging functionality
pub mod logger;

// re-export these so callers don't need to know where they are
pub use codec::{ReadError, decode_node, encode_node};
pub use hash::{EMPTY_ROOT_HASH, InvalidNodeHashLength, NodeHash};
pub use hashednode::{HasUpdate, Preimage, hash_node, hash_preimage};
pub use keys::store_prefix;
#[cfg(feature = "fjall")]
pub use kvstore::FjallStore;
pub use kvstore::{KvOp, KvPair, KvStore, MemStore, StoreError};
pub use node::{InnerNode, LeafNode, Node, NodeRef, Version, WorkingId};
pub use nodedb::{Changes, ErrorKind, NodeDb, NodeDbConfig, NodeDbError, Orphan};

/// A shared node, which is just a triomphe Arc of a persisted node
pub type SharedNode = triomphe::Arc<Node>;

/// The strategy for caching nodes that are read
/// from the store. Nodes written by a commit are always
/// cached; reads are cached according to this strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum CacheReadStrategy {
    /// Only cache writes (no reads will be cached)
    WritesOnly,

    /// Cache inner node reads (reads that are not leaf nodes)
    #[default]
    InnerReads,

    /// Cache all reads (leaves and inner nodes)
    All,
}

impl Display for CacheReadStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{self:?}")
    }
}
