// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! # `NodeDb`
//!
//! The [`NodeDb`] translates between tree nodes and records in a [`KvStore`].
//! It owns three kinds of records (see the `keys` module for their layout):
//!
//! - persisted nodes, addressed by their hash,
//! - the version registry, mapping each committed version to its root hash,
//! - orphan records, naming the nodes each version made unreachable.
//!
//! Everything a version writes goes to the store in a single atomic batch,
//! so a registry entry can never point at a root that was not written.
//!
//! Recently used nodes are kept in an LRU cache. The cache is an
//! optimization only: every node can always be rebuilt from the store.

use std::num::NonZeroUsize;

use lru::LruCache;
use metrics::counter;
use parking_lot::Mutex;
use typed_builder::TypedBuilder;

use crate::keys::KeyLayout;
use crate::logger::{debug, trace};
use crate::{
    CacheReadStrategy, KvOp, KvStore, NodeHash, ReadError, SharedNode, StoreError, Version,
    decode_node, encode_node, hash_node,
};

/// Configuration of a [`NodeDb`]
#[derive(Clone, TypedBuilder, Debug)]
pub struct NodeDbConfig {
    /// Maximum number of nodes held in the read cache
    #[builder(default = nonzero_ext::nonzero!(10_000usize))]
    pub cache_size: NonZeroUsize,
    /// Which reads populate the cache
    #[builder(default)]
    pub cache_read_strategy: CacheReadStrategy,
    /// Recompute the hash of every node loaded from the store and reject
    /// nodes whose content does not match the hash they were looked up by
    #[builder(default = true)]
    pub verify_hashes: bool,
    /// Namespace prepended to every key, for several trees sharing a store
    #[builder(default, setter(into))]
    pub prefix: Vec<u8>,
}

impl Default for NodeDbConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// The broad class of a [`NodeDbError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced node or version is absent from the store
    NotFound,
    /// Stored bytes do not decode into what they should be
    Corrupt,
    /// The request conflicts with the state of the database
    InvalidOperation,
    /// The underlying store failed
    Store,
}

/// Errors returned by the [`NodeDb`]
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum NodeDbError {
    /// A node referenced by hash is not in the store
    #[error("node {hash:?} not found")]
    NodeNotFound {
        /// The missing hash
        hash: NodeHash,
    },

    /// A version was never committed
    #[error("version {version} not found")]
    VersionNotFound {
        /// The requested version
        version: Version,
    },

    /// A stored node could not be decoded
    #[error("node {hash:?} is corrupt: {source}")]
    CorruptNode {
        /// The hash the node was stored under
        hash: NodeHash,
        /// The decoding failure
        #[source]
        source: ReadError,
    },

    /// A stored node does not hash to the key it was stored under
    #[error("node {hash:?} is corrupt: its content hashes to {computed:?}")]
    HashMismatch {
        /// The hash the node was stored under
        hash: NodeHash,
        /// The hash of the stored content
        computed: NodeHash,
    },

    /// A version registry entry is neither empty nor a hash
    #[error("root of version {version} is corrupt: expected 0 or 32 bytes, found {len}")]
    CorruptRoot {
        /// The version whose entry is corrupt
        version: Version,
        /// Length of the stored value
        len: usize,
    },

    /// An orphan record key could not be parsed
    #[error("orphan record {key} is corrupt")]
    CorruptOrphan {
        /// The hex encoded key
        key: String,
    },

    /// A commit would not advance the latest version
    #[error("cannot commit version {version}: latest committed version is {latest}")]
    NotLatest {
        /// The version being committed
        version: Version,
        /// The latest committed version
        latest: Version,
    },

    /// The underlying store failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl NodeDbError {
    /// The class of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            NodeDbError::NodeNotFound { .. } | NodeDbError::VersionNotFound { .. } => {
                ErrorKind::NotFound
            }
            NodeDbError::CorruptNode { .. }
            | NodeDbError::HashMismatch { .. }
            | NodeDbError::CorruptRoot { .. }
            | NodeDbError::CorruptOrphan { .. } => ErrorKind::Corrupt,
            NodeDbError::NotLatest { .. } => ErrorKind::InvalidOperation,
            NodeDbError::Store(_) => ErrorKind::Store,
        }
    }
}

/// A persisted node that became unreachable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Orphan {
    /// The version whose commit made the node unreachable
    pub deleted: Version,
    /// The version that created the node
    pub created: Version,
    /// The node's hash
    pub hash: NodeHash,
}

/// Everything a single version writes, see [`NodeDb::commit`]
#[derive(Debug, Default)]
pub struct Changes {
    /// The version being committed
    pub version: Version,
    /// The root of the new version; `None` for an empty tree
    pub root: Option<NodeHash>,
    /// Newly hashed nodes, children before parents
    pub nodes: Vec<(NodeHash, SharedNode)>,
    /// Hash and creating version of every persisted node this version
    /// made unreachable
    pub orphans: Vec<(NodeHash, Version)>,
}

/// Persistence and caching of tree nodes over a [`KvStore`]
#[derive(Debug)]
pub struct NodeDb<S> {
    store: S,
    keys: KeyLayout,
    cache: Mutex<LruCache<NodeHash, SharedNode>>,
    cache_read_strategy: CacheReadStrategy,
    verify_hashes: bool,
    // held for the duration of a commit
    latest: Mutex<Version>,
}

impl<S: KvStore> NodeDb<S> {
    /// Open a node database over `store`, scanning the version registry
    /// for the latest committed version.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn new(store: S, config: NodeDbConfig) -> Result<Self, NodeDbError> {
        let keys = KeyLayout::new(&config.prefix);

        let mut latest: Version = 0;
        for item in store.prefix_iter(&keys.roots()) {
            let (key, _) = item?;
            if let Some(version) = keys.parse_root(&key) {
                latest = latest.max(version);
            }
        }
        debug!(
            "opened node db at version {latest} with prefix {}",
            hex::encode(&config.prefix)
        );

        Ok(Self {
            store,
            keys,
            cache: Mutex::new(LruCache::new(config.cache_size)),
            cache_read_strategy: config.cache_read_strategy,
            verify_hashes: config.verify_hashes,
            latest: Mutex::new(latest),
        })
    }

    /// The underlying store
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The most recently committed version, or 0 if nothing was committed
    pub fn latest_version(&self) -> Version {
        *self.latest.lock()
    }

    /// Fetch the persisted node with the given hash.
    ///
    /// # Errors
    ///
    /// Returns [`NodeDbError::NodeNotFound`] if the store has no such node, or
    /// a corruption error if the stored bytes are not a valid node with
    /// that hash.
    pub fn get(&self, hash: &NodeHash) -> Result<SharedNode, NodeDbError> {
        if let Some(node) = self.read_cached_node(hash) {
            return Ok(node);
        }

        counter!("iavl.read_node", "from" => "store").increment(1);
        trace!("reading node {hash:?} from store");
        let bytes = self
            .store
            .get(&self.keys.node(hash))?
            .ok_or(NodeDbError::NodeNotFound { hash: *hash })?;
        let node = decode_node(&bytes).map_err(|source| NodeDbError::CorruptNode {
            hash: *hash,
            source,
        })?;
        if self.verify_hashes {
            let computed = hash_node(&node);
            if computed != *hash {
                return Err(NodeDbError::HashMismatch {
                    hash: *hash,
                    computed,
                });
            }
        }

        let node = SharedNode::new(node);
        self.cache_node(*hash, node.clone());
        Ok(node)
    }

    /// The root hash of a committed `version`; `None` if that version is empty.
    ///
    /// # Errors
    ///
    /// Returns [`NodeDbError::VersionNotFound`] if `version` was never
    /// committed. Version 0 always exists and is empty.
    pub fn root(&self, version: Version) -> Result<Option<NodeHash>, NodeDbError> {
        if version == 0 {
            return Ok(None);
        }
        let value = self
            .store
            .get(&self.keys.root(version))?
            .ok_or(NodeDbError::VersionNotFound { version })?;
        if value.is_empty() {
            return Ok(None);
        }
        NodeHash::try_from(&*value)
            .map(Some)
            .map_err(|err| NodeDbError::CorruptRoot {
                version,
                len: err.0,
            })
    }

    /// The root hash of `version`, or `None` for an empty or unknown version.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read.
    pub fn get_root_hash(&self, version: Version) -> Result<Option<NodeHash>, NodeDbError> {
        match self.root(version) {
            Err(NodeDbError::VersionNotFound { .. }) => Ok(None),
            other => other,
        }
    }

    /// Returns true if `version` was committed (version 0 always was).
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read.
    pub fn has_version(&self, version: Version) -> Result<bool, NodeDbError> {
        Ok(version == 0 || self.store.get(&self.keys.root(version))?.is_some())
    }

    /// The orphan records written by the commit of `version`, ordered by
    /// creating version and hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or holds a malformed
    /// orphan record.
    pub fn orphans(&self, version: Version) -> Result<Vec<Orphan>, NodeDbError> {
        self.store
            .prefix_iter(&self.keys.orphans_of(version))
            .map(|item| -> Result<Orphan, NodeDbError> {
                let (key, _) = item?;
                let (deleted, created, hash) =
                    self.keys
                        .parse_orphan(&key)
                        .ok_or_else(|| NodeDbError::CorruptOrphan {
                            key: hex::encode(&key),
                        })?;
                Ok(Orphan {
                    deleted,
                    created,
                    hash,
                })
            })
            .collect()
    }

    /// Atomically persist a new version: its nodes, its registry entry and its
    /// orphan records. The batch is durable when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`NodeDbError::NotLatest`] if `changes.version` is not newer
    /// than every committed version, or a store error if the batch could not
    /// be written. Nothing is written on error.
    pub fn commit(&self, changes: Changes) -> Result<(), NodeDbError> {
        let Changes {
            version,
            root,
            nodes,
            orphans,
        } = changes;

        let mut latest = self.latest.lock();
        if version <= *latest {
            return Err(NodeDbError::NotLatest {
                version,
                latest: *latest,
            });
        }

        let mut batch = Vec::with_capacity(nodes.len().saturating_add(orphans.len()).saturating_add(1));
        for (hash, node) in &nodes {
            trace!("persisting node {hash:?} {node:?}");
            batch.push(KvOp::put(self.keys.node(hash), encode_node(node)));
        }
        let root_value: Box<[u8]> = root.map_or_else(Box::default, |hash| Box::from(hash.as_ref()));
        batch.push(KvOp::put(self.keys.root(version), root_value));
        for (hash, created) in &orphans {
            batch.push(KvOp::put(
                self.keys.orphan(version, *created, hash),
                Box::<[u8]>::default(),
            ));
        }

        self.store.write_batch(batch)?;
        *latest = version;
        drop(latest);

        counter!("iavl.commit").increment(1);
        counter!("iavl.commit.nodes").increment(nodes.len() as u64);
        counter!("iavl.commit.orphans").increment(orphans.len() as u64);
        debug!(
            "committed version {version} root {root:?}: {} nodes, {} orphans",
            nodes.len(),
            orphans.len()
        );

        self.write_cached_nodes(nodes);
        Ok(())
    }

    /// Number of nodes currently cached
    pub fn cached_nodes(&self) -> usize {
        self.cache.lock().len()
    }

    /// Drop every cached node; later reads go to the store
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    fn read_cached_node(&self, hash: &NodeHash) -> Option<SharedNode> {
        let mut guard = self.cache.lock();
        let cached = guard.get(hash).cloned();
        counter!("iavl.cache.node", "type" => if cached.is_some() { "hit" } else { "miss" })
            .increment(1);
        cached
    }

    fn cache_node(&self, hash: NodeHash, node: SharedNode) {
        match self.cache_read_strategy {
            CacheReadStrategy::WritesOnly => {
                // we don't cache reads
            }
            CacheReadStrategy::All => {
                self.cache.lock().put(hash, node);
            }
            CacheReadStrategy::InnerReads => {
                if !node.is_leaf() {
                    self.cache.lock().put(hash, node);
                }
            }
        }
    }

    fn write_cached_nodes(&self, nodes: Vec<(NodeHash, SharedNode)>) {
        let mut guard = self.cache.lock();
        for (hash, node) in nodes {
            guard.put(hash, node);
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use test_case::test_case;

    use super::*;
    use crate::{InnerNode, LeafNode, MemStore, Node, store_prefix};

    fn leaf(key: &[u8], value: &[u8], version: Version) -> (NodeHash, SharedNode) {
        let node = Node::Leaf(LeafNode::new(key, value, version));
        (hash_node(&node), SharedNode::new(node))
    }

    fn inner(left: NodeHash, right: NodeHash, key: &[u8], version: Version) -> (NodeHash, SharedNode) {
        let node = Node::Inner(InnerNode {
            height: 1,
            size: 2,
            version,
            key: Box::from(key),
            left,
            right,
        });
        (hash_node(&node), SharedNode::new(node))
    }

    /// Commits a two leaf tree at version 1
    fn two_leaves(db: &NodeDb<Arc<MemStore>>) -> [(NodeHash, SharedNode); 3] {
        let a = leaf(b"a", b"1", 1);
        let b = leaf(b"b", b"2", 1);
        let root = inner(a.0, b.0, b"b", 1);
        db.commit(Changes {
            version: 1,
            root: Some(root.0),
            nodes: vec![a.clone(), b.clone(), root.clone()],
            orphans: vec![],
        })
        .unwrap();
        [a, b, root]
    }

    fn new_db(store: &Arc<MemStore>, config: NodeDbConfig) -> NodeDb<Arc<MemStore>> {
        NodeDb::new(Arc::clone(store), config).unwrap()
    }

    #[test]
    fn empty_db() {
        let db = NodeDb::new(MemStore::new(), NodeDbConfig::default()).unwrap();
        assert_eq!(db.latest_version(), 0);
        assert_eq!(db.root(0).unwrap(), None);
        assert!(db.has_version(0).unwrap());
        assert!(!db.has_version(1).unwrap());
        assert_eq!(db.get_root_hash(1).unwrap(), None);
        let err = db.root(1).unwrap_err();
        assert!(matches!(err, NodeDbError::VersionNotFound { version: 1 }));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn commit_then_read_from_cold_cache() {
        let store = Arc::new(MemStore::new());
        let db = new_db(&store, NodeDbConfig::default());
        let [a, _, root] = two_leaves(&db);
        assert_eq!(db.cached_nodes(), 3);
        assert_eq!(db.latest_version(), 1);

        let cold = new_db(&store, NodeDbConfig::default());
        assert_eq!(cold.latest_version(), 1);
        assert_eq!(cold.root(1).unwrap(), Some(root.0));
        assert_eq!(*cold.get(&root.0).unwrap(), *root.1);
        assert_eq!(*cold.get(&a.0).unwrap(), *a.1);
    }

    #[test]
    fn missing_node() {
        let db = NodeDb::new(MemStore::new(), NodeDbConfig::default()).unwrap();
        let hash = NodeHash::from([3; 32]);
        let err = db.get(&hash).unwrap_err();
        assert!(matches!(err, NodeDbError::NodeNotFound { hash: h } if h == hash));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn undecodable_node() {
        let store = Arc::new(MemStore::new());
        let db = new_db(&store, NodeDbConfig::default());
        let hash = NodeHash::from([4; 32]);
        store.put(&KeyLayout::default().node(&hash), b"\x00").unwrap();
        let err = db.get(&hash).unwrap_err();
        assert!(matches!(err, NodeDbError::CorruptNode { .. }), "{err}");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test_case(true; "verified")]
    #[test_case(false; "unverified")]
    fn node_under_wrong_hash(verify_hashes: bool) {
        let store = Arc::new(MemStore::new());
        let config = NodeDbConfig::builder().verify_hashes(verify_hashes).build();
        let db = new_db(&store, config);
        let (real, node) = leaf(b"k", b"v", 1);
        let wrong = NodeHash::from([5; 32]);
        store
            .put(&KeyLayout::default().node(&wrong), &encode_node(&node))
            .unwrap();

        match db.get(&wrong) {
            Err(NodeDbError::HashMismatch { hash, computed }) => {
                assert!(verify_hashes);
                assert_eq!(hash, wrong);
                assert_eq!(computed, real);
            }
            Ok(loaded) => {
                assert!(!verify_hashes);
                assert_eq!(*loaded, *node);
            }
            Err(err) => panic!("unexpected {err}"),
        }
    }

    #[test]
    fn empty_version_is_recorded() {
        let store = Arc::new(MemStore::new());
        let db = new_db(&store, NodeDbConfig::default());
        db.commit(Changes {
            version: 1,
            ..Changes::default()
        })
        .unwrap();
        assert!(db.has_version(1).unwrap());
        assert_eq!(db.root(1).unwrap(), None);
        assert_eq!(new_db(&store, NodeDbConfig::default()).latest_version(), 1);
    }

    #[test]
    fn corrupt_registry_entry() {
        let store = Arc::new(MemStore::new());
        store.put(&KeyLayout::default().root(2), b"short").unwrap();
        let db = new_db(&store, NodeDbConfig::default());
        assert_eq!(db.latest_version(), 2);
        let err = db.root(2).unwrap_err();
        assert!(matches!(err, NodeDbError::CorruptRoot { version: 2, len: 5 }));
    }

    #[test]
    fn versions_must_advance() {
        let store = Arc::new(MemStore::new());
        let db = new_db(&store, NodeDbConfig::default());
        two_leaves(&db);
        let before = store.len();
        let err = db
            .commit(Changes {
                version: 1,
                ..Changes::default()
            })
            .unwrap_err();
        assert!(matches!(err, NodeDbError::NotLatest { version: 1, latest: 1 }));
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert_eq!(store.len(), before);
    }

    #[test]
    fn orphans_are_listed_per_version() {
        let store = Arc::new(MemStore::new());
        let db = new_db(&store, NodeDbConfig::default());
        let [a, b, root] = two_leaves(&db);

        let a2 = leaf(b"a", b"updated", 2);
        let root2 = inner(a2.0, b.0, b"b", 2);
        db.commit(Changes {
            version: 2,
            root: Some(root2.0),
            nodes: vec![a2, root2],
            orphans: vec![(a.0, 1), (root.0, 1)],
        })
        .unwrap();

        assert!(db.orphans(1).unwrap().is_empty());
        let mut expected = vec![
            Orphan {
                deleted: 2,
                created: 1,
                hash: a.0,
            },
            Orphan {
                deleted: 2,
                created: 1,
                hash: root.0,
            },
        ];
        expected.sort();
        assert_eq!(db.orphans(2).unwrap(), expected);
        // orphans are only recorded, never deleted
        assert!(db.get(&a.0).is_ok());
    }

    #[test]
    fn prefixes_isolate_trees() {
        let store = Arc::new(MemStore::new());
        let bank = new_db(
            &store,
            NodeDbConfig::builder().prefix(store_prefix("bank")).build(),
        );
        let acc = new_db(
            &store,
            NodeDbConfig::builder().prefix(store_prefix("acc")).build(),
        );
        two_leaves(&bank);
        assert_eq!(acc.latest_version(), 0);
        assert!(!acc.has_version(1).unwrap());
        acc.commit(Changes {
            version: 1,
            ..Changes::default()
        })
        .unwrap();
        assert!(bank.root(1).unwrap().is_some());
        assert!(acc.root(1).unwrap().is_none());
    }

    #[test_case(CacheReadStrategy::WritesOnly, 0; "writes only")]
    #[test_case(CacheReadStrategy::InnerReads, 1; "inner reads")]
    #[test_case(CacheReadStrategy::All, 3; "all reads")]
    fn cache_read_strategy(strategy: CacheReadStrategy, cached: usize) {
        let store = Arc::new(MemStore::new());
        let db = new_db(
            &store,
            NodeDbConfig::builder().cache_read_strategy(strategy).build(),
        );
        let nodes = two_leaves(&db);
        db.clear_cache();
        assert_eq!(db.cached_nodes(), 0);
        for (hash, _) in &nodes {
            db.get(hash).unwrap();
        }
        assert_eq!(db.cached_nodes(), cached);
    }

    #[test]
    fn cache_is_bounded() {
        let store = Arc::new(MemStore::new());
        let db = new_db(
            &store,
            NodeDbConfig::builder()
                .cache_size(NonZeroUsize::new(2).unwrap())
                .build(),
        );
        let nodes = two_leaves(&db);
        assert_eq!(db.cached_nodes(), 2);
        for (hash, node) in &nodes {
            assert_eq!(*db.get(hash).unwrap(), **node);
        }
    }
}
