// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use iavl_storage::logger::{debug, trace, trace_enabled};
use iavl_storage::{
    Changes, InnerNode, KvStore, LeafNode, Node, NodeDb, NodeDbError, NodeHash, NodeRef,
    SharedNode, Version, hash_node,
};
use metrics::counter;

use crate::working::{WorkingNode, WorkingSet};
use crate::{Key, Value};

/// A node reached while walking the tree: either borrowed from the working
/// set or shared from the node database.
pub(crate) enum NodeView<'a> {
    Working(&'a WorkingNode),
    Persisted(SharedNode),
}

impl NodeView<'_> {
    pub(crate) fn height(&self) -> u8 {
        match self {
            NodeView::Working(node) => node.height(),
            NodeView::Persisted(node) => node.height(),
        }
    }

    pub(crate) fn size(&self) -> u64 {
        match self {
            NodeView::Working(node) => node.size(),
            NodeView::Persisted(node) => node.size(),
        }
    }

    pub(crate) fn key(&self) -> &[u8] {
        match self {
            NodeView::Working(node) => node.key(),
            NodeView::Persisted(node) => node.key(),
        }
    }

    pub(crate) fn value(&self) -> Option<&[u8]> {
        match self {
            NodeView::Working(node) => node.value(),
            NodeView::Persisted(node) => node.value(),
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        match self {
            NodeView::Working(node) => node.is_leaf(),
            NodeView::Persisted(node) => node.is_leaf(),
        }
    }

    /// `(left, right)` for inner nodes
    pub(crate) fn children(&self) -> Option<(NodeRef, NodeRef)> {
        match self {
            NodeView::Working(Node::Inner(inner)) => Some((inner.left, inner.right)),
            NodeView::Working(Node::Leaf(_)) => None,
            NodeView::Persisted(node) => node.as_inner().map(|inner| {
                (NodeRef::from(inner.left), NodeRef::from(inner.right))
            }),
        }
    }
}

/// A mutable working copy of one version of an IAVL tree.
///
/// The tree starts out at a committed version loaded from its [`NodeDb`].
/// [`Tree::set`] and [`Tree::remove`] build the next version in memory,
/// copying the path from the root to each touched leaf and leaving every
/// other subtree shared with the committed version. [`Tree::save_version`]
/// hashes the new nodes and commits them.
///
/// A tree is a single writer: mutations take `&mut self`. Any number of trees
/// may share one [`NodeDb`], and reads through `&self` may run concurrently.
///
/// A mutation that fails, for example because a node is missing from the
/// store, leaves the working version exactly as it was before the call.
pub struct Tree<S: KvStore> {
    db: Arc<NodeDb<S>>,
    version: Version,
    saved_root: Option<NodeHash>,
    root: Option<NodeRef>,
    working: WorkingSet,
    /// persisted nodes replaced in this version, with the version that created them
    orphans: BTreeMap<NodeHash, Version>,
    /// orphans added by the mutation in progress
    new_orphans: Vec<NodeHash>,
}

impl<S: KvStore> Debug for Tree<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("version", &self.version)
            .field("saved_root", &self.saved_root)
            .field("root", &self.root)
            .field("working_nodes", &self.working.len())
            .field("orphans", &self.orphans.len())
            .finish_non_exhaustive()
    }
}

impl<S: KvStore> Tree<S> {
    /// Load the tree at `version`, or at the latest committed version if
    /// `version` is `None`. Version 0 is the empty tree.
    ///
    /// # Errors
    ///
    /// Returns [`NodeDbError::VersionNotFound`] if `version` was never committed.
    pub fn new(db: Arc<NodeDb<S>>, version: Option<Version>) -> Result<Self, NodeDbError> {
        let version = version.unwrap_or_else(|| db.latest_version());
        let root = db.root(version)?;
        debug!("loaded tree at version {version} with root {root:?}");
        Ok(Tree {
            db,
            version,
            saved_root: root,
            root: root.map(NodeRef::from),
            working: WorkingSet::default(),
            orphans: BTreeMap::new(),
            new_orphans: Vec::new(),
        })
    }

    /// The last committed version this tree is based on
    pub const fn version(&self) -> Version {
        self.version
    }

    /// The root hash of [`Tree::version`], `None` for an empty tree
    pub const fn root_hash(&self) -> Option<NodeHash> {
        self.saved_root
    }

    /// The node database backing this tree
    pub const fn db(&self) -> &Arc<NodeDb<S>> {
        &self.db
    }

    /// Returns true if the working tree has no keys
    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of keys in the working tree
    ///
    /// # Errors
    ///
    /// Returns an error if the root node cannot be loaded.
    pub fn size(&self) -> Result<u64, NodeDbError> {
        self.root
            .map_or(Ok(0), |root| self.node(root).map(|node| node.size()))
    }

    /// Height of the working tree; 0 for a single leaf or an empty tree
    ///
    /// # Errors
    ///
    /// Returns an error if the root node cannot be loaded.
    pub fn height(&self) -> Result<u8, NodeDbError> {
        self.root
            .map_or(Ok(0), |root| self.node(root).map(|node| node.height()))
    }

    /// Number of persisted nodes the working version has replaced so far
    pub fn pending_orphans(&self) -> usize {
        self.orphans.len()
    }

    /// Look up `key` in the working tree.
    ///
    /// # Errors
    ///
    /// Returns an error if a node on the path cannot be loaded.
    pub fn get(&self, key: &[u8]) -> Result<Option<Value>, NodeDbError> {
        let Some(mut current) = self.root else {
            return Ok(None);
        };
        loop {
            let node = self.node(current)?;
            match node.children() {
                Some((left, right)) => {
                    current = if key < node.key() { left } else { right };
                }
                None if node.key() == key => return Ok(node.value().map(Box::from)),
                None => return Ok(None),
            }
        }
    }

    /// Returns true if `key` is in the working tree
    ///
    /// # Errors
    ///
    /// Returns an error if a node on the path cannot be loaded.
    pub fn contains(&self, key: &[u8]) -> Result<bool, NodeDbError> {
        self.get(key).map(|value| value.is_some())
    }

    /// Insert or update `key`, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if a node on the path cannot be loaded. The working
    /// version is left as it was.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<Option<Value>, NodeDbError> {
        counter!("iavl.tree.op", "op" => "set").increment(1);
        if trace_enabled() {
            trace!("set {} => {}", hex::encode(key), hex::encode(value));
        }

        let Some(root) = self.root else {
            self.root = Some(self.new_leaf(key, value));
            return Ok(None);
        };
        self.atomically(|tree| {
            let (root, old) = tree.set_recursive(root, key, value)?;
            tree.root = Some(root);
            Ok(old)
        })
    }

    fn set_recursive(
        &mut self,
        node_ref: NodeRef,
        key: &[u8],
        value: &[u8],
    ) -> Result<(NodeRef, Option<Value>), NodeDbError> {
        let version = self.next_version();
        let leaf_key: Option<Key> = {
            let node = self.node(node_ref)?;
            node.is_leaf().then(|| Box::from(node.key()))
        };

        if let Some(leaf_key) = leaf_key {
            let inner = match key.cmp(&*leaf_key) {
                Ordering::Equal => {
                    let old = self.take(node_ref)?;
                    let new_leaf = self.new_leaf(key, value);
                    return Ok((new_leaf, old.value().map(Box::from)));
                }
                Ordering::Less => InnerNode {
                    height: 1,
                    size: 2,
                    version,
                    key: leaf_key,
                    left: self.new_leaf(key, value),
                    right: node_ref,
                },
                Ordering::Greater => InnerNode {
                    height: 1,
                    size: 2,
                    version,
                    key: Box::from(key),
                    left: node_ref,
                    right: self.new_leaf(key, value),
                },
            };
            return Ok((self.alloc(Node::Inner(inner)), None));
        }

        let mut inner = self.take_inner(node_ref)?;
        let old = if key < &*inner.key {
            let (left, old) = self.set_recursive(inner.left, key, value)?;
            inner.left = left;
            old
        } else {
            let (right, old) = self.set_recursive(inner.right, key, value)?;
            inner.right = right;
            old
        };

        if old.is_some() {
            // an update keeps the shape of the tree
            return Ok((self.alloc(Node::Inner(inner)), old));
        }
        self.update_height_size(&mut inner)?;
        Ok((self.balance(inner)?, None))
    }

    /// Remove `key`, returning its value. Removing a missing key changes
    /// nothing and returns `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if a node on the path cannot be loaded.
    pub fn remove(&mut self, key: &[u8]) -> Result<Option<Value>, NodeDbError> {
        counter!("iavl.tree.op", "op" => "remove").increment(1);
        if trace_enabled() {
            trace!("remove {}", hex::encode(key));
        }

        let Some(root) = self.root else {
            return Ok(None);
        };
        // check first, so a miss leaves every node in place
        if !self.contains(key)? {
            return Ok(None);
        }
        self.atomically(|tree| {
            let (root, _, value) = tree.remove_recursive(root, key)?;
            tree.root = root;
            Ok(Some(value))
        })
    }

    /// Run a mutation, undoing all of its effects on the working version
    /// if it fails.
    fn atomically<T>(
        &mut self,
        mutate: impl FnOnce(&mut Self) -> Result<T, NodeDbError>,
    ) -> Result<T, NodeDbError> {
        let root = self.root;
        self.working.checkpoint();
        self.new_orphans.clear();

        let result = mutate(self);
        if result.is_err() {
            self.working.revert();
            for hash in self.new_orphans.drain(..) {
                self.orphans.remove(&hash);
            }
            self.root = root;
        }
        result
    }

    /// Removes `key` below `node_ref`, which must contain it.
    ///
    /// Returns the replacement subtree (`None` once it is empty), the new
    /// separator key for the closest ancestor that routed right, and the value.
    fn remove_recursive(
        &mut self,
        node_ref: NodeRef,
        key: &[u8],
    ) -> Result<(Option<NodeRef>, Option<Key>, Value), NodeDbError> {
        let mut inner = match self.take(node_ref)? {
            Node::Leaf(leaf) => {
                debug_assert_eq!(&*leaf.key, key);
                return Ok((None, None, leaf.value));
            }
            Node::Inner(inner) => inner,
        };

        if key < &*inner.key {
            let (left, new_key, value) = self.remove_recursive(inner.left, key)?;
            let Some(left) = left else {
                // the right sibling takes this node's place; its smallest
                // key is this node's separator
                return Ok((Some(inner.right), Some(inner.key), value));
            };
            inner.left = left;
            self.update_height_size(&mut inner)?;
            Ok((Some(self.balance(inner)?), new_key, value))
        } else {
            let (right, new_key, value) = self.remove_recursive(inner.right, key)?;
            let Some(right) = right else {
                return Ok((Some(inner.left), None, value));
            };
            inner.right = right;
            if let Some(new_key) = new_key {
                inner.key = new_key;
            }
            self.update_height_size(&mut inner)?;
            Ok((Some(self.balance(inner)?), None, value))
        }
    }

    /// Hash and persist the working version, making it the new committed
    /// version. Returns the new root hash (`None` for an empty tree) and
    /// version number.
    ///
    /// Saving without changes still commits a new version with the same root.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails, for instance because another
    /// tree already committed this version. The working version is left
    /// untouched on error.
    pub fn save_version(&mut self) -> Result<(Option<NodeHash>, Version), NodeDbError> {
        let version = self.next_version();

        let mut nodes = Vec::with_capacity(self.working.len());
        let root = self.root.map(|root| {
            self.hash_subtree(root, &mut |hash, node| {
                nodes.push((hash, SharedNode::new(node)));
            })
        });
        let orphans = self
            .orphans
            .iter()
            .map(|(hash, created)| (*hash, *created))
            .collect();

        self.db.commit(Changes {
            version,
            root,
            nodes,
            orphans,
        })?;

        counter!("iavl.tree.op", "op" => "save_version").increment(1);
        self.version = version;
        self.saved_root = root;
        self.root = root.map(NodeRef::from);
        self.working.clear();
        self.orphans.clear();
        Ok((root, version))
    }

    /// The root hash [`Tree::save_version`] would produce now, without
    /// persisting anything.
    pub fn working_hash(&self) -> Option<NodeHash> {
        self.root
            .map(|root| self.hash_subtree(root, &mut |_, _| {}))
    }

    /// Discard all changes since the last committed version
    pub fn rollback(&mut self) {
        self.root = self.saved_root.map(NodeRef::from);
        self.working.clear();
        self.orphans.clear();
    }

    /// Hash the subtree at `node_ref` bottom up, handing every newly hashed
    /// node to `persist` (children before their parent).
    fn hash_subtree(&self, node_ref: NodeRef, persist: &mut impl FnMut(NodeHash, Node)) -> NodeHash {
        let id = match node_ref {
            NodeRef::Persisted(hash) => return hash,
            NodeRef::Working(id) => id,
        };
        let node = match self.working.get(id) {
            Node::Leaf(leaf) => Node::Leaf(leaf.clone()),
            Node::Inner(inner) => {
                let left = self.hash_subtree(inner.left, persist);
                let right = self.hash_subtree(inner.right, persist);
                Node::Inner(InnerNode {
                    height: inner.height,
                    size: inner.size,
                    version: inner.version,
                    key: inner.key.clone(),
                    left,
                    right,
                })
            }
        };
        let hash = hash_node(&node);
        persist(hash, node);
        hash
    }

    pub(crate) const fn root_ref(&self) -> Option<NodeRef> {
        self.root
    }

    pub(crate) const fn next_version(&self) -> Version {
        self.version.saturating_add(1)
    }

    pub(crate) fn node(&self, node_ref: NodeRef) -> Result<NodeView<'_>, NodeDbError> {
        match node_ref {
            NodeRef::Working(id) => Ok(NodeView::Working(self.working.get(id))),
            NodeRef::Persisted(hash) => self.db.get(&hash).map(NodeView::Persisted),
        }
    }

    pub(crate) fn alloc(&mut self, node: WorkingNode) -> NodeRef {
        NodeRef::Working(self.working.insert(node))
    }

    fn new_leaf(&mut self, key: &[u8], value: &[u8]) -> NodeRef {
        let leaf = LeafNode::new(key, value, self.next_version());
        self.alloc(Node::Leaf(leaf))
    }

    /// Detach a node so it can be rebuilt. A persisted node becomes an
    /// orphan of this version and is copied at the next version.
    pub(crate) fn take(&mut self, node_ref: NodeRef) -> Result<WorkingNode, NodeDbError> {
        let hash = match node_ref {
            NodeRef::Working(id) => return Ok(self.working.take(id)),
            NodeRef::Persisted(hash) => hash,
        };
        let node = self.db.get(&hash)?;
        if self.orphans.insert(hash, node.version()).is_none() {
            self.new_orphans.push(hash);
        }
        Ok(match &*node {
            Node::Leaf(leaf) => Node::Leaf(leaf.clone()),
            Node::Inner(inner) => Node::Inner(InnerNode {
                version: self.next_version(),
                ..inner.clone().map_children(NodeRef::from)
            }),
        })
    }

    pub(crate) fn take_inner(
        &mut self,
        node_ref: NodeRef,
    ) -> Result<InnerNode<NodeRef>, NodeDbError> {
        match self.take(node_ref)? {
            Node::Inner(inner) => Ok(inner),
            Node::Leaf(_) => unreachable!("only inner nodes are rebuilt in place"),
        }
    }
}
