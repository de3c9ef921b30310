// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::fmt::{self, Debug};

use crate::NodeHash;

/// A committed version of the tree. Version 0 is always the empty tree.
pub type Version = u64;

/// Index of a node in a tree's working set. Only meaningful to the tree
/// that allocated it, and only until that tree's next commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkingId(usize);

impl WorkingId {
    /// Create an id from a working set slot index
    #[must_use]
    pub const fn new(index: usize) -> Self {
        WorkingId(index)
    }

    /// The working set slot index
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A reference from an inner node to one of its children.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// A node created in the current, uncommitted version
    Working(WorkingId),
    /// An immutable node stored in the node database
    Persisted(NodeHash),
}

impl Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Working(id) => write!(f, "Working({})", id.index()),
            NodeRef::Persisted(hash) => write!(f, "Persisted({hash:?})"),
        }
    }
}

impl From<NodeHash> for NodeRef {
    fn from(hash: NodeHash) -> Self {
        NodeRef::Persisted(hash)
    }
}

/// A leaf holds one key and its value. Its height is 0 and its size is 1.
#[derive(Clone, PartialEq, Eq)]
pub struct LeafNode {
    /// The version at which this leaf was created or last updated
    pub version: Version,
    /// The key
    pub key: Box<[u8]>,
    /// The value
    pub value: Box<[u8]>,
}

impl LeafNode {
    /// Create a leaf at `version`
    #[must_use]
    pub fn new(key: &[u8], value: &[u8], version: Version) -> Self {
        LeafNode {
            version,
            key: Box::from(key),
            value: Box::from(value),
        }
    }
}

impl Debug for LeafNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Leaf v{} {} => {}]",
            self.version,
            hex::encode(&self.key),
            hex::encode(&self.value)
        )
    }
}

/// An inner node routes lookups: keys less than `key` live under `left`,
/// all other keys under `right`. `key` is the smallest key of the right subtree.
#[derive(Clone, PartialEq, Eq)]
pub struct InnerNode<C> {
    /// `max(left.height, right.height) + 1`
    pub height: u8,
    /// Number of leaves below this node
    pub size: u64,
    /// The version at which this node was created
    pub version: Version,
    /// The separator key
    pub key: Box<[u8]>,
    /// Subtree with keys less than `key`
    pub left: C,
    /// Subtree with keys greater than or equal to `key`
    pub right: C,
}

impl<C> InnerNode<C> {
    /// Convert the child references, keeping all other fields
    pub fn map_children<D>(self, mut f: impl FnMut(C) -> D) -> InnerNode<D> {
        InnerNode {
            height: self.height,
            size: self.size,
            version: self.version,
            key: self.key,
            left: f(self.left),
            right: f(self.right),
        }
    }
}

impl<C: Debug> Debug for InnerNode<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Inner v{} h{} s{} {} L={:?} R={:?}]",
            self.version,
            self.height,
            self.size,
            hex::encode(&self.key),
            self.left,
            self.right
        )
    }
}

/// A node in the tree. Persisted nodes refer to their children by hash
/// (`Node<NodeHash>`, the default), working nodes by [`NodeRef`].
#[derive(Clone, PartialEq, Eq)]
pub enum Node<C = NodeHash> {
    /// A leaf node
    Leaf(LeafNode),
    /// An inner node
    Inner(InnerNode<C>),
}

impl<C> Node<C> {
    /// 0 for leaves
    #[must_use]
    pub const fn height(&self) -> u8 {
        match self {
            Node::Leaf(_) => 0,
            Node::Inner(inner) => inner.height,
        }
    }

    /// Number of leaves in the subtree rooted here
    #[must_use]
    pub const fn size(&self) -> u64 {
        match self {
            Node::Leaf(_) => 1,
            Node::Inner(inner) => inner.size,
        }
    }

    /// The version that created this node
    #[must_use]
    pub const fn version(&self) -> Version {
        match self {
            Node::Leaf(leaf) => leaf.version,
            Node::Inner(inner) => inner.version,
        }
    }

    /// The leaf key, or the separator key of an inner node
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Node::Leaf(leaf) => &leaf.key,
            Node::Inner(inner) => &inner.key,
        }
    }

    /// Returns the value if this is a leaf
    #[must_use]
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Node::Leaf(leaf) => Some(&leaf.value),
            Node::Inner(_) => None,
        }
    }

    /// Returns true for leaves
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Returns the inner node, if this is one
    #[must_use]
    pub const fn as_inner(&self) -> Option<&InnerNode<C>> {
        match self {
            Node::Inner(inner) => Some(inner),
            Node::Leaf(_) => None,
        }
    }
}

impl<C: Debug> Debug for Node<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Leaf(leaf) => Debug::fmt(leaf, f),
            Node::Inner(inner) => Debug::fmt(inner, f),
        }
    }
}

impl From<LeafNode> for Node {
    fn from(leaf: LeafNode) -> Self {
        Node::Leaf(leaf)
    }
}
