// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! AVL rebalancing of working nodes.
//!
//! Every rotation rebuilds the rotated node and its pivot child as working
//! nodes at the next version. A persisted pivot becomes an orphan.

use iavl_storage::{InnerNode, KvStore, Node, NodeDbError, NodeRef};

use crate::Tree;

impl<S: KvStore> Tree<S> {
    /// Recompute `height` and `size` of `node` from its children
    pub(crate) fn update_height_size(
        &self,
        node: &mut InnerNode<NodeRef>,
    ) -> Result<(), NodeDbError> {
        let (left_height, left_size) = {
            let left = self.node(node.left)?;
            (left.height(), left.size())
        };
        let (right_height, right_size) = {
            let right = self.node(node.right)?;
            (right.height(), right.size())
        };
        node.height = left_height.max(right_height).saturating_add(1);
        node.size = left_size.saturating_add(right_size);
        Ok(())
    }

    fn height_difference(&self, left: NodeRef, right: NodeRef) -> Result<i16, NodeDbError> {
        let left = i16::from(self.node(left)?.height());
        let right = i16::from(self.node(right)?.height());
        Ok(left - right)
    }

    /// `height(left) - height(right)`, 0 for a leaf
    pub(crate) fn balance_factor(&self, node_ref: NodeRef) -> Result<i16, NodeDbError> {
        let children = self.node(node_ref)?.children();
        match children {
            Some((left, right)) => self.height_difference(left, right),
            None => Ok(0),
        }
    }

    /// Restore the AVL invariant at `node`, whose subtrees are balanced and
    /// whose height and size are current. Returns the new subtree root.
    pub(crate) fn balance(&mut self, mut node: InnerNode<NodeRef>) -> Result<NodeRef, NodeDbError> {
        let balance = self.height_difference(node.left, node.right)?;

        if balance > 1 {
            if self.balance_factor(node.left)? >= 0 {
                return self.rotate_right(node);
            }
            let left = self.take_inner(node.left)?;
            node.left = self.rotate_left(left)?;
            return self.rotate_right(node);
        }

        if balance < -1 {
            if self.balance_factor(node.right)? <= 0 {
                return self.rotate_left(node);
            }
            let right = self.take_inner(node.right)?;
            node.right = self.rotate_right(right)?;
            return self.rotate_left(node);
        }

        Ok(self.alloc(Node::Inner(node)))
    }

    //       node            pivot
    //      /    \          /     \
    //   pivot    c   =>   a      node
    //   /   \                   /    \
    //  a     b                 b      c
    fn rotate_right(&mut self, mut node: InnerNode<NodeRef>) -> Result<NodeRef, NodeDbError> {
        let mut pivot = self.take_inner(node.left)?;
        node.left = pivot.right;
        self.update_height_size(&mut node)?;
        pivot.right = self.alloc(Node::Inner(node));
        self.update_height_size(&mut pivot)?;
        Ok(self.alloc(Node::Inner(pivot)))
    }

    fn rotate_left(&mut self, mut node: InnerNode<NodeRef>) -> Result<NodeRef, NodeDbError> {
        let mut pivot = self.take_inner(node.right)?;
        node.right = pivot.left;
        self.update_height_size(&mut node)?;
        pivot.left = self.alloc(Node::Inner(node));
        self.update_height_size(&mut pivot)?;
        Ok(self.alloc(Node::Inner(pivot)))
    }
}
