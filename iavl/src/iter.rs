// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use iavl_storage::{KvStore, NodeDbError, NodeRef};

use crate::{Key, Tree, Value};

/// Iterates over the key-value pairs of a [`Tree`] in ascending key order.
///
/// Created by [`Tree::iter`]. Iteration stops after the first error.
#[derive(Debug)]
pub struct TreeIter<'a, S: KvStore> {
    tree: &'a Tree<S>,
    // nodes still to visit, the next one on top
    stack: Vec<NodeRef>,
}

impl<S: KvStore> Iterator for TreeIter<'_, S> {
    type Item = Result<(Key, Value), NodeDbError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node_ref) = self.stack.pop() {
            let node = match self.tree.node(node_ref) {
                Ok(node) => node,
                Err(err) => {
                    self.stack.clear();
                    return Some(Err(err));
                }
            };
            if let Some((left, right)) = node.children() {
                self.stack.push(right);
                self.stack.push(left);
                continue;
            }
            let value = node.value().map(Box::from).unwrap_or_default();
            return Some(Ok((Box::from(node.key()), value)));
        }
        None
    }
}

impl<S: KvStore> Tree<S> {
    /// Iterate over the working tree in ascending key order
    pub fn iter(&self) -> TreeIter<'_, S> {
        TreeIter {
            tree: self,
            stack: self.root_ref().into_iter().collect(),
        }
    }
}
