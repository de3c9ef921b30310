// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use iavl_storage::{Node, NodeRef, WorkingId};

/// A node that has not been hashed yet; its children may be working too.
pub(crate) type WorkingNode = Node<NodeRef>;

/// The arena holding the nodes of the version being built.
///
/// Slots vacated by [`WorkingSet::take`] are reused, so ids are only stable
/// while the node they name is live.
///
/// Every insert and take since the last [`WorkingSet::checkpoint`] is
/// journaled, so [`WorkingSet::revert`] can restore the arena exactly.
#[derive(Debug, Default)]
pub(crate) struct WorkingSet {
    slots: Vec<Option<WorkingNode>>,
    free: Vec<usize>,
    journal: Vec<Undo>,
}

#[derive(Debug)]
enum Undo {
    Inserted { index: usize, reused: bool },
    Taken { index: usize, node: WorkingNode },
}

impl WorkingSet {
    pub(crate) fn insert(&mut self, node: WorkingNode) -> WorkingId {
        if let Some(index) = self.free.pop() {
            if let Some(slot) = self.slots.get_mut(index) {
                *slot = Some(node);
                self.journal.push(Undo::Inserted { index, reused: true });
                return WorkingId::new(index);
            }
        }
        self.slots.push(Some(node));
        let index = self.slots.len().saturating_sub(1);
        self.journal.push(Undo::Inserted {
            index,
            reused: false,
        });
        WorkingId::new(index)
    }

    pub(crate) fn get(&self, id: WorkingId) -> &WorkingNode {
        self.slots
            .get(id.index())
            .and_then(Option::as_ref)
            .expect("working node ids are only handed out for live nodes")
    }

    pub(crate) fn take(&mut self, id: WorkingId) -> WorkingNode {
        let node = self
            .slots
            .get_mut(id.index())
            .and_then(Option::take)
            .expect("working node ids are only handed out for live nodes");
        self.free.push(id.index());
        self.journal.push(Undo::Taken {
            index: id.index(),
            node: node.clone(),
        });
        node
    }

    /// Forget the journal, keeping the current contents
    pub(crate) fn checkpoint(&mut self) {
        self.journal.clear();
    }

    /// Undo every insert and take since the last checkpoint
    pub(crate) fn revert(&mut self) {
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::Inserted { index, reused } => {
                    if reused {
                        if let Some(slot) = self.slots.get_mut(index) {
                            *slot = None;
                        }
                        self.free.push(index);
                    } else {
                        self.slots.pop();
                    }
                }
                Undo::Taken { index, node } => {
                    debug_assert_eq!(self.free.last(), Some(&index));
                    self.free.pop();
                    if let Some(slot) = self.slots.get_mut(index) {
                        *slot = Some(node);
                    }
                }
            }
        }
    }

    /// Number of live nodes
    pub(crate) fn len(&self) -> usize {
        self.slots.len().saturating_sub(self.free.len())
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.journal.clear();
    }
}

#[cfg(test)]
mod tests {
    use iavl_storage::LeafNode;

    use super::*;

    fn leaf(key: &[u8]) -> WorkingNode {
        Node::Leaf(LeafNode::new(key, b"v", 1))
    }

    #[test]
    fn slots_are_reused() {
        let mut set = WorkingSet::default();
        let a = set.insert(leaf(b"a"));
        let b = set.insert(leaf(b"b"));
        assert_eq!(set.len(), 2);

        assert_eq!(set.take(a).key(), b"a");
        assert_eq!(set.len(), 1);
        let c = set.insert(leaf(b"c"));
        assert_eq!(c, a);
        assert_eq!(set.get(c).key(), b"c");
        assert_eq!(set.get(b).key(), b"b");

        set.clear();
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn revert_restores_the_checkpoint() {
        let mut set = WorkingSet::default();
        let a = set.insert(leaf(b"a"));
        let b = set.insert(leaf(b"b"));
        set.checkpoint();

        set.take(a);
        let c = set.insert(leaf(b"c"));
        assert_eq!(c, a);
        set.take(b);
        assert_eq!(set.insert(leaf(b"d")), b);
        assert_eq!(set.insert(leaf(b"e")).index(), 2);
        assert_eq!(set.len(), 3);

        set.revert();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(a).key(), b"a");
        assert_eq!(set.get(b).key(), b"b");
        // no slot is left on the free list
        assert_eq!(set.insert(leaf(b"f")).index(), 2);
    }

    #[test]
    #[should_panic(expected = "live nodes")]
    fn taken_ids_are_dead() {
        let mut set = WorkingSet::default();
        let a = set.insert(leaf(b"a"));
        set.take(a);
        let _ = set.get(a);
    }
}
