// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use iavl_storage::logger::debug;
use iavl_storage::{KvStore, NodeDbError};

use crate::{Key, Tree, Value};

/// What a [`Change`] does to its key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOp {
    /// The key is new, with this value
    Insert(Value),
    /// The key exists and now has this value
    Update(Value),
    /// The key is removed; carries the value it had
    Delete(Value),
}

/// One entry of a bulk changeset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// The key being changed
    pub key: Key,
    /// The change
    pub op: ChangeOp,
}

impl Change {
    /// Set `key` to `value`, for a key that did not exist
    pub fn insert(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Change {
            key: key.into(),
            op: ChangeOp::Insert(value.into()),
        }
    }

    /// Set `key` to `value`, for a key that exists
    pub fn update(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Change {
            key: key.into(),
            op: ChangeOp::Update(value.into()),
        }
    }

    /// Remove `key`, which held `prior`
    pub fn delete(key: impl Into<Key>, prior: impl Into<Value>) -> Self {
        Change {
            key: key.into(),
            op: ChangeOp::Delete(prior.into()),
        }
    }
}

impl<S: KvStore> Tree<S> {
    /// Apply a changeset to the working tree in order. Inserts and updates
    /// become [`Tree::set`], deletes become [`Tree::remove`]; the values a
    /// change carries about prior state are not checked.
    ///
    /// # Errors
    ///
    /// Stops at, and returns, the first error. Changes before it stay applied.
    pub fn apply_changeset(
        &mut self,
        changes: impl IntoIterator<Item = Change>,
    ) -> Result<(), NodeDbError> {
        let mut applied = 0usize;
        for Change { key, op } in changes {
            match op {
                ChangeOp::Insert(value) | ChangeOp::Update(value) => {
                    self.set(&key, &value)?;
                }
                ChangeOp::Delete(_) => {
                    self.remove(&key)?;
                }
            }
            applied = applied.saturating_add(1);
        }
        debug!("applied {applied} changes on top of version {}", self.version());
        Ok(())
    }
}
