// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::RwLock;

use super::{KvOp, KvPair, KvStore, StoreError};

/// An in-memory [`KvStore`], used for testing and for trees that never
/// outlive the process.
#[derive(Debug, Default)]
pub struct MemStore {
    items: RwLock<BTreeMap<Box<[u8]>, Box<[u8]>>>,
}

impl MemStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys in the store
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns true if the store holds no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Box<[u8]>>, StoreError> {
        Ok(self.items.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.items.write().insert(Box::from(key), Box::from(value));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.items.write().remove(key);
        Ok(())
    }

    fn write_batch(&self, batch: Vec<KvOp>) -> Result<(), StoreError> {
        // holding the write lock for the whole batch makes it atomic to readers
        let mut items = self.items.write();
        for op in batch {
            match op {
                KvOp::Put { key, value } => {
                    items.insert(key, value);
                }
                KvOp::Delete { key } => {
                    items.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn prefix_iter<'a>(
        &'a self,
        prefix: &[u8],
    ) -> Box<dyn Iterator<Item = Result<KvPair, StoreError>> + 'a> {
        let items = self.items.read();
        let matching: Vec<KvPair> = items
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Box::new(matching.into_iter().map(Ok))
    }
}
