// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::path::Path;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};

use super::{KvOp, KvPair, KvStore, StoreError};

const FJALL_PARTITION_NAME: &str = "iavl";

impl From<fjall::Error> for StoreError {
    fn from(err: fjall::Error) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

/// A [`KvStore`] persisted on disk in a fjall keyspace.
pub struct FjallStore {
    keyspace: Keyspace,
    items: PartitionHandle,
}

impl std::fmt::Debug for FjallStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FjallStore").finish_non_exhaustive()
    }
}

impl FjallStore {
    /// Creates or opens a store in the directory `path`.
    ///
    /// If `truncate` is set, any existing contents are discarded.
    ///
    /// # Errors
    ///
    /// Will return an error if unable to create or open the keyspace.
    pub fn new<P: AsRef<Path>>(path: P, truncate: bool) -> Result<Self, StoreError> {
        let keyspace = Config::new(path).open()?;

        if truncate {
            let items =
                keyspace.open_partition(FJALL_PARTITION_NAME, PartitionCreateOptions::default())?;
            keyspace.delete_partition(items)?;
        }

        let items =
            keyspace.open_partition(FJALL_PARTITION_NAME, PartitionCreateOptions::default())?;

        Ok(Self { keyspace, items })
    }
}

impl KvStore for FjallStore {
    fn get(&self, key: &[u8]) -> Result<Option<Box<[u8]>>, StoreError> {
        Ok(self.items.get(key)?.map(|value| Box::from(&*value)))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.items.insert(key, value)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.items.remove(key)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    fn write_batch(&self, batch: Vec<KvOp>) -> Result<(), StoreError> {
        let mut writes = self.keyspace.batch();
        for op in batch {
            match op {
                KvOp::Put { key, value } => writes.insert(&self.items, &*key, &*value),
                KvOp::Delete { key } => writes.remove(&self.items, &*key),
            }
        }
        writes.commit()?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    fn prefix_iter<'a>(
        &'a self,
        prefix: &[u8],
    ) -> Box<dyn Iterator<Item = Result<KvPair, StoreError>> + 'a> {
        Box::new(self.items.prefix(prefix.to_vec()).map(|item| {
            item.map(|(key, value)| (Box::from(&*key), Box::from(&*value)))
                .map_err(StoreError::from)
        }))
    }
}
