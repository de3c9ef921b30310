// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! The ordered key-value store a [`NodeDb`](crate::NodeDb) persists into.
//!
//! Two implementations are provided: [`MemStore`], an ordered map kept in
//! memory (primarily for testing), and `FjallStore`, an on-disk LSM tree
//! available with the `fjall` feature.

use std::fmt::Debug;
use std::sync::Arc;

#[cfg(feature = "fjall")]
mod fjall;
mod memory;

#[cfg(feature = "fjall")]
pub use self::fjall::FjallStore;
pub use self::memory::MemStore;

/// A key and its value, as returned by prefix iteration
pub type KvPair = (Box<[u8]>, Box<[u8]>);

/// A single write in an atomic batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    /// Set `key` to `value`
    Put {
        /// The key
        key: Box<[u8]>,
        /// The value
        value: Box<[u8]>,
    },
    /// Remove `key` if present
    Delete {
        /// The key
        key: Box<[u8]>,
    },
}

impl KvOp {
    /// A put of `value` at `key`
    pub fn put(key: impl Into<Box<[u8]>>, value: impl Into<Box<[u8]>>) -> Self {
        KvOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// A delete of `key`
    pub fn delete(key: impl Into<Box<[u8]>>) -> Self {
        KvOp::Delete { key: key.into() }
    }
}

/// Errors raised by a [`KvStore`]
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// An I/O error from the backing storage
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error reported by the backing storage engine
    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// An ordered byte-keyed store.
///
/// Implementations must be safe to share between threads: reads may happen
/// concurrently with each other and with a single writer.
pub trait KvStore: Send + Sync + Debug {
    /// Read the value stored at `key`
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backing storage fails.
    fn get(&self, key: &[u8]) -> Result<Option<Box<[u8]>>, StoreError>;

    /// Store `value` at `key`
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backing storage fails.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Remove `key`
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backing storage fails.
    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Apply every operation in `batch` atomically, and make the result
    /// durable before returning.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the batch could not be applied. In that
    /// case none of the operations are visible.
    fn write_batch(&self, batch: Vec<KvOp>) -> Result<(), StoreError>;

    /// Iterate over every key starting with `prefix`, in ascending key order
    fn prefix_iter<'a>(
        &'a self,
        prefix: &[u8],
    ) -> Box<dyn Iterator<Item = Result<KvPair, StoreError>> + 'a>;
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn get(&self, key: &[u8]) -> Result<Option<Box<[u8]>>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn write_batch(&self, batch: Vec<KvOp>) -> Result<(), StoreError> {
        (**self).write_batch(batch)
    }

    fn prefix_iter<'a>(
        &'a self,
        prefix: &[u8],
    ) -> Box<dyn Iterator<Item = Result<KvPair, StoreError>> + 'a> {
        (**self).prefix_iter(prefix)
    }
}
