// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! Layout of the records a [`NodeDb`](crate::NodeDb) writes to its store.
//!
//! | record  | key                                                   | value           |
//! |---------|-------------------------------------------------------|-----------------|
//! | node    | `n` hash                                              | encoded node    |
//! | root    | `r` version (u64 BE)                                  | hash, or empty  |
//! | orphan  | `o` deleted version (u64 BE) created version (u64 BE) hash | empty      |
//!
//! Every key is additionally preceded by the database's namespace prefix.

use crate::{NodeHash, Version};

const NODE_TAG: u8 = b'n';
const ROOT_TAG: u8 = b'r';
const ORPHAN_TAG: u8 = b'o';

const VERSION_LEN: usize = size_of::<Version>();

/// The namespace prefix used by a cosmos multistore for the store named `name`.
#[must_use]
pub fn store_prefix(name: &str) -> Vec<u8> {
    format!("s/k:{name}/").into_bytes()
}

/// Builds the store keys for one namespace.
#[derive(Debug, Clone, Default)]
pub(crate) struct KeyLayout {
    prefix: Box<[u8]>,
}

impl KeyLayout {
    pub(crate) fn new(prefix: &[u8]) -> Self {
        KeyLayout {
            prefix: Box::from(prefix),
        }
    }

    fn key(&self, tag: u8, capacity: usize) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len().saturating_add(1).saturating_add(capacity));
        key.extend_from_slice(&self.prefix);
        key.push(tag);
        key
    }

    pub(crate) fn node(&self, hash: &NodeHash) -> Vec<u8> {
        let mut key = self.key(NODE_TAG, NodeHash::LEN);
        key.extend_from_slice(hash.as_ref());
        key
    }

    pub(crate) fn root(&self, version: Version) -> Vec<u8> {
        let mut key = self.key(ROOT_TAG, VERSION_LEN);
        key.extend_from_slice(&version.to_be_bytes());
        key
    }

    /// The prefix shared by every root record
    pub(crate) fn roots(&self) -> Vec<u8> {
        self.key(ROOT_TAG, 0)
    }

    pub(crate) fn orphan(&self, deleted: Version, created: Version, hash: &NodeHash) -> Vec<u8> {
        let mut key = self.key(ORPHAN_TAG, 2 * VERSION_LEN + NodeHash::LEN);
        key.extend_from_slice(&deleted.to_be_bytes());
        key.extend_from_slice(&created.to_be_bytes());
        key.extend_from_slice(hash.as_ref());
        key
    }

    /// The prefix shared by every orphan record written by version `deleted`
    pub(crate) fn orphans_of(&self, deleted: Version) -> Vec<u8> {
        let mut key = self.key(ORPHAN_TAG, VERSION_LEN);
        key.extend_from_slice(&deleted.to_be_bytes());
        key
    }

    /// Extract the version from a root record key
    pub(crate) fn parse_root(&self, key: &[u8]) -> Option<Version> {
        let rest = self.strip(ROOT_TAG, key)?;
        let bytes: [u8; VERSION_LEN] = rest.try_into().ok()?;
        Some(Version::from_be_bytes(bytes))
    }

    /// Extract `(deleted, created, hash)` from an orphan record key
    pub(crate) fn parse_orphan(&self, key: &[u8]) -> Option<(Version, Version, NodeHash)> {
        let rest = self.strip(ORPHAN_TAG, key)?;
        let (deleted, rest) = rest.split_first_chunk::<VERSION_LEN>()?;
        let (created, hash) = rest.split_first_chunk::<VERSION_LEN>()?;
        let hash = NodeHash::try_from(hash).ok()?;
        Some((
            Version::from_be_bytes(*deleted),
            Version::from_be_bytes(*created),
            hash,
        ))
    }

    fn strip<'a>(&self, tag: u8, key: &'a [u8]) -> Option<&'a [u8]> {
        let (&found, rest) = key.strip_prefix(&*self.prefix)?.split_first()?;
        (found == tag).then_some(rest)
    }
}
