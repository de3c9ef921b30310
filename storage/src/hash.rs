// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::fmt::{self, Debug, Display};

/// The root hash reported by reference implementations for a tree with no
/// nodes: the sha256 digest of the empty string.
pub const EMPTY_ROOT_HASH: NodeHash = NodeHash([
    0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9, 0x24,
    0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52, 0xb8, 0x55,
]);

/// The sha256 content hash of a persisted node
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Default)]
pub struct NodeHash([u8; 32]);

/// Returned when a byte slice of the wrong length is converted into a [`NodeHash`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid node hash length: expected 32 bytes, found {0}")]
pub struct InvalidNodeHashLength(pub usize);

impl NodeHash {
    /// The length of a hash in bytes
    pub const LEN: usize = 32;

    /// The raw digest bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::ops::Deref for NodeHash {
    type Target = [u8; 32];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for NodeHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

impl From<[u8; 32]> for NodeHash {
    fn from(value: [u8; 32]) -> Self {
        NodeHash(value)
    }
}

impl TryFrom<&[u8]> for NodeHash {
    type Error = InvalidNodeHashLength;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        <[u8; 32]>::try_from(value)
            .map(NodeHash)
            .map_err(|_| InvalidNodeHashLength(value.len()))
    }
}
