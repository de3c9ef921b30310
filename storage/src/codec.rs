// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! Stored node format.
//!
//! ```text
//! varint(height) varint(size) varint(version) bytes(key)
//!   leaf:  bytes(value)
//!   inner: bytes(left hash) bytes(right hash)
//! ```
//!
//! `varint` is a zigzag varint of an i64 and `bytes` is an unsigned varint
//! length followed by the raw bytes.

use integer_encoding::VarInt;

use crate::hashednode::{add_len_and_value_to_buf, add_varint_to_buf};
use crate::{InnerNode, LeafNode, Node, NodeHash, Version};

/// Error that ocurred while decoding a stored node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// Insufficient data in the byte stream.
    #[error("incomplete {item} at offset {offset}: expected {expected} bytes, but found {found}")]
    IncompleteItem {
        /// The specific item that was trying to parse.
        item: &'static str,
        /// The offset in the byte stream where the error ocurred.
        offset: usize,
        /// The expected length of the input (for this item).
        expected: usize,
        /// The number of bytes found in the byte stream.
        found: usize,
    },
    /// An item was invalid after parsing.
    #[error("invalid {item} at offset {offset}: expected {expected}, but found {found}")]
    InvalidItem {
        /// The item that was trying to parse.
        item: &'static str,
        /// The offset in the byte stream where the error ocurred.
        offset: usize,
        /// A hint at what was expected.
        expected: &'static str,
        /// Message indicating what was actually found.
        found: String,
    },
}

/// Serialize a persisted node into its stored form.
#[must_use]
pub fn encode_node(node: &Node) -> Box<[u8]> {
    let mut buf = Vec::with_capacity(
        3 * 10
            + node.key().len()
            + node.value().map_or(2 * (NodeHash::LEN + 1), |v| v.len() + 10),
    );
    add_varint_to_buf(&mut buf, i64::from(node.height()));
    add_varint_to_buf(&mut buf, node.size() as i64);
    add_varint_to_buf(&mut buf, node.version() as i64);
    add_len_and_value_to_buf(&mut buf, node.key());
    match node {
        Node::Leaf(leaf) => add_len_and_value_to_buf(&mut buf, &leaf.value),
        Node::Inner(inner) => {
            add_len_and_value_to_buf(&mut buf, inner.left);
            add_len_and_value_to_buf(&mut buf, inner.right);
        }
    }
    buf.into_boxed_slice()
}

/// Deserialize a stored node.
///
/// # Errors
///
/// Returns a [`ReadError`] if the bytes are truncated, carry trailing data,
/// or contain out of range fields.
pub fn decode_node(data: &[u8]) -> Result<Node, ReadError> {
    let mut reader = Reader { data, offset: 0 };

    let height = reader.read_varint("height")?;
    let height = u8::try_from(height).map_err(|_| reader.invalid("height", "0..=255", height))?;
    let size = reader.read_varint("size")?;
    let size = u64::try_from(size).map_err(|_| reader.invalid("size", "a positive size", size))?;
    let version = reader.read_varint("version")?;
    let version = Version::try_from(version)
        .map_err(|_| reader.invalid("version", "a non-negative version", version))?;
    let key = Box::from(reader.read_bytes("key")?);

    let node = if height == 0 {
        if size != 1 {
            return Err(reader.invalid("size", "1 for a leaf", size));
        }
        let value = Box::from(reader.read_bytes("value")?);
        Node::Leaf(LeafNode {
            version,
            key,
            value,
        })
    } else {
        if size < 2 {
            return Err(reader.invalid("size", "at least 2 for an inner node", size));
        }
        let left = reader.read_hash("left hash")?;
        let right = reader.read_hash("right hash")?;
        Node::Inner(InnerNode {
            height,
            size,
            version,
            key,
            left,
            right,
        })
    };

    if !reader.data.is_empty() {
        return Err(ReadError::InvalidItem {
            item: "trailing data",
            offset: reader.offset,
            expected: "none",
            found: format!("{} bytes", reader.data.len()),
        });
    }
    Ok(node)
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn invalid(&self, item: &'static str, expected: &'static str, found: impl ToString) -> ReadError {
        ReadError::InvalidItem {
            item,
            offset: self.offset,
            expected,
            found: found.to_string(),
        }
    }

    fn advance(&mut self, n: usize) -> &'a [u8] {
        let (head, rest) = self.data.split_at(n);
        self.data = rest;
        self.offset = self.offset.saturating_add(n);
        head
    }

    fn read_varint(&mut self, item: &'static str) -> Result<i64, ReadError> {
        match i64::decode_var(self.data) {
            Some((value, len)) => {
                self.advance(len);
                Ok(value)
            }
            None => Err(ReadError::IncompleteItem {
                item,
                offset: self.offset,
                expected: 1,
                found: self.data.len(),
            }),
        }
    }

    fn read_bytes(&mut self, item: &'static str) -> Result<&'a [u8], ReadError> {
        let start = self.offset;
        let Some((len, len_size)) = u64::decode_var(self.data) else {
            return Err(ReadError::IncompleteItem {
                item,
                offset: start,
                expected: 1,
                found: self.data.len(),
            });
        };
        self.advance(len_size);
        match usize::try_from(len) {
            Ok(len) if len <= self.data.len() => Ok(self.advance(len)),
            _ => Err(ReadError::IncompleteItem {
                item,
                offset: start,
                expected: usize::try_from(len).unwrap_or(usize::MAX),
                found: self.data.len(),
            }),
        }
    }

    fn read_hash(&mut self, item: &'static str) -> Result<NodeHash, ReadError> {
        let start = self.offset;
        let bytes = self.read_bytes(item)?;
        NodeHash::try_from(bytes).map_err(|err| ReadError::InvalidItem {
            item,
            offset: start,
            expected: "a 32 byte hash",
            found: err.to_string(),
        })
    }
}
