// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use integer_encoding::VarInt;
use sha2::{Digest, Sha256};

use crate::{InnerNode, LeafNode, Node, NodeHash, Version};

/// Returns the hash of a persisted `node`.
#[must_use]
pub fn hash_node(node: &Node) -> NodeHash {
    match node {
        Node::Leaf(leaf) => leaf.to_hash(),
        Node::Inner(inner) => inner.to_hash(),
    }
}

/// Returns the serialized representation of `node` used as the pre-image
/// when hashing the node.
#[must_use]
pub fn hash_preimage(node: &Node) -> Box<[u8]> {
    let mut buf = Vec::with_capacity(3 * 10 + node.key().len() + 2 * (NodeHash::LEN + 1));
    match node {
        Node::Leaf(leaf) => leaf.write(&mut buf),
        Node::Inner(inner) => inner.write(&mut buf),
    }
    buf.into_boxed_slice()
}

/// A sink for preimage bytes: either a running digest or a buffer.
pub trait HasUpdate {
    /// Append `data` to the sink
    fn update<T: AsRef<[u8]>>(&mut self, data: T);
}

impl HasUpdate for Sha256 {
    fn update<T: AsRef<[u8]>>(&mut self, data: T) {
        sha2::Digest::update(self, data);
    }
}

impl HasUpdate for Vec<u8> {
    fn update<T: AsRef<[u8]>>(&mut self, data: T) {
        self.extend(data.as_ref());
    }
}

/// Something that can be hashed by writing out its canonical preimage.
pub trait Preimage {
    /// Returns the sha256 hash of this preimage
    fn to_hash(&self) -> NodeHash {
        let mut hasher = Sha256::new();
        self.write(&mut hasher);
        let digest: [u8; 32] = hasher.finalize().into();
        digest.into()
    }

    /// Write this preimage to `buf`
    fn write(&self, buf: &mut impl HasUpdate);
}

/// Common prefix of every node: height, size and version as zigzag varints.
fn write_header(buf: &mut impl HasUpdate, height: u8, size: u64, version: Version) {
    add_varint_to_buf(buf, i64::from(height));
    add_varint_to_buf(buf, size as i64);
    add_varint_to_buf(buf, version as i64);
}

impl Preimage for LeafNode {
    fn write(&self, buf: &mut impl HasUpdate) {
        write_header(buf, 0, 1, self.version);
        add_len_and_value_to_buf(buf, &self.key);
        let value_digest: [u8; 32] = Sha256::digest(&self.value).into();
        add_len_and_value_to_buf(buf, value_digest);
    }
}

// the separator key is not part of the preimage
impl Preimage for InnerNode<NodeHash> {
    fn write(&self, buf: &mut impl HasUpdate) {
        write_header(buf, self.height, self.size, self.version);
        add_len_and_value_to_buf(buf, self.left);
        add_len_and_value_to_buf(buf, self.right);
    }
}

/// Writes `value` as a zigzag varint
pub(crate) fn add_varint_to_buf<H: HasUpdate>(buf: &mut H, value: i64) {
    let mut buf_arr = [0u8; 10];
    let len = value.encode_var(&mut buf_arr);
    buf.update(buf_arr.get(..len).unwrap_or_default());
}

/// Writes the unsigned varint length of `value` followed by `value`
pub(crate) fn add_len_and_value_to_buf<H: HasUpdate, V: AsRef<[u8]>>(buf: &mut H, value: V) {
    let value = value.as_ref();
    let mut buf_arr = [0u8; 10];
    let len = value.len().encode_var(&mut buf_arr);
    buf.update(buf_arr.get(..len).unwrap_or_default());
    buf.update(value);
}
