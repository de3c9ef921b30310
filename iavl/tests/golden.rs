// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! Root hashes and orphan counts that must match the cosmos iavl node format.

#![expect(clippy::unwrap_used)]

use std::sync::Arc;

use hex_literal::hex;
use iavl::{CacheReadStrategy, MemStore, NodeDb, NodeDbConfig, NodeHash, Tree, Version};
use test_case::test_case;

type MemTree = Tree<Arc<MemStore>>;

fn save(tree: &mut MemTree, expected: [u8; 32], orphans: usize) -> Version {
    let (root, version) = tree.save_version().unwrap();
    assert_eq!(root, Some(NodeHash::from(expected)), "root of version {version}");
    assert_eq!(tree.root_hash(), root);
    assert_eq!(
        tree.db().orphans(version).unwrap().len(),
        orphans,
        "orphans of version {version}"
    );
    tree.check().unwrap();
    version
}

fn numbered(prefix: &str, i: usize) -> Vec<u8> {
    format!("{prefix}{i:02}").into_bytes()
}

#[test_case(NodeDbConfig::default(); "default")]
#[test_case(NodeDbConfig::builder().cache_read_strategy(CacheReadStrategy::All).build(); "cache all reads")]
#[test_case(
    NodeDbConfig::builder()
        .cache_size(std::num::NonZeroUsize::MIN)
        .cache_read_strategy(CacheReadStrategy::WritesOnly)
        .verify_hashes(false)
        .build();
    "tiny cache"
)]
#[test_case(NodeDbConfig::builder().prefix(iavl::store_prefix("bank")).build(); "namespaced")]
fn cosmos_reference_versions(config: NodeDbConfig) {
    let _ = env_logger::Builder::new().is_test(true).try_init();

    let store = Arc::new(MemStore::new());
    let db = Arc::new(NodeDb::new(Arc::clone(&store), config.clone()).unwrap());
    let mut tree = Tree::new(Arc::clone(&db), None).unwrap();
    assert_eq!(tree.version(), 0);

    tree.set(b"hello", b"world").unwrap();
    let v1 = save(
        &mut tree,
        hex!("6032661AB0D201132DB7A8FA1DA6A0AFE427E6278BD122C301197680AB79CA02"),
        0,
    );
    assert_eq!(v1, 1);

    assert_eq!(
        tree.set(b"hello", b"world1").unwrap().as_deref(),
        Some(&b"world"[..])
    );
    assert_eq!(tree.set(b"hello1", b"world1").unwrap(), None);
    save(
        &mut tree,
        hex!("457D81F933F53E5CFB90D813B84981AA2604D69939E10C94304D18287DED31F7"),
        1,
    );

    tree.set(b"hello2", b"world1").unwrap();
    tree.set(b"hello3", b"world1").unwrap();
    save(
        &mut tree,
        hex!("C7AB142752ADD0374992261536E502851CE555D243270D3C3C6B77CF31B7945D"),
        1,
    );
    assert_eq!(tree.height().unwrap(), 2);

    for i in 0..20 {
        tree.set(&numbered("hello", i), b"world1").unwrap();
    }
    save(
        &mut tree,
        hex!("D6D9F6CA091FA4BD3545F0FEDB2C5865D42123B222C202DF72EFB4BFD75CC118"),
        2,
    );

    assert_eq!(tree.remove(b"not exists").unwrap(), None);
    assert_eq!(tree.pending_orphans(), 0);
    assert_eq!(
        tree.remove(b"hello").unwrap().as_deref(),
        Some(&b"world1"[..])
    );
    assert!(tree.remove(b"hello19").unwrap().is_some());
    assert_eq!(tree.get(b"hello").unwrap(), None);
    save(
        &mut tree,
        hex!("585581060957AE2E6157F1790A88BF3544FECC9902BBF2E2286CF7325539126C"),
        11,
    );

    for i in 0..21 {
        tree.set(&numbered("aello", i), b"world1").unwrap();
    }
    let v6 = save(
        &mut tree,
        hex!("5C5859808C79637A143FEA9548A19194782D501A15D3EB412240D6A0D040D637"),
        4,
    );

    // a second database over the same store starts with a cold cache
    let reopened = Arc::new(NodeDb::new(Arc::clone(&store), config).unwrap());
    assert_eq!(reopened.latest_version(), v6);
    let cold = Tree::new(reopened, None).unwrap();
    assert_eq!(cold.version(), v6);
    assert_eq!(cold.root_hash(), tree.root_hash());
    assert_eq!(
        cold.get(b"aello20").unwrap().as_deref(),
        Some(&b"world1"[..])
    );

    for i in 0..21 {
        assert!(tree.remove(&numbered("aello", i)).unwrap().is_some());
    }
    for i in 0..19 {
        assert!(tree.remove(&numbered("hello", i)).unwrap().is_some());
    }
    save(
        &mut tree,
        hex!("D91CF6388EEFF3204474BB07B853AB0D7D39163912AC1E610E92F9B178C76922"),
        81,
    );

    let remaining: Vec<_> = tree.iter().map(|kv| kv.unwrap().0.into_vec()).collect();
    assert_eq!(
        remaining,
        vec![b"hello1".to_vec(), b"hello2".to_vec(), b"hello3".to_vec()]
    );
}

#[test]
fn single_leaf_root_is_the_leaf_hash() {
    let db = Arc::new(NodeDb::new(MemStore::new(), NodeDbConfig::default()).unwrap());
    let mut tree = Tree::new(db, None).unwrap();
    tree.set(b"hello", b"world").unwrap();
    let expected = NodeHash::from(hex!(
        "6032661AB0D201132DB7A8FA1DA6A0AFE427E6278BD122C301197680AB79CA02"
    ));
    assert_eq!(tree.working_hash(), Some(expected));
    assert_eq!(
        expected.to_string(),
        "6032661AB0D201132DB7A8FA1DA6A0AFE427E6278BD122C301197680AB79CA02"
    );
}
