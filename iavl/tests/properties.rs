// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! Random workloads checked against an ordered map.

#![expect(clippy::unwrap_used)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use iavl::{KvStore, MemStore, NodeDb, NodeDbConfig, NodeHash, Tree, Version};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng, rng};

type Model = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Debug, Clone)]
enum Op {
    Set(u8, u8),
    Remove(u8),
    Save,
    Rollback,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0u8..48, any::<u8>()).prop_map(|(k, v)| Op::Set(k, v)),
        3 => (0u8..48).prop_map(Op::Remove),
        1 => Just(Op::Save),
        1 => Just(Op::Rollback),
    ]
}

fn contents(tree: &Tree<impl KvStore>) -> Model {
    tree.iter()
        .map(|kv| {
            let (k, v) = kv.unwrap();
            (k.into_vec(), v.into_vec())
        })
        .collect()
}

/// Every hash reachable from `root`
fn reachable(db: &NodeDb<impl KvStore>, root: Option<NodeHash>) -> BTreeSet<NodeHash> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<NodeHash> = root.into_iter().collect();
    while let Some(hash) = stack.pop() {
        if !seen.insert(hash) {
            continue;
        }
        if let Some(inner) = db.get(&hash).unwrap().as_inner() {
            stack.extend([inner.left, inner.right]);
        }
    }
    seen
}

/// A seeded rng that prints its seed so failures can be reproduced
/// with `IAVL_TEST_SEED=<seed>`.
fn seeded_rng() -> StdRng {
    let seed = std::env::var("IAVL_TEST_SEED")
        .ok()
        .map_or_else(|| rng().random(), |s| str::parse(&s).unwrap());
    eprintln!("Seed {seed}: to rerun with this data, export IAVL_TEST_SEED={seed}");
    StdRng::seed_from_u64(seed)
}

proptest! {
    /// The tree behaves like an ordered map and keeps its invariants after
    /// every operation; every saved version can be reloaded.
    #[test]
    fn behaves_like_a_map(ops in prop::collection::vec(op(), 1..200)) {
        let db = Arc::new(NodeDb::new(MemStore::new(), NodeDbConfig::default()).unwrap());
        let mut tree = Tree::new(Arc::clone(&db), None).unwrap();
        let mut working = Model::new();
        let mut committed = Model::new();
        let mut snapshots: Vec<(Version, Model)> = Vec::new();

        for op in ops {
            match op {
                Op::Set(k, v) => {
                    let old = tree.set(&[k], &[v]).unwrap().map(<[u8]>::into_vec);
                    prop_assert_eq!(old, working.insert(vec![k], vec![v]));
                }
                Op::Remove(k) => {
                    let old = tree.remove(&[k]).unwrap().map(<[u8]>::into_vec);
                    prop_assert_eq!(old, working.remove(&vec![k]));
                }
                Op::Save => {
                    let predicted = tree.working_hash();
                    let (root, version) = tree.save_version().unwrap();
                    prop_assert_eq!(root, predicted);
                    committed = working.clone();
                    snapshots.push((version, committed.clone()));
                }
                Op::Rollback => {
                    tree.rollback();
                    working = committed.clone();
                }
            }
            let stats = tree.check().unwrap();
            prop_assert_eq!(stats.leaves, working.len() as u64);
            prop_assert_eq!(tree.size().unwrap(), working.len() as u64);
        }

        prop_assert_eq!(contents(&tree), working);
        for (version, snapshot) in snapshots {
            let old = Tree::new(Arc::clone(&db), Some(version)).unwrap();
            prop_assert_eq!(contents(&old), snapshot);
        }
    }

    /// Replaying the same operations on another database yields the same roots.
    #[test]
    fn hashes_are_deterministic(ops in prop::collection::vec(op(), 1..100)) {
        let mut trees = [(); 2].map(|()| {
            let db = Arc::new(NodeDb::new(MemStore::new(), NodeDbConfig::default()).unwrap());
            Tree::new(db, None).unwrap()
        });
        for op in &ops {
            for tree in &mut trees {
                match *op {
                    Op::Set(k, v) => {
                        tree.set(&[k], &[v]).unwrap();
                    }
                    Op::Remove(k) => {
                        tree.remove(&[k]).unwrap();
                    }
                    Op::Save => {
                        tree.save_version().unwrap();
                    }
                    Op::Rollback => tree.rollback(),
                }
            }
            let [a, b] = &trees;
            prop_assert_eq!(a.working_hash(), b.working_hash());
        }
    }
}

/// A long random workload, checking after each version that the orphans it
/// recorded are exactly the nodes it made unreachable.
#[test]
fn orphans_are_exactly_the_unreachable_nodes() {
    let _ = env_logger::Builder::new().is_test(true).try_init();
    let mut rng = seeded_rng();

    let db = Arc::new(NodeDb::new(MemStore::new(), NodeDbConfig::default()).unwrap());
    let mut tree = Tree::new(Arc::clone(&db), None).unwrap();
    let mut model = Model::new();
    let mut previous = BTreeSet::new();
    let mut versions: Vec<(Version, Model)> = Vec::new();

    for _ in 0..40 {
        for _ in 0..rng.random_range(1..60) {
            let key = rng.random_range(0u16..400).to_be_bytes().to_vec();
            if rng.random_bool(0.3) {
                let removed = tree.remove(&key).unwrap().map(<[u8]>::into_vec);
                assert_eq!(removed, model.remove(&key));
            } else {
                let value: [u8; 8] = rng.random();
                tree.set(&key, &value).unwrap();
                model.insert(key, value.to_vec());
            }
        }
        let (root, version) = tree.save_version().unwrap();
        tree.check().unwrap();

        let current = reachable(&db, root);
        let orphans = db.orphans(version).unwrap();
        let orphaned: BTreeSet<NodeHash> = orphans.iter().map(|orphan| orphan.hash).collect();
        let expected: BTreeSet<NodeHash> = previous.difference(&current).copied().collect();
        assert_eq!(orphaned, expected, "orphans of version {version}");
        for orphan in &orphans {
            assert_eq!(orphan.deleted, version);
            assert_eq!(db.get(&orphan.hash).unwrap().version(), orphan.created);
        }

        previous = current;
        versions.push((version, model.clone()));
    }

    // every version reloads from the store alone
    db.clear_cache();
    for (version, expected) in versions {
        let old = Tree::new(Arc::clone(&db), Some(version)).unwrap();
        assert_eq!(contents(&old), expected, "contents of version {version}");
    }
}
