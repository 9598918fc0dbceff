use super::*;

use crate::node::{Child, TrieNode};
use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::BTreeSet;

/// Checks every structural invariant of the trie and returns the key count.
fn validate_set(s: &SparseIntSet) -> usize {
    let count = match &s.root {
        Some(root) => {
            let count = validate_node(root, ROOT_SHIFT);
            assert!(count > 0, "populated root must hold at least one key");
            count
        }
        None => 0,
    };
    assert_eq!(count, s.len(), "reachable key count must match len()");
    count
}

fn validate_node(n: &TrieNode, shift: u32) -> usize {
    assert_eq!(n.shift(), shift, "child shift must be parent shift - 8");
    let children = n.children();
    assert!(!children.is_empty(), "empty node left in the trie");
    assert_eq!(
        children.len(),
        n.presence().len(),
        "one child per presence bit"
    );

    let mut count = 0;
    for (rank, entry) in children.iter().enumerate() {
        assert_eq!(
            n.presence().position(entry.index),
            (rank, true),
            "child {rank} must sit at the rank of its index"
        );
        match &entry.child {
            Child::Inner(inner) => {
                assert!(shift > LEAF_PARENT_SHIFT, "interior node below leaf level");
                count += validate_node(inner, shift - BITS_PER_LEVEL);
            }
            Child::Leaf(leaf) => {
                assert_eq!(shift, LEAF_PARENT_SHIFT, "leaf above the bottom level");
                assert!(!leaf.is_empty(), "empty leaf left in the trie");
                count += leaf.len();
            }
        }
    }
    count
}

fn key_strategy() -> impl Strategy<Value = u64> + Clone {
    // Mostly a dense counter window, a few distant clusters, and the odd outlier.
    prop_oneof![
        6 => 0u64..512,
        3 => (0u64..4, 0u64..256).prop_map(|(hi, lo)| (hi << 40) | lo),
        1 => any::<u64>(),
    ]
}

fn keys_strategy(max: usize) -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(key_strategy(), 0..=max)
}

#[derive(Arbitrary, Clone, Debug)]
enum Op {
    #[proptest(weight = 5)]
    Add(#[proptest(strategy = "key_strategy()")] u64),
    #[proptest(weight = 3)]
    Remove(#[proptest(strategy = "key_strategy()")] u64),
    #[proptest(weight = 2)]
    Contains(#[proptest(strategy = "key_strategy()")] u64),
    #[proptest(weight = 1)]
    Position(#[proptest(strategy = "key_strategy()")] u64),
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence(ops in prop::collection::vec(any::<Op>(), 0..=1000)) {
        let mut s = SparseIntSet::new();
        let mut m: BTreeSet<u64> = BTreeSet::new();

        for op in ops {
            match op {
                Op::Add(key) => {
                    prop_assert_eq!(s.add(key), m.insert(key));
                }
                Op::Remove(key) => {
                    prop_assert_eq!(s.remove(key), m.remove(&key));
                }
                Op::Contains(key) => {
                    prop_assert_eq!(s.contains(key), m.contains(&key));
                }
                Op::Position(key) => {
                    let want = (m.range(..key).count(), m.contains(&key));
                    prop_assert_eq!(s.position(key), want);
                }
            }
            prop_assert_eq!(s.len(), m.len());
            prop_assert_eq!(s.is_empty(), m.is_empty());
        }

        validate_set(&s);
        let got: Vec<u64> = s.iter().collect();
        let expected: Vec<u64> = m.iter().copied().collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_elements_resume(keys in keys_strategy(300), start in key_strategy(), chunk in 1usize..16) {
        let s: SparseIntSet = keys.iter().copied().collect();
        let m: BTreeSet<u64> = keys.iter().copied().collect();

        let mut out = vec![0u64; chunk];
        let mut got = Vec::new();
        let mut next = Some(start);
        while let Some(from) = next {
            let n = s.elements(&mut out, from);
            got.extend_from_slice(&out[..n]);
            next = if n < chunk { None } else { out[n - 1].checked_add(1) };
        }

        prop_assert!(got.windows(2).all(|w| w[0] < w[1]), "not strictly ascending");
        prop_assert!(got.iter().all(|&k| k >= start));
        let expected: Vec<u64> = m.range(start..).copied().collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_intersection(sets in prop::collection::vec(keys_strategy(200), 1..5)) {
        let built: Vec<SparseIntSet> = sets.iter().map(|k| k.iter().copied().collect()).collect();
        let models: Vec<BTreeSet<u64>> = sets.iter().map(|k| k.iter().copied().collect()).collect();

        let refs: Vec<&SparseIntSet> = built.iter().collect();
        let got = SparseIntSet::intersection(&refs);
        validate_set(&got);

        let expected: Vec<u64> = models[0]
            .iter()
            .copied()
            .filter(|k| models[1..].iter().all(|m| m.contains(k)))
            .collect();
        prop_assert_eq!(got.iter().collect::<Vec<_>>(), expected.clone());

        // Structural result equals a set built from the expected keys.
        let rebuilt: SparseIntSet = expected.into_iter().collect();
        prop_assert_eq!(got, rebuilt);
    }

    #[test]
    fn prop_equal_ignores_history(keys in keys_strategy(200), extra in keys_strategy(50)) {
        let forward: SparseIntSet = keys.iter().copied().collect();
        let backward: SparseIntSet = keys.iter().rev().copied().collect();
        prop_assert_eq!(&forward, &backward);

        let mut detour = backward.clone();
        let fresh: BTreeSet<u64> = extra.into_iter().filter(|k| !forward.contains(*k)).collect();
        detour.extend(fresh.iter().copied());
        for k in &fresh {
            prop_assert!(detour.remove(*k));
        }
        validate_set(&detour);
        prop_assert_eq!(&forward, &detour);
        prop_assert_eq!(&detour, &forward);
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

/// Keys that share prefixes of every length, so removals cascade to each level.
fn small_keys() -> Vec<u64> {
    vec![
        0,
        1,
        0x1_00,
        0x1_00_0000_0000,
        1 << 63,
        u64::MAX,
    ]
}

#[test]
fn exhaustive_insert_order_small_set() {
    let keys = small_keys();
    let expected: SparseIntSet = keys.iter().copied().collect();

    for_each_permutation(&keys, |perm| {
        let s: SparseIntSet = perm.into_iter().collect();
        validate_set(&s);
        assert_eq!(s, expected);
        assert_eq!(s.to_string(), expected.to_string());
    });
}

#[test]
fn exhaustive_remove_order_small_set() {
    let keys = small_keys();
    let base: SparseIntSet = keys.iter().copied().collect();

    for_each_permutation(&keys, |perm| {
        let mut s = base.clone();
        let mut m: BTreeSet<u64> = keys.iter().copied().collect();

        for k in perm {
            assert_eq!(s.remove(k), m.remove(&k));
            assert_eq!(s.len(), m.len());
            validate_set(&s);
            let rebuilt: SparseIntSet = m.iter().copied().collect();
            assert_eq!(s, rebuilt);
        }
        assert!(s.is_empty());
        assert!(s.root.is_none());
    });
}
