use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use ranked_tree::{Direction, Error, Natural, Rank, RankedMap, Reverse, Snapshot};

/// The number of operations to perform in each proptest case.
const TEST_SIZE: usize = 2_000;

/// Keys drawn from a range narrow enough to force collisions.
fn key_strategy() -> impl Strategy<Value = i64> {
    -500i64..500i64
}

// ─── Operations enum for driving randomized tests ────────────────────────────

#[derive(Debug, Clone)]
enum MapOp {
    Insert(i64, i64),
    Remove(i64),
    Get(i64),
    PopFirst,
    PopLast,
    GetByRank(usize),
    RankOf(i64),
    RemoveAt(usize),
    RemoveRange(usize, usize),
}

fn map_op_strategy() -> impl Strategy<Value = MapOp> {
    prop_oneof![
        8 => (key_strategy(), any::<i64>()).prop_map(|(k, v)| MapOp::Insert(k, v)),
        3 => key_strategy().prop_map(MapOp::Remove),
        2 => key_strategy().prop_map(MapOp::Get),
        1 => Just(MapOp::PopFirst),
        1 => Just(MapOp::PopLast),
        2 => (0usize..1_200).prop_map(MapOp::GetByRank),
        2 => key_strategy().prop_map(MapOp::RankOf),
        2 => (0usize..1_200).prop_map(MapOp::RemoveAt),
        1 => (0usize..600, 0usize..40).prop_map(|(s, c)| MapOp::RemoveRange(s, c)),
    ]
}

fn model_remove_range(model: &mut BTreeMap<i64, i64>, start: usize, count: usize) {
    let doomed: Vec<i64> = model.keys().skip(start).take(count).copied().collect();
    for key in doomed {
        model.remove(&key);
    }
}

// ─── Randomized comparison against BTreeMap ─────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Replays random operations on both a `RankedMap` and a `BTreeMap` and
    /// asserts identical results at every step.
    #[test]
    fn map_ops_match_btreemap(
        capacity in 4usize..10,
        ops in proptest::collection::vec(map_op_strategy(), TEST_SIZE),
    ) {
        let mut map = RankedMap::with_capacity(capacity).unwrap();
        let mut model = BTreeMap::new();

        for op in &ops {
            match *op {
                MapOp::Insert(k, v) => prop_assert_eq!(map.insert(k, v), model.insert(k, v), "insert({})", k),
                MapOp::Remove(k) => prop_assert_eq!(map.remove(&k), model.remove(&k), "remove({})", k),
                MapOp::Get(k) => prop_assert_eq!(map.get(&k), model.get(&k)),
                MapOp::PopFirst => prop_assert_eq!(map.pop_first(), model.pop_first()),
                MapOp::PopLast => prop_assert_eq!(map.pop_last(), model.pop_last()),
                MapOp::GetByRank(rank) => prop_assert_eq!(map.get_by_rank(rank), model.iter().nth(rank)),
                MapOp::RankOf(k) => {
                    let below = model.range(..k).count();
                    let expected = if model.contains_key(&k) { Ok(below) } else { Err(below) };
                    prop_assert_eq!(map.rank_of(&k), expected);
                }
                MapOp::RemoveAt(rank) => {
                    let expected = model.keys().nth(rank).copied().map(|k| (k, model.remove(&k).unwrap()));
                    prop_assert_eq!(map.remove_at(rank).ok(), expected);
                }
                MapOp::RemoveRange(start, count) => {
                    let result = map.remove_range(start, count);
                    if start + count <= model.len() {
                        prop_assert!(result.is_ok());
                        model_remove_range(&mut model, start, count);
                    } else {
                        prop_assert_eq!(result, Err(Error::RankOutOfRange { rank: start + count, len: model.len() }));
                    }
                }
            }
            prop_assert_eq!(map.len(), model.len());
        }

        map.check_invariants().unwrap();
        prop_assert!(map.iter().eq(model.iter()));
        prop_assert!(map.iter().rev().eq(model.iter().rev()));
    }

    #[test]
    fn ranges_match_filter(
        keys in proptest::collection::btree_set(-200i32..200, 0..400),
        low in -220i32..220,
        span in 0i32..120,
    ) {
        let map: RankedMap<i32, ()> = keys.iter().map(|&k| (k, ())).collect();
        let high = low + span;
        let expected: Vec<i32> = keys.iter().copied().filter(|k| (low..high).contains(k)).collect();

        prop_assert_eq!(map.range(low..high).map(|(k, _)| *k).collect::<Vec<_>>(), expected.clone());
        prop_assert_eq!(map.elements_between(&low, &high).map(|(k, _)| *k).collect::<Vec<_>>(), expected.clone());
        let inclusive: Vec<i32> = keys.iter().copied().filter(|k| (low..=high).contains(k)).collect();
        prop_assert_eq!(map.range(low..=high).map(|(k, _)| *k).collect::<Vec<_>>(), inclusive);
        let from: Vec<i32> = keys.iter().copied().filter(|&k| k >= low).collect();
        prop_assert_eq!(map.elements_from(&low).map(|(k, _)| *k).collect::<Vec<_>>(), from);
    }

    #[test]
    fn skip_take_rev_match_vec(
        len in 0usize..500,
        skip in 0usize..520,
        take in 0usize..520,
    ) {
        let mut map = RankedMap::with_capacity(5).unwrap();
        map.extend((0..len).map(|k| (k, ())));
        let keys: Vec<usize> = (0..len).collect();

        let forward: Vec<usize> = map.keys().skip(skip).take(take).copied().collect();
        prop_assert_eq!(forward, keys.iter().skip(skip).take(take).copied().collect::<Vec<_>>());
        let backward: Vec<usize> = map.keys().rev().skip(skip).take(take).copied().collect();
        prop_assert_eq!(backward, keys.iter().rev().skip(skip).take(take).copied().collect::<Vec<_>>());
        prop_assert_eq!(map.iter_from_rank(skip).len(), len.saturating_sub(skip));
    }
}

// ─── Exhaustive rank-range removal ──────────────────────────────────────────

#[test]
fn remove_range_exhaustive() {
    for capacity in 4..=7 {
        for width in 0..=20usize {
            for start in 0..=width {
                for count in 0..=width - start {
                    let mut map = RankedMap::with_capacity(capacity).unwrap();
                    map.extend((0..width).map(|k| (k, k * 10)));
                    map.remove_range(start, count).unwrap();

                    map.check_invariants().unwrap();
                    let expected: Vec<usize> = (0..start).chain(start + count..width).collect();
                    assert_eq!(
                        map.keys().copied().collect::<Vec<_>>(),
                        expected,
                        "capacity {capacity} width {width} start {start} count {count}"
                    );
                }
            }
        }
    }
}

// ─── Scenarios ──────────────────────────────────────────────────────────────

#[test]
fn order_four_interleaved_inserts() {
    let mut map = RankedMap::with_capacity(4).unwrap();
    for key in (2..=44).step_by(2) {
        map.insert(key, ());
    }
    map.check_invariants().unwrap();
    assert_eq!(map.height(), 3);
    // Ascending appends leave full leaves and three-child branches.
    assert_eq!(
        map.dump_structure(),
        "[18 36]\n\
         [6 12] [24 30] [42]\n\
         (2 4 6) (8 10 12) (14 16 18) (20 22 24) (26 28 30) (32 34 36) (38 40 42) (44)\n"
    );

    map.insert(1, ());
    map.insert(21, ());
    map.check_invariants().unwrap();
    // Both inserts split a full leaf at its midpoint without splitting a parent.
    assert_eq!(map.height(), 3);
    assert_eq!(
        map.dump_structure(),
        "[18 36]\n\
         [2 6 12] [21 24 30] [42]\n\
         (1 2) (4 6) (8 10 12) (14 16 18) (20 21) (22 24) (26 28 30) (32 34 36) (38 40 42) (44)\n"
    );

    assert_eq!(map.len(), 24);
    assert_eq!(map.rank_of(&1), Ok(0));
    let rank = map.rank_of(&21).unwrap();
    assert_eq!(map.get_by_rank(rank - 1), Some((&20, &())));
    assert_eq!(map.get_by_rank(rank + 1), Some((&22, &())));
}

#[test]
fn order_five_ascending_then_drain() {
    let mut map = RankedMap::with_capacity(5).unwrap();
    for key in 1..=41 {
        map.insert(key, key);
    }
    map.check_invariants().unwrap();
    assert_eq!(map.height(), 3);

    for key in (1..=41).step_by(2) {
        assert_eq!(map.remove(&key), Some(key));
        map.check_invariants().unwrap();
    }
    assert_eq!(map.len(), 20);
    assert_eq!(map[Rank(0)], 2);

    while map.pop_last().is_some() {
        map.check_invariants().unwrap();
    }
    assert_eq!(map.height(), 1);
}

#[test]
fn cursor_goes_stale_in_both_directions() {
    let mut map: RankedMap<i32, i32> = (0..50).map(|k| (k, k)).collect();

    let mut forward = map.cursor();
    let mut backward = map.cursor_back();
    assert_eq!(map.advance(&mut forward), Ok(Some((&0, &0))));
    assert_eq!(map.advance(&mut backward), Ok(Some((&49, &49))));

    // Overwriting a value keeps cursors usable.
    map.insert(10, -10);
    assert_eq!(map.advance(&mut forward), Ok(Some((&1, &1))));

    map.remove(&25);
    assert_eq!(map.advance(&mut forward), Err(Error::StaleCursor));
    assert_eq!(map.advance(&mut backward), Err(Error::StaleCursor));

    let mut fresh = map.cursor_at(48, Direction::Forward).unwrap();
    assert_eq!(map.advance(&mut fresh), Ok(Some((&49, &49))));
    assert_eq!(map.advance(&mut fresh), Ok(None));
    assert!(fresh.is_finished());
}

#[test]
fn serde_round_trip_keeps_capacity_and_order() {
    let mut map = RankedMap::with_capacity_and_comparator(6, Reverse(Natural)).unwrap();
    map.extend((0..100).map(|k| (k, k.to_string())));

    let json = serde_json::to_string(&map).unwrap();
    let back: RankedMap<i32, String, Reverse<Natural>> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, map);
    assert_eq!(back.node_capacity(), 6);
    assert_eq!(back.first_key_value(), Some((&99, &"99".to_string())));
    back.check_invariants().unwrap();
}

#[test]
fn deserialize_rejects_unsorted_entries() {
    let json = r#"{"capacity":4,"comparator":null,"entries":[[2,"b"],[1,"a"]]}"#;
    let result = serde_json::from_str::<RankedMap<i32, String>>(json);
    assert!(result.is_err());

    let snapshot = Snapshot {
        capacity: 300,
        comparator: Natural,
        entries: vec![(1, ())],
    };
    assert!(matches!(RankedMap::try_from(snapshot), Err(Error::InvalidCapacity { capacity: 300, .. })));
}

#[test]
fn snapshot_round_trip() {
    let map: RankedMap<u8, char> = (b'a'..=b'z').map(|b| (b, char::from(b))).collect();
    let snapshot = map.snapshot();
    assert_eq!(RankedMap::validate_snapshot(&snapshot), Ok(()));
    assert_eq!(RankedMap::restore(snapshot).unwrap(), map);
}
