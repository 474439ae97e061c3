//! Property-based tests for the concurrent map using proptest
//!
//! Every operation sequence is replayed against a plain `HashMap`; because each
//! task observes all earlier tasks, the two must agree after every step.

use crate::map::{ConcurrentMap, WriteMode};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone)]
enum Op {
    Set(u8, u32),
    Update(u8, Option<u32>),
    Remove(u8),
    Get(u8),
    Clear,
    Replace(Vec<(u8, u32)>),
    Keys,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..16, any::<u32>()).prop_map(|(k, v)| Op::Set(k, v)),
        2 => (0u8..16, prop::option::of(any::<u32>())).prop_map(|(k, v)| Op::Update(k, v)),
        2 => (0u8..16).prop_map(Op::Remove),
        3 => (0u8..16).prop_map(Op::Get),
        1 => Just(Op::Clear),
        1 => prop::collection::vec((0u8..16, any::<u32>()), 0..8).prop_map(Op::Replace),
        1 => Just(Op::Keys),
    ]
}

fn write_mode_strategy() -> impl Strategy<Value = WriteMode> {
    prop_oneof![Just(WriteMode::Deferred), Just(WriteMode::Blocking)]
}

#[cfg(test)]
mod sequential_properties {
    use super::*;

    proptest! {
        #[test]
        fn test_matches_hash_map_model(
            mode in write_mode_strategy(),
            ops in prop::collection::vec(op_strategy(), 1..64)
        ) {
            let map = ConcurrentMap::builder().write_mode(mode).build().unwrap();
            let mut model: HashMap<u8, u32> = HashMap::new();

            for op in ops {
                match op {
                    Op::Set(k, v) => {
                        map.set(k, v);
                        model.insert(k, v);
                    }
                    Op::Update(k, v) => {
                        map.update(k, v);
                        match v {
                            Some(v) => model.insert(k, v),
                            None => model.remove(&k),
                        };
                    }
                    Op::Remove(k) => {
                        prop_assert_eq!(map.remove(&k), model.remove(&k));
                    }
                    Op::Get(k) => {
                        prop_assert_eq!(map.get(&k), model.get(&k).copied());
                    }
                    Op::Clear => {
                        map.clear();
                        model.clear();
                    }
                    Op::Replace(entries) => {
                        let replacement: HashMap<u8, u32> = entries.into_iter().collect();
                        map.replace_all(replacement.clone());
                        model = replacement;
                    }
                    Op::Keys => {
                        let mut keys = map.keys();
                        keys.sort_unstable();
                        let mut expected: Vec<u8> = model.keys().copied().collect();
                        expected.sort_unstable();
                        prop_assert_eq!(keys, expected);
                    }
                }
            }

            prop_assert_eq!(map.snapshot(), model.clone());
            prop_assert_eq!(map.len(), model.len());
        }

        #[test]
        fn test_compact_map_matches_filter_map(
            entries in prop::collection::hash_map(any::<u16>(), any::<u16>(), 0..64),
            threshold in any::<u16>()
        ) {
            let map = ConcurrentMap::from_map(entries.clone());

            let mut got = map.compact_map(|k, v| (*v >= threshold).then_some(*k));
            got.sort_unstable();
            let mut expected: Vec<u16> = entries
                .iter()
                .filter(|(_, v)| **v >= threshold)
                .map(|(k, _)| *k)
                .collect();
            expected.sort_unstable();

            prop_assert_eq!(got, expected);
        }

        #[test]
        fn test_for_each_error_stops_iteration(
            entries in prop::collection::hash_map(any::<u16>(), any::<u16>(), 1..64),
            stop_after in 1usize..64
        ) {
            let map = ConcurrentMap::from_map(entries.clone());
            let mut visited = 0usize;

            let result = map.for_each(|_, _| {
                visited += 1;
                if visited == stop_after { Err(visited) } else { Ok(()) }
            });

            if stop_after <= entries.len() {
                prop_assert_eq!(result, Err(stop_after));
                prop_assert_eq!(visited, stop_after);
            } else {
                prop_assert_eq!(result, Ok(()));
                prop_assert_eq!(visited, entries.len());
            }
        }
    }
}

#[cfg(test)]
mod concurrent_properties {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_disjoint_writers_union(
            per_thread in prop::collection::vec(
                prop::collection::vec(any::<u32>(), 0..50),
                1..6
            )
        ) {
            let map = Arc::new(ConcurrentMap::new());

            let handles: Vec<_> = per_thread
                .iter()
                .cloned()
                .enumerate()
                .map(|(thread_id, values)| {
                    let map = Arc::clone(&map);
                    thread::spawn(move || {
                        for (i, value) in values.into_iter().enumerate() {
                            map.set((thread_id, i), value);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            let expected: HashMap<(usize, usize), u32> = per_thread
                .into_iter()
                .enumerate()
                .flat_map(|(thread_id, values)| {
                    values
                        .into_iter()
                        .enumerate()
                        .map(move |(i, value)| ((thread_id, i), value))
                })
                .collect();

            prop_assert_eq!(map.snapshot(), expected);
        }

        #[test]
        fn test_last_replace_wins(
            batches in prop::collection::vec(
                prop::collection::hash_map(0u8..32, any::<u32>(), 0..16),
                1..8
            )
        ) {
            let map = ConcurrentMap::new();
            map.set(255u8, 0u32);

            for batch in &batches {
                map.replace_all(batch.clone());
            }

            prop_assert_eq!(map.snapshot(), batches.last().cloned().unwrap());
        }
    }
}
