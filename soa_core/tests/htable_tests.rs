#![allow(missing_docs)]

use rstest::rstest;
use soa_core::{HTable, ProbeCursor, Slot, SlotState, SoaError};

mod common;
use common::init_test_logger;

const FRUITS: [&str; 26] = [
    "apple", "banana", "cherry", "date", "elderberry", "fig", "grape", "honeydew", "kiwi",
    "lemon", "mango", "nectarine", "orange", "papaya", "quince", "raspberry", "strawberry",
    "tangerine", "ugli", "vanilla", "watermelon", "xigua", "yam", "zucchini", "apricot",
    "blueberry",
];

fn fruit_table() -> HTable<(String, i32)> {
    let mut table = HTable::new();
    for (i, fruit) in FRUITS.iter().enumerate() {
        let value = if *fruit == "banana" { 12 } else { i as i32 * 100 };
        table.insert((fruit.to_string(), value)).unwrap();
    }
    table.insert(("banana".to_string(), 42)).unwrap();
    table.insert(("banana".to_string(), 9001)).unwrap();
    table
}

#[test]
fn test_banana_duplicates() {
    init_test_logger();
    let mut table = fruit_table();
    assert_eq!(table.len(), 28);

    let row = table.find("banana", true).unwrap();
    assert_eq!(*table.at::<1>(row), 12);
    let row = table.find("banana", false).unwrap();
    assert_eq!(*table.at::<1>(row), 42);
    let row = table.find("banana", false).unwrap();
    assert_eq!(*table.at::<1>(row), 9001);
    assert_eq!(table.find("banana", false), None);

    assert_eq!(table.erase_all("banana").unwrap(), 3);
    assert_eq!(table.find("banana", true), None);
    assert_eq!(table.count("banana"), 0);
    assert_eq!(table.len(), 25);
    for fruit in FRUITS.iter().filter(|fruit| **fruit != "banana") {
        assert_eq!(table.count(*fruit), 1, "{fruit}");
    }
}

#[test]
fn test_explicit_cursor_through_shared_reference() {
    let table = fruit_table();
    let shared = &table;
    let mut cursor = ProbeCursor::new();
    let mut values = Vec::new();
    let mut found = shared.find_with("banana", true, &mut cursor);
    while let Some(row) = found {
        values.push(*shared.at::<1>(row));
        found = shared.find_with("banana", false, &mut cursor);
    }
    assert_eq!(values, [12, 42, 9001]);
    assert_eq!(cursor.position(), None);
}

#[test]
fn test_erase_continues_iteration() {
    let mut table = fruit_table();
    let mut removed = Vec::new();
    let mut found = table.find("banana", true);
    while found.is_some() {
        let (_, value) = table.remove_found().unwrap().unwrap();
        removed.push(value);
        found = table.find("banana", false);
    }
    assert_eq!(removed, [12, 42, 9001]);
    assert!(table.is_consistent());
}

#[rstest]
#[case::by_key(0)]
#[case::by_tag(2)]
fn test_sort_preserves_association(#[case] column: usize) {
    init_test_logger();
    let mut table: HTable<(u32, u64, i8)> = HTable::new();
    for i in 0..300u32 {
        let key = (i * 37) % 1009;
        table.insert((key, u64::from(key) * 11, (key % 100) as i8)).unwrap();
    }
    match column {
        0 => {
            table.sort::<0>();
            assert!(table.column::<0>().windows(2).all(|w| w[0] <= w[1]));
        }
        _ => {
            table.sort::<2>();
            assert!(table.column::<2>().windows(2).all(|w| w[0] <= w[1]));
        }
    }
    for i in 0..300u32 {
        let key = (i * 37) % 1009;
        let row = table.get(&key).unwrap();
        assert_eq!(*table.at::<1>(row), u64::from(key) * 11);
        assert_eq!(*table.at::<2>(row), (key % 100) as i8);
    }
    assert!(table.is_consistent());
}

#[test]
fn test_reserve_keeps_capacity_aligned() {
    let mut table: HTable<(u64, u8)> = HTable::new();
    for n in [1, 15, 16, 17, 250, 1000] {
        table.reserve(n).unwrap();
        assert_eq!(table.capacity() % 16, 0);
        assert!(table.capacity() >= n);
        assert_eq!(table.slot_capacity(), 2 * table.capacity() + 3);
    }
}

#[test]
fn test_round_trip_after_erases() {
    init_test_logger();
    let mut table: HTable<(u64, i64, u16)> = HTable::new();
    for i in 0..500u64 {
        table.insert((i % 97, i as i64 * -3, (i % 13) as u16)).unwrap();
    }
    for key in (0..97).step_by(3) {
        table.erase(&key).unwrap();
    }
    let len = table.len();
    let bytes = table.serialize().unwrap().to_vec();

    let mut restored: HTable<(u64, i64, u16)> = HTable::new();
    restored.load(len, &bytes).unwrap();
    for key in 0..97u64 {
        let mut expected: Vec<(i64, u16)> = table
            .matches(&key)
            .map(|row| (*table.at::<1>(row), *table.at::<2>(row)))
            .collect();
        let mut actual: Vec<(i64, u16)> = restored
            .matches(&key)
            .map(|row| (*restored.at::<1>(row), *restored.at::<2>(row)))
            .collect();
        expected.sort_unstable();
        actual.sort_unstable();
        assert_eq!(actual, expected, "key {key}");
    }
}

#[test]
fn test_load_into_used_table_replaces_contents() {
    let mut source: HTable<(u32, u32)> = HTable::from_rows((0..20).map(|i| (i, i + 1))).unwrap();
    let bytes = source.serialize().unwrap().to_vec();

    let mut target: HTable<(u32, u32)> = HTable::from_rows((100..300).map(|i| (i, 0))).unwrap();
    target.load(20, &bytes).unwrap();
    assert_eq!(target.len(), 20);
    assert_eq!(target.capacity(), 32);
    assert_eq!(target.get(&150), None);
    assert_eq!(target.get(&7).map(|row| *target.at::<1>(row)), Some(8));
}

#[test]
fn test_load_rejects_short_buffer() {
    let mut table: HTable<(u32, u32)> = HTable::new();
    assert!(matches!(
        table.load(1, &[0; 8]),
        Err(SoaError::SizeMismatch { actual: 8, .. })
    ));
}

/// A table of keys `0..n` whose slot for `row` has been overwritten with a
/// tombstone, so the row is no longer reachable from its bucket.
fn table_with_lost_link(n: u32, row: usize) -> HTable<(u32, u32)> {
    let mut source: HTable<(u32, u32)> = HTable::from_rows((0..n).map(|i| (i, i * 10))).unwrap();
    let bytes = source.serialize().unwrap().to_vec();
    let pos = source
        .slot_map()
        .iter()
        .position(|slot| slot.state() == SlotState::Row(row))
        .unwrap();

    let mut table: HTable<(u32, u32)> = HTable::new();
    let buf = table.deserialize(n as usize).unwrap();
    buf.copy_from_slice(&bytes);
    buf[pos * 4..pos * 4 + 4].copy_from_slice(&Slot::TOMBSTONE.raw().to_ne_bytes());
    table
}

#[test]
fn test_lost_link_leaves_table_unchanged() {
    init_test_logger();
    let mut table = table_with_lost_link(5, 4);
    assert!(!table.is_consistent());
    let keys = table.column::<0>().to_vec();
    let slots = table.slot_map().to_vec();

    assert!(matches!(
        table.swap_rows(0, 4),
        Err(SoaError::IndexCorrupted(_))
    ));
    assert_eq!(table.column::<0>(), keys);
    assert_eq!(table.slot_map(), slots);

    // Removing row 0 would move row 4 into its place.
    assert_eq!(table.find(&0, true), Some(0));
    assert!(matches!(
        table.remove_found(),
        Err(SoaError::IndexCorrupted(_))
    ));
    assert_eq!(table.len(), 5);
    assert_eq!(table.column::<0>(), keys);
    assert_eq!(table.slot_map(), slots);
}

#[test]
fn test_bulk_insert_then_check_once() {
    let mut table: HTable<(u64, u32)> = HTable::new();
    for i in 0..20_000u64 {
        table.insert((i, (i % 5) as u32)).unwrap();
    }
    assert_eq!(table.len(), 20_000);
    assert!(table.is_consistent());
    assert_eq!(table.get(&19_999).map(|row| *table.at::<1>(row)), Some(4));
}

#[test]
fn test_slot_stats() {
    let mut table: HTable<(u32,)> = HTable::from_rows((0..10).map(|i| (i,))).unwrap();
    table.erase(&4).unwrap();
    let stats = table.slot_stats();
    assert_eq!(stats.slots, 35);
    assert_eq!(stats.occupied, 9);
    assert_eq!(stats.tombstones, 1);
    assert_eq!(stats.empty, 25);
    assert!(stats.longest_run >= 1);
}

mod property_tests {
    use std::collections::HashMap;

    use quickcheck::{Arbitrary, Gen, quickcheck};
    use soa_core::HTable;

    #[derive(Clone, Debug)]
    enum Op {
        Insert(u8, i16),
        Erase(u8),
        EraseAll(u8),
        EraseSorted(u8),
        Swap(usize, usize),
        Sort,
        Shrink,
    }

    impl Arbitrary for Op {
        fn arbitrary(g: &mut Gen) -> Self {
            let key = u8::arbitrary(g) % 24;
            match u8::arbitrary(g) % 10 {
                0..=3 => Op::Insert(key, i16::arbitrary(g)),
                4 => Op::Erase(key),
                5 => Op::EraseAll(key),
                6 => Op::EraseSorted(key),
                7 => Op::Swap(usize::arbitrary(g) % 40, usize::arbitrary(g) % 40),
                8 => Op::Sort,
                _ => Op::Shrink,
            }
        }
    }

    type Model = HashMap<u8, Vec<i16>>;

    fn remove_value(model: &mut Model, key: u8, value: i16) -> bool {
        let Some(values) = model.get_mut(&key) else {
            return false;
        };
        let Some(at) = values.iter().position(|v| *v == value) else {
            return false;
        };
        values.swap_remove(at);
        true
    }

    fn agrees(table: &HTable<(u8, i16)>, model: &Model) -> bool {
        let total: usize = model.values().map(Vec::len).sum();
        table.len() == total
            && table.is_consistent()
            && model.iter().all(|(key, values)| {
                let mut expected = values.clone();
                let mut actual: Vec<i16> = table.matches(key).map(|row| *table.at::<1>(row)).collect();
                expected.sort_unstable();
                actual.sort_unstable();
                expected == actual
            })
    }

    quickcheck! {
        fn prop_matches_multimap_model(ops: Vec<Op>) -> bool {
            let mut table: HTable<(u8, i16)> = HTable::new();
            let mut model = Model::new();
            for op in ops {
                match op {
                    Op::Insert(key, value) => {
                        table.insert((key, value)).unwrap();
                        model.entry(key).or_default().push(value);
                    }
                    Op::Erase(key) => {
                        table.find(&key, true);
                        match table.remove_found().unwrap() {
                            Some((k, value)) => {
                                if k != key || !remove_value(&mut model, key, value) {
                                    return false;
                                }
                            }
                            None => {
                                if model.get(&key).is_some_and(|values| !values.is_empty()) {
                                    return false;
                                }
                            }
                        }
                    }
                    Op::EraseAll(key) => {
                        let expected = model.remove(&key).map_or(0, |values| values.len());
                        if table.erase_all(&key).unwrap() != expected {
                            return false;
                        }
                    }
                    Op::EraseSorted(key) => {
                        let mut expected: Vec<u8> = table.column::<0>().to_vec();
                        match table.find(&key, true) {
                            Some(row) => {
                                let Some((_, value)) = table.remove_found_sorted().unwrap() else {
                                    return false;
                                };
                                if !remove_value(&mut model, key, value) {
                                    return false;
                                }
                                expected.remove(row);
                                if table.column::<0>() != expected.as_slice() {
                                    return false;
                                }
                            }
                            None => {
                                if model.get(&key).is_some_and(|values| !values.is_empty()) {
                                    return false;
                                }
                            }
                        }
                    }
                    Op::Swap(a, b) => {
                        let valid = a < table.len() && b < table.len();
                        if table.swap_rows(a, b).is_ok() != valid {
                            return false;
                        }
                    }
                    Op::Sort => {
                        table.sort::<1>();
                        if !table.column::<1>().windows(2).all(|w| w[0] <= w[1]) {
                            return false;
                        }
                    }
                    Op::Shrink => table.shrink_to_fit().unwrap(),
                }
                if table.capacity() % 16 != 0 {
                    return false;
                }
            }
            agrees(&table, &model)
        }

        fn prop_serialize_round_trip(rows: Vec<(u8, i16)>, erased: Vec<u8>) -> bool {
            let mut table: HTable<(u8, i16)> = HTable::new();
            for row in rows {
                table.insert(row).unwrap();
            }
            for key in erased {
                table.erase(&key).unwrap();
            }
            let len = table.len();
            let bytes = table.serialize().unwrap().to_vec();
            let mut restored: HTable<(u8, i16)> = HTable::new();
            if restored.load(len, &bytes).is_err() {
                return false;
            }
            let mut model = Model::new();
            for (key, value) in table.rows() {
                model.entry(*key).or_default().push(*value);
            }
            agrees(&restored, &model)
        }
    }
}
