//! Property-based tests for tag store lookups.
//!
//! Arbitrary non-decreasing triplet sets are written to a file; every id in
//! range must return exactly the last-wins view of its source rows.

use geodex::tags::{TagFileWriter, TagStore};
use proptest::prelude::*;
use std::collections::BTreeMap;
use tempfile::TempDir;

/// Sorted triplets over a small id and key space so duplicates are common.
fn triplet_strategy() -> impl Strategy<Value = Vec<(u64, String, String)>> {
    prop::collection::vec((0u64..50, "[a-d]{0,2}", "\\PC{0,6}"), 0..200).prop_map(
        |mut triplets| {
            // Stable sort keeps the generated order of rows within one id.
            triplets.sort_by_key(|(id, _, _)| *id);
            triplets
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_get_tags_matches_last_wins_model(triplets in triplet_strategy()) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tags.bin");
        let mut writer = TagFileWriter::new();
        for (id, key, value) in &triplets {
            writer.push(*id, key, value).unwrap();
        }
        writer.finish(&path).unwrap();

        let mut model: BTreeMap<u64, BTreeMap<String, String>> = BTreeMap::new();
        for (id, key, value) in &triplets {
            model.entry(*id).or_default().insert(key.clone(), value.clone());
        }

        let store = TagStore::open(&path).unwrap();
        prop_assert_eq!(store.len(), triplets.len());
        for id in 0u64..52 {
            let expected = model.get(&id).cloned().unwrap_or_default();
            prop_assert_eq!(store.get_tags(id), expected);
        }
        prop_assert_eq!(store.skipped_rows(), 0);
    }
}
