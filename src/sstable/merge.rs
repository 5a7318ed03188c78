use std::path::Path;
use std::sync::Arc;

use super::{Table, TableBuilder};
use crate::error::Result;

/// Merge an ordered list of tables into fresh tables of `table_size` bytes
/// under `dir`.
///
/// Input order is precedence order: index 0 is the most recent, and when the
/// same key appears in several inputs the lowest-index occurrence wins. The
/// output is a run of disjoint tables ascending by min key. Tombstones pass
/// through like any other value so they keep shadowing older levels.
///
/// Input files are unlinked up front; their mappings keep the data readable
/// for concurrent readers (and for this merge) until the last reference
/// drops.
pub fn merge_tables(
    tables: &[Arc<Table>],
    table_size: u32,
    dir: Option<&Path>,
) -> Result<Vec<Arc<Table>>> {
    let mut builder = TableBuilder::new(table_size, dir);
    let mut result = Vec::new();
    let mut last_key: Option<Vec<u8>> = None;

    for table in tables {
        table.unlink();
    }

    let mut iters: Vec<_> = tables.iter().map(|t| t.iter()).collect();
    let mut heads: Vec<Option<(&[u8], &[u8])>> = iters.iter_mut().map(Iterator::next).collect();

    loop {
        // Smallest current key wins; a strict comparison keeps the lowest
        // input index on ties, which is what realizes shadowing.
        let mut min: Option<(usize, &[u8], &[u8])> = None;
        for (i, head) in heads.iter().enumerate() {
            let Some((key, value)) = *head else { continue };
            if min.map_or(true, |(_, min_key, _)| key < min_key) {
                min = Some((i, key, value));
            }
        }
        let Some((i, key, value)) = min else { break };

        if last_key.as_deref() != Some(key) {
            if !builder.add(key, value)? {
                if let Some(table) = builder.finalize()? {
                    result.push(Arc::new(table));
                }
                let added = builder.add(key, value)?;
                assert!(added, "record must fit a fresh table");
            }
            last_key = Some(key.to_vec());
        }

        heads[i] = iters[i].next();
    }

    if let Some(table) = builder.finalize()? {
        result.push(Arc::new(table));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::testutil::{random_kv, sorted_random_kv};

    fn build(table_size: u32, pairs: &[(Vec<u8>, Vec<u8>)]) -> Arc<Table> {
        let mut builder = TableBuilder::new(table_size, None);
        for (key, value) in pairs {
            assert!(builder.add(key, value).unwrap());
        }
        Arc::new(builder.finalize().unwrap().expect("non-empty table"))
    }

    #[test]
    fn test_lowest_index_wins_on_ties() {
        let newest = build(64, &[(b"a".to_vec(), b"new".to_vec())]);
        let oldest = build(64, &[(b"a".to_vec(), b"old".to_vec())]);

        let merged = merge_tables(&[newest, oldest], 64, None).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].get(b"a"), Some(b"new".to_vec()));
        assert_eq!(merged[0].len(), 1);
    }

    #[test]
    fn test_rollover_produces_disjoint_run() {
        // Budget of 28 bytes holds two 6-byte records; five records must
        // roll over into three output tables.
        let input = build(
            1 << 10,
            &[
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec()),
                (b"c".to_vec(), b"3".to_vec()),
                (b"d".to_vec(), b"4".to_vec()),
                (b"e".to_vec(), b"5".to_vec()),
            ],
        );

        let merged = merge_tables(&[input], 28, None).unwrap();
        assert_eq!(merged.len(), 3);
        for pair in merged.windows(2) {
            assert!(pair[0].max_key() < pair[1].min_key());
        }
    }

    #[test]
    fn test_tombstones_pass_through() {
        let newest = build(64, &[(b"a".to_vec(), b"".to_vec())]);
        let oldest = build(64, &[(b"a".to_vec(), b"old".to_vec())]);

        let merged = merge_tables(&[newest, oldest], 64, None).unwrap();
        assert_eq!(merged[0].get(b"a"), Some(vec![]));
    }

    #[test]
    fn test_merge_thirteen_random_tables() {
        let num_tables = 13;
        let mut tables = Vec::new();
        let mut reference = BTreeMap::new();

        for i in 0..num_tables {
            let kv = sorted_random_kv(1000, 16, i as u64);
            tables.push(build(1 << 20, &kv));
            for (key, value) in kv {
                // Later tables overwrite earlier ones in the reference.
                reference.insert(key, value);
            }
        }

        // Index 0 must be the most recent input.
        tables.reverse();
        let merged = merge_tables(&tables, 1 << 20, None).unwrap();

        let total: usize = merged.iter().map(|t| t.len()).sum();
        assert_eq!(total, reference.len());

        let mut expected = reference.iter();
        let mut last: Option<Vec<u8>> = None;
        for table in &merged {
            for (key, value) in table.iter() {
                let (ref_key, ref_value) = expected.next().expect("more merged than reference");
                assert_eq!(key, &ref_key[..]);
                assert_eq!(value, &ref_value[..]);
                if let Some(last) = &last {
                    assert!(key > &last[..]);
                }
                last = Some(key.to_vec());
            }
        }
        assert!(expected.next().is_none());
    }

    #[test]
    fn test_inputs_are_unlinked() {
        let dir = tempfile::tempdir().unwrap();
        let kv = random_kv(10, 8, 7);

        let mut builder = TableBuilder::new(1 << 16, Some(dir.path()));
        let sorted: BTreeMap<_, _> = kv.into_iter().collect();
        for (key, value) in &sorted {
            assert!(builder.add(key, value).unwrap());
        }
        let input = Arc::new(builder.finalize().unwrap().expect("non-empty"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let merged = merge_tables(&[input], 1 << 16, Some(dir.path())).unwrap();
        // The input file is gone, exactly the merged output remains.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), merged.len());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].len(), sorted.len());
    }
}
