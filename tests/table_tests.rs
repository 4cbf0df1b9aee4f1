// End-to-End Table Tests
// These tests write tables and read them back through the public API

use lsm_sstable::cache::BlockCache;
use lsm_sstable::{
    ChecksumType, CompressionType, InternalKey, InternalKeyKind, MemFile, Options, TableIterator,
    TableReader, TableWriter,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tempfile::TempDir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

type Entry = (InternalKey, Vec<u8>);

fn write_table(entries: &[Entry], options: &Options) -> MemFile {
    let file = MemFile::new();
    let mut writer = TableWriter::new(file.clone(), options.clone()).unwrap();
    for (key, value) in entries {
        writer.add(key, value).unwrap();
    }
    writer.close().unwrap();
    file
}

fn open_table(file: &MemFile, options: &Options) -> TableReader {
    TableReader::open(Arc::new(file.clone()), 1, options).unwrap()
}

fn collect_forward(iter: &mut TableIterator) -> Vec<Entry> {
    let mut out = Vec::new();
    let mut ok = iter.first();
    while ok {
        out.push((iter.key().unwrap().clone(), iter.value().unwrap().to_vec()));
        ok = iter.next();
    }
    assert!(iter.error().is_none());
    out
}

fn collect_backward(iter: &mut TableIterator) -> Vec<Entry> {
    let mut out = Vec::new();
    let mut ok = iter.last();
    while ok {
        out.push((iter.key().unwrap().clone(), iter.value().unwrap().to_vec()));
        ok = iter.prev();
    }
    assert!(iter.error().is_none());
    out.reverse();
    out
}

/// Ascending records with several versions for some user keys.
fn random_entries(rng: &mut StdRng, n: usize) -> Vec<Entry> {
    let mut entries = Vec::with_capacity(n);
    let mut i = 0;
    while entries.len() < n {
        let user_key = format!("user{:06}", i).into_bytes();
        let versions = rng.random_range(1..=3u64);
        for v in (0..versions).rev() {
            let kind = match rng.random_range(0..10) {
                0 => InternalKeyKind::Delete,
                1 => InternalKeyKind::Merge,
                _ => InternalKeyKind::Set,
            };
            let len = rng.random_range(0..64);
            let value: Vec<u8> = (0..len).map(|_| rng.random()).collect();
            entries.push((InternalKey::new(user_key.clone(), 100 + v, kind), value));
        }
        i += rng.random_range(1..4);
    }
    entries.truncate(n);
    entries
}

/// Test the documented three-fruit scenario
#[test]
fn test_fruit_scenario() {
    init_logging();
    let entries = vec![
        (InternalKey::new(b"apple".to_vec(), 1, InternalKeyKind::Set), b"red".to_vec()),
        (InternalKey::new(b"banana".to_vec(), 2, InternalKeyKind::Set), b"yellow".to_vec()),
        (InternalKey::new(b"cherry".to_vec(), 3, InternalKeyKind::Set), b"red".to_vec()),
    ];
    let options = Options::default();
    let reader = open_table(&write_table(&entries, &options), &options);
    let mut iter = reader.iter().unwrap();

    for target in [&b"banana"[..], b"b"] {
        assert!(iter.seek_ge(target));
        let key = iter.key().unwrap();
        assert_eq!(key.user_key(), b"banana");
        assert_eq!(key.seq_num(), 2);
        assert_eq!(key.kind(), InternalKeyKind::Set);
        assert_eq!(iter.value().unwrap(), b"yellow");
    }

    assert!(!iter.seek_ge(b"d"));
    assert!(!iter.valid());

    assert!(iter.seek_lt(b"banana"));
    assert_eq!(iter.key().unwrap(), &entries[0].0);
    assert_eq!(iter.value().unwrap(), b"red");
}

/// Round trip over every option combination
#[test]
fn test_round_trip_all_options() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(7);
    let entries = random_entries(&mut rng, 3000);

    for compression in [CompressionType::None, CompressionType::Snappy] {
        for checksum in [ChecksumType::Crc32c, ChecksumType::XxHash64] {
            for block_size in [64, 4096] {
                let options = Options::default()
                    .compression(compression)
                    .checksum(checksum)
                    .block_size(block_size);
                let reader = open_table(&write_table(&entries, &options), &options);
                let mut iter = reader.iter().unwrap();

                let forward = collect_forward(&mut iter);
                assert_eq!(forward, entries, "{:?} {:?} {}", compression, checksum, block_size);
                assert_eq!(collect_backward(&mut iter), forward);
            }
        }
    }
}

/// Prefix compression survives every restart interval
#[test]
fn test_restart_intervals() {
    let mut rng = StdRng::seed_from_u64(11);
    let entries = random_entries(&mut rng, 500);

    for interval in [1, 2, 16, entries.len()] {
        let options = Options::default().block_restart_interval(interval).block_size(1 << 20);
        let reader = open_table(&write_table(&entries, &options), &options);
        assert_eq!(reader.num_data_blocks(), 1);

        let mut iter = reader.iter().unwrap();
        assert_eq!(collect_forward(&mut iter), entries, "restart interval {}", interval);
        assert_eq!(collect_backward(&mut iter), entries, "restart interval {}", interval);
    }
}

/// SeekGE and SeekLT land on the right record for present and absent keys
#[test]
fn test_seek_correctness() {
    let mut rng = StdRng::seed_from_u64(3);
    let entries = random_entries(&mut rng, 2000);
    let options = Options::default().block_size(512);
    let reader = open_table(&write_table(&entries, &options), &options);
    let mut iter = reader.iter().unwrap();

    for i in 0..2000 {
        let target = format!("user{:06}", i).into_bytes();

        let ge = entries.iter().find(|(k, _)| k.user_key() >= target.as_slice());
        match ge {
            Some((key, value)) => {
                assert!(iter.seek_ge(&target));
                assert_eq!(iter.key().unwrap(), key);
                assert_eq!(iter.value().unwrap(), value.as_slice());
            }
            None => assert!(!iter.seek_ge(&target)),
        }

        let lt = entries.iter().rev().find(|(k, _)| k.user_key() < target.as_slice());
        match lt {
            Some((key, _)) => {
                assert!(iter.seek_lt(&target));
                assert_eq!(iter.key().unwrap(), key);
            }
            None => assert!(!iter.seek_lt(&target)),
        }
    }
}

/// Get returns the newest version of a key, including tombstones
#[test]
fn test_get_newest_version() {
    let options = Options::default().block_size(128);
    let entries = vec![
        (InternalKey::new(b"a".to_vec(), 5, InternalKeyKind::Set), b"a5".to_vec()),
        (InternalKey::new(b"a".to_vec(), 3, InternalKeyKind::Set), b"a3".to_vec()),
        (InternalKey::new(b"b".to_vec(), 9, InternalKeyKind::Delete), Vec::new()),
        (InternalKey::new(b"b".to_vec(), 2, InternalKeyKind::Set), b"b2".to_vec()),
        (InternalKey::new(b"c".to_vec(), 1, InternalKeyKind::Merge), b"c1".to_vec()),
    ];
    let reader = open_table(&write_table(&entries, &options), &options);

    let a = reader.get(b"a").unwrap().unwrap();
    assert_eq!((a.key.seq_num(), a.value.as_slice()), (5, &b"a5"[..]));

    let b = reader.get(b"b").unwrap().unwrap();
    assert_eq!(b.key.kind(), InternalKeyKind::Delete);

    let c = reader.get(b"c").unwrap().unwrap();
    assert_eq!(c.key.kind(), InternalKeyKind::Merge);

    assert!(reader.get(b"bb").unwrap().is_none());
    assert!(reader.get(b"").unwrap().is_none());

    let props = reader.properties();
    assert_eq!(props.num_entries, 5);
    assert_eq!(props.num_deletions, 1);
    assert_eq!(props.num_merge_operands, 1);
}

/// A global sequence number replaces every stored sequence number
#[test]
fn test_global_seq_num_override() {
    let entries: Vec<Entry> = (1..=50u64)
        .map(|seq| {
            (InternalKey::new(format!("key{:03}", seq).into_bytes(), seq, InternalKeyKind::Set), vec![seq as u8])
        })
        .collect();
    let file = write_table(&entries, &Options::default().block_size(64));

    let options = Options::default().global_seq_num(100);
    let reader = open_table(&file, &options);
    let mut iter = reader.iter().unwrap();
    let records = collect_forward(&mut iter);
    assert_eq!(records.len(), 50);
    for ((key, value), (orig, orig_value)) in records.iter().zip(&entries) {
        assert_eq!(key.seq_num(), 100);
        assert_eq!(key.user_key(), orig.user_key());
        assert_eq!(value, orig_value);
    }
    assert_eq!(reader.get(b"key007").unwrap().unwrap().key.seq_num(), 100);

    // Without an override the stored numbers come back
    let reader = open_table(&file, &Options::default());
    assert_eq!(reader.get(b"key007").unwrap().unwrap().key.seq_num(), 7);
}

/// Global sequence number recorded by the writer
#[test]
fn test_global_seq_num_from_properties() {
    let entries = vec![(InternalKey::new(b"k".to_vec(), 3, InternalKeyKind::Set), b"v".to_vec())];
    let file = write_table(&entries, &Options::default().global_seq_num(77));

    let reader = open_table(&file, &Options::default());
    assert_eq!(reader.global_seq_num(), Some(77));
    assert_eq!(reader.get(b"k").unwrap().unwrap().key.seq_num(), 77);
}

/// Index keys are shortened separators, not full keys
#[test]
fn test_index_separators_are_short() {
    let options = Options::default().block_size(256).compression(CompressionType::None);
    // Leading bytes two apart leave room for a one-byte separator
    let entries: Vec<Entry> = (0..120u8)
        .map(|i| {
            let mut key = vec![i * 2];
            key.extend_from_slice(&[b'x'; 40]);
            (InternalKey::new(key, 1, InternalKeyKind::Set), vec![0u8; 16])
        })
        .collect();
    let reader = open_table(&write_table(&entries, &options), &options);

    let props = reader.properties();
    let full_keys = props.num_data_blocks * (entries[0].0.encoded_size() as u64);
    assert!(props.index_size < full_keys, "index {} >= {}", props.index_size, full_keys);

    let mut iter = reader.iter().unwrap();
    assert_eq!(collect_forward(&mut iter), entries);
}

/// The bloom filter rejects missing keys without touching data blocks
#[test]
fn test_filter_skips_data_blocks() {
    let cache = Arc::new(BlockCache::new(1 << 20));
    let options = Options::default().filter_bits_per_key(10).cache(cache.clone());
    let mut rng = StdRng::seed_from_u64(5);
    let entries = random_entries(&mut rng, 1000);
    let reader = open_table(&write_table(&entries, &options), &options);

    for i in 0..1000 {
        let key = format!("missing{:06}", i);
        assert!(reader.get(key.as_bytes()).unwrap().is_none());
    }
    // False positives are rare; most misses never reach the cache
    assert!(cache.stats().lookups < 100, "lookups {}", cache.stats().lookups);

    for (key, _) in entries.iter().step_by(7) {
        assert!(reader.get(key.user_key()).unwrap().is_some());
    }
}

/// Tables round trip through real files
#[test]
fn test_on_disk_table() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("000001.sst");
    let options = Options::default().block_size(1024);

    let mut writer = TableWriter::create(&path, options.clone()).unwrap();
    for i in 0..10_000 {
        let key = format!("key_{:08}", i);
        let value = format!("value_{:08}", i);
        writer.set(key.as_bytes(), value.as_bytes()).unwrap();
    }
    writer.delete(b"key_99999999").unwrap();
    let size = writer.close().unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), size);

    let reader = TableReader::open_path(&path, 1, &options).unwrap();
    assert_eq!(reader.file_size(), size);
    assert_eq!(reader.properties().num_entries, 10_001);
    assert_eq!(reader.footer().checksum, ChecksumType::Crc32c);

    for i in (0..10_000).step_by(997) {
        let key = format!("key_{:08}", i);
        let record = reader.get(key.as_bytes()).unwrap().unwrap();
        assert_eq!(record.value, format!("value_{:08}", i).into_bytes());
    }
    let tombstone = reader.get(b"key_99999999").unwrap().unwrap();
    assert_eq!(tombstone.key.kind(), InternalKeyKind::Delete);
}

/// Data blocks tile the file front to back
#[test]
fn test_layout_handles() {
    let options = Options::default().block_size(512);
    let mut rng = StdRng::seed_from_u64(9);
    let entries = random_entries(&mut rng, 800);
    let reader = open_table(&write_table(&entries, &options), &options);

    let handles = reader.data_block_handles().unwrap();
    assert_eq!(handles.len() as u64, reader.num_data_blocks());
    let mut expected_offset = 0;
    for handle in &handles {
        assert_eq!(handle.offset, expected_offset);
        expected_offset = handle.end_offset() + 5;
    }
    assert_eq!(expected_offset, reader.properties().data_size);
    assert!(reader.footer().metaindex_handle.offset < reader.footer().index_handle.offset);
}

/// Options loaded from JSON produce readable tables
#[test]
fn test_options_from_json() {
    let options = Options::from_json(
        r#"{"block_size": 256, "block_restart_interval": 4, "compression": "None", "checksum": "XxHash64"}"#,
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    let entries = random_entries(&mut rng, 300);
    let reader = open_table(&write_table(&entries, &options), &options);
    assert_eq!(reader.footer().checksum, ChecksumType::XxHash64);
    assert_eq!(reader.properties().compression_name, "NoCompression");

    let mut iter = reader.iter().unwrap();
    assert_eq!(collect_forward(&mut iter), entries);
}
