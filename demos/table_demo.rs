//! Example demonstrating table usage.
//!
//! This example shows how to:
//! - Write a table from sorted records
//! - Look up keys in the table
//! - Iterate in both directions and seek
//! - Inspect the table properties

use lsm_sstable::{InternalKey, InternalKeyKind, Options, Result, TableReader, TableWriter};
use std::fs;

fn main() -> Result<()> {
    env_logger::init();
    println!("=== Table Example ===\n");

    let temp_dir = std::env::temp_dir().join("lsm_sstable_example");
    fs::create_dir_all(&temp_dir)?;
    let table_path = temp_dir.join("example.sst");
    let options = Options::default().block_size(1024).filter_bits_per_key(10);

    // === Part 1: Writing a table ===
    println!("1. Writing a table...");
    {
        let mut writer = TableWriter::create(&table_path, options.clone())?;

        // Records must be added in increasing key order
        let entries: Vec<(&[u8], &[u8])> = vec![
            (b"apple", b"A red or green fruit"),
            (b"banana", b"A yellow tropical fruit"),
            (b"cherry", b"A small red stone fruit"),
            (b"date", b"A sweet brown fruit from palm trees"),
            (b"elderberry", b"A dark purple berry"),
            (b"fig", b"A soft sweet fruit with many seeds"),
        ];
        for (seq, (key, value)) in entries.iter().enumerate() {
            writer.add(&InternalKey::new(key.to_vec(), seq as u64 + 1, InternalKeyKind::Set), value)?;
        }
        writer.add(&InternalKey::new(b"grape".to_vec(), 10, InternalKeyKind::Delete), b"")?;

        let file_size = writer.close()?;
        println!("   Table created: {} bytes\n", file_size);
    }

    // === Part 2: Point lookups ===
    println!("2. Looking up keys...");
    let reader = TableReader::open_path(&table_path, 1, &options)?;
    for key in [&b"banana"[..], b"fig", b"grape", b"mango"] {
        match reader.get(key)? {
            Some(record) if record.key.kind() == InternalKeyKind::Delete => {
                println!("   '{}' -> DELETED", String::from_utf8_lossy(key));
            }
            Some(record) => {
                println!(
                    "   '{}' -> '{}' (seq {})",
                    String::from_utf8_lossy(key),
                    String::from_utf8_lossy(&record.value),
                    record.key.seq_num()
                );
            }
            None => println!("   '{}' -> NOT FOUND", String::from_utf8_lossy(key)),
        }
    }
    println!();

    // === Part 3: Iteration ===
    println!("3. Iterating...");
    {
        let mut iter = reader.iter()?;
        let mut ok = iter.first();
        while ok {
            println!("   {:?} -> {}", iter.key()?, String::from_utf8_lossy(iter.value()?));
            ok = iter.next();
        }

        println!("   Backwards from 'd':");
        let mut ok = iter.seek_lt(b"d");
        while ok {
            println!("     {}", String::from_utf8_lossy(iter.key()?.user_key()));
            ok = iter.prev();
        }
        if let Some(err) = iter.error() {
            println!("   Iteration failed: {}", err);
        }
    }
    println!();

    // === Part 4: Properties ===
    println!("4. Table properties:");
    match serde_json::to_string_pretty(reader.properties()) {
        Ok(json) => println!("{}", json),
        Err(e) => println!("   Cannot render properties: {}", e),
    }

    reader.close();
    println!("\nExample completed successfully!");
    println!("  (Temporary files at: {})", temp_dir.display());

    Ok(())
}
