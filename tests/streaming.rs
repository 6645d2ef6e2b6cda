use anyhow::{Result, anyhow};
use gristmill::stream::{BATCH_SIZE, ItemScan};
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn create_shard(path: &Path, rows: usize, unattributed: usize) -> Result<()> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "CREATE TABLE items (
            id INTEGER PRIMARY KEY,
            type TEXT NOT NULL,
            time INTEGER,
            by TEXT,
            title TEXT,
            url TEXT,
            score INTEGER
        )",
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO items (id, type, time, by, title, url, score)
         VALUES (?1, 'comment', ?2, ?3, NULL, NULL, 1)",
    )?;
    for i in 0..rows {
        stmt.execute(rusqlite::params![i as i64 + 1, i as i64, "someone"])?;
    }
    for i in 0..unattributed {
        stmt.execute(rusqlite::params![
            (rows + i) as i64 + 1,
            0i64,
            None::<String>
        ])?;
    }
    Ok(())
}

fn shard_path(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

#[test]
fn every_row_is_delivered_exactly_once() -> Result<()> {
    let dir = tempdir()?;
    let path = shard_path(&dir, "shard.sqlite");
    create_shard(&path, 2500, 0)?;

    let mut batch_sizes = Vec::new();
    let mut ids = Vec::new();
    let delivered = ItemScan::open(&path).for_each_batch(|rows| {
        batch_sizes.push(rows.len());
        ids.extend(rows.iter().map(|r| r.id));
        Ok(())
    })?;

    assert_eq!(delivered, 2500);
    assert_eq!(batch_sizes, vec![1000, 1000, 500]);
    assert!(batch_sizes.iter().all(|n| *n <= BATCH_SIZE));
    // Rows arrive in cursor order, within and across batches.
    let expected: Vec<i64> = (1..=2500).collect();
    assert_eq!(ids, expected);
    Ok(())
}

#[test]
fn unattributed_rows_are_filtered_out_of_the_scan() -> Result<()> {
    let dir = tempdir()?;
    let path = shard_path(&dir, "shard.sqlite");
    create_shard(&path, 40, 17)?;

    let delivered = ItemScan::open(&path).for_each_batch(|_| Ok(()))?;
    assert_eq!(delivered, 40);
    Ok(())
}

#[test]
fn an_exact_multiple_of_the_batch_size_has_no_empty_tail() -> Result<()> {
    let dir = tempdir()?;
    let path = shard_path(&dir, "shard.sqlite");
    create_shard(&path, 2000, 0)?;

    let mut batch_sizes = Vec::new();
    ItemScan::open(&path).for_each_batch(|rows| {
        batch_sizes.push(rows.len());
        Ok(())
    })?;
    assert_eq!(batch_sizes, vec![1000, 1000]);
    Ok(())
}

#[test]
fn an_empty_shard_completes_with_no_batches() -> Result<()> {
    let dir = tempdir()?;
    let path = shard_path(&dir, "shard.sqlite");
    create_shard(&path, 0, 0)?;

    let mut batches = 0;
    let delivered = ItemScan::open(&path).for_each_batch(|_| {
        batches += 1;
        Ok(())
    })?;
    assert_eq!(delivered, 0);
    assert_eq!(batches, 0);
    Ok(())
}

#[test]
fn a_corrupt_shard_surfaces_as_the_terminal_error() -> Result<()> {
    let dir = tempdir()?;
    let path = shard_path(&dir, "garbage.sqlite");
    fs::write(&path, b"this is not a database")?;

    let result = ItemScan::open(&path).for_each_batch(|_| Ok(()));
    let err = result.expect_err("scan of a corrupt shard must fail");
    assert!(err.to_string().contains("shard scan failed"));
    Ok(())
}

#[test]
fn a_failing_consumer_ends_the_scan_without_hanging() -> Result<()> {
    let dir = tempdir()?;
    let path = shard_path(&dir, "shard.sqlite");
    create_shard(&path, 5000, 0)?;

    let mut seen = 0;
    let result = ItemScan::open(&path).for_each_batch(|rows| {
        seen += rows.len();
        Err(anyhow!("downstream refused the batch"))
    });
    assert!(result.is_err());
    assert_eq!(seen, 1000);
    Ok(())
}
