use anyhow::Result;
use gristmill::item::ItemRow;
use gristmill::reduce::{ItemUpdate, ShardTally, UserAggregate};
use gristmill::store::{BucketSet, BucketStore};
use gristmill::alphabet::BUCKET_COUNT;
use rusqlite::Connection;
use tempfile::tempdir;

fn update(
    username: &str,
    id: i64,
    kind: &str,
    time: Option<i64>,
    score: Option<f64>,
    url: Option<&str>,
) -> ItemUpdate {
    ItemUpdate::from_row(&ItemRow {
        id,
        kind: kind.to_string(),
        time,
        by: username.to_string(),
        title: Some(format!("title {id}")),
        url: url.map(str::to_string),
        score,
    })
}

fn read_aggregate(conn: &Connection, username: &str) -> Result<UserAggregate> {
    let agg = conn.query_row(
        "SELECT first_time, last_time, items, comments, stories, ask, show, launch,
                jobs, polls, sum_score, max_score, min_score, max_score_id, max_score_title
         FROM users WHERE username = ?1",
        [username],
        |row| {
            Ok(UserAggregate {
                first_time: row.get(0)?,
                last_time: row.get(1)?,
                items: row.get(2)?,
                comments: row.get(3)?,
                stories: row.get(4)?,
                ask: row.get(5)?,
                show: row.get(6)?,
                launch: row.get(7)?,
                jobs: row.get(8)?,
                polls: row.get(9)?,
                sum_score: row.get(10)?,
                max_score: row.get(11)?,
                min_score: row.get(12)?,
                max_score_id: row.get(13)?,
                max_score_title: row.get(14)?,
            })
        },
    )?;
    Ok(agg)
}

#[test]
fn store_merge_matches_the_pure_reducer() -> Result<()> {
    let dir = tempdir()?;
    let mut store = BucketStore::create(dir.path(), 10)?;

    // Two "shards" worth of updates for the same user, flushed separately.
    let first_batch = [
        update("alice", 1, "story", Some(300), Some(7.0), None),
        update("alice", 2, "comment", Some(100), Some(1.0), None),
    ];
    let second_batch = [
        update("alice", 3, "story", Some(200), Some(9.0), None),
        update("alice", 4, "comment", None, None, None),
    ];

    let mut expected: Option<UserAggregate> = None;
    for upd in first_batch.iter().chain(second_batch.iter()) {
        expected = Some(match expected.take() {
            Some(mut agg) => {
                agg.absorb(upd);
                agg
            }
            None => UserAggregate::seed(upd),
        });
    }
    let expected = expected.unwrap();

    let mut tally = ShardTally::default();
    for upd in first_batch {
        tally.add(upd);
    }
    store.apply(&tally)?;
    let mut tally = ShardTally::default();
    for upd in second_batch {
        tally.add(upd);
    }
    store.apply(&tally)?;

    let path = store.finish()?;
    let conn = Connection::open(path)?;
    assert_eq!(read_aggregate(&conn, "alice")?, expected);
    Ok(())
}

#[test]
fn counters_only_grow_across_flushes() -> Result<()> {
    let dir = tempdir()?;
    let mut store = BucketStore::create(dir.path(), 11)?;

    let mut tally = ShardTally::default();
    tally.add(update("bob", 1, "story", Some(50), Some(2.0), None));
    store.apply(&tally)?;

    let before = read_aggregate(&Connection::open(store.path())?, "bob")?;

    let mut tally = ShardTally::default();
    tally.add(update("bob", 2, "comment", Some(70), Some(3.0), None));
    store.apply(&tally)?;

    let after = read_aggregate(&Connection::open(store.path())?, "bob")?;
    assert!(after.items > before.items);
    assert!(after.comments >= before.comments);
    assert!(after.stories >= before.stories);
    assert!(after.sum_score >= before.sum_score);
    assert!(after.last_time >= before.last_time);
    Ok(())
}

#[test]
fn finalize_derives_avg_score_and_indexes() -> Result<()> {
    let dir = tempdir()?;
    let mut store = BucketStore::create(dir.path(), 10)?;

    let mut tally = ShardTally::default();
    tally.add(update("alice", 1, "story", Some(100), Some(10.0), None));
    tally.add(update("alice", 2, "comment", Some(200), Some(5.0), None));
    tally.add(update("amy", 3, "comment", Some(300), Some(1.0), None));
    store.apply(&tally)?;
    store.finalize()?;
    let path = store.finish()?;

    let conn = Connection::open(path)?;
    let avg: f64 = conn.query_row(
        "SELECT avg_score FROM users WHERE username = 'alice'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(avg, 7.5);

    let indexes: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(indexes, 4);
    Ok(())
}

#[test]
fn side_tables_accumulate_across_flushes() -> Result<()> {
    let dir = tempdir()?;
    let mut store = BucketStore::create(dir.path(), 12)?;

    let mut tally = ShardTally::default();
    tally.add(update(
        "carol",
        1,
        "story",
        Some(1_700_000_000),
        Some(1.0),
        Some("http://www.example.com/a"),
    ));
    store.apply(&tally)?;

    let mut tally = ShardTally::default();
    tally.add(update(
        "carol",
        2,
        "story",
        Some(1_700_000_100),
        Some(1.0),
        Some("https://example.com/b"),
    ));
    store.apply(&tally)?;

    let conn = Connection::open(store.path())?;
    let domain_count: i64 = conn.query_row(
        "SELECT count FROM user_domains WHERE username = 'carol' AND domain = 'example.com'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(domain_count, 2);
    let month_count: i64 = conn.query_row(
        "SELECT count FROM user_months WHERE username = 'carol' AND month = '2023-11'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(month_count, 2);
    Ok(())
}

#[test]
fn first_activity_scan_skips_users_without_timestamps() -> Result<()> {
    let dir = tempdir()?;
    let mut store = BucketStore::create(dir.path(), 13)?;

    let mut tally = ShardTally::default();
    tally.add(update("dan", 1, "comment", Some(900), None, None));
    tally.add(update("dana", 2, "comment", None, None, None));
    store.apply(&tally)?;

    assert_eq!(store.first_activity_times()?, vec![900]);
    Ok(())
}

#[test]
fn the_bucket_arena_is_created_upfront() -> Result<()> {
    let dir = tempdir()?;
    let buckets = BucketSet::create(dir.path())?;
    let stores = buckets.into_stores();
    assert_eq!(stores.len(), BUCKET_COUNT);
    for (sid, store) in stores.iter().enumerate() {
        assert_eq!(store.sid(), sid);
        assert!(store.path().exists());
    }
    Ok(())
}

#[test]
fn recreating_a_store_replaces_the_old_file() -> Result<()> {
    let dir = tempdir()?;
    let mut store = BucketStore::create(dir.path(), 10)?;
    let mut tally = ShardTally::default();
    tally.add(update("alice", 1, "comment", Some(1), None, None));
    store.apply(&tally)?;
    let path = store.finish()?;

    // A fresh run starts from an empty table, not the previous contents.
    let store = BucketStore::create(dir.path(), 10)?;
    let count: i64 =
        Connection::open(&path)?.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    drop(store);
    assert_eq!(count, 0);
    Ok(())
}
