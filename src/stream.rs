//! Flow-controlled streaming scan of one shard.
//!
//! A full item scan can block for a long time inside the storage engine (the
//! first cursor step may pay for an internal sort), so the cursor lives on
//! its own worker thread and results come back over a channel in batches of
//! at most [`BATCH_SIZE`] rows. The protocol is deliberately tiny:
//!
//! - worker → consumer: [`ScanMessage::Batch`] with the buffered rows, then
//!   exactly one terminal [`ScanMessage::Done`] or [`ScanMessage::Error`].
//! - consumer → worker: one ack per batch.
//!
//! The worker performs no cursor reads between emitting a batch and
//! receiving its ack, so at most one unacknowledged batch is ever in flight.
//! That window of one is the entire backpressure mechanism: consumer memory
//! is bounded at one batch regardless of shard size. There is no timeout and
//! no cancellation; a stalled side stalls the scan. Dropping the consumer
//! closes both channels, which the worker observes as an end of interest and
//! exits on.

use crate::item::ItemRow;
use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::thread::{self, JoinHandle};

/// Maximum rows buffered into one `Batch` message.
pub const BATCH_SIZE: usize = 1000;

const SCAN_SQL: &str =
    "SELECT id, type, time, by, title, url, score FROM items WHERE by IS NOT NULL";

/// Messages emitted by the scan worker.
#[derive(Debug)]
pub enum ScanMessage {
    /// One batch of rows in cursor order.
    Batch(Vec<ItemRow>),
    /// Cursor exhausted; no messages follow.
    Done,
    /// Scan failed; no messages follow and no partial recovery is attempted.
    Error(String),
}

/// Consumer handle for a running shard scan.
pub struct ItemScan {
    messages: Receiver<ScanMessage>,
    acks: SyncSender<()>,
    worker: Option<JoinHandle<()>>,
}

impl ItemScan {
    /// Start scanning the shard database at `db_path` on a worker thread.
    ///
    /// The worker opens its own read-only connection; any open or query
    /// failure surfaces as the stream's terminal error rather than here.
    #[must_use]
    pub fn open(db_path: &Path) -> Self {
        let (msg_tx, msg_rx) = sync_channel::<ScanMessage>(1);
        let (ack_tx, ack_rx) = sync_channel::<()>(1);
        let path = db_path.to_path_buf();
        let worker = thread::spawn(move || run_scan(path, &msg_tx, &ack_rx));
        Self { messages: msg_rx, acks: ack_tx, worker: Some(worker) }
    }

    /// Drain the scan, handing each batch to `handle` in cursor order.
    ///
    /// The ack for a batch is sent only after `handle` returns, so the
    /// worker cannot run ahead of the consumer. Returns the total number of
    /// rows delivered.
    ///
    /// # Errors
    ///
    /// Fails if the worker reported a terminal error, disconnected without
    /// one, or `handle` itself failed. The worker unblocks and exits in all
    /// of these cases once the handle is dropped.
    pub fn for_each_batch<F>(mut self, mut handle: F) -> Result<u64>
    where
        F: FnMut(Vec<ItemRow>) -> Result<()>,
    {
        let mut delivered = 0u64;
        loop {
            match self.messages.recv() {
                Ok(ScanMessage::Batch(rows)) => {
                    delivered += rows.len() as u64;
                    handle(rows)?;
                    // The worker may already be gone after a send-side race;
                    // a failed ack is then just a no-op.
                    let _ = self.acks.send(());
                }
                Ok(ScanMessage::Done) => break,
                Ok(ScanMessage::Error(msg)) => bail!("shard scan failed: {msg}"),
                Err(_) => bail!("scan worker exited without a terminal message"),
            }
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        Ok(delivered)
    }
}

fn run_scan(path: PathBuf, messages: &SyncSender<ScanMessage>, acks: &Receiver<()>) {
    let terminal = match pump_cursor(&path, messages, acks) {
        Ok(()) => ScanMessage::Done,
        Err(err) => ScanMessage::Error(err.to_string()),
    };
    // Consumer may have dropped already; either way this thread is done.
    let _ = messages.send(terminal);
}

/// Pull rows from the cursor and push acknowledged batches.
///
/// Returns `Ok(())` both on exhaustion and when the consumer goes away;
/// only storage-side failures become the stream's terminal error.
fn pump_cursor(
    path: &Path,
    messages: &SyncSender<ScanMessage>,
    acks: &Receiver<()>,
) -> rusqlite::Result<()> {
    let conn = rusqlite::Connection::open_with_flags(
        path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
    )?;
    let mut stmt = conn.prepare(SCAN_SQL)?;
    let rows = stmt.query_map([], |row| {
        Ok(ItemRow {
            id: row.get(0)?,
            kind: row.get(1)?,
            time: row.get(2)?,
            by: row.get(3)?,
            title: row.get(4)?,
            url: row.get(5)?,
            score: row.get(6)?,
        })
    })?;

    let mut batch = Vec::with_capacity(BATCH_SIZE);
    for row in rows {
        batch.push(row?);
        if batch.len() >= BATCH_SIZE {
            if messages.send(ScanMessage::Batch(std::mem::take(&mut batch))).is_err() {
                return Ok(());
            }
            if acks.recv().is_err() {
                return Ok(());
            }
        }
    }
    if !batch.is_empty() {
        if messages.send(ScanMessage::Batch(batch)).is_err() {
            return Ok(());
        }
        if acks.recv().is_err() {
            return Ok(());
        }
    }
    Ok(())
}
