//! Output-file guards shared by both passes.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

/// Make sure `path` can be overwritten, moving a read-only file aside.
///
/// A protected file is renamed into a timestamped `backups-*/` directory
/// next to it rather than clobbered; absent or writable files pass through
/// untouched.
///
/// # Errors
///
/// Fails when the backup directory or rename cannot be created.
pub fn ensure_writable_or_backup(path: &Path) -> Result<()> {
    let Ok(meta) = fs::metadata(path) else {
        return Ok(());
    };
    if !meta.permissions().readonly() {
        return Ok(());
    }
    let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S");
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let backup_dir = dir.join(format!("backups-{stamp}"));
    fs::create_dir_all(&backup_dir)
        .with_context(|| format!("create backup dir {}", backup_dir.display()))?;
    let dest = backup_dir.join(path.file_name().unwrap_or_default());
    fs::rename(path, &dest)
        .with_context(|| format!("move protected file to {}", dest.display()))?;
    log::info!("moved protected file to {}", dest.display());
    Ok(())
}

/// Write `value` as pretty-printed JSON, creating parent directories.
///
/// # Errors
///
/// Fails on any create, serialize, or write error.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("serialize {}", path.display()))?;
    Ok(())
}
