//! Shard manifest input.
//!
//! The manifest is produced upstream and lists every shard with its id,
//! file name, and optional time/id ranges. Shards are always processed in
//! ascending `sid` order.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// One shard as listed in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardEntry {
    pub sid: i64,
    pub file: String,
    #[serde(default)]
    pub tmin: Option<i64>,
    #[serde(default)]
    pub tmax: Option<i64>,
    #[serde(default)]
    pub id_lo: Option<i64>,
    #[serde(default)]
    pub id_hi: Option<i64>,
}

/// The full shard manifest.
///
/// `snapshot_time` is opaque here; it is copied through to the summary
/// output verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardManifest {
    #[serde(default)]
    pub shards: Vec<ShardEntry>,
    #[serde(default)]
    pub snapshot_time: Option<serde_json::Value>,
}

/// Load and validate the shard manifest.
///
/// # Errors
///
/// A missing or unparsable manifest and an empty shard list are both fatal:
/// no pass can produce meaningful output without shards.
pub fn load_manifest(path: &Path) -> Result<ShardManifest> {
    let file =
        File::open(path).with_context(|| format!("manifest not found: {}", path.display()))?;
    let mut manifest: ShardManifest = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parse manifest {}", path.display()))?;
    if manifest.shards.is_empty() {
        bail!("no shards listed in manifest {}", path.display());
    }
    manifest.shards.sort_by_key(|s| s.sid);
    Ok(manifest)
}
