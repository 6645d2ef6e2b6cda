//! Gzip plumbing for shard inputs and bucket outputs.
//!
//! Shards may arrive as gzipped SQLite files; they are decompressed into a
//! scratch directory before being opened. Each decompressed file is owned by
//! the shard step that created it — [`ScratchFile`] removes it when the step
//! exits, success or failure, and a failed removal is logged and swallowed.
//! Output compression writes to a `.tmp` sibling and renames into place, and
//! every compressed artifact is re-read once to validate its integrity.

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// A decompressed shard file scoped to one shard-processing step.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            log::debug!("scratch cleanup failed for {}: {err}", self.path.display());
        }
    }
}

/// A readable handle on one shard's database file.
///
/// Plain shards are opened in place; gzipped shards are decompressed into
/// the scratch directory and cleaned up when the handle is dropped.
#[derive(Debug)]
pub enum ShardHandle {
    Plain(PathBuf),
    Scratch(ScratchFile),
}

impl ShardHandle {
    #[must_use]
    pub fn db_path(&self) -> &Path {
        match self {
            ShardHandle::Plain(path) => path,
            ShardHandle::Scratch(scratch) => scratch.path(),
        }
    }
}

/// Open a shard file, decompressing `.gz` shards into `scratch_dir`.
///
/// # Errors
///
/// Fails when the shard cannot be read or its gzip stream is corrupt.
pub fn open_shard(path: &Path, scratch_dir: &Path) -> Result<ShardHandle> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !name.ends_with(".gz") {
        return Ok(ShardHandle::Plain(path.to_path_buf()));
    }
    let stem = name.strip_suffix(".gz").unwrap_or(&name);
    let dst = scratch_dir.join(stem);
    gunzip_to(path, &dst).map(ShardHandle::Scratch)
}

/// Stream-decompress `src` into `dst`.
fn gunzip_to(src: &Path, dst: &Path) -> Result<ScratchFile> {
    let input = File::open(src).with_context(|| format!("open {}", src.display()))?;
    let mut decoder = GzDecoder::new(BufReader::new(input));
    let output = File::create(dst).with_context(|| format!("create {}", dst.display()))?;
    // Own the scratch path before copying so a failed copy still cleans up.
    let scratch = ScratchFile { path: dst.to_path_buf() };
    let mut writer = BufWriter::new(output);
    io::copy(&mut decoder, &mut writer)
        .with_context(|| format!("gunzip {}", src.display()))?;
    writer.flush().with_context(|| format!("flush {}", dst.display()))?;
    Ok(scratch)
}

/// Compress `src` into `dst` at the best compression level.
///
/// Writes through a `.tmp` sibling and renames into place so a crashed run
/// never leaves a half-written artifact under the final name. Returns the
/// compressed size in bytes.
///
/// # Errors
///
/// Fails on any read, write, or rename error.
pub fn gzip_file(src: &Path, dst: &Path) -> Result<u64> {
    let tmp = dst.with_extension("gz.tmp");
    let input = File::open(src).with_context(|| format!("open {}", src.display()))?;
    let mut reader = BufReader::new(input);
    let output = File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::best());
    io::copy(&mut reader, &mut encoder)
        .with_context(|| format!("gzip {}", src.display()))?;
    let mut writer = encoder
        .finish()
        .with_context(|| format!("finish gzip stream for {}", dst.display()))?;
    writer.flush().with_context(|| format!("flush {}", tmp.display()))?;
    drop(writer);
    fs::rename(&tmp, dst)
        .with_context(|| format!("rename {} to {}", tmp.display(), dst.display()))?;
    let bytes = fs::metadata(dst)
        .with_context(|| format!("stat {}", dst.display()))?
        .len();
    Ok(bytes)
}

/// Decode a gzip file end to end, discarding the output.
///
/// # Errors
///
/// Fails if the stream is truncated or corrupt — used as a post-write
/// integrity gate on compressed artifacts.
pub fn validate_gzip(path: &Path) -> Result<()> {
    let input = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut decoder = GzDecoder::new(BufReader::new(input));
    io::copy(&mut decoder, &mut io::sink())
        .with_context(|| format!("gzip validation failed for {}", path.display()))?;
    Ok(())
}
