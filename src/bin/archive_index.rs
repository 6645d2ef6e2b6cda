//! Build the per-shard archive summary index.

use anyhow::{Result, bail};
use gristmill::summary::{IndexConfig, build_archive_index};

const USAGE: &str = "\
Usage:
  archive-index [--manifest PATH] [--shards-dir PATH] [--out PATH]
";

fn parse_args(args: &[String]) -> Result<Option<IndexConfig>> {
    let mut cfg = IndexConfig::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(None),
            "--manifest" => cfg.manifest = next_value(&mut iter, arg)?.into(),
            "--shards-dir" => cfg.shards_dir = next_value(&mut iter, arg)?.into(),
            "--out" => cfg.out = next_value(&mut iter, arg)?.into(),
            other => bail!("unknown argument: {other}\n{USAGE}"),
        }
    }
    Ok(Some(cfg))
}

fn next_value<'a>(iter: &mut std::slice::Iter<'a, String>, flag: &str) -> Result<&'a String> {
    match iter.next() {
        Some(value) if !value.starts_with("--") => Ok(value),
        _ => bail!("{flag} requires a value\n{USAGE}"),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(cfg) = parse_args(&args)? else {
        print!("{USAGE}");
        return Ok(());
    };
    build_archive_index(&cfg)?;
    Ok(())
}
