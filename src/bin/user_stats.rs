//! Build the per-user statistics stores and their manifest.

use anyhow::{Result, bail};
use gristmill::driver::{StatsConfig, build_user_stats};

const USAGE: &str = "\
Usage:
  user-stats [--manifest PATH] [--shards-dir PATH]
             [--out-dir PATH] [--out-manifest PATH]
             [--gzip] [--keep-sqlite]

Examples:
  user-stats --gzip
";

fn parse_args(args: &[String]) -> Result<Option<StatsConfig>> {
    let mut cfg = StatsConfig::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(None),
            "--gzip" => cfg.gzip = true,
            "--keep-sqlite" => cfg.keep_sqlite = true,
            "--manifest" => cfg.manifest = next_value(&mut iter, arg)?.into(),
            "--shards-dir" => cfg.shards_dir = next_value(&mut iter, arg)?.into(),
            "--out-dir" => cfg.out_dir = next_value(&mut iter, arg)?.into(),
            "--out-manifest" => cfg.out_manifest = next_value(&mut iter, arg)?.into(),
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
    build_user_stats(&cfg)?;
    Ok(())
}
