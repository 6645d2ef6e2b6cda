//! # Gristmill
//!
//! A **batch aggregation engine** that grinds a sharded archive of forum
//! items (posts and comments, each attributed to a username) into two
//! derived artifacts:
//!
//! - a per-shard **archive index** — item/post/comment counts, byte sizes,
//!   and a percentile-trimmed effective time range per shard;
//! - a set of 37 **per-user statistics stores**, bucketed by the first
//!   character of the username, with cumulative counters, per-domain and
//!   per-month histograms, and a chronological user-growth curve.
//!
//! ## How a run works
//!
//! The shard manifest fixes the processing order. For each shard, the driver
//! decompresses the file to scratch when needed, streams every attributed
//! item exactly once through a flow-controlled channel (the scan cursor
//! lives on its own worker thread, batching rows under a one-batch
//! backpressure window), routes each row to its bucket, and merges the
//! folded batch into the bucket store in a single transaction. Derived
//! fields — `avg_score` and the growth curve — are computed only after
//! every shard has contributed, because later shards can still change what
//! earlier ones established (a user's `first_time` only ever moves down).
//!
//! ```ignore
//! use gristmill::driver::{StatsConfig, build_user_stats};
//!
//! # fn main() -> anyhow::Result<()> {
//! let manifest = build_user_stats(&StatsConfig::default())?;
//! println!("{} users across {} buckets", manifest.totals.users, manifest.shards.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`alphabet`] - the fixed bucket alphabet and the username router
//! - [`item`] - item rows, type classification, domain and month derivation
//! - [`manifest`] - shard-manifest input model
//! - [`range`] - percentile-trimmed effective time ranges
//! - [`reduce`] - the per-user aggregate and its commutative merge
//! - [`stream`] - the batched, acknowledged shard-scan channel
//! - [`compress`] - gzip decompression to scratch, output compression
//! - [`store`] - per-bucket SQLite stores with transactional batch merges
//! - [`driver`] - the user-statistics pass
//! - [`growth`] - the monthly user-growth curve
//! - [`summary`] - the archive-index pass
//! - [`fsutil`] - output-file guards

pub mod alphabet;
pub mod compress;
pub mod driver;
pub mod fsutil;
pub mod growth;
pub mod item;
pub mod manifest;
pub mod range;
pub mod reduce;
pub mod store;
pub mod stream;
pub mod summary;

// General re-exports
pub use alphabet::{ALPHABET, BUCKET_COUNT, bucket_for};
pub use driver::{StatsConfig, StatsManifest, build_user_stats};
pub use growth::{GrowthPoint, GrowthTally};
pub use item::{ItemClass, ItemRow};
pub use manifest::{ShardEntry, ShardManifest, load_manifest};
pub use range::EffectiveRange;
pub use reduce::{ItemUpdate, ShardTally, UserAggregate};
pub use store::{BucketSet, BucketStore};
pub use stream::{BATCH_SIZE, ItemScan, ScanMessage};
pub use summary::{ArchiveIndex, IndexConfig, build_archive_index};
