//! # tick-store
//!
//! Append-only, time-sharded trade storage.
//!
//! - **Skip list** (`skiplist`): timestamp to byte-offset index per shard
//! - **Records** (`record`): length/timestamp header + MessagePack payload
//! - **Media** (`file`): `ShardFile`/`Medium` traits with disk and memory backends
//! - **Shards** (`shard`): one log file, its time range and lazy index
//! - **Library** (`library`): rotation, discovery, merged queries, reclamation
//! - **Streams** (`stream`): cancellable producer-thread query results
//! - **Workers** (`reclaim`, `ingest`): background retention and channel ingest
//! - **Candles** (`candles`): OHLCV aggregation

pub mod candles;
pub mod file;
pub mod ingest;
pub mod library;
pub mod reclaim;
pub mod record;
pub mod shard;
pub mod skiplist;
pub mod stream;

pub use file::{DiskMedium, MemMedium, Medium, ShardFile};
pub use ingest::{IngestStats, run_ingest_loop};
pub use library::{Library, LibraryStats, ReclaimReport, TradeIter};
pub use reclaim::spawn_reclaimer;
pub use shard::{Shard, ShardMeta};
pub use stream::{CancelHandle, TradeStream};
