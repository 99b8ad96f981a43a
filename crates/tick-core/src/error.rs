//! Typed error definitions for the tick library.
//!
//! Provides [`TickError`] for storage-engine failures that callers may want to
//! match on (corruption vs. I/O vs. a closed shard). All variants implement
//! `std::error::Error` via `thiserror`, so they convert into `anyhow::Error`
//! at binary boundaries.

use thiserror::Error;

/// Convenience alias used across the storage crates.
pub type Result<T, E = TickError> = std::result::Result<T, E>;

/// Domain-specific errors for the tick library.
#[derive(Debug, Error)]
pub enum TickError {
    /// File open, read, write, or fsync failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A trade could not be serialized into a record payload.
    #[error("encode error: {0}")]
    Encode(String),

    /// A record header or payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Encoded payload exceeds the per-record bound.
    #[error("record payload of {len} bytes exceeds the {max} byte limit")]
    RecordTooLarge { len: usize, max: usize },

    /// A record extends past the end of the readable range.
    #[error("truncated record at offset {offset}")]
    TruncatedRecord { offset: u64 },

    /// The shard's file handle has been released.
    #[error("shard {0} is closed")]
    ShardClosed(String),

    /// The shard's tail is not record-aligned; it stays readable but takes
    /// no further appends.
    #[error("shard {0} has an unaligned tail and is read-only")]
    ShardPoisoned(String),

    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),
}

impl TickError {
    /// True for errors caused by bad bytes on disk rather than the environment.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::TruncatedRecord { .. })
    }
}
