//! A shard: one time-bucketed, append-only trade log plus its in-memory index.
//!
//! # Concurrency
//!
//! All mutable state sits behind one `RwLock`. Appends, `open` and `close`
//! take the write lock; readers take the read lock only long enough to capture
//! a [`Snapshot`] (file handle, byte length, start offset) and then scan
//! without holding any lock. Bytes appended after the snapshot are outside the
//! reader's range, so reads never see a torn record and never block writers.
//!
//! # Index
//!
//! Shards created by the library index every record as it is appended.
//! Shards discovered on disk defer the index until the first query (or the
//! first append after reactivation), paying one header-only scan. The scan
//! runs outside the state lock; a separate build mutex keeps it to one
//! builder, and the finished index is swapped in under a short write lock.
//!
//! # Poisoning
//!
//! A shard whose tail is not record-aligned (a torn tail found on load, or a
//! failed append that could not be truncated away) is poisoned: it still
//! serves reads up to its known size but rejects appends.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tick_core::{Result, TickError, Trade};
use tracing::{debug, error, warn};

use crate::file::{Medium, SectionReader, ShardFile};
use crate::record::{self, HEADER_LEN, MAX_PAYLOAD_LEN, RecordHeader};
use crate::skiplist::SkipList;

/// File name prefix of every shard.
pub const SHARD_PREFIX: &str = "trades_";

const READ_BUFFER: usize = 4096;

/// File name for a shard whose bucket starts at `bucket` seconds.
pub fn shard_name(bucket: u64) -> String {
    format!("{SHARD_PREFIX}{bucket}")
}

/// Bucket start encoded in a shard file name, or `None` if `name` does not
/// follow the `trades_<digits>` convention.
pub fn parse_shard_name(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(SHARD_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Point-in-time view of a shard's bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardMeta {
    /// Smallest timestamp stored, `None` while empty.
    pub start_time: Option<u64>,
    /// Largest timestamp stored, `None` while empty.
    pub last_time: Option<u64>,
    /// File length in bytes.
    pub size: u64,
}

impl ShardMeta {
    fn observe(&mut self, ts: u64) {
        self.start_time = Some(self.start_time.map_or(ts, |s| s.min(ts)));
        self.last_time = Some(self.last_time.map_or(ts, |l| l.max(ts)));
    }
}

struct ShardState {
    /// `None` once closed.
    file: Option<Arc<dyn ShardFile>>,
    meta: ShardMeta,
    index: SkipList,
    indexed: bool,
    poisoned: bool,
}

/// Consistent read view captured under the shard lock.
struct Snapshot {
    file: Arc<dyn ShardFile>,
    start: u64,
    end: u64,
}

/// One shard file and its index.
pub struct Shard {
    name: String,
    path: PathBuf,
    bucket: u64,
    medium: Arc<dyn Medium>,
    state: RwLock<ShardState>,
    /// Held for the whole of a deferred index build.
    build: Mutex<()>,
}

impl Shard {
    /// Open (creating if needed) the shard at `path` and derive its time
    /// range with a header-only scan.
    ///
    /// A corrupt or torn tail ends the scan early: the shard keeps the time
    /// range of its readable prefix, queries reaching the bad record fail
    /// with a decode error, and the shard is poisoned against appends.
    pub fn load(medium: Arc<dyn Medium>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| path.display().to_string());
        let bucket = parse_shard_name(&name).unwrap_or(0);

        let file = medium.open(&path)?;
        let size = file.len()?;

        let mut meta = ShardMeta { size, ..ShardMeta::default() };
        let mut poisoned = false;
        if size > 0 {
            let mut cursor = RecordCursor::new(file.clone(), 0, size);
            if let Err(e) = cursor.for_each_header(|_, header| meta.observe(header.ts)) {
                warn!("shard {name}: scan stopped at offset {}, shard is read-only: {e}", cursor.offset());
                poisoned = true;
            }
        }

        Ok(Self {
            name,
            path,
            bucket,
            medium,
            state: RwLock::new(ShardState {
                file: Some(file),
                meta,
                index: SkipList::new(),
                indexed: size == 0,
                poisoned,
            }),
            build: Mutex::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Numeric suffix of the file name (0 if the name is free-form). This is
    /// the bucket start for the first shard of a bucket and `bucket + k` for
    /// the shards that follow it once it fills up.
    pub fn bucket(&self) -> u64 {
        self.bucket
    }

    pub fn meta(&self) -> ShardMeta {
        self.state.read().meta
    }

    pub fn size(&self) -> u64 {
        self.state.read().meta.size
    }

    pub fn start_time(&self) -> Option<u64> {
        self.state.read().meta.start_time
    }

    pub fn last_time(&self) -> Option<u64> {
        self.state.read().meta.last_time
    }

    pub fn is_open(&self) -> bool {
        self.state.read().file.is_some()
    }

    pub fn is_indexed(&self) -> bool {
        self.state.read().indexed
    }

    /// True once the shard has stopped accepting appends because its tail
    /// is not record-aligned.
    pub fn is_poisoned(&self) -> bool {
        self.state.read().poisoned
    }

    /// Append one trade.
    ///
    /// The record is encoded before the lock is taken; the lock then covers
    /// the write and the bookkeeping. A failed write is truncated away so
    /// later records stay aligned; if the truncate fails too the shard is
    /// poisoned.
    pub fn append(&self, trade: &Trade) -> Result<()> {
        let rec = record::encode_record(trade)?;
        self.ensure_indexed()?;

        let mut guard = self.state.write();
        let st = &mut *guard;
        let file = st.file.clone().ok_or_else(|| TickError::ShardClosed(self.name.clone()))?;
        if st.poisoned {
            return Err(TickError::ShardPoisoned(self.name.clone()));
        }

        let offset = st.meta.size;
        if let Err(e) = file.append(&rec) {
            if let Err(te) = file.set_len(offset) {
                error!("shard {}: failed to roll back partial append at {offset}, shard is read-only: {te}", self.name);
                st.poisoned = true;
            }
            return Err(e.into());
        }

        st.meta.size += rec.len() as u64;
        st.meta.observe(trade.timestamp);
        st.index.insert(trade.timestamp, offset);
        Ok(())
    }

    /// Flush written data to durable storage without closing.
    pub fn flush(&self) -> Result<()> {
        let file = self.state.read().file.clone();
        if let Some(file) = file {
            file.sync()?;
        }
        Ok(())
    }

    /// Sync and release the file handle.
    ///
    /// Readers that already hold a snapshot keep their own handle and finish
    /// normally. The handle is released even when the sync fails.
    pub fn close(&self) -> Result<()> {
        let file = self.state.write().file.take();
        match file {
            Some(file) => {
                debug!("closing shard {}", self.name);
                file.sync()?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Reopen the file for further appends. No-op if already open.
    pub fn open(&self) -> Result<()> {
        let mut st = self.state.write();
        if st.file.is_none() {
            debug!("reopening shard {}", self.name);
            st.file = Some(self.medium.open(&self.path)?);
        }
        Ok(())
    }

    /// Lazily stream trades for `market`/`instrument` with `timestamp >= after`.
    ///
    /// The stream covers the bytes present when this call returns; it ends
    /// cleanly there, or with a decode error at the first corrupt record.
    pub fn stream(&self, market: &str, instrument: &str, after: u64) -> Result<ShardReader> {
        let snap = self.snapshot(after)?;
        debug!("shard {}: stream from offset {} to {}", self.name, snap.start, snap.end);
        Ok(ShardReader {
            cursor: RecordCursor::new(snap.file, snap.start, snap.end),
            market: market.to_string(),
            instrument: instrument.to_string(),
            after,
            done: false,
        })
    }

    /// Materialise every matching trade with `timestamp >= after`.
    pub fn get_all(&self, market: &str, instrument: &str, after: u64) -> Result<Vec<Trade>> {
        self.stream(market, instrument, after)?.collect()
    }

    /// First `n` matching trades with `timestamp >= after`.
    pub fn get_n(&self, market: &str, instrument: &str, after: u64, n: usize) -> Result<Vec<Trade>> {
        self.stream(market, instrument, after)?.take(n).collect()
    }

    fn snapshot(&self, after: u64) -> Result<Snapshot> {
        self.ensure_indexed()?;

        let st = self.state.read();
        let file = st.file.clone().ok_or_else(|| TickError::ShardClosed(self.name.clone()))?;
        // Seek to the last record strictly before `after` so records sharing
        // the `after` timestamp are never skipped.
        let start = match after.checked_sub(1) {
            Some(before) => st.index.search(before).map_or(0, |e| e.offset),
            None => 0,
        };
        Ok(Snapshot { file, start, end: st.meta.size })
    }

    /// Build the deferred index if it is still missing.
    ///
    /// Neither lock on the state is held during the scan, so metadata reads
    /// and other shards' queries proceed while a large file is indexed.
    fn ensure_indexed(&self) -> Result<()> {
        if self.state.read().indexed {
            return Ok(());
        }

        let _build = self.build.lock();
        let (file, end) = {
            let st = self.state.read();
            if st.indexed {
                return Ok(());
            }
            let file = st.file.clone().ok_or_else(|| TickError::ShardClosed(self.name.clone()))?;
            (file, st.meta.size)
        };

        // Appends wait on `ensure_indexed`, so `end` stays the file size
        // until the index is installed.
        let mut index = SkipList::new();
        let mut cursor = RecordCursor::new(file, 0, end);
        if let Err(e) = cursor.for_each_header(|offset, header| index.insert(header.ts, offset)) {
            warn!("shard {}: index build stopped at offset {}: {e}", self.name, cursor.offset());
        }
        debug!("shard {}: indexed {} records", self.name, index.len());

        let mut st = self.state.write();
        st.index = index;
        st.indexed = true;
        Ok(())
    }
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard").field("name", &self.name).field("meta", &self.meta()).finish()
    }
}

// ---------------------------------------------------------------------------
// Record cursor
// ---------------------------------------------------------------------------

/// Forward-only walker over the records in `[start, end)` of a shard file.
pub(crate) struct RecordCursor {
    reader: BufReader<SectionReader>,
    offset: u64,
    end: u64,
    payload: [u8; MAX_PAYLOAD_LEN],
}

impl RecordCursor {
    pub(crate) fn new(file: Arc<dyn ShardFile>, start: u64, end: u64) -> Self {
        Self {
            reader: BufReader::with_capacity(READ_BUFFER, SectionReader::new(file, start, end)),
            offset: start.min(end),
            end,
            payload: [0u8; MAX_PAYLOAD_LEN],
        }
    }

    /// Absolute offset of the next unread byte.
    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next header, or `None` exactly at the end of the range.
    fn next_header(&mut self) -> Result<Option<(u64, RecordHeader)>> {
        if self.offset == self.end {
            return Ok(None);
        }
        let at = self.offset;
        if self.end - at < HEADER_LEN as u64 {
            return Err(TickError::TruncatedRecord { offset: at });
        }

        let mut buf = [0u8; HEADER_LEN];
        self.reader.read_exact(&mut buf)?;
        let header = RecordHeader::decode(&buf)?;
        if self.end - at < header.record_len() {
            return Err(TickError::TruncatedRecord { offset: at });
        }
        self.offset += HEADER_LEN as u64;
        Ok(Some((at, header)))
    }

    fn read_payload(&mut self, header: &RecordHeader) -> Result<&[u8]> {
        let len = header.len as usize;
        self.reader.read_exact(&mut self.payload[..len])?;
        self.offset += len as u64;
        Ok(&self.payload[..len])
    }

    fn skip_payload(&mut self, header: &RecordHeader) -> Result<()> {
        let mut left = header.len as usize;
        while left > 0 {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                return Err(TickError::TruncatedRecord { offset: self.offset });
            }
            let n = buf.len().min(left);
            self.reader.consume(n);
            left -= n;
        }
        self.offset += header.len as u64;
        Ok(())
    }

    /// Walk every remaining header, skipping payloads.
    fn for_each_header(&mut self, mut f: impl FnMut(u64, RecordHeader)) -> Result<()> {
        while let Some((offset, header)) = self.next_header()? {
            self.skip_payload(&header)?;
            f(offset, header);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ShardReader
// ---------------------------------------------------------------------------

/// Lazy, forward-only iterator over one shard's matching trades.
///
/// Yields `Err` at most once, then ends.
pub struct ShardReader {
    cursor: RecordCursor,
    market: String,
    instrument: String,
    after: u64,
    done: bool,
}

impl ShardReader {
    fn step(&mut self) -> Result<Option<Trade>> {
        while let Some((_, header)) = self.cursor.next_header()? {
            if header.ts < self.after {
                self.cursor.skip_payload(&header)?;
                continue;
            }
            let trade = record::decode_payload(self.cursor.read_payload(&header)?)?;
            if trade.matches(&self.market, &self.instrument) {
                return Ok(Some(trade));
            }
        }
        Ok(None)
    }
}

impl Iterator for ShardReader {
    type Item = Result<Trade>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(trade)) => Some(Ok(trade)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
