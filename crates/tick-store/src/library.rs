//! The library: a directory of shards managed as one time-ordered trade store.
//!
//! # Lifecycle
//!
//! 1. [`Library::open`] creates the directory if needed and registers every
//!    `trades_<digits>` file found there.
//! 2. [`Library::add`] appends to the active shard, opening a new one named
//!    after the trade's bucket when none is active, and seals the active shard
//!    once it reaches the rotation threshold. When the bucket's shard is
//!    already full the suffix is stepped: `trades_<bucket+1>`,
//!    `trades_<bucket+2>` and so on. A stepped suffix is only a name that
//!    sorts after its predecessor, not a bucket start; queries always use the
//!    time range read from the records, and an empty shard ages from the
//!    bucket its suffix falls in.
//! 3. Queries pick shards by their cached time range and chain per-shard
//!    readers in ascending `start_time` order.
//! 4. [`Library::reclaim`] deletes shards whose newest trade has aged out of
//!    the retention window.
//!
//! # Locking
//!
//! The registry mutex guards only the name map and the active pointer. It is
//! held just long enough to clone shard handles; shard metadata reads, file
//! opens and scans all happen after it is released, so a shard busy building
//! its index never stalls unrelated callers. When both are needed the
//! registry lock is taken before a shard lock.
//!
//! # Ordering
//!
//! Results are ordered by shard `start_time`, then by position in each file.
//! With several producers writing out of timestamp order the output is only
//! approximately sorted; it is never re-sorted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use tick_core::config::LibraryConfig;
use tick_core::time_util::bucket_start;
use tick_core::{Candle, Result, TickError, Trade};
use tracing::{debug, info, warn};

use crate::candles;
use crate::file::{DiskMedium, Medium};
use crate::shard::{Shard, ShardReader, parse_shard_name, shard_name};
use crate::stream::TradeStream;

#[derive(Default)]
struct Registry {
    shards: AHashMap<String, Arc<Shard>>,
    active: Option<Arc<Shard>>,
}

/// Outcome of one reclamation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    /// Shards deleted and unregistered.
    pub removed: Vec<String>,
    /// Stale shards whose deletion failed; retried next pass.
    pub failed: Vec<String>,
}

impl ReclaimReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.failed.is_empty()
    }
}

/// Registry-level counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryStats {
    pub shards: usize,
    pub total_bytes: u64,
    pub active: Option<String>,
}

/// A set of shards in one directory.
pub struct Library {
    directory: PathBuf,
    config: LibraryConfig,
    medium: Arc<dyn Medium>,
    registry: Mutex<Registry>,
}

impl Library {
    /// Open the library on the local filesystem.
    pub fn open(config: LibraryConfig) -> Result<Self> {
        Self::open_with_medium(config, Arc::new(DiskMedium))
    }

    /// Open the library on an arbitrary [`Medium`].
    ///
    /// Failing to create or list the directory is fatal. Shard files that
    /// cannot be loaded are skipped with a warning.
    pub fn open_with_medium(config: LibraryConfig, medium: Arc<dyn Medium>) -> Result<Self> {
        config.validate()?;
        let directory = config.directory.clone();
        medium.create_dir_all(&directory)?;

        let mut names = medium.list(&directory)?;
        names.retain(|n| parse_shard_name(n).is_some());
        names.sort();

        let mut registry = Registry::default();
        for name in names {
            match Shard::load(medium.clone(), directory.join(&name)) {
                Ok(shard) => {
                    debug!("discovered shard {name} ({} bytes)", shard.size());
                    registry.shards.insert(name, Arc::new(shard));
                }
                Err(e) => warn!("skipping shard {name}: {e}"),
            }
        }

        info!("library opened at {} with {} shard(s)", directory.display(), registry.shards.len());

        Ok(Self { directory, config, medium, registry: Mutex::new(registry) })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    /// Registered shard names, sorted.
    pub fn shard_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.lock().shards.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn stats(&self) -> LibraryStats {
        let (shards, active) = self.registered();
        LibraryStats {
            shards: shards.len(),
            total_bytes: shards.iter().map(|s| s.size()).sum(),
            active: active.map(|s| s.name().to_string()),
        }
    }

    /// Handles to every registered shard and the active one.
    fn registered(&self) -> (Vec<Arc<Shard>>, Option<Arc<Shard>>) {
        let reg = self.registry.lock();
        (reg.shards.values().cloned().collect(), reg.active.clone())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Append one trade.
    ///
    /// The caller normalises `trade.timestamp` to seconds beforehand.
    pub fn add(&self, trade: &Trade) -> Result<()> {
        let shard = self.active_shard(trade.timestamp)?;
        if let Err(e) = shard.append(trade) {
            if shard.is_poisoned() && self.deactivate(&shard) {
                warn!("shard {} is read-only, next trade opens a new shard", shard.name());
            }
            return Err(e);
        }

        if shard.size() >= self.config.rotation_threshold_bytes {
            self.seal(&shard)?;
        }
        Ok(())
    }

    /// Active shard, creating or reactivating one when none is active.
    ///
    /// A registered shard that is full or poisoned is never reactivated; the
    /// name suffix is stepped instead so the new shard sorts right after it.
    /// Opening and loading run without the registry lock; if another writer
    /// installs a shard meanwhile, that one wins.
    fn active_shard(&self, ts: u64) -> Result<Arc<Shard>> {
        let mut suffix = bucket_start(ts, self.config.bucket_secs);
        loop {
            let name = shard_name(suffix);
            let existing = {
                let reg = self.registry.lock();
                if let Some(active) = &reg.active {
                    return Ok(active.clone());
                }
                reg.shards.get(&name).cloned()
            };

            let (shard, reactivated) = match existing {
                Some(shard) if shard.size() < self.config.rotation_threshold_bytes && !shard.is_poisoned() => {
                    shard.open()?;
                    (shard, true)
                }
                Some(_) => {
                    suffix = suffix
                        .checked_add(1)
                        .ok_or_else(|| TickError::Config(format!("no free shard name after {name}")))?;
                    continue;
                }
                None => (Arc::new(Shard::load(self.medium.clone(), self.directory.join(&name))?), false),
            };

            let mut reg = self.registry.lock();
            if let Some(active) = &reg.active {
                return Ok(active.clone());
            }
            let registered = reg.shards.get(&name).map(|current| Arc::ptr_eq(current, &shard));
            match (registered, reactivated) {
                (Some(true), true) => info!("reactivated shard {name} ({} bytes)", shard.size()),
                (None, false) => {
                    info!("opened new shard {name}");
                    reg.shards.insert(name, shard.clone());
                }
                // Registered or reclaimed under us; look again.
                _ => continue,
            }
            reg.active = Some(shard.clone());
            return Ok(shard);
        }
    }

    /// Stop appending to `shard` if it is the active one.
    fn deactivate(&self, shard: &Arc<Shard>) -> bool {
        let mut reg = self.registry.lock();
        if reg.active.as_ref().is_some_and(|a| Arc::ptr_eq(a, shard)) {
            reg.active = None;
            return true;
        }
        false
    }

    /// Flush a full shard and stop appending to it.
    fn seal(&self, shard: &Arc<Shard>) -> Result<()> {
        let flushed = shard.flush();
        if self.deactivate(shard) {
            info!("sealed shard {} at {} bytes", shard.name(), shard.size());
        }
        flushed
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Shards that may hold trades in `[after, until]`, by ascending start.
    fn select(&self, after: u64, until: Option<u64>) -> Vec<Arc<Shard>> {
        let (shards, _) = self.registered();
        let mut picked: Vec<(u64, Arc<Shard>)> = shards
            .into_iter()
            .filter_map(|shard| {
                let meta = shard.meta();
                let (start, last) = (meta.start_time?, meta.last_time?);
                if last < after || until.is_some_and(|u| start > u) {
                    return None;
                }
                Some((start, shard))
            })
            .collect();

        picked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.name().cmp(b.1.name())));
        picked.into_iter().map(|(_, shard)| shard).collect()
    }

    fn iter_from(&self, market: &str, instrument: &str, after: u64, until: Option<u64>) -> TradeIter {
        let shards = self.select(after, until);
        debug!("query {market}:{instrument} after={after} until={until:?} over {} shard(s)", shards.len());
        TradeIter::over(shards, market, instrument, after, until)
    }

    /// Trades with `timestamp > since`, in shard order.
    pub fn get_since(&self, market: &str, instrument: &str, since: u64) -> Result<Vec<Trade>> {
        self.get_since_iter(market, instrument, since).collect()
    }

    /// Lazy form of [`get_since`](Self::get_since). Dropping the iterator
    /// stops the scan.
    pub fn get_since_iter(&self, market: &str, instrument: &str, since: u64) -> TradeIter {
        match since.checked_add(1) {
            Some(after) => self.iter_from(market, instrument, after, None),
            // Nothing is newer than `u64::MAX`.
            None => TradeIter::over(Vec::new(), market, instrument, since, None),
        }
    }

    /// [`get_since`](Self::get_since) produced on a background thread.
    pub fn get_since_stream(&self, market: &str, instrument: &str, since: u64) -> Result<TradeStream> {
        let iter = self.get_since_iter(market, instrument, since);
        Ok(TradeStream::spawn(format!("stream-{market}-{instrument}"), iter)?)
    }

    /// Trades with `timestamp >= since`.
    pub fn get_all(&self, market: &str, instrument: &str, since: u64) -> Result<Vec<Trade>> {
        self.iter_from(market, instrument, since, None).collect()
    }

    /// The first `n` trades with `timestamp >= since`.
    pub fn get_n(&self, market: &str, instrument: &str, since: u64, n: usize) -> Result<Vec<Trade>> {
        self.iter_from(market, instrument, since, None).take(n).collect()
    }

    /// Trades with `since < timestamp <= until`.
    pub fn get_range(&self, market: &str, instrument: &str, since: u64, until: u64) -> Result<Vec<Trade>> {
        if until <= since {
            return Ok(Vec::new());
        }
        self.iter_from(market, instrument, since + 1, Some(until)).collect()
    }

    /// OHLCV candles of `interval` seconds over trades after `since`.
    pub fn candles(&self, market: &str, instrument: &str, since: u64, interval: u64) -> Result<Vec<Candle>> {
        candles::aggregate(self.get_since_iter(market, instrument, since), interval)
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Delete every shard whose newest trade is older than the retention
    /// window ending at `now`. Empty shards age from the start of the bucket
    /// their name suffix falls in.
    ///
    /// Files are closed and removed outside the registry lock; only confirmed
    /// deletions (including files already gone) are unregistered.
    pub fn reclaim(&self, now: u64) -> ReclaimReport {
        let cutoff = now.saturating_sub(self.config.retention_secs);
        let bucket_secs = self.config.bucket_secs;

        let (shards, active) = self.registered();
        let stale: Vec<Arc<Shard>> = shards
            .into_iter()
            .filter(|s| s.last_time().unwrap_or_else(|| bucket_start(s.bucket(), bucket_secs)) < cutoff)
            .collect();

        let mut report = ReclaimReport::default();
        if stale.is_empty() {
            return report;
        }
        if let Some(active) = active.filter(|a| stale.iter().any(|s| Arc::ptr_eq(a, s))) {
            self.deactivate(&active);
        }

        for shard in &stale {
            if let Err(e) = shard.close() {
                warn!("reclaim: closing {} failed: {e}", shard.name());
            }
            match self.medium.remove(shard.path()) {
                Ok(()) => report.removed.push(shard.name().to_string()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("reclaim: {} already gone", shard.name());
                    report.removed.push(shard.name().to_string());
                }
                Err(e) => {
                    warn!("reclaim: removing {} failed: {e}", shard.path().display());
                    report.failed.push(shard.name().to_string());
                }
            }
        }

        {
            let mut reg = self.registry.lock();
            for name in &report.removed {
                if let Some(shard) = reg.shards.remove(name) {
                    if reg.active.as_ref().is_some_and(|a| Arc::ptr_eq(a, &shard)) {
                        reg.active = None;
                    }
                }
            }
        }

        info!(
            "reclaim: cutoff={cutoff} removed {} shard(s), {} failed",
            report.removed.len(),
            report.failed.len()
        );
        report
    }

    /// Close every shard. All shards are attempted; the first error is
    /// returned.
    pub fn close(&self) -> Result<()> {
        let shards: Vec<Arc<Shard>> = {
            let mut reg = self.registry.lock();
            reg.active = None;
            reg.shards.values().cloned().collect()
        };

        let mut first_err = None;
        for shard in shards {
            if let Err(e) = shard.close() {
                warn!("closing {} failed: {e}", shard.name());
                first_err.get_or_insert(e);
            }
        }
        info!("library at {} closed", self.directory.display());
        first_err.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").field("directory", &self.directory).field("stats", &self.stats()).finish()
    }
}

// ---------------------------------------------------------------------------
// TradeIter
// ---------------------------------------------------------------------------

/// Pull-based iterator over trades from several shards.
///
/// A failing shard yields its error and the iterator continues with the next
/// shard; collecting into `Result<Vec<_>>` stops at the first error. Shards
/// closed since selection (reclaimed) are skipped.
pub struct TradeIter {
    shards: std::vec::IntoIter<Arc<Shard>>,
    current: Option<ShardReader>,
    market: String,
    instrument: String,
    after: u64,
    until: Option<u64>,
}

impl TradeIter {
    fn over(shards: Vec<Arc<Shard>>, market: &str, instrument: &str, after: u64, until: Option<u64>) -> Self {
        Self {
            shards: shards.into_iter(),
            current: None,
            market: market.to_string(),
            instrument: instrument.to_string(),
            after,
            until,
        }
    }
}

impl Iterator for TradeIter {
    type Item = Result<Trade>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(reader) = self.current.as_mut() {
                match reader.next() {
                    Some(Ok(trade)) => {
                        if self.until.is_some_and(|u| trade.timestamp > u) {
                            continue;
                        }
                        return Some(Ok(trade));
                    }
                    Some(Err(e)) => {
                        self.current = None;
                        return Some(Err(e));
                    }
                    None => self.current = None,
                }
            }

            let shard = self.shards.next()?;
            match shard.stream(&self.market, &self.instrument, self.after) {
                Ok(reader) => self.current = Some(reader),
                Err(TickError::ShardClosed(name)) => debug!("skipping closed shard {name}"),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
