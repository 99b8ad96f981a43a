use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tick_core::config::LibraryConfig;
use tick_core::time_util::now_secs;
use tick_core::{Direction, TickError, Trade};
use tick_store::record::HEADER_LEN;
use tick_store::{Library, MemMedium, Medium, ShardFile, TradeStream, run_ingest_loop, spawn_reclaimer};

const MARKET: &str = "X";
const INSTRUMENT: &str = "Y";

fn trade(ts: u64) -> Trade {
    Trade {
        market: MARKET.into(),
        instrument: INSTRUMENT.into(),
        trade_id: format!("id-{ts}"),
        direction: if ts % 2 == 0 { Direction::Buy } else { Direction::Sell },
        amount: 100.0 + ts as f64 / 100.0,
        units: 0.5,
        timestamp: ts,
    }
}

fn timestamps(trades: &[Trade]) -> Vec<u64> {
    trades.iter().map(|t| t.timestamp).collect()
}

fn disk_library(dir: &Path) -> Library {
    Library::open(LibraryConfig::new(dir)).unwrap()
}

fn config_with_threshold(dir: &Path, threshold: u64) -> LibraryConfig {
    LibraryConfig { rotation_threshold_bytes: threshold, ..LibraryConfig::new(dir) }
}

#[test]
fn round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let lib = disk_library(dir.path());

    let t = Trade {
        market: "staging.ataas.io".into(),
        instrument: "TCFWAUD".into(),
        trade_id: "2394237".into(),
        direction: Direction::Sell,
        amount: 765.1324,
        units: 10.001,
        timestamp: 1_621_250_971,
    };
    lib.add(&t).unwrap();

    assert_eq!(lib.get_all("staging.ataas.io", "TCFWAUD", 0).unwrap(), vec![t.clone()]);
    assert_eq!(lib.get_since("staging.ataas.io", "TCFWAUD", t.timestamp - 1).unwrap(), vec![t]);
}

#[test]
fn scenario_100_200_300() {
    let dir = tempfile::tempdir().unwrap();
    let lib = disk_library(dir.path());
    for ts in [100, 200, 300] {
        lib.add(&trade(ts)).unwrap();
    }

    let got = lib.get_since(MARKET, INSTRUMENT, 150).unwrap();
    assert_eq!(timestamps(&got), vec![200, 300]);
}

#[test]
fn get_since_is_strictly_after() {
    let dir = tempfile::tempdir().unwrap();
    let lib = disk_library(dir.path());
    let all: Vec<u64> = (1..=50).map(|i| 1_000 + i * 7).collect();
    for &ts in &all {
        lib.add(&trade(ts)).unwrap();
    }

    for k in [0, 1, 17, 48, 49] {
        let got = lib.get_since(MARKET, INSTRUMENT, all[k]).unwrap();
        assert_eq!(timestamps(&got), all[k + 1..].to_vec(), "since t{k}");
    }
    assert_eq!(lib.get_since(MARKET, INSTRUMENT, 0).unwrap().len(), all.len());
}

#[test]
fn get_all_and_get_n_are_inclusive() {
    let dir = tempfile::tempdir().unwrap();
    let lib = disk_library(dir.path());
    for ts in [10, 20, 30, 40] {
        lib.add(&trade(ts)).unwrap();
    }

    assert_eq!(timestamps(&lib.get_all(MARKET, INSTRUMENT, 20).unwrap()), vec![20, 30, 40]);
    assert_eq!(timestamps(&lib.get_all(MARKET, INSTRUMENT, 0).unwrap()), vec![10, 20, 30, 40]);
    assert_eq!(timestamps(&lib.get_n(MARKET, INSTRUMENT, 20, 2).unwrap()), vec![20, 30]);
    assert!(lib.get_n(MARKET, INSTRUMENT, 0, 0).unwrap().is_empty());
}

#[test]
fn filters_market_and_instrument() {
    let dir = tempfile::tempdir().unwrap();
    let lib = disk_library(dir.path());
    for ts in 1..=30u64 {
        let mut t = trade(ts);
        match ts % 3 {
            0 => t.market = "other".into(),
            1 => t.instrument = "Z".into(),
            _ => {}
        }
        lib.add(&t).unwrap();
    }

    let got = lib.get_since(MARKET, INSTRUMENT, 0).unwrap();
    assert_eq!(got.len(), 10);
    assert!(got.iter().all(|t| t.matches(MARKET, INSTRUMENT)));
    assert!(lib.get_since("nowhere", INSTRUMENT, 0).unwrap().is_empty());
}

#[test]
fn equal_timestamps_are_all_returned() {
    let dir = tempfile::tempdir().unwrap();
    let lib = disk_library(dir.path());
    lib.add(&trade(10)).unwrap();
    for i in 0..5 {
        let mut t = trade(20);
        t.trade_id = format!("dup-{i}");
        lib.add(&t).unwrap();
    }
    lib.add(&trade(30)).unwrap();

    let got = lib.get_all(MARKET, INSTRUMENT, 20).unwrap();
    let ids: Vec<&str> = got.iter().map(|t| t.trade_id.as_str()).collect();
    assert_eq!(ids, vec!["dup-0", "dup-1", "dup-2", "dup-3", "dup-4", "id-30"]);
}

#[test]
fn rotation_spans_shards() {
    let dir = tempfile::tempdir().unwrap();
    let record_len = tick_store::record::encode_record(&trade(1_000)).unwrap().len() as u64;
    // Room for ten records per shard.
    let lib = Library::open(config_with_threshold(dir.path(), record_len * 10)).unwrap();

    let all: Vec<u64> = (1_000..1_015).collect();
    for &ts in &all {
        lib.add(&trade(ts)).unwrap();
    }

    let names = lib.shard_names();
    assert_eq!(names.len(), 2, "shards: {names:?}");
    for name in &names {
        assert!(dir.path().join(name).exists());
    }

    assert_eq!(timestamps(&lib.get_since(MARKET, INSTRUMENT, 999).unwrap()), all);
    assert_eq!(timestamps(&lib.get_since(MARKET, INSTRUMENT, 1_008).unwrap()), (1_009..1_015).collect::<Vec<_>>());
}

#[test]
fn discovery_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let lib = Library::open(config_with_threshold(dir.path(), 1)).unwrap();
        for ts in [100, 200, 300] {
            lib.add(&trade(ts)).unwrap();
        }
        lib.close().unwrap();
    }
    std::fs::write(dir.path().join("README"), b"not a shard").unwrap();
    std::fs::write(dir.path().join("trades_abc"), b"not a shard either").unwrap();

    let lib = disk_library(dir.path());
    assert_eq!(lib.shard_names(), vec!["trades_180", "trades_300", "trades_60"]);
    assert!(lib.stats().active.is_none());
    assert_eq!(timestamps(&lib.get_since(MARKET, INSTRUMENT, 150).unwrap()), vec![200, 300]);
}

#[test]
fn reactivated_bucket_appends() {
    let dir = tempfile::tempdir().unwrap();
    {
        let lib = disk_library(dir.path());
        lib.add(&trade(100)).unwrap();
        lib.close().unwrap();
    }

    let lib = disk_library(dir.path());
    lib.add(&trade(110)).unwrap();
    assert_eq!(lib.shard_names(), vec!["trades_60"]);
    assert_eq!(timestamps(&lib.get_all(MARKET, INSTRUMENT, 0).unwrap()), vec![100, 110]);
    assert_eq!(timestamps(&lib.get_since(MARKET, INSTRUMENT, 100).unwrap()), vec![110]);
}

#[test]
fn missing_directory_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let lib = disk_library(&nested);
    lib.add(&trade(1)).unwrap();
    assert!(nested.join("trades_0").exists());
}

#[test]
fn oversized_trade_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let lib = disk_library(dir.path());
    let mut t = trade(5);
    t.trade_id = "z".repeat(300);

    assert!(matches!(lib.add(&t), Err(TickError::RecordTooLarge { .. })));
    lib.add(&trade(6)).unwrap();
    assert_eq!(timestamps(&lib.get_all(MARKET, INSTRUMENT, 0).unwrap()), vec![6]);
}

#[test]
fn corrupt_length_fails_query() {
    let medium = Arc::new(MemMedium::new());
    let config = LibraryConfig::new("/lib");
    {
        let lib = Library::open_with_medium(config.clone(), medium.clone()).unwrap();
        lib.add(&trade(100)).unwrap();
        lib.add(&trade(101)).unwrap();
    }

    // Splice a header claiming a 9000-byte payload onto the shard.
    let file = medium.file(Path::new("/lib/trades_60")).unwrap();
    let mut bad = [0u8; HEADER_LEN];
    bad[..2].copy_from_slice(&9000u16.to_le_bytes());
    bad[2..].copy_from_slice(&102u64.to_le_bytes());
    file.append(&bad).unwrap();

    let lib = Library::open_with_medium(config, medium).unwrap();
    let err = lib.get_since(MARKET, INSTRUMENT, 0).unwrap_err();
    assert!(err.is_corruption(), "unexpected error {err}");

    // Reads that stop before the bad record still succeed.
    assert_eq!(timestamps(&lib.get_n(MARKET, INSTRUMENT, 0, 2).unwrap()), vec![100, 101]);

    let items: Vec<_> = lib.get_since_iter(MARKET, INSTRUMENT, 0).collect();
    assert_eq!(items.len(), 3);
    assert!(items[2].is_err());
}

#[test]
fn reclaim_removes_stale_shards() {
    let dir = tempfile::tempdir().unwrap();
    let lib = Library::open(config_with_threshold(dir.path(), 1)).unwrap();
    let now = 2_000_000;

    lib.add(&trade(1_000)).unwrap();
    lib.add(&trade(now - 60)).unwrap();
    assert_eq!(lib.shard_names().len(), 2);

    let report = lib.reclaim(now);
    assert_eq!(report.removed, vec!["trades_960".to_string()]);
    assert!(report.failed.is_empty());
    assert!(!dir.path().join("trades_960").exists());
    assert_eq!(timestamps(&lib.get_all(MARKET, INSTRUMENT, 0).unwrap()), vec![now - 60]);

    // Nothing left to do.
    assert!(lib.reclaim(now).is_empty());
}

#[test]
fn reclaim_clears_stale_active_shard() {
    let dir = tempfile::tempdir().unwrap();
    let lib = disk_library(dir.path());
    lib.add(&trade(1_000)).unwrap();
    assert_eq!(lib.stats().active.as_deref(), Some("trades_960"));

    let report = lib.reclaim(1_000 + 2 * 86_400);
    assert_eq!(report.removed.len(), 1);
    assert!(lib.stats().active.is_none());

    lib.add(&trade(200_000)).unwrap();
    assert_eq!(lib.shard_names(), vec!["trades_199980"]);
}

/// Medium whose removals fail until switched off.
struct StickyMedium {
    inner: MemMedium,
    fail_remove: AtomicBool,
}

impl Medium for StickyMedium {
    fn open(&self, path: &Path) -> io::Result<Arc<dyn ShardFile>> {
        self.inner.open(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        self.inner.remove(path)
    }

    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        self.inner.create_dir_all(dir)
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<String>> {
        self.inner.list(dir)
    }
}

#[test]
fn reclaim_failure_is_retried() {
    let medium = Arc::new(StickyMedium { inner: MemMedium::new(), fail_remove: AtomicBool::new(true) });
    let lib = Library::open_with_medium(LibraryConfig::new("/lib"), medium.clone()).unwrap();
    lib.add(&trade(1_000)).unwrap();
    let now = 1_000 + 2 * 86_400;

    let report = lib.reclaim(now);
    assert!(report.removed.is_empty());
    assert_eq!(report.failed, vec!["trades_960".to_string()]);
    assert_eq!(lib.shard_names(), vec!["trades_960"]);

    medium.fail_remove.store(false, Ordering::SeqCst);
    let report = lib.reclaim(now);
    assert_eq!(report.removed, vec!["trades_960".to_string()]);
    assert!(lib.shard_names().is_empty());
}

#[test]
fn reclaim_treats_missing_file_as_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let lib = disk_library(dir.path());
    lib.add(&trade(1_000)).unwrap();
    std::fs::remove_file(dir.path().join("trades_960")).unwrap();

    let report = lib.reclaim(1_000 + 2 * 86_400);
    assert_eq!(report.removed, vec!["trades_960".to_string()]);
    assert!(lib.shard_names().is_empty());
}

#[test]
fn stream_matches_get_since() {
    let dir = tempfile::tempdir().unwrap();
    let lib = disk_library(dir.path());
    for ts in 1..=3_000u64 {
        lib.add(&trade(ts)).unwrap();
    }

    let expected = lib.get_since(MARKET, INSTRUMENT, 1_000).unwrap();
    let streamed: Vec<Trade> =
        lib.get_since_stream(MARKET, INSTRUMENT, 1_000).unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(streamed, expected);
    assert_eq!(streamed.len(), 2_000);
}

#[test]
fn cancelled_stream_stops_producer() {
    let dir = tempfile::tempdir().unwrap();
    let lib = disk_library(dir.path());
    for ts in 1..=5_000u64 {
        lib.add(&trade(ts)).unwrap();
    }

    let mut stream = lib.get_since_stream(MARKET, INSTRUMENT, 0).unwrap();
    assert_eq!(stream.next().unwrap().unwrap().timestamp, 1);
    stream.cancel();
    assert!(stream.next().is_none());

    let deadline = Instant::now() + Duration::from_secs(5);
    while !stream.is_finished() {
        assert!(Instant::now() < deadline, "producer still running");
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Iterator wrapper that records when it is dropped.
struct DropFlag<I> {
    inner: I,
    dropped: Arc<AtomicBool>,
}

impl<I: Iterator> Iterator for DropFlag<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        self.inner.next()
    }
}

impl<I> Drop for DropFlag<I> {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[test]
fn dropping_stream_releases_producer() {
    let dir = tempfile::tempdir().unwrap();
    let lib = disk_library(dir.path());
    for ts in 1..=5_000u64 {
        lib.add(&trade(ts)).unwrap();
    }

    let dropped = Arc::new(AtomicBool::new(false));
    let source = DropFlag { inner: lib.get_since_iter(MARKET, INSTRUMENT, 0), dropped: dropped.clone() };
    let mut stream = TradeStream::spawn("drop-release".into(), source).unwrap();
    assert_eq!(stream.next().unwrap().unwrap().timestamp, 1);

    let handle = stream.cancel_handle();
    drop(stream);
    assert!(handle.is_cancelled());

    // The producer parks on the full channel; only the cancel wakes it, and
    // it drops the shard readers on the way out.
    let deadline = Instant::now() + Duration::from_secs(5);
    while !dropped.load(Ordering::SeqCst) {
        assert!(Instant::now() < deadline, "producer kept its source alive");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn dropped_iterator_leaves_library_usable() {
    let dir = tempfile::tempdir().unwrap();
    let lib = disk_library(dir.path());
    for ts in 1..=100u64 {
        lib.add(&trade(ts)).unwrap();
    }
    {
        let mut iter = lib.get_since_iter(MARKET, INSTRUMENT, 0);
        assert_eq!(iter.next().unwrap().unwrap().timestamp, 1);
    }
    lib.add(&trade(101)).unwrap();
    assert_eq!(lib.get_since(MARKET, INSTRUMENT, 0).unwrap().len(), 101);
}

#[test]
fn candles_from_library() {
    let dir = tempfile::tempdir().unwrap();
    let lib = disk_library(dir.path());
    for ts in [60, 70, 130, 170] {
        lib.add(&trade(ts)).unwrap();
    }

    let candles = lib.candles(MARKET, INSTRUMENT, 0, 60).unwrap();
    assert_eq!(candles.len(), 2);
    assert_eq!(candles[0].timestamp, 60);
    assert_eq!(candles[0].open, trade(60).amount);
    assert_eq!(candles[0].close, trade(70).amount);
    assert_eq!(candles[1].timestamp, 120);
    assert!((candles[1].volume - 1.0).abs() < 1e-9);

    assert!(matches!(lib.candles(MARKET, INSTRUMENT, 0, 0), Err(TickError::Config(_))));
}

#[test]
fn ingest_loop_drains_channel() {
    let dir = tempfile::tempdir().unwrap();
    let lib = disk_library(dir.path());
    let (tx, rx) = crossbeam_channel::unbounded();

    for ts in 1..=10u64 {
        tx.send(trade(ts)).unwrap();
    }
    let mut big = trade(11);
    big.trade_id = "q".repeat(400);
    tx.send(big).unwrap();
    drop(tx);

    let stats = run_ingest_loop("test", &lib, rx);
    assert_eq!(stats.added, 10);
    assert_eq!(stats.failed, 1);
    assert_eq!(lib.get_all(MARKET, INSTRUMENT, 0).unwrap().len(), 10);
}

#[test]
fn concurrent_readers_and_writer() {
    let dir = tempfile::tempdir().unwrap();
    let lib = Arc::new(disk_library(dir.path()));
    lib.add(&trade(1)).unwrap();

    let writer = {
        let lib = lib.clone();
        std::thread::spawn(move || {
            for ts in 2..=2_000u64 {
                lib.add(&trade(ts)).unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let lib = lib.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let got = lib.get_all(MARKET, INSTRUMENT, 0).unwrap();
                    // Every snapshot is a gap-free prefix.
                    assert!(timestamps(&got).iter().copied().eq(1..=got.len() as u64));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(lib.get_all(MARKET, INSTRUMENT, 0).unwrap().len(), 2_000);
}

#[tokio::test]
async fn reclaimer_task_runs_until_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let lib = Arc::new(disk_library(dir.path()));
    let old = now_secs() - 3 * 86_400;
    lib.add(&trade(old)).unwrap();
    assert_eq!(lib.shard_names().len(), 1);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = spawn_reclaimer(lib.clone(), Duration::from_millis(20), shutdown_rx);

    let deadline = Instant::now() + Duration::from_secs(5);
    while !lib.shard_names().is_empty() {
        assert!(Instant::now() < deadline, "stale shard never reclaimed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

/// File whose reads stall while `slow` is set.
struct SlowFile {
    inner: Arc<dyn ShardFile>,
    slow: Arc<AtomicBool>,
}

impl ShardFile for SlowFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if self.slow.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(10));
        }
        self.inner.read_at(buf, offset)
    }

    fn append(&self, buf: &[u8]) -> io::Result<()> {
        self.inner.append(buf)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        self.inner.set_len(len)
    }

    fn sync(&self) -> io::Result<()> {
        self.inner.sync()
    }

    fn len(&self) -> io::Result<u64> {
        self.inner.len()
    }
}

struct SlowMedium {
    inner: MemMedium,
    slow: Arc<AtomicBool>,
}

impl Medium for SlowMedium {
    fn open(&self, path: &Path) -> io::Result<Arc<dyn ShardFile>> {
        Ok(Arc::new(SlowFile { inner: self.inner.open(path)?, slow: self.slow.clone() }))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.inner.remove(path)
    }

    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        self.inner.create_dir_all(dir)
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<String>> {
        self.inner.list(dir)
    }
}

#[test]
fn registry_not_blocked_by_index_build() {
    let medium = Arc::new(SlowMedium { inner: MemMedium::new(), slow: Arc::new(AtomicBool::new(false)) });
    let config = LibraryConfig::new("/lib");
    {
        let lib = Library::open_with_medium(config.clone(), medium.clone()).unwrap();
        for ts in 1..=3_000u64 {
            lib.add(&trade(ts)).unwrap();
        }
    }

    // Reopened shards index lazily, on a now slow file.
    let lib = Arc::new(Library::open_with_medium(config, medium.clone()).unwrap());
    medium.slow.store(true, Ordering::SeqCst);

    let first = {
        let lib = lib.clone();
        std::thread::spawn(move || lib.get_all(MARKET, INSTRUMENT, 0).unwrap().len())
    };
    std::thread::sleep(Duration::from_millis(50));
    let second = {
        let lib = lib.clone();
        std::thread::spawn(move || lib.get_since(MARKET, INSTRUMENT, 2_990).unwrap().len())
    };
    std::thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    assert_eq!(lib.shard_names(), vec!["trades_0"]);
    assert_eq!(lib.stats().shards, 1);
    let waited = started.elapsed();
    assert!(waited < Duration::from_millis(150), "registry calls waited {waited:?}");

    assert_eq!(first.join().unwrap(), 3_000);
    assert_eq!(second.join().unwrap(), 10);
}

/// File that tears appends and refuses truncation while `fail` is set.
struct TornFile {
    inner: Arc<dyn ShardFile>,
    fail: Arc<AtomicBool>,
}

impl ShardFile for TornFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.inner.read_at(buf, offset)
    }

    fn append(&self, buf: &[u8]) -> io::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            self.inner.append(&buf[..buf.len().min(5)])?;
            return Err(io::Error::other("device lost"));
        }
        self.inner.append(buf)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::other("device lost"));
        }
        self.inner.set_len(len)
    }

    fn sync(&self) -> io::Result<()> {
        self.inner.sync()
    }

    fn len(&self) -> io::Result<u64> {
        self.inner.len()
    }
}

struct TornMedium {
    inner: MemMedium,
    fail: Arc<AtomicBool>,
}

impl Medium for TornMedium {
    fn open(&self, path: &Path) -> io::Result<Arc<dyn ShardFile>> {
        Ok(Arc::new(TornFile { inner: self.inner.open(path)?, fail: self.fail.clone() }))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.inner.remove(path)
    }

    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        self.inner.create_dir_all(dir)
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<String>> {
        self.inner.list(dir)
    }
}

#[test]
fn torn_shard_is_replaced_by_a_fresh_one() {
    let medium = Arc::new(TornMedium { inner: MemMedium::new(), fail: Arc::new(AtomicBool::new(false)) });
    let lib = Library::open_with_medium(LibraryConfig::new("/lib"), medium.clone()).unwrap();
    lib.add(&trade(100)).unwrap();

    medium.fail.store(true, Ordering::SeqCst);
    assert!(matches!(lib.add(&trade(110)), Err(TickError::Io(_))));
    assert!(lib.stats().active.is_none());
    medium.fail.store(false, Ordering::SeqCst);

    lib.add(&trade(120)).unwrap();
    assert_eq!(lib.shard_names(), vec!["trades_60", "trades_61"]);
    assert_eq!(lib.stats().active.as_deref(), Some("trades_61"));
    assert_eq!(timestamps(&lib.get_all(MARKET, INSTRUMENT, 0).unwrap()), vec![100, 120]);

    // Reopening sees the torn tail and still refuses to append to it.
    drop(lib);
    let lib = Library::open_with_medium(LibraryConfig::new("/lib"), medium).unwrap();
    lib.add(&trade(115)).unwrap();
    assert_eq!(lib.stats().active.as_deref(), Some("trades_61"));
}
