//! # tick-runner
//!
//! Command-line front end for the tick library.
//!
//! - `serve` opens the library, starts the background reclaimer and ingests
//!   newline-delimited JSON trades from stdin until EOF or Ctrl+C.
//! - `query` prints stored trades (or candles) as JSON lines.
//!
//! # Usage
//!
//! ```bash
//! feed | tick-runner serve config.json --log-level info
//! tick-runner query config.json --market binance --instrument BTCUSDT --since 1700000000 --limit 100
//! tick-runner query config.json --market binance --instrument BTCUSDT --candles 60
//! ```

use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::Sender;
use tick_core::config::AppConfig;
use tick_core::logging::{LogGuard, init_logging};
use tick_core::{Trade, normalize_timestamp};
use tick_store::{Library, run_ingest_loop, spawn_reclaimer};
use tracing::{error, info, warn};

/// Buffered trades between the stdin reader and the ingest worker.
const INGEST_CAPACITY: usize = 10_000;

/// Period of the library stats log line.
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Tick library ingest and query tool.
#[derive(Parser)]
#[command(name = "tick-runner", about = "Tick library ingest and query tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Optional log directory for file output; overrides `service.log_path`.
    #[arg(long, global = true)]
    log_dir: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest JSON trades from stdin.
    Serve {
        /// Configuration file path (JSON).
        config: PathBuf,
    },
    /// Print stored trades as JSON lines.
    Query {
        /// Configuration file path (JSON).
        config: PathBuf,

        #[arg(long)]
        market: String,

        #[arg(long)]
        instrument: String,

        /// Only trades strictly after this timestamp (seconds).
        #[arg(long, default_value_t = 0)]
        since: u64,

        /// Only trades at or before this timestamp (seconds).
        #[arg(long)]
        until: Option<u64>,

        /// Maximum number of trades to print.
        #[arg(long)]
        limit: Option<usize>,

        /// Print OHLCV candles of this many seconds instead of trades.
        #[arg(long)]
        candles: Option<u64>,

        /// Blank market, instrument and trade id in the output.
        #[arg(long)]
        redact: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { ref config } => {
            let (config, _log_guard) = load(config, &cli)?;
            serve(config).await
        }
        Command::Query { ref config, ref market, ref instrument, since, until, limit, candles, redact } => {
            let (config, _log_guard) = load(config, &cli)?;
            query(config, market, instrument, since, until, limit, candles, redact)
        }
    }
}

/// Load the config and initialise logging from it. The returned guard must
/// outlive the command so buffered file logs are flushed.
fn load(path: &Path, cli: &Cli) -> Result<(AppConfig, Option<LogGuard>)> {
    let config = tick_core::config::load_config(path).with_context(|| format!("loading {}", path.display()))?;
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    let guard = init_logging(&cli.log_level, log_dir.as_deref(), &config.module_name());
    info!(
        "tick-runner starting — config={}, library={}, log_level={}",
        path.display(),
        config.library.directory.display(),
        cli.log_level
    );
    Ok((config, guard))
}

async fn serve(config: AppConfig) -> Result<()> {
    // 1. Open the library
    let library = Arc::new(Library::open(config.library.clone())?);
    let stats = library.stats();
    info!("library ready — {} shard(s), {} bytes", stats.shards, stats.total_bytes);

    // 2. Background reclamation
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let reclaimer = spawn_reclaimer(library.clone(), config.library.reclaim_interval(), shutdown_rx);

    // 3. Ingest worker on a dedicated thread
    let (trade_tx, trade_rx) = crossbeam_channel::bounded::<Trade>(INGEST_CAPACITY);
    let (done_tx, mut done_rx) = tokio::sync::oneshot::channel();
    let ingest_lib = library.clone();
    std::thread::Builder::new().name("tick-ingest".into()).spawn(move || {
        let stats = run_ingest_loop("ingest", &ingest_lib, trade_rx);
        let _ = done_tx.send(stats);
    })?;

    // 4. Stdin reader; dropping its sender on EOF ends the ingest loop
    std::thread::Builder::new().name("tick-stdin".into()).spawn(move || {
        let (read, rejected) = read_trades(std::io::stdin().lock(), &trade_tx);
        info!("stdin closed — {read} trade(s) read, {rejected} rejected");
    })?;

    info!("serving — press Ctrl+C to stop");

    // 5. Wait for EOF or a shutdown signal
    let mut stats_tick = tokio::time::interval(STATS_INTERVAL);
    stats_tick.tick().await;
    loop {
        tokio::select! {
            res = &mut done_rx => {
                match res {
                    Ok(s) => info!("ingest finished — added={}, failed={}", s.added, s.failed),
                    Err(_) => error!("ingest worker exited without reporting"),
                }
                break;
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!("failed to listen for Ctrl+C: {e}");
                }
                info!("shutdown signal received");
                break;
            }
            _ = stats_tick.tick() => {
                let s = library.stats();
                info!("library — shards={}, bytes={}, active={:?}", s.shards, s.total_bytes, s.active);
            }
        }
    }

    // 6. Stop background work and release every shard
    let _ = shutdown_tx.send(true);
    if let Err(e) = reclaimer.await {
        error!("reclaimer task failed: {e}");
    }
    library.close()?;

    info!("tick-runner stopped — goodbye");
    Ok(())
}

/// Parse JSON lines from `input` into `tx` until EOF or the receiver goes
/// away. Returns `(accepted, rejected)` line counts.
fn read_trades(input: impl BufRead, tx: &Sender<Trade>) -> (u64, u64) {
    let (mut accepted, mut rejected) = (0u64, 0u64);
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("stdin read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_trade(&line) {
            Ok(trade) => {
                if tx.send(trade).is_err() {
                    break;
                }
                accepted += 1;
            }
            Err(e) => {
                rejected += 1;
                warn!("skipping malformed trade: {e}");
            }
        }
    }
    (accepted, rejected)
}

/// Decode one JSON trade and normalise its timestamp to seconds.
fn parse_trade(line: &str) -> Result<Trade> {
    let mut trade: Trade = serde_json::from_str(line)?;
    trade.timestamp = normalize_timestamp(trade.timestamp);
    Ok(trade)
}

#[allow(clippy::too_many_arguments)]
fn query(
    config: AppConfig,
    market: &str,
    instrument: &str,
    since: u64,
    until: Option<u64>,
    limit: Option<usize>,
    candles: Option<u64>,
    redact: bool,
) -> Result<()> {
    let library = Library::open(config.library)?;
    let mut out = BufWriter::new(std::io::stdout().lock());

    if let Some(interval) = candles {
        let candles = library.candles(market, instrument, since, interval)?;
        for candle in candles.iter().take(limit.unwrap_or(usize::MAX)) {
            serde_json::to_writer(&mut out, candle)?;
            writeln!(out)?;
        }
        info!("printed {} candle(s)", candles.len().min(limit.unwrap_or(usize::MAX)));
    } else {
        let mut trades = match (until, limit) {
            (Some(until), _) => library.get_range(market, instrument, since, until)?,
            (None, Some(n)) => library.get_since_iter(market, instrument, since).take(n).collect::<tick_core::Result<Vec<Trade>>>()?,
            (None, None) => library.get_since(market, instrument, since)?,
        };
        if let Some(n) = limit {
            trades.truncate(n);
        }
        for trade in &trades {
            if redact {
                serde_json::to_writer(&mut out, &trade.redacted())?;
            } else {
                serde_json::to_writer(&mut out, trade)?;
            }
            writeln!(out)?;
        }
        info!("printed {} trade(s)", trades.len());
    }

    out.flush()?;
    library.close()?;
    Ok(())
}
