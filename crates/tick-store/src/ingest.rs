//! Channel-fed ingest worker.
//!
//! Feed handlers push normalised trades into a crossbeam channel; one worker
//! thread drains it into the library. The loop exits when every sender has
//! been dropped.

use crossbeam_channel::Receiver;
use tick_core::Trade;
use tracing::{info, warn};

use crate::library::Library;

/// Counters returned when the ingest loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub added: u64,
    pub failed: u64,
}

/// Run the ingest loop on the calling thread.
///
/// Failed appends are logged and counted; the loop keeps going.
pub fn run_ingest_loop(label: &str, library: &Library, rx: Receiver<Trade>) -> IngestStats {
    let mut stats = IngestStats::default();
    info!("[{label}] ingest loop started");

    while let Ok(trade) = rx.recv() {
        match library.add(&trade) {
            Ok(()) => stats.added += 1,
            Err(e) => {
                stats.failed += 1;
                warn!("[{label}] dropping {trade}: {e}");
            }
        }
    }

    info!("[{label}] ingest loop exited, added={} failed={}", stats.added, stats.failed);
    stats
}
