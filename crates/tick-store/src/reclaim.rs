//! Background retention task.

use std::sync::Arc;
use std::time::Duration;

use tick_core::time_util::now_secs;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::library::Library;

/// Run [`Library::reclaim`] every `interval` until `shutdown` flips to `true`
/// (or its sender is dropped).
///
/// Each pass runs on the blocking pool. A panicking pass is logged and the
/// loop carries on with the next tick.
pub fn spawn_reclaimer(library: Arc<Library>, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        info!("[reclaimer] started, interval={interval:?}");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let lib = library.clone();
            match tokio::task::spawn_blocking(move || lib.reclaim(now_secs())).await {
                Ok(report) if report.is_empty() => debug!("[reclaimer] nothing to reclaim"),
                Ok(report) => info!("[reclaimer] removed={:?} failed={:?}", report.removed, report.failed),
                Err(e) => error!("[reclaimer] pass aborted: {e}"),
            }
        }

        info!("[reclaimer] stopped");
    })
}
