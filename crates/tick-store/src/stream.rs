//! Cancellable push-style trade stream.
//!
//! A producer thread drains a trade iterator into a bounded crossbeam channel;
//! the consumer pulls from the other end. Cancelling (explicitly, through a
//! [`CancelHandle`], or by dropping the stream) wakes the producer even while
//! it is blocked on a full channel, so an abandoned stream stops scanning
//! within one record.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, bounded, select};
use tick_core::{Result, Trade};
use tracing::debug;

/// Producer-to-consumer buffer size.
pub const STREAM_CAPACITY: usize = 1000;

/// Cloneable stop signal for a [`TradeStream`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    tx: Sender<()>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        if !self.flag.swap(true, Ordering::AcqRel) {
            let _ = self.tx.try_send(());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Trades produced on a background thread.
///
/// Iteration ends when the producer is exhausted, after the first error, or
/// once the stream is cancelled.
pub struct TradeStream {
    rx: Receiver<Result<Trade>>,
    cancel: CancelHandle,
    producer: Option<JoinHandle<()>>,
}

impl TradeStream {
    /// Run `source` on a new thread named `name`.
    pub fn spawn<I>(name: String, source: I) -> std::io::Result<Self>
    where
        I: Iterator<Item = Result<Trade>> + Send + 'static,
    {
        let (tx, rx) = bounded(STREAM_CAPACITY);
        let (cancel_tx, cancel_rx) = bounded(1);
        let cancel = CancelHandle { flag: Arc::new(AtomicBool::new(false)), tx: cancel_tx };

        let flag = cancel.flag.clone();
        let producer = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || produce(&name, source, &tx, &cancel_rx, &flag))?;

        Ok(Self { rx, cancel, producer: Some(producer) })
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True once the producer thread has exited.
    pub fn is_finished(&self) -> bool {
        self.producer.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Iterator for TradeStream {
    type Item = Result<Trade>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.rx.recv().ok()
    }
}

impl Drop for TradeStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn produce<I>(name: &str, source: I, tx: &Sender<Result<Trade>>, cancel_rx: &Receiver<()>, flag: &AtomicBool)
where
    I: Iterator<Item = Result<Trade>>,
{
    let mut sent = 0u64;
    for item in source {
        if flag.load(Ordering::Acquire) {
            break;
        }
        let last = item.is_err();
        select! {
            send(tx, item) -> res => {
                if res.is_err() {
                    break;
                }
            }
            recv(cancel_rx) -> _ => break,
        }
        sent += 1;
        if last {
            break;
        }
    }
    debug!("[{name}] producer exited after {sent} item(s)");
}
