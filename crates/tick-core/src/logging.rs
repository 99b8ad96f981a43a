//! `tracing` subscriber setup for the runner.
//!
//! Human-readable events go to stderr; when a log directory is configured the
//! same events are also written as JSON lines to a daily file through a
//! non-blocking writer. `RUST_LOG` overrides the configured level.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Keeps the background file writer alive. Dropping it flushes pending lines.
pub type LogGuard = WorkerGuard;

/// Install the global subscriber.
///
/// Returns the file writer guard when `log_dir` is set; hold it until
/// shutdown. A second call leaves the first subscriber in place and only
/// reports it at debug level.
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str) -> Option<LogGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // stderr keeps stdout free for `query` output
    let console = fmt::layer().with_writer(std::io::stderr).with_target(true).with_thread_names(true);

    let (file, guard) = match log_dir {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, module_name));
            let layer = fmt::layer().json().with_writer(writer).with_current_span(false).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    if let Err(e) = tracing_subscriber::registry().with(filter).with(console).with(file).try_init() {
        tracing::debug!("subscriber already installed: {e}");
    }
    guard
}
