//! OHLCV aggregation over a time-ordered trade sequence.

use tick_core::time_util::bucket_start;
use tick_core::{Candle, Result, TickError, Trade};

/// Folds trades into fixed-width candles.
///
/// Input is expected in non-decreasing timestamp order. A trade that lands in
/// an earlier bucket than the current candle is folded into the current one
/// rather than reopening a finished candle.
#[derive(Debug)]
pub struct CandleAggregator {
    interval: u64,
    current: Option<Candle>,
    done: Vec<Candle>,
}

impl CandleAggregator {
    pub fn new(interval: u64) -> Result<Self> {
        if interval == 0 {
            return Err(TickError::Config("candle interval must be > 0".into()));
        }
        Ok(Self { interval, current: None, done: Vec::new() })
    }

    pub fn push(&mut self, trade: &Trade) {
        let bucket = bucket_start(trade.timestamp, self.interval);
        if let Some(c) = self.current.as_mut() {
            if bucket <= c.timestamp {
                c.update(trade);
                return;
            }
        }
        if let Some(prev) = self.current.replace(Candle::open_with(bucket, trade)) {
            self.done.push(prev);
        }
    }

    /// Completed candles plus the one still open.
    pub fn finish(mut self) -> Vec<Candle> {
        if let Some(c) = self.current.take() {
            self.done.push(c);
        }
        self.done
    }
}

/// Aggregate a fallible trade sequence, stopping at the first error.
pub fn aggregate<I>(trades: I, interval: u64) -> Result<Vec<Candle>>
where
    I: IntoIterator<Item = Result<Trade>>,
{
    let mut agg = CandleAggregator::new(interval)?;
    for trade in trades {
        agg.push(&trade?);
    }
    Ok(agg.finish())
}
