//! Core data types: the trade record, its direction, and candle summaries.

pub mod enums;
pub mod trade;

pub use enums::*;
pub use trade::*;
