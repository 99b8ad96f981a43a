//! # tick-core
//!
//! Core crate for the tick library, providing:
//!
//! - **Types** (`types`): `Trade`, `Direction`, `Candle`, timestamp normalisation
//! - **Configuration** (`config`): JSON config deserialization and validation
//! - **Error types** (`error`): domain-specific `TickError` via thiserror
//! - **Time utilities** (`time_util`): epoch clocks and bucket truncation
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;

pub use error::{Result, TickError};
// Re-export types at crate root for convenience.
pub use types::*;
