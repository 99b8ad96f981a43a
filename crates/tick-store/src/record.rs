//! On-disk record codec.
//!
//! ```text
//! ┌──────────────┬───────────────┬──────────────────────────────────┐
//! │ payload len  │ timestamp     │ payload                          │
//! │ u16 LE (2 B) │ u64 LE (8 B)  │ MessagePack map, named fields    │
//! └──────────────┴───────────────┴──────────────────────────────────┘
//! ```
//!
//! The timestamp is duplicated in the header so scans can skip records
//! without decoding payloads. Payloads are capped at [`MAX_PAYLOAD_LEN`];
//! anything larger on disk is treated as corruption.

use tick_core::{Result, TickError, Trade};

/// Fixed header size in bytes.
pub const HEADER_LEN: usize = 10;

/// Largest payload a valid record may carry.
pub const MAX_PAYLOAD_LEN: usize = 150;

/// Decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub len: u16,
    pub ts: u64,
}

impl RecordHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[..2].copy_from_slice(&self.len.to_le_bytes());
        buf[2..].copy_from_slice(&self.ts.to_le_bytes());
        buf
    }

    /// Parse and bound-check a header.
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self> {
        let len = u16::from_le_bytes([buf[0], buf[1]]);
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&buf[2..]);
        let header = Self { len, ts: u64::from_le_bytes(ts) };

        if header.len as usize > MAX_PAYLOAD_LEN {
            return Err(TickError::Decode(format!(
                "record length {} outside of standard bounds ({MAX_PAYLOAD_LEN})",
                header.len
            )));
        }
        Ok(header)
    }

    /// Header plus payload size.
    #[inline]
    pub fn record_len(&self) -> u64 {
        HEADER_LEN as u64 + self.len as u64
    }
}

/// Serialize a trade into a MessagePack payload with field names.
pub fn encode_payload(trade: &Trade) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(trade).map_err(|e| TickError::Encode(e.to_string()))
}

pub fn decode_payload(payload: &[u8]) -> Result<Trade> {
    rmp_serde::from_slice(payload).map_err(|e| TickError::Decode(format!("failed to decode record: {e}")))
}

/// Build a complete record (header + payload) for `trade`.
///
/// Fails with [`TickError::RecordTooLarge`] rather than writing a record that
/// readers would reject.
pub fn encode_record(trade: &Trade) -> Result<Vec<u8>> {
    let payload = encode_payload(trade)?;
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(TickError::RecordTooLarge { len: payload.len(), max: MAX_PAYLOAD_LEN });
    }

    let header = RecordHeader { len: payload.len() as u16, ts: trade.timestamp };
    let mut record = Vec::with_capacity(HEADER_LEN + payload.len());
    record.extend_from_slice(&header.encode());
    record.extend_from_slice(&payload);
    Ok(record)
}
