//! Wall-clock helpers in the library's seconds-since-epoch convention.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as **seconds** since Unix epoch.
///
/// A clock set before 1970 reads as the epoch.
#[inline]
pub fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

/// Truncate `ts` down to a multiple of `width` seconds.
///
/// A zero width leaves `ts` unchanged.
#[inline]
pub fn bucket_start(ts: u64, width: u64) -> u64 {
    if width == 0 { ts } else { ts - ts % width }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_truncation() {
        assert_eq!(bucket_start(125, 60), 120);
        assert_eq!(bucket_start(120, 60), 120);
        assert_eq!(bucket_start(59, 60), 0);
        assert_eq!(bucket_start(59, 0), 59);
    }

    #[test]
    fn clock_is_past_2020() {
        assert!(now_secs() > 1_577_836_800);
    }
}
