//! Common utility functions.

use std::collections::HashSet;
use std::hash::Hash;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds since Unix epoch.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn timestamp_ms() -> u64 {
    // Truncation is safe: timestamp won't overflow u64 for ~500 million years
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX` instead of wrapping.
#[must_use]
pub fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Remove duplicates, keeping the first occurrence of each item.
#[must_use]
pub fn dedup_ordered<T, I>(items: I) -> Vec<T>
where
    T: Eq + Hash + Copy,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(*item)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_ms() {
        let ts1 = timestamp_ms();
        std::thread::sleep(Duration::from_millis(2));
        let ts2 = timestamp_ms();
        assert!(ts2 > ts1);
    }

    #[test]
    fn test_saturating_millis() {
        assert_eq!(saturating_millis(Duration::from_micros(1_999)), 1);
        assert_eq!(saturating_millis(Duration::from_secs(30)), 30_000);
        assert_eq!(
            saturating_millis(Duration::from_secs(18_446_744_073_709_552)),
            u64::MAX
        );
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_dedup_ordered() {
        assert_eq!(dedup_ordered([3, 1, 3, 2, 1]), vec![3, 1, 2]);
        assert!(dedup_ordered(Vec::<u8>::new()).is_empty());
    }
}
