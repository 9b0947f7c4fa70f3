use std::time::Duration;

/// Connectivity mode of a live event feed, as shown to the view layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Push channel is (or is about to be) live.
    Connected,
    /// Channel dropped; a backoff-delayed reconnect is pending.
    Reconnecting,
    /// Retry budget exhausted; the feed polls snapshots on a fixed period.
    /// Terminal for the life of the feed.
    Polling,
}

const BASE_DELAY_MS: u64 = 1_000;
const MAX_DELAY_MS: u64 = 30_000;

/// Reconnect attempts before degrading to polling.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Delay before reconnect attempt `attempt` (1-based), or `None` once the
/// retry budget is spent and the feed should fall back to polling.
///
/// Schedule: 1s, 2s, 4s, doubling up to a 30s ceiling.
pub fn reconnect_delay(attempt: u32) -> Option<Duration> {
    if attempt == 0 || attempt > MAX_RECONNECT_ATTEMPTS {
        return None;
    }
    let exp = (attempt - 1).min(63);
    let ms = BASE_DELAY_MS
        .saturating_mul(1u64 << exp)
        .min(MAX_DELAY_MS);
    Some(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_escalation() {
        assert_eq!(reconnect_delay(1), Some(Duration::from_millis(1_000)));
        assert_eq!(reconnect_delay(2), Some(Duration::from_millis(2_000)));
        assert_eq!(reconnect_delay(3), Some(Duration::from_millis(4_000)));
    }

    #[test]
    fn test_budget_exhaustion() {
        assert_eq!(reconnect_delay(0), None);
        assert_eq!(reconnect_delay(4), None);
        assert_eq!(reconnect_delay(100), None);
    }

    #[test]
    fn test_delay_ceiling() {
        // The cap only matters if the attempt budget is ever raised.
        let exp = 10 - 1;
        let ms = BASE_DELAY_MS.saturating_mul(1u64 << exp).min(MAX_DELAY_MS);
        assert_eq!(ms, MAX_DELAY_MS);
    }
}
