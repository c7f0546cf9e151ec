//! Wall-clock plausibility wait
//!
//! TLS certificate validation needs a correct clock. Devices without an RTC boot
//! at the epoch and only get real time once network time sync lands, so startup
//! polls the clock for a bounded number of attempts before connecting.

use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;
use tracing::{info, warn};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Anything earlier than this is treated as "not yet synchronized".
pub fn plausibility_floor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn is_plausible(time: DateTime<Utc>) -> bool {
    time >= plausibility_floor()
}

/// Poll `clock` until it reads a plausible time.
///
/// Checks at most `max_attempts` times with `delay` between checks. Returns
/// whether the clock became plausible; callers proceed either way.
pub async fn wait_for_valid_time<C: Clock + ?Sized>(
    clock: &C,
    max_attempts: u32,
    delay: Duration,
) -> bool {
    let mut last_reading = None;
    for attempt in 1..=max_attempts {
        let now = clock.now();
        if is_plausible(now) {
            info!(time = %now, attempt, "System time is set");
            return true;
        }
        last_reading = Some(now);

        if attempt < max_attempts {
            info!(attempt, max_attempts, "Waiting for system time to be set");
            tokio::time::sleep(delay).await;
        }
    }

    warn!(
        time = ?last_reading,
        max_attempts,
        "System time still implausible, continuing anyway"
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn epoch() -> DateTime<Utc> {
        Utc.timestamp_opt(0, 0).unwrap()
    }

    /// Reads the epoch until `synced_after` calls have been made
    struct SteppingClock {
        calls: AtomicU32,
        synced_after: u32,
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call > self.synced_after {
                Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
            } else {
                epoch()
            }
        }
    }

    #[test]
    fn test_plausibility_floor() {
        assert!(!is_plausible(epoch()));
        assert!(is_plausible(plausibility_floor()));
        assert!(is_plausible(Utc::now()));
    }

    #[tokio::test]
    async fn test_returns_immediately_when_synced() {
        let clock = SteppingClock {
            calls: AtomicU32::new(0),
            synced_after: 0,
        };
        assert!(wait_for_valid_time(&clock, 10, Duration::from_millis(1)).await);
        assert_eq!(clock.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_waits_until_synced() {
        let clock = SteppingClock {
            calls: AtomicU32::new(0),
            synced_after: 3,
        };
        assert!(wait_for_valid_time(&clock, 10, Duration::from_millis(1)).await);
        assert_eq!(clock.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let clock = SteppingClock {
            calls: AtomicU32::new(0),
            synced_after: u32::MAX,
        };
        assert!(!wait_for_valid_time(&clock, 3, Duration::from_millis(1)).await);
        // One read per attempt, whether or not a subscriber records the warning
        assert_eq!(clock.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_system_clock_is_plausible() {
        assert!(wait_for_valid_time(&SystemClock, 1, Duration::from_millis(1)).await);
    }
}
