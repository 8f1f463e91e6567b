//! Wall clock abstraction and the pure time formatting used in titles.

use std::cell::Cell;
use std::rc::Rc;

/// Upper bound for any elapsed value shown for a live stream.
pub const MAX_ELAPSED_SECS: u64 = 48 * 60 * 60;

/// Millisecond wall clock. The page core never reads time any other way.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Virtual clock advanced explicitly. Used by replays and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Cell::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.set(now_ms);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now.set(self.now.get().saturating_add(delta_ms));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Formats whole seconds as `H:MM:SS` when an hour or more, else `M:SS`.
pub fn format_hms(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Seconds from `origin_ms` to `now_ms`, floored and clamped to `[0, 48h]`.
pub fn elapsed_secs(origin_ms: u64, now_ms: u64) -> u64 {
    (now_ms.saturating_sub(origin_ms) / 1000).min(MAX_ELAPSED_SECS)
}

/// Remaining whole seconds of a finite media timeline.
///
/// `None` unless `duration` is finite and positive. A non-finite current time
/// counts as the start of the timeline.
pub fn remaining_secs(duration: f64, current_time: f64) -> Option<u64> {
    if !duration.is_finite() || duration <= 0.0 {
        return None;
    }
    let position = if current_time.is_finite() {
        current_time.max(0.0)
    } else {
        0.0
    };
    let remaining = (duration - position).ceil().clamp(0.0, duration);
    Some(remaining as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_minutes_and_hours() {
        assert_eq!(format_hms(0), "0:00");
        assert_eq!(format_hms(60), "1:00");
        assert_eq!(format_hms(125), "2:05");
        assert_eq!(format_hms(3600), "1:00:00");
        assert_eq!(format_hms(3 * 3600 + 7 * 60 + 9), "3:07:09");
    }

    #[test]
    fn remaining_uses_ceiling() {
        assert_eq!(remaining_secs(125.0, 65.0), Some(60));
        assert_eq!(remaining_secs(125.0, 64.2), Some(61));
        assert_eq!(remaining_secs(10.0, 10.0), Some(0));
    }

    #[test]
    fn remaining_never_negative_or_above_duration() {
        assert_eq!(remaining_secs(10.0, 12.0), Some(0));
        assert_eq!(remaining_secs(10.5, -3.0), Some(10));
        assert_eq!(remaining_secs(10.0, f64::NAN), Some(10));
    }

    #[test]
    fn remaining_requires_finite_positive_duration() {
        assert_eq!(remaining_secs(f64::INFINITY, 3.0), None);
        assert_eq!(remaining_secs(0.0, 0.0), None);
        assert_eq!(remaining_secs(f64::NAN, 0.0), None);
    }

    #[test]
    fn remaining_is_monotonic_while_playing() {
        let duration = 37.4;
        let mut previous = u64::MAX;
        let mut position = 0.0;
        while position <= duration {
            let remaining = remaining_secs(duration, position).expect("finite");
            assert!(remaining <= previous);
            assert!(remaining as f64 <= duration);
            previous = remaining;
            position += 0.25;
        }
    }

    #[test]
    fn elapsed_is_clamped() {
        assert_eq!(elapsed_secs(1_000, 91_000), 90);
        assert_eq!(elapsed_secs(5_000, 1_000), 0);
        assert_eq!(elapsed_secs(0, u64::MAX), MAX_ELAPSED_SECS);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(10);
        clock.advance(5);
        assert_eq!(clock.now_ms(), 15);
        let shared = Rc::new(clock);
        assert_eq!(shared.now_ms(), 15);
    }
}
