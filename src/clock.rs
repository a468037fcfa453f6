use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Remaining session time, split for display.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Countdown {
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Countdown {
    pub fn zero() -> Self {
        Self {
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }

    fn from_remaining(remaining: Duration) -> Self {
        let total_seconds = remaining.num_seconds().max(0);
        Self {
            hours: total_seconds / 3600,
            minutes: (total_seconds / 60) % 60,
            seconds: total_seconds % 60,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.hours == 0 && self.minutes == 0 && self.seconds == 0
    }
}

/// Result of one clock tick.
#[derive(Debug, Clone, Copy)]
pub struct ClockTick {
    pub remaining: Countdown,
    /// True on exactly one tick: the first whose `now` is at or past the
    /// scheduled end.
    pub expired_now: bool,
}

/// Wall-clock countdown toward a session's fixed end time.
///
/// Each tick recomputes remaining time from `end_time - now` rather than
/// decrementing a counter, so a suspended host wakes up to the correct
/// remainder (and to an immediate expiry if the end passed while asleep).
pub struct SessionClock {
    end_time: DateTime<Utc>,
    fired: bool,
}

impl SessionClock {
    pub fn new(end_time: DateTime<Utc>) -> Self {
        Self {
            end_time,
            fired: false,
        }
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> ClockTick {
        let remaining = Countdown::from_remaining(self.end_time - now);
        let expired_now = !self.fired && now >= self.end_time;
        if expired_now {
            self.fired = true;
        }
        ClockTick {
            remaining,
            expired_now,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    #[test]
    fn splits_remaining_into_h_m_s() {
        let mut clock = SessionClock::new(end());
        let now = end() - Duration::seconds(3_725); // 1h 2m 5s
        let tick = clock.tick(now);
        assert_eq!(
            tick.remaining,
            Countdown {
                hours: 1,
                minutes: 2,
                seconds: 5
            }
        );
        assert!(!tick.expired_now);
    }

    #[test]
    fn expiry_fires_on_exactly_one_tick() {
        let mut clock = SessionClock::new(end());
        let mut fired = 0;
        // 1 s cadence straddling the end time.
        for offset in -2..=3 {
            let tick = clock.tick(end() + Duration::seconds(offset));
            if tick.expired_now {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        assert!(clock.has_fired());
    }

    #[test]
    fn suspended_host_expires_on_first_tick_after_wake() {
        let mut clock = SessionClock::new(end());
        clock.tick(end() - Duration::minutes(30));

        // Host slept through the scheduled end; the next tick must both
        // report zero remaining and fire.
        let tick = clock.tick(end() + Duration::minutes(47));
        assert!(tick.expired_now);
        assert!(tick.remaining.is_zero());
    }

    #[test]
    fn remaining_never_goes_negative() {
        let mut clock = SessionClock::new(end());
        let tick = clock.tick(end() + Duration::hours(5));
        assert_eq!(tick.remaining, Countdown::zero());
    }
}
