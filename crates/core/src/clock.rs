use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Local, NaiveDateTime, Utc};

/// Source of "now" for stages and the sending-window gate.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    /// Wall-clock time on the operator's machine; the sending window is relative to it.
    fn now_local(&self) -> NaiveDateTime;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_local(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Manually advanced clock for tests and replays. Local time equals UTC.
#[derive(Clone, Debug)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(now)) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        match self.now.lock() {
            Ok(mut current) => *current = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }

    pub fn advance(&self, by: Duration) {
        let next = self.now_utc() + by;
        self.set(next);
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn now_local(&self) -> NaiveDateTime {
        self.now_utc().naive_utc()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{Clock, FixedClock};

    #[test]
    fn fixed_clock_advances_both_views() {
        let clock = FixedClock::at(Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap());
        clock.advance(Duration::days(3));
        assert_eq!(clock.now_utc(), Utc.with_ymd_and_hms(2024, 3, 7, 9, 0, 0).unwrap());
        assert_eq!(clock.now_local(), clock.now_utc().naive_utc());
    }
}
