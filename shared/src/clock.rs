//! Time sources
//!
//! The state machine reads two clocks: the local calendar clock decides meal
//! windows, the monotonic clock measures how long a state has been held. They
//! are separate traits so each can be replaced on its own.

use chrono::{DateTime, FixedOffset, Local};
use std::time::Instant;

/// Local wall-clock time including its UTC offset
pub trait CalendarClock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Monotonic time, unaffected by wall-clock adjustments
pub trait MonotonicClock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The system's configured local time zone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCalendar;

impl CalendarClock for SystemCalendar {
    fn now(&self) -> DateTime<FixedOffset> {
        let now = Local::now();
        now.with_timezone(now.offset())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMonotonic;

impl MonotonicClock for SystemMonotonic {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
