//! Time sources for the scheduler
//!
//! Every wait in the gateway is a delta against [`Clock::now_ms`]; wall time
//! is only used for heartbeats and the service password.

use std::cell::Cell;
use std::time::Instant;

use chrono::{Local, NaiveDate, NaiveDateTime};

pub trait Clock {
    /// Monotonic milliseconds since an arbitrary origin
    fn now_ms(&self) -> u64;

    /// Local wall-clock time
    fn wall_time(&self) -> NaiveDateTime;
}

/// Process clock: `Instant` for ticks, local time from chrono
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn wall_time(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Hand-driven clock for tests and simulations
#[derive(Debug, Clone)]
pub struct ManualClock {
    now_ms: Cell<u64>,
    wall: Cell<NaiveDateTime>,
}

impl ManualClock {
    /// Clock at tick `now_ms`, wall time 2024-10-10 10:10:00
    pub fn new(now_ms: u64) -> Self {
        let wall = NaiveDate::from_ymd_opt(2024, 10, 10)
            .and_then(|date| date.and_hms_opt(10, 10, 0))
            .unwrap_or_default();
        Self {
            now_ms: Cell::new(now_ms),
            wall: Cell::new(wall),
        }
    }

    /// Move both tick and wall time forward
    pub fn advance(&self, ms: u64) {
        self.now_ms.set(self.now_ms.get() + ms);
        self.wall
            .set(self.wall.get() + chrono::Duration::milliseconds(ms as i64));
    }

    pub fn set_wall_time(&self, wall: NaiveDateTime) {
        self.wall.set(wall);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }

    fn wall_time(&self) -> NaiveDateTime {
        self.wall.get()
    }
}
