//! The single source of "now" for the store and the scheduler.
//!
//! With the `mock-time` feature the current instant is held in shared state so
//! tests can move through a booking's lifecycle (creation, reminder window,
//! confirmation cutoff) without waiting on the wall clock.

use jiff::{Timestamp, Zoned, civil::Date, tz::TimeZone};
#[cfg(feature = "mock-time")]
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct TimeSource {
    #[cfg(feature = "mock-time")]
    time: Arc<Mutex<Timestamp>>,
}

impl TimeSource {
    #[allow(clippy::new_without_default)]
    #[cfg(not(feature = "mock-time"))]
    pub fn new() -> Self {
        Self {}
    }

    #[cfg(feature = "mock-time")]
    pub fn new(initial_time: Timestamp) -> Self {
        Self {
            time: Arc::new(Mutex::new(initial_time)),
        }
    }

    #[cfg(not(feature = "mock-time"))]
    pub fn now(&self) -> Timestamp {
        Timestamp::now()
    }

    #[cfg(feature = "mock-time")]
    pub fn now(&self) -> Timestamp {
        *self.time.lock().unwrap()
    }

    /// The current instant on the venue's wall clock.
    pub fn now_in(&self, tz: &TimeZone) -> Zoned {
        self.now().to_zoned(tz.clone())
    }

    /// The venue-local calendar date of the current instant.
    pub fn today_in(&self, tz: &TimeZone) -> Date {
        self.now_in(tz).date()
    }

    #[cfg(feature = "mock-time")]
    pub fn set(&self, time: Timestamp) {
        *self.time.lock().unwrap() = time;
    }
}
