//! MXF timestamp type.
//!
//! MXF stores UTC calendar date-times with a 1/250 second quantum (`qmsec`).

use chrono::{Datelike, Timelike, Utc};
use std::fmt;

/// UTC calendar date-time with 1/250 s resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
    /// Quarter milliseconds, 0..=249
    pub qmsec: u8,
}

impl Timestamp {
    /// Create a timestamp from components.
    #[allow(clippy::too_many_arguments)]
    pub fn new(year: u16, month: u8, day: u8, hour: u8, min: u8, sec: u8, qmsec: u8) -> Self {
        Timestamp {
            year,
            month,
            day,
            hour,
            min,
            sec,
            qmsec,
        }
    }

    /// The current UTC time.
    pub fn now() -> Self {
        let now = Utc::now();
        Timestamp {
            year: now.year() as u16,
            month: now.month() as u8,
            day: now.day() as u8,
            hour: now.hour() as u8,
            min: now.minute() as u8,
            sec: now.second() as u8,
            qmsec: (now.timestamp_subsec_millis() / 4) as u8,
        }
    }

    /// Serialize to the 8-byte MXF wire form.
    pub fn to_bytes(&self) -> [u8; 8] {
        let year = self.year.to_be_bytes();
        [
            year[0], year[1], self.month, self.day, self.hour, self.min, self.sec, self.qmsec,
        ]
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.min, self.sec
        )
    }
}
