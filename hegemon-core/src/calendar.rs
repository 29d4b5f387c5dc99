//! Game calendar: 24-hour days, 30-day months, 12-month years.
//!
//! No leap years, ever. One tick is one in-game hour, and
//! [`GameTime::to_total_hours`] is an exact bijection used as the stable
//! temporal key throughout the save format and the modifier timestamps.

use serde::{Deserialize, Serialize};

pub const HOURS_PER_DAY: u64 = 24;
pub const DAYS_PER_MONTH: u64 = 30;
pub const MONTHS_PER_YEAR: u64 = 12;
pub const DAYS_PER_YEAR: u64 = DAYS_PER_MONTH * MONTHS_PER_YEAR;
pub const HOURS_PER_MONTH: u64 = HOURS_PER_DAY * DAYS_PER_MONTH;
pub const HOURS_PER_YEAR: u64 = HOURS_PER_DAY * DAYS_PER_YEAR;
pub const DAYS_PER_WEEK: u64 = 7;

/// A specific moment in game time.
///
/// Equality compares all four fields. `month` and `day` are 1-based,
/// `hour` is 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GameTime {
    pub year: u32,
    pub month: u8, // 1-12
    pub day: u8,   // 1-30
    pub hour: u8,  // 0-23
}

/// Which calendar boundaries an hour advance crossed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rollover {
    pub day: bool,
    pub month: bool,
    pub year: bool,
}

impl GameTime {
    pub fn new(year: u32, month: u8, day: u8, hour: u8) -> Self {
        debug_assert!((1..=12).contains(&month), "month out of range: {month}");
        debug_assert!((1..=30).contains(&day), "day out of range: {day}");
        debug_assert!(hour < 24, "hour out of range: {hour}");
        Self {
            year,
            month,
            day,
            hour,
        }
    }

    /// Total hours since year 0, month 1, day 1, hour 0. Exact bijection.
    pub fn to_total_hours(&self) -> u64 {
        let days = self.year as u64 * DAYS_PER_YEAR
            + (self.month as u64 - 1) * DAYS_PER_MONTH
            + (self.day as u64 - 1);
        days * HOURS_PER_DAY + self.hour as u64
    }

    /// Inverse of [`to_total_hours`](Self::to_total_hours).
    pub fn from_total_hours(hours: u64) -> Self {
        let days = hours / HOURS_PER_DAY;
        Self {
            year: (days / DAYS_PER_YEAR) as u32,
            month: ((days % DAYS_PER_YEAR) / DAYS_PER_MONTH) as u8 + 1,
            day: (days % DAYS_PER_MONTH) as u8 + 1,
            hour: (hours % HOURS_PER_DAY) as u8,
        }
    }

    /// Total days since the calendar epoch (for weekly cadence checks).
    pub fn total_days(&self) -> u64 {
        self.to_total_hours() / HOURS_PER_DAY
    }

    /// Advance one hour in place, reporting which boundaries were crossed.
    pub fn advance_hour(&mut self) -> Rollover {
        let mut roll = Rollover::default();
        self.hour += 1;
        if self.hour as u64 == HOURS_PER_DAY {
            self.hour = 0;
            self.day += 1;
            roll.day = true;
            if self.day as u64 > DAYS_PER_MONTH {
                self.day = 1;
                self.month += 1;
                roll.month = true;
                if self.month as u64 > MONTHS_PER_YEAR {
                    self.month = 1;
                    self.year += 1;
                    roll.year = true;
                }
            }
        }
        roll
    }

    /// `self` advanced by whole days (convenience for treaty/modifier spans).
    pub fn add_days(&self, days: u64) -> Self {
        Self::from_total_hours(self.to_total_hours() + days * HOURS_PER_DAY)
    }
}

impl Default for GameTime {
    fn default() -> Self {
        Self::new(1, 1, 1, 0)
    }
}

impl std::fmt::Display for GameTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:02}.{:02} {:02}:00",
            self.year, self.month, self.day, self.hour
        )
    }
}
