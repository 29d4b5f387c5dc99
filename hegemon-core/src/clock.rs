//! Real-time to game-time conversion.
//!
//! The time manager accumulates `real_delta × speed × hours_per_real_second`
//! in fixed point and hands whole hours to the tick dispatcher. Speed
//! multipliers are exact integer fractions; no float ever enters the
//! accumulator.

use crate::fixed::Fixed;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An exact speed fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speed {
    pub num: u32,
    pub den: u32,
}

impl Speed {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    fn as_fixed(self) -> Fixed {
        Fixed::from_ratio(self.num as i64, self.den as i64)
    }
}

/// The default speed table: paused, half, normal, double, quintuple.
pub const SPEED_TABLE: [Speed; 5] = [
    Speed::new(0, 1),
    Speed::new(1, 2),
    Speed::new(1, 1),
    Speed::new(2, 1),
    Speed::new(5, 1),
];

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    #[error("invalid speed index {0} (table has {1} entries)")]
    InvalidSpeed(usize, usize),
    #[error("cannot synchronize backward: target tick {target} < current {current}")]
    BackwardSync { target: u64, current: u64 },
}

/// Drives tick production from real frame deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeManager {
    accumulator: Fixed,
    /// Base rate at speed 1.
    hours_per_real_second: Fixed,
    speed_index: usize,
    /// Speed restored by `resume` after a `pause`.
    resume_index: usize,
    #[serde(skip, default = "default_table")]
    table: Vec<Speed>,
}

fn default_table() -> Vec<Speed> {
    SPEED_TABLE.to_vec()
}

impl TimeManager {
    pub fn new(hours_per_real_second: Fixed) -> Self {
        Self {
            accumulator: Fixed::ZERO,
            hours_per_real_second,
            speed_index: 2, // normal
            resume_index: 2,
            table: default_table(),
        }
    }

    /// Replace the speed table (game-configurable). Index 0 must stay the
    /// paused entry.
    pub fn with_table(mut self, table: Vec<Speed>) -> Self {
        debug_assert!(!table.is_empty() && table[0].num == 0, "index 0 must be paused");
        self.table = table;
        self.speed_index = self.speed_index.min(self.table.len() - 1);
        self
    }

    pub fn speed_index(&self) -> usize {
        self.speed_index
    }

    pub fn is_paused(&self) -> bool {
        self.table[self.speed_index].num == 0
    }

    pub fn set_speed(&mut self, index: usize) -> Result<(), ClockError> {
        if index >= self.table.len() {
            return Err(ClockError::InvalidSpeed(index, self.table.len()));
        }
        self.speed_index = index;
        if self.table[index].num != 0 {
            self.resume_index = index;
        }
        Ok(())
    }

    /// Pause (speed multiplier 0), remembering the running speed.
    pub fn pause(&mut self) {
        self.speed_index = 0;
    }

    /// Resume at the last non-zero speed.
    pub fn resume(&mut self) {
        self.speed_index = self.resume_index;
    }

    /// Feed a real-time delta (seconds, fixed point). Returns the number of
    /// whole in-game hours the dispatcher should now run.
    pub fn update(&mut self, real_delta_seconds: Fixed) -> u32 {
        let speed = self.table[self.speed_index].as_fixed();
        self.accumulator =
            self.accumulator + real_delta_seconds * speed * self.hours_per_real_second;

        let mut hours = 0u32;
        while self.accumulator >= Fixed::ONE {
            self.accumulator = self.accumulator - Fixed::ONE;
            hours += 1;
        }
        hours
    }

    /// Validate a multiplayer resync target. Fast-forwarding is the
    /// caller's job (hour-by-hour through the dispatcher); rewinding is a
    /// hard error.
    pub fn hours_to_synchronize(&self, current_tick: u64, target: u64) -> Result<u64, ClockError> {
        if target < current_tick {
            return Err(ClockError::BackwardSync {
                target,
                current: current_tick,
            });
        }
        Ok(target - current_tick)
    }

    /// Drop any fractional accumulated time (used when jumping ticks).
    pub fn reset_accumulator(&mut self) {
        self.accumulator = Fixed::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TimeManager {
        // One in-game hour per real second at normal speed
        TimeManager::new(Fixed::ONE)
    }

    #[test]
    fn test_accumulates_whole_hours() {
        let mut tm = manager();
        assert_eq!(tm.update(Fixed::from_ratio(1, 2)), 0);
        assert_eq!(tm.update(Fixed::from_ratio(1, 2)), 1);
        assert_eq!(tm.update(Fixed::from_int(3)), 3);
    }

    #[test]
    fn test_paused_produces_nothing() {
        let mut tm = manager();
        tm.pause();
        assert!(tm.is_paused());
        assert_eq!(tm.update(Fixed::from_int(100)), 0);

        tm.resume();
        assert!(!tm.is_paused());
        assert_eq!(tm.update(Fixed::ONE), 1);
    }

    #[test]
    fn test_resume_restores_last_speed() {
        let mut tm = manager();
        tm.set_speed(3).unwrap(); // double
        tm.pause();
        tm.resume();
        assert_eq!(tm.speed_index(), 3);
        assert_eq!(tm.update(Fixed::from_int(2)), 4);
    }

    #[test]
    fn test_half_speed_is_exact() {
        let mut tm = manager();
        tm.set_speed(1).unwrap(); // 1/2
        // 2 real seconds at half speed: exactly one hour, no drift
        assert_eq!(tm.update(Fixed::ONE), 0);
        assert_eq!(tm.update(Fixed::ONE), 1);
        assert_eq!(tm.update(Fixed::ONE), 0);
        assert_eq!(tm.update(Fixed::ONE), 1);
    }

    #[test]
    fn test_invalid_speed_rejected() {
        let mut tm = manager();
        assert_eq!(tm.set_speed(9), Err(ClockError::InvalidSpeed(9, 5)));
        assert_eq!(tm.speed_index(), 2);
    }

    #[test]
    fn test_backward_sync_is_error() {
        let tm = manager();
        assert!(matches!(
            tm.hours_to_synchronize(100, 50),
            Err(ClockError::BackwardSync { .. })
        ));
        assert_eq!(tm.hours_to_synchronize(100, 130), Ok(30));
        assert_eq!(tm.hours_to_synchronize(100, 100), Ok(0));
    }
}
