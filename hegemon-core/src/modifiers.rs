//! Timed, decaying numeric modifiers.
//!
//! A modifier is a magnitude that decays linearly to zero over
//! `decay_ticks` (0 = permanent). Opinions, incomes and combat strengths
//! all stack these additively onto a base value. All evaluation is in
//! [`Fixed`]; no float ever touches a modifier.

use crate::fixed::Fixed;
use crate::ids::{ModifierTypeId, Tick};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A timed modifier record; 18 bytes on the wire (kind, start, decay,
/// magnitude).
///
/// `start_tick` is stored as u32: modifiers live in hour ticks and u32
/// hours span roughly half a million game years.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedModifier {
    pub kind: ModifierTypeId,
    pub start_tick: u32,
    /// Ticks until fully decayed; 0 means permanent.
    pub decay_ticks: u32,
    pub magnitude: Fixed,
}

impl TimedModifier {
    pub fn new(kind: ModifierTypeId, start_tick: Tick, decay_ticks: u32, magnitude: Fixed) -> Self {
        Self {
            kind,
            start_tick: start_tick as u32,
            decay_ticks,
            magnitude,
        }
    }

    /// Current value at `tick`: full magnitude scaled by the remaining
    /// fraction of the decay window, exactly 0 from `start + decay` on.
    pub fn value_at(&self, tick: Tick) -> Fixed {
        if self.decay_ticks == 0 {
            return self.magnitude;
        }
        let elapsed = tick.saturating_sub(self.start_tick as Tick);
        if elapsed >= self.decay_ticks as Tick {
            return Fixed::ZERO;
        }
        let remaining = Fixed::ONE
            - Fixed::from_int(elapsed as i64) / Fixed::from_int(self.decay_ticks as i64);
        self.magnitude * remaining
    }

    /// Whether the modifier has fully decayed at `tick`.
    #[inline]
    pub fn is_expired(&self, tick: Tick) -> bool {
        self.decay_ticks > 0 && tick.saturating_sub(self.start_tick as Tick) >= self.decay_ticks as Tick
    }
}

/// Registry of modifier type names (scenario-defined).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ModifierTypeRegistry {
    names: Vec<String>,
    #[serde(skip)]
    by_name: FxHashMap<String, ModifierTypeId>,
}

impl ModifierTypeRegistry {
    pub fn register(&mut self, name: &str) -> ModifierTypeId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = ModifierTypeId(self.names.len() as u16 + 1);
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn id_of(&self, name: &str) -> Option<ModifierTypeId> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: ModifierTypeId) -> Option<&str> {
        if id.is_some() && (id.0 as usize) <= self.names.len() {
            Some(&self.names[id.0 as usize - 1])
        } else {
            None
        }
    }

    pub fn count(&self) -> u16 {
        self.names.len() as u16
    }

    /// Rebuild the name index after deserialization.
    pub fn rebuild_index(&mut self) {
        self.by_name = self
            .names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), ModifierTypeId(i as u16 + 1)))
            .collect();
    }
}
