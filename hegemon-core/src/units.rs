//! Unit table and movement orders.
//!
//! Units are 8-byte records in a dense table preallocated at scenario load;
//! slots are reused so the table never grows during play. Spawn always takes
//! the lowest empty slot, which makes allocation a pure function of the
//! table contents and keeps save/load byte-identical. Movement orders are a
//! sparse side map keyed by unit id: most units are stationary most of the
//! time.

use crate::ids::{CountryId, ProvinceId, Tick, UnitId, UnitTypeId};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Hot unit state: exactly 8 bytes. Strength and morale are percentages.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitState {
    pub province: ProvinceId,
    pub country: CountryId,
    pub unit_type: UnitTypeId,
    pub strength: u8,
    pub morale: u8,
}

const _: () = assert!(std::mem::size_of::<UnitState>() == 8);

impl UnitState {
    /// A dead/empty slot.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.country.is_none()
    }
}

/// Static per-type definition from the scenario registries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTypeDef {
    pub name: String,
    /// Days to cross one province at base speed.
    pub traversal_days: u16,
    pub attack: crate::fixed::Fixed,
    pub defense: crate::fixed::Fixed,
}

/// Registry of unit types.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct UnitTypeRegistry {
    defs: Vec<UnitTypeDef>,
    #[serde(skip)]
    by_name: FxHashMap<String, UnitTypeId>,
}

impl UnitTypeRegistry {
    pub fn register(&mut self, def: UnitTypeDef) -> UnitTypeId {
        if let Some(&id) = self.by_name.get(&def.name) {
            return id;
        }
        let id = UnitTypeId(self.defs.len() as u16 + 1);
        self.by_name.insert(def.name.clone(), id);
        self.defs.push(def);
        id
    }

    pub fn get(&self, id: UnitTypeId) -> Option<&UnitTypeDef> {
        if id.is_some() && (id.0 as usize) <= self.defs.len() {
            Some(&self.defs[id.0 as usize - 1])
        } else {
            None
        }
    }

    pub fn id_of(&self, name: &str) -> Option<UnitTypeId> {
        self.by_name.get(name).copied()
    }

    pub fn count(&self) -> u16 {
        self.defs.len() as u16
    }

    pub fn rebuild_index(&mut self) {
        self.by_name = self
            .defs
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), UnitTypeId(i as u16 + 1)))
            .collect();
    }
}

/// An active multi-hop movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementOrder {
    pub destination: ProvinceId,
    /// Index into `path` of the waypoint being approached.
    pub waypoint_index: u16,
    /// Hours until the current segment completes.
    pub ticks_remaining: u32,
    /// Full path from the first hop to the destination (start excluded).
    pub path: Vec<ProvinceId>,
    /// Tick the order was issued (for queries/debugging).
    pub issued_tick: Tick,
}

impl MovementOrder {
    /// The waypoint currently being approached, if any remain.
    pub fn next_waypoint(&self) -> Option<ProvinceId> {
        self.path.get(self.waypoint_index as usize).copied()
    }
}

/// The unit store.
pub struct UnitStore {
    /// Slot `id - 1`. Empty slots have `country == NONE`.
    units: Vec<UnitState>,
    /// Highest slot ever used (live range is `1..=high_water`).
    high_water: u16,
    orders: FxHashMap<UnitId, MovementOrder>,
    capacity: usize,
}

impl UnitStore {
    pub fn with_capacity(capacity: u16) -> Self {
        Self {
            units: vec![UnitState::default(); capacity as usize],
            high_water: 0,
            orders: FxHashMap::default(),
            capacity: capacity as usize,
        }
    }

    /// Allocate a unit slot. Fresh units start at full strength and morale.
    ///
    /// Always takes the lowest empty slot; returns None when the
    /// preallocated capacity is exhausted.
    pub fn spawn(
        &mut self,
        province: ProvinceId,
        country: CountryId,
        unit_type: UnitTypeId,
    ) -> Option<UnitId> {
        let slot = match self.units[..self.high_water as usize]
            .iter()
            .position(|s| s.is_empty())
        {
            Some(i) => i as u16 + 1,
            None if (self.high_water as usize) < self.capacity => {
                self.high_water += 1;
                self.high_water
            }
            None => return None, // capacity exhausted
        };

        self.units[slot as usize - 1] = UnitState {
            province,
            country,
            unit_type,
            strength: 100,
            morale: 100,
        };
        Some(UnitId(slot))
    }

    /// Remove a unit and any movement order it had.
    pub fn despawn(&mut self, id: UnitId) {
        if id.is_none() || id.0 > self.high_water {
            return;
        }
        let state = &mut self.units[id.0 as usize - 1];
        if !state.is_empty() {
            *state = UnitState::default();
            self.orders.remove(&id);
        }
    }

    pub fn get(&self, id: UnitId) -> Option<&UnitState> {
        if id.is_none() || id.0 > self.high_water {
            return None;
        }
        let state = &self.units[id.0 as usize - 1];
        if state.is_empty() {
            None
        } else {
            Some(state)
        }
    }

    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut UnitState> {
        if id.is_none() || id.0 > self.high_water {
            return None;
        }
        let state = &mut self.units[id.0 as usize - 1];
        if state.is_empty() {
            None
        } else {
            Some(state)
        }
    }

    /// Live units in ascending id order (deterministic).
    pub fn iter(&self) -> impl Iterator<Item = (UnitId, &UnitState)> {
        self.units[..self.high_water as usize]
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_empty())
            .map(|(i, s)| (UnitId(i as u16 + 1), s))
    }

    /// Collect units of `country` into `out` (cleared first).
    pub fn units_of(&self, country: CountryId, out: &mut Vec<UnitId>) {
        out.clear();
        for (id, state) in self.iter() {
            if state.country == country {
                out.push(id);
            }
        }
    }

    pub fn live_count(&self) -> usize {
        self.units[..self.high_water as usize]
            .iter()
            .filter(|s| !s.is_empty())
            .count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // === Movement orders ===

    pub fn order_of(&self, id: UnitId) -> Option<&MovementOrder> {
        self.orders.get(&id)
    }

    pub fn order_mut(&mut self, id: UnitId) -> Option<&mut MovementOrder> {
        self.orders.get_mut(&id)
    }

    pub fn set_order(&mut self, id: UnitId, order: MovementOrder) {
        self.orders.insert(id, order);
    }

    pub fn clear_order(&mut self, id: UnitId) -> Option<MovementOrder> {
        self.orders.remove(&id)
    }

    /// Unit ids with active orders, ascending (deterministic processing order).
    pub fn moving_units(&self, out: &mut Vec<UnitId>) {
        out.clear();
        out.extend(self.orders.keys().copied());
        out.sort_unstable();
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Snapshot access for serialization: the raw slot array up to the
    /// high-water mark.
    pub fn raw_slots(&self) -> &[UnitState] {
        &self.units[..self.high_water as usize]
    }

    pub fn orders(&self) -> &FxHashMap<UnitId, MovementOrder> {
        &self.orders
    }

    /// Restore from a snapshot (load path only).
    pub fn restore(&mut self, slots: &[UnitState], orders: Vec<(UnitId, MovementOrder)>) {
        debug_assert!(slots.len() <= self.capacity, "snapshot exceeds capacity");
        for unit in &mut self.units {
            *unit = UnitState::default();
        }
        self.units[..slots.len()].copy_from_slice(slots);
        self.high_water = slots.len() as u16;
        self.orders = orders.into_iter().collect();
    }
}
