//! The aggregate authoritative game state.
//!
//! `GameState` owns every store, created once at scenario load and mutated
//! only through the tick dispatcher and the command pipeline. It exposes
//! the read-only query surface the presentation layer (and the AI) sees;
//! all queries are safe between barriers. No global instance exists: the
//! host owns the state and passes references down.

use crate::adjacency::AdjacencyGraph;
use crate::ai::AiState;
use crate::calendar::GameTime;
use crate::countries::CountryRegistry;
use crate::diplomacy::DiplomacyStore;
use crate::fixed::Fixed;
use crate::ids::{CountryId, ModifierTypeId, ProvinceId, ResourceTypeId, TerrainId, Tick, UnitTypeId};
use crate::modifiers::ModifierTypeRegistry;
use crate::pathfind::PathFlags;
use crate::provinces::ProvinceStore;
use crate::resources::{ResourceStore, ResourceTypeRegistry};
use crate::scenario::TerrainDef;
use crate::systems::economy::{BuildingRegistry, EconomyState};
use crate::units::{UnitStore, UnitTypeRegistry};

/// Handles to registry entries every scenario provides.
#[derive(Debug, Clone, Copy)]
pub struct WellKnown {
    /// The treasury resource.
    pub gold: ResourceTypeId,
    /// Opinion penalty attached by a war declaration.
    pub declared_war: ModifierTypeId,
    /// Opinion bonus toward a defender whose ally honored the alliance.
    pub defensive_war_help: ModifierTypeId,
}

/// Complete simulation state.
pub struct GameState {
    pub scenario_name: String,
    pub seed: u64,
    /// Monotonic hour counter since scenario start.
    pub tick: Tick,
    pub time: GameTime,

    pub provinces: ProvinceStore,
    pub countries: CountryRegistry,
    pub adjacency: AdjacencyGraph,
    /// Terrain registry, indexed by `TerrainId - 1`. Frozen after load.
    pub terrain: Vec<TerrainDef>,
    pub resource_types: ResourceTypeRegistry,
    pub resources: ResourceStore,
    pub modifier_types: ModifierTypeRegistry,
    pub unit_types: UnitTypeRegistry,
    pub buildings: BuildingRegistry,
    pub economy: EconomyState,
    pub diplomacy: DiplomacyStore,
    pub units: UnitStore,
    /// Per-country AI bookkeeping, indexed by `CountryId - 1`.
    pub ai: Vec<AiState>,
    pub well_known: WellKnown,
}

impl GameState {
    pub fn terrain_def(&self, id: TerrainId) -> Option<&TerrainDef> {
        if id.is_some() && (id.0 as usize) <= self.terrain.len() {
            Some(&self.terrain[id.0 as usize - 1])
        } else {
            None
        }
    }

    /// Movement cost in days for entering a province, as Fixed.
    pub fn terrain_move_cost(&self, province: ProvinceId) -> Fixed {
        self.terrain_def(self.provinces.get_terrain(province))
            .map(|t| Fixed::from_int(t.move_cost_days as i64))
            .unwrap_or_else(|| Fixed::from_int(10))
    }

    /// Whether `country` may move units into `province`.
    ///
    /// Land only; impassable terrain never. Borders are open into unowned
    /// land, own land, enemies (invasion) and access grantors.
    pub fn can_enter(&self, country: CountryId, province: ProvinceId, flags: PathFlags) -> bool {
        if !self.provinces.contains(province) {
            return false;
        }
        let state = self.provinces.get_state(province);
        if state.is_sea() || state.is_impassable() {
            return false;
        }
        if flags.contains(PathFlags::IGNORE_BORDERS) {
            return true;
        }
        let owner = state.owner;
        owner.is_none()
            || owner == country
            || self.diplomacy.at_war(country, owner)
            || self.diplomacy.has_military_access(country, owner)
    }

    /// Hours for one unit of this type to cross one province.
    pub fn unit_travel_ticks(&self, unit_type: UnitTypeId) -> u32 {
        let days = self
            .unit_types
            .get(unit_type)
            .map(|d| d.traversal_days)
            .unwrap_or(10);
        days as u32 * crate::calendar::HOURS_PER_DAY as u32
    }

    /// Symmetric opinion at the current tick.
    pub fn opinion(&self, a: CountryId, b: CountryId) -> Fixed {
        self.diplomacy.opinion(a, b, self.tick)
    }

    pub fn at_war(&self, a: CountryId, b: CountryId) -> bool {
        self.diplomacy.at_war(a, b)
    }

    /// Whether a country is in crisis for AI scheduling purposes: at war,
    /// or bankrupt (empty treasury).
    pub fn in_crisis(&self, country: CountryId) -> bool {
        self.diplomacy.at_war_any(country)
            || self.resources.get(country, self.well_known.gold) == Fixed::ZERO
    }

    /// Check the universal invariants. Used by tests and debug builds;
    /// a violation here means deterministic state is already corrupt.
    pub fn validate_invariants(&self) -> Result<(), String> {
        let country_count = self.countries.count();

        let mut owned_total: u64 = 0;
        for (id, province) in self.provinces.iter() {
            if province.owner.0 > country_count {
                return Err(format!(
                    "province {id} owned by out-of-range country {}",
                    province.owner
                ));
            }
            if province.controller.0 > country_count {
                return Err(format!(
                    "province {id} controlled by out-of-range country {}",
                    province.controller
                ));
            }
            if province.is_sea() && province.owner.is_some() {
                return Err(format!("sea province {id} has an owner"));
            }
            if province.owner.is_some() {
                owned_total += 1;
            }
        }
        if owned_total > self.provinces.len() as u64 {
            return Err("owned province total exceeds province count".into());
        }

        for rel in self.diplomacy.relations_sorted() {
            if rel.at_war {
                let a = rel.low;
                let b = rel.high;
                if self.diplomacy.are_allied(a, b) {
                    return Err(format!("{a} and {b} are at war while allied"));
                }
                if self.diplomacy.has_nap(a, b) {
                    return Err(format!("{a} and {b} are at war under a NAP"));
                }
            }
            let opinion = self.opinion(rel.low, rel.high);
            if opinion < crate::diplomacy::OPINION_MIN || opinion > crate::diplomacy::OPINION_MAX {
                return Err(format!("opinion for {}/{} escaped clamp", rel.low, rel.high));
            }
        }

        for (unit_id, unit) in self.units.iter() {
            if unit.country.0 > country_count {
                return Err(format!("unit {unit_id} belongs to unknown country"));
            }
            if !self.provinces.contains(unit.province) {
                return Err(format!("unit {unit_id} in unknown province"));
            }
        }

        Ok(())
    }
}
