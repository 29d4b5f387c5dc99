//! Monthly economy: province income accrual and buildings.
//!
//! Income is derived state: terrain base income plus building yields plus
//! any timed country-level income modifiers, summed in fixed point and
//! credited to the treasury resource on the monthly tick.

use crate::fixed::Fixed;
use crate::ids::{BuildingTypeId, CountryId, ProvinceId, Tick};
use crate::modifiers::TimedModifier;
use crate::state::GameState;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Static building definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingDef {
    pub name: String,
    /// Treasury cost to construct.
    pub cost: Fixed,
    /// Monthly income contribution.
    pub income: Fixed,
}

/// Registry of building types.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BuildingRegistry {
    defs: Vec<BuildingDef>,
    #[serde(skip)]
    by_name: FxHashMap<String, BuildingTypeId>,
}

impl BuildingRegistry {
    pub fn register(&mut self, def: BuildingDef) -> BuildingTypeId {
        if let Some(&id) = self.by_name.get(&def.name) {
            return id;
        }
        let id = BuildingTypeId(self.defs.len() as u16 + 1);
        self.by_name.insert(def.name.clone(), id);
        self.defs.push(def);
        id
    }

    pub fn get(&self, id: BuildingTypeId) -> Option<&BuildingDef> {
        if id.is_some() && (id.0 as usize) <= self.defs.len() {
            Some(&self.defs[id.0 as usize - 1])
        } else {
            None
        }
    }

    pub fn id_of(&self, name: &str) -> Option<BuildingTypeId> {
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
            .map(|(i, d)| (d.name.clone(), BuildingTypeId(i as u16 + 1)))
            .collect();
    }
}

/// Mutable economy state: constructed buildings and country-level income
/// modifiers.
pub struct EconomyState {
    built: FxHashMap<(ProvinceId, BuildingTypeId), u16>,
    income_modifiers: Vec<(CountryId, TimedModifier)>,
    modifier_capacity: usize,
}

impl EconomyState {
    pub fn with_capacity(building_capacity: usize, modifier_capacity: usize) -> Self {
        let mut built = FxHashMap::default();
        built.reserve(building_capacity);
        Self {
            built,
            income_modifiers: Vec::with_capacity(modifier_capacity),
            modifier_capacity,
        }
    }

    pub fn building_count(&self, province: ProvinceId, building: BuildingTypeId) -> u16 {
        self.built.get(&(province, building)).copied().unwrap_or(0)
    }

    pub fn add_building(&mut self, province: ProvinceId, building: BuildingTypeId) {
        *self.built.entry((province, building)).or_insert(0) += 1;
    }

    /// Monthly building income for one province.
    pub fn province_building_income(
        &self,
        registry: &BuildingRegistry,
        province: ProvinceId,
    ) -> Fixed {
        let mut total = Fixed::ZERO;
        for (&(p, building), &count) in &self.built {
            if p == province {
                if let Some(def) = registry.get(building) {
                    total = total + def.income * Fixed::from_int(count as i64);
                }
            }
        }
        total
    }

    #[must_use]
    pub fn add_income_modifier(&mut self, country: CountryId, modifier: TimedModifier) -> bool {
        if self.income_modifiers.len() >= self.modifier_capacity {
            log::warn!("income modifier capacity {} exhausted", self.modifier_capacity);
            return false;
        }
        self.income_modifiers.push((country, modifier));
        true
    }

    /// Sum of live income modifiers for a country at `tick`.
    pub fn income_modifier_sum(&self, country: CountryId, tick: Tick) -> Fixed {
        self.income_modifiers
            .iter()
            .filter(|(c, _)| *c == country)
            .map(|(_, m)| m.value_at(tick))
            .sum()
    }

    /// Drop fully-decayed income modifiers (sequential, order-preserving).
    pub fn compact_expired(&mut self, tick: Tick) -> usize {
        let before = self.income_modifiers.len();
        self.income_modifiers.retain(|(_, m)| !m.is_expired(tick));
        before - self.income_modifiers.len()
    }

    /// Buildings sorted by (province, type) for stable serialization.
    pub fn built_sorted(&self) -> Vec<(ProvinceId, BuildingTypeId, u16)> {
        let mut entries: Vec<_> = self
            .built
            .iter()
            .map(|(&(p, b), &count)| (p, b, count))
            .collect();
        entries.sort_unstable();
        entries
    }

    pub fn income_modifiers_raw(&self) -> &[(CountryId, TimedModifier)] {
        &self.income_modifiers
    }

    pub fn restore(
        &mut self,
        built: Vec<(ProvinceId, BuildingTypeId, u16)>,
        income_modifiers: Vec<(CountryId, TimedModifier)>,
    ) {
        self.built.clear();
        for (province, building, count) in built {
            self.built.insert((province, building), count);
        }
        self.income_modifiers.clear();
        self.income_modifiers.extend_from_slice(&income_modifiers);
    }
}

/// Accrue monthly income for every country into the treasury resource.
pub fn run_economy_tick(state: &mut GameState, tick: Tick) {
    let gold = state.well_known.gold;
    let n = state.countries.count();
    // Income per country, indexed id-1. Scratch sized once per call site
    // would be nicer, but monthly cadence keeps this cold.
    let mut income = vec![Fixed::ZERO; n as usize];

    for (id, province) in state.provinces.iter() {
        let owner = province.owner;
        if owner.is_none() || owner.0 > n {
            continue;
        }
        let terrain_income = state
            .terrain_def(province.terrain)
            .map(|t| Fixed::from_int(t.income))
            .unwrap_or(Fixed::ZERO);
        let buildings = state
            .economy
            .province_building_income(&state.buildings, id);
        income[owner.0 as usize - 1] =
            income[owner.0 as usize - 1] + terrain_income + buildings;
    }

    for country in state.countries.iter_ids() {
        let total = income[country.0 as usize - 1]
            + state.economy.income_modifier_sum(country, tick);
        if total > Fixed::ZERO {
            state.resources.add(country, gold, total);
        }
    }

    let compacted = state.economy.compact_expired(tick);
    if compacted > 0 {
        log::debug!("economy: compacted {compacted} expired income modifiers");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ModifierTypeId;
    use crate::testing::GameStateBuilder;

    #[test]
    fn test_registry() {
        let mut reg = BuildingRegistry::default();
        let id = reg.register(BuildingDef {
            name: "market".into(),
            cost: Fixed::from_int(50),
            income: Fixed::from_int(2),
        });
        assert_eq!(reg.id_of("market"), Some(id));
        assert_eq!(reg.get(id).unwrap().income, Fixed::from_int(2));
    }

    #[test]
    fn test_income_accrual() {
        let mut state = GameStateBuilder::new()
            .with_country("AAA")
            .with_country("BBB")
            .with_province(1, Some("AAA"))
            .with_province(2, Some("AAA"))
            .with_province(3, Some("BBB"))
            .with_province(4, None)
            .build();
        let gold = state.well_known.gold;

        run_economy_tick(&mut state, 0);

        // Default terrain earns 1/month per province
        assert_eq!(
            state.resources.get(CountryId(1), gold),
            Fixed::from_int(2)
        );
        assert_eq!(
            state.resources.get(CountryId(2), gold),
            Fixed::from_int(1)
        );
    }

    #[test]
    fn test_building_income() {
        let mut state = GameStateBuilder::new()
            .with_country("AAA")
            .with_province(1, Some("AAA"))
            .build();
        let gold = state.well_known.gold;
        let market = state.buildings.register(BuildingDef {
            name: "market".into(),
            cost: Fixed::from_int(50),
            income: Fixed::from_int(3),
        });
        state.economy.add_building(ProvinceId(1), market);
        state.economy.add_building(ProvinceId(1), market);

        run_economy_tick(&mut state, 0);
        // 1 terrain + 2 × 3 buildings
        assert_eq!(
            state.resources.get(CountryId(1), gold),
            Fixed::from_int(7)
        );
    }

    #[test]
    fn test_income_modifier_decays_out() {
        let mut state = GameStateBuilder::new()
            .with_country("AAA")
            .with_province(1, Some("AAA"))
            .build();
        let gold = state.well_known.gold;
        assert!(state.economy.add_income_modifier(
            CountryId(1),
            TimedModifier::new(ModifierTypeId(1), 0, 100, Fixed::from_int(10)),
        ));

        run_economy_tick(&mut state, 0);
        assert_eq!(
            state.resources.get(CountryId(1), gold),
            Fixed::from_int(11)
        );

        // Expired by tick 100 and compacted out
        run_economy_tick(&mut state, 100);
        assert_eq!(
            state.resources.get(CountryId(1), gold),
            Fixed::from_int(12)
        );
        assert!(state.economy.income_modifiers_raw().is_empty());
    }

    #[test]
    fn test_built_sorted_stable() {
        let mut economy = EconomyState::with_capacity(16, 16);
        economy.add_building(ProvinceId(5), BuildingTypeId(2));
        economy.add_building(ProvinceId(1), BuildingTypeId(1));
        economy.add_building(ProvinceId(5), BuildingTypeId(1));
        let sorted = economy.built_sorted();
        assert_eq!(
            sorted,
            vec![
                (ProvinceId(1), BuildingTypeId(1), 1),
                (ProvinceId(5), BuildingTypeId(1), 1),
                (ProvinceId(5), BuildingTypeId(2), 1),
            ]
        );
    }
}
