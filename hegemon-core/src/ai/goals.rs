//! Stock strategic goals.
//!
//! Each goal works purely through the query surface and emits commands;
//! scores are fixed point and every tie-break is by ascending id so the
//! scheduler's output is replay-stable.

use crate::ai::{Constraint, Goal, GoalScratch};
use crate::command::Command;
use crate::events::CommandBuffer;
use crate::fixed::Fixed;
use crate::ids::{BuildingTypeId, CountryId, ResourceTypeId};
use crate::state::GameState;

/// Write the distinct countries owning land adjacent to `country`'s
/// provinces into `scratch.neighbors`, ascending.
fn neighbor_countries(state: &GameState, country: CountryId, scratch: &mut GoalScratch) {
    state.provinces.get_provinces_of(country, &mut scratch.provinces);
    scratch.neighbors.clear();
    for &province in &scratch.provinces {
        for &next in state.adjacency.neighbors(province) {
            let owner = state.provinces.get_owner(next);
            if owner.is_some() && owner != country && !scratch.neighbors.contains(&owner) {
                scratch.neighbors.push(owner);
            }
        }
    }
    scratch.neighbors.sort_unstable();
}

/// Build income buildings in underdeveloped provinces.
pub struct DevelopEconomy {
    constraints: Vec<Constraint>,
    gold: ResourceTypeId,
    building: BuildingTypeId,
    cost: Fixed,
}

impl DevelopEconomy {
    pub fn new(gold: ResourceTypeId, building: BuildingTypeId, cost: Fixed) -> Self {
        Self {
            constraints: vec![
                Constraint::MinProvinces(1),
                Constraint::MinResource(gold, cost),
            ],
            gold,
            building,
            cost,
        }
    }
}

impl Goal for DevelopEconomy {
    fn name(&self) -> &str {
        "develop_economy"
    }

    fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    fn evaluate(&self, country: CountryId, state: &GameState, _scratch: &mut GoalScratch) -> Fixed {
        // Affordability: richer countries invest more eagerly, capped so
        // expansion can still outbid it.
        let treasury = state.resources.get(country, self.gold);
        (treasury / self.cost).min(Fixed::from_int(5))
    }

    fn execute(
        &self,
        country: CountryId,
        state: &GameState,
        scratch: &mut GoalScratch,
        out: &mut CommandBuffer,
    ) {
        state.provinces.get_provinces_of(country, &mut scratch.provinces);
        // Least-built province wins; lowest id on ties.
        let target = scratch
            .provinces
            .iter()
            .copied()
            .min_by_key(|&p| (state.economy.building_count(p, self.building), p));
        if let Some(province) = target {
            out.submit(Command::Build {
                province,
                building: self.building,
            });
        }
    }
}

/// Spend diplomatic gold on the worst relationship among neighbors.
pub struct ImproveStanding {
    constraints: Vec<Constraint>,
    gold: ResourceTypeId,
    spend: Fixed,
}

impl ImproveStanding {
    pub fn new(gold: ResourceTypeId, spend: Fixed) -> Self {
        Self {
            constraints: vec![
                Constraint::MinProvinces(1),
                Constraint::MinResource(gold, spend),
            ],
            gold,
            spend,
        }
    }

    fn worst_neighbor(
        &self,
        country: CountryId,
        state: &GameState,
        scratch: &mut GoalScratch,
    ) -> Option<(CountryId, Fixed)> {
        neighbor_countries(state, country, scratch);
        scratch
            .neighbors
            .iter()
            .copied()
            .filter(|&other| !state.at_war(country, other))
            .map(|other| (other, state.opinion(country, other)))
            .min_by_key(|&(other, opinion)| (opinion, other))
    }
}

impl Goal for ImproveStanding {
    fn name(&self) -> &str {
        "improve_standing"
    }

    fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    fn evaluate(&self, country: CountryId, state: &GameState, scratch: &mut GoalScratch) -> Fixed {
        match self.worst_neighbor(country, state, scratch) {
            // Hostile neighbors make mending fences urgent; scale the gap
            // below zero into a modest score.
            Some((_, opinion)) if opinion < Fixed::ZERO => {
                (-opinion) / Fixed::from_int(50)
            }
            _ => Fixed::ZERO,
        }
    }

    fn execute(
        &self,
        country: CountryId,
        state: &GameState,
        scratch: &mut GoalScratch,
        out: &mut CommandBuffer,
    ) {
        if let Some((target, _)) = self.worst_neighbor(country, state, scratch) {
            out.submit(Command::ImproveRelations {
                from: country,
                to: target,
                spend: self.spend,
            });
        }
    }
}

/// Declare war on a clearly weaker neighbor.
pub struct Expand {
    constraints: Vec<Constraint>,
}

impl Expand {
    pub fn new(gold: ResourceTypeId, war_chest: Fixed) -> Self {
        Self {
            constraints: vec![
                Constraint::AtWar(false),
                Constraint::MinProvinces(1),
                Constraint::MinResource(gold, war_chest),
            ],
        }
    }

    fn weakest_target(
        &self,
        country: CountryId,
        state: &GameState,
        scratch: &mut GoalScratch,
    ) -> Option<(CountryId, u32)> {
        neighbor_countries(state, country, scratch);
        scratch
            .neighbors
            .iter()
            .copied()
            .filter(|&other| {
                !state.diplomacy.are_allied(country, other)
                    && !state.diplomacy.has_nap(country, other)
            })
            .map(|other| (other, state.provinces.count_provinces_of(other)))
            .min_by_key(|&(other, size)| (size, other))
    }
}

impl Goal for Expand {
    fn name(&self) -> &str {
        "expand"
    }

    fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    fn evaluate(&self, country: CountryId, state: &GameState, scratch: &mut GoalScratch) -> Fixed {
        let own = state.provinces.count_provinces_of(country);
        match self.weakest_target(country, state, scratch) {
            // Only worth it against someone at most half our size.
            Some((_, size)) if size * 2 <= own => {
                Fixed::from_int(own as i64) / Fixed::from_int(size.max(1) as i64)
            }
            _ => Fixed::ZERO,
        }
    }

    fn personality(&self, country: CountryId, state: &GameState) -> Fixed {
        state
            .countries
            .cold(country)
            .map(|c| c.ai_aggression)
            .unwrap_or(Fixed::ONE)
    }

    fn execute(
        &self,
        country: CountryId,
        state: &GameState,
        scratch: &mut GoalScratch,
        out: &mut CommandBuffer,
    ) {
        if let Some((target, _)) = self.weakest_target(country, state, scratch) {
            out.submit(Command::DeclareWar {
                attacker: country,
                defender: target,
            });
        }
    }
}

/// Raise units while at war.
pub struct Mobilize {
    constraints: Vec<Constraint>,
    unit_type: crate::ids::UnitTypeId,
}

impl Mobilize {
    pub fn new(unit_type: crate::ids::UnitTypeId) -> Self {
        Self {
            constraints: vec![Constraint::AtWar(true), Constraint::MinProvinces(1)],
            unit_type,
        }
    }
}

impl Goal for Mobilize {
    fn name(&self) -> &str {
        "mobilize"
    }

    fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    fn evaluate(&self, country: CountryId, state: &GameState, scratch: &mut GoalScratch) -> Fixed {
        state.units.units_of(country, &mut scratch.units);
        let units = scratch.units.len() as u32;
        let provinces = state.provinces.count_provinces_of(country);
        if units >= provinces {
            return Fixed::ZERO;
        }
        // Deficit relative to province count, weighted above economy goals
        Fixed::from_int((provinces - units) as i64) * Fixed::from_int(3)
    }

    fn execute(
        &self,
        country: CountryId,
        state: &GameState,
        scratch: &mut GoalScratch,
        out: &mut CommandBuffer,
    ) {
        state.provinces.get_provinces_of(country, &mut scratch.provinces);
        let Some(&home) = scratch.provinces.first() else {
            return;
        };
        out.submit(Command::CreateUnit {
            province: home,
            country,
            unit_type: self.unit_type,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::countries::CountryFlags;
    use crate::ids::ProvinceId;
    use crate::testing::GameStateBuilder;

    fn two_country_state() -> GameState {
        // AAA owns 1,2,3; BBB owns 4. 3-4 adjacent.
        let mut state = GameStateBuilder::new()
            .with_country("AAA")
            .with_country("BBB")
            .with_province(1, Some("AAA"))
            .with_province(2, Some("AAA"))
            .with_province(3, Some("AAA"))
            .with_province(4, Some("BBB"))
            .with_adjacency(1, 2)
            .with_adjacency(2, 3)
            .with_adjacency(3, 4)
            .build();
        for id in [1u16, 2] {
            state
                .countries
                .hot_mut(CountryId(id))
                .unwrap()
                .flags
                .insert(CountryFlags::AI_CONTROLLED);
        }
        state
    }

    #[test]
    fn test_neighbor_countries() {
        let state = two_country_state();
        let mut scratch = GoalScratch::default();
        neighbor_countries(&state, CountryId(1), &mut scratch);
        assert_eq!(scratch.neighbors, vec![CountryId(2)]);

        neighbor_countries(&state, CountryId(2), &mut scratch);
        assert_eq!(scratch.neighbors, vec![CountryId(1)]);
    }

    #[test]
    fn test_expand_targets_weaker_neighbor() {
        let state = two_country_state();
        let mut scratch = GoalScratch::default();
        let gold = state.well_known.gold;
        let goal = Expand::new(gold, Fixed::from_int(50));

        // AAA (3 provinces) vs BBB (1): worth attacking
        let score = goal.evaluate(CountryId(1), &state, &mut scratch);
        assert!(score > Fixed::ZERO);

        let mut out = CommandBuffer::default();
        goal.execute(CountryId(1), &state, &mut scratch, &mut out);
        let mut drained = Vec::new();
        out.drain_into(&mut drained);
        assert_eq!(
            drained,
            vec![Command::DeclareWar {
                attacker: CountryId(1),
                defender: CountryId(2),
            }]
        );

        // BBB (1 province) vs AAA (3): not worth it
        let score = goal.evaluate(CountryId(2), &state, &mut scratch);
        assert_eq!(score, Fixed::ZERO);
    }

    #[test]
    fn test_expand_respects_nap() {
        let mut state = two_country_state();
        assert!(state.diplomacy.set_symmetric_treaty(
            CountryId(1),
            CountryId(2),
            crate::diplomacy::TreatyFlags::NON_AGGRESSION,
            true
        ));
        let gold = state.well_known.gold;
        let goal = Expand::new(gold, Fixed::from_int(50));
        let mut scratch = GoalScratch::default();
        assert_eq!(goal.evaluate(CountryId(1), &state, &mut scratch), Fixed::ZERO);
    }

    #[test]
    fn test_develop_picks_least_built_province() {
        let mut state = two_country_state();
        let gold = state.well_known.gold;
        let market = state.buildings.id_of("market").unwrap();
        // Province 1 already has a market; 2 and 3 are bare → 2 wins (lowest id)
        state.economy.add_building(ProvinceId(1), market);

        let goal = DevelopEconomy::new(gold, market, Fixed::from_int(50));
        let mut scratch = GoalScratch::default();
        let mut out = CommandBuffer::default();
        goal.execute(CountryId(1), &state, &mut scratch, &mut out);

        let mut drained = Vec::new();
        out.drain_into(&mut drained);
        assert_eq!(
            drained,
            vec![Command::Build {
                province: ProvinceId(2),
                building: market,
            }]
        );
    }

    #[test]
    fn test_improve_standing_targets_worst_opinion() {
        let mut state = two_country_state();
        state
            .diplomacy
            .adjust_base_opinion(CountryId(1), CountryId(2), Fixed::from_int(-80));
        let gold = state.well_known.gold;
        let goal = ImproveStanding::new(gold, Fixed::from_int(10));
        let mut scratch = GoalScratch::default();

        assert!(goal.evaluate(CountryId(1), &state, &mut scratch) > Fixed::ZERO);

        let mut out = CommandBuffer::default();
        goal.execute(CountryId(1), &state, &mut scratch, &mut out);
        let mut drained = Vec::new();
        out.drain_into(&mut drained);
        assert_eq!(
            drained,
            vec![Command::ImproveRelations {
                from: CountryId(1),
                to: CountryId(2),
                spend: Fixed::from_int(10),
            }]
        );
    }

    #[test]
    fn test_mobilize_only_at_war() {
        let mut state = two_country_state();
        let goal = Mobilize::new(crate::ids::UnitTypeId(1));

        // At peace the constraint gate fails
        assert!(!goal.constraints()[0].check(CountryId(1), &state));

        assert!(state.diplomacy.set_at_war(CountryId(1), CountryId(2)));
        assert!(goal.constraints()[0].check(CountryId(1), &state));

        let mut scratch = GoalScratch::default();
        assert!(goal.evaluate(CountryId(1), &state, &mut scratch) > Fixed::ZERO);

        let mut out = CommandBuffer::default();
        goal.execute(CountryId(1), &state, &mut scratch, &mut out);
        let mut drained = Vec::new();
        out.drain_into(&mut drained);
        assert_eq!(drained.len(), 1);
        assert!(matches!(drained[0], Command::CreateUnit { .. }));
    }
}
