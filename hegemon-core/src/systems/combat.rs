//! Deterministic battle resolution.
//!
//! Whenever units of warring countries share a province, the resolver runs
//! each hourly tick: damage is `strength × attack − strength × defense` in
//! fixed point, casualties land on strength, and a morale break retreats
//! the loser to its lowest-id passable neighbor. Dice come from the keyed
//! combat stream, so replays roll identically.

use crate::events::{PendingEvent, UnitDestroyed, UnitMoved};
use crate::fixed::Fixed;
use crate::ids::{ProvinceId, Tick, UnitId};
use crate::pathfind::PathFlags;
use crate::rng::{streams, StreamRng};
use crate::state::GameState;

/// Morale restored after a successful retreat.
const RETREAT_MORALE: u8 = 25;
/// Morale lost per combat round.
const MORALE_DAMAGE: u8 = 10;

/// Resolve one hourly combat round everywhere.
pub fn run_combat_tick(
    state: &mut GameState,
    tick: Tick,
    pending: &mut Vec<PendingEvent>,
    roster: &mut Vec<(ProvinceId, UnitId)>,
) {
    // Deterministic roster: (province, unit id) ascending.
    roster.clear();
    for (id, unit) in state.units.iter() {
        roster.push((unit.province, id));
    }
    roster.sort_unstable();

    let mut rng = StreamRng::new(state.seed, tick, streams::COMBAT);

    // Walk province groups; within a group, pair each unit with the first
    // hostile unit after it. Pair order is fully determined by the roster.
    let mut group_start = 0;
    while group_start < roster.len() {
        let province = roster[group_start].0;
        let mut group_end = group_start + 1;
        while group_end < roster.len() && roster[group_end].0 == province {
            group_end += 1;
        }

        for i in group_start..group_end {
            for j in (i + 1)..group_end {
                let (a, b) = (roster[i].1, roster[j].1);
                let hostile = match (state.units.get(a), state.units.get(b)) {
                    (Some(ua), Some(ub)) => {
                        // Either side may have retreated or died earlier
                        // this tick; only live co-located hostiles fight.
                        ua.province == province
                            && ub.province == province
                            && state.at_war(ua.country, ub.country)
                    }
                    _ => false,
                };
                if hostile {
                    resolve_round(state, tick, a, b, &mut rng, pending);
                }
            }
        }

        group_start = group_end;
    }
}

fn resolve_round(
    state: &mut GameState,
    tick: Tick,
    attacker: UnitId,
    defender: UnitId,
    rng: &mut StreamRng,
    pending: &mut Vec<PendingEvent>,
) {
    let (atk_mods, def_mods, strength_a, strength_b) = {
        let ua = state.units.get(attacker).expect("attacker alive");
        let ub = state.units.get(defender).expect("defender alive");
        let atk = state
            .unit_types
            .get(ua.unit_type)
            .map(|d| d.attack)
            .unwrap_or(Fixed::ONE);
        let def = state
            .unit_types
            .get(ub.unit_type)
            .map(|d| d.defense)
            .unwrap_or(Fixed::ONE);
        (
            atk,
            def,
            Fixed::from_int(ua.strength as i64),
            Fixed::from_int(ub.strength as i64),
        )
    };

    // Casualties on each side from the opposing side's surplus.
    let dealt_to_b = (strength_a * atk_mods - strength_b * def_mods).max(Fixed::ZERO);
    let dealt_to_a = (strength_b * atk_mods - strength_a * def_mods).max(Fixed::ZERO);

    let dice_b = rng.next_range(3) as u8;
    let dice_a = rng.next_range(3) as u8;
    let casualties_b = ((dealt_to_b / Fixed::from_int(10)).to_int() as u8).saturating_add(1 + dice_b);
    let casualties_a = ((dealt_to_a / Fixed::from_int(10)).to_int() as u8).saturating_add(1 + dice_a);

    apply_round_result(state, tick, defender, casualties_b, pending);
    apply_round_result(state, tick, attacker, casualties_a, pending);
}

fn apply_round_result(
    state: &mut GameState,
    tick: Tick,
    unit_id: UnitId,
    casualties: u8,
    pending: &mut Vec<PendingEvent>,
) {
    let (country, province, strength, morale) = {
        let unit = state.units.get_mut(unit_id).expect("unit alive");
        unit.strength = unit.strength.saturating_sub(casualties);
        unit.morale = unit.morale.saturating_sub(MORALE_DAMAGE);
        (unit.country, unit.province, unit.strength, unit.morale)
    };

    if strength == 0 {
        state.units.despawn(unit_id);
        log::debug!("unit {unit_id} destroyed in {province}");
        pending.push(PendingEvent::UnitDestroyed(UnitDestroyed {
            unit: unit_id,
            country,
            province,
            tick,
        }));
        return;
    }

    if morale == 0 {
        // Morale break: fall back to the lowest-id enterable neighbor.
        let refuge = state
            .adjacency
            .neighbors(province)
            .iter()
            .copied()
            .find(|&p| state.can_enter(country, p, PathFlags::default()));
        if let Some(refuge) = refuge {
            let unit = state.units.get_mut(unit_id).expect("unit alive");
            unit.province = refuge;
            unit.morale = RETREAT_MORALE;
            // A retreat abandons whatever march was under way.
            state.units.clear_order(unit_id);
            log::debug!("unit {unit_id} broke and retreated to {refuge}");
            pending.push(PendingEvent::UnitMoved(UnitMoved {
                unit: unit_id,
                from: province,
                to: refuge,
                tick,
            }));
        }
        // Nowhere to run: the unit holds at zero morale and keeps taking
        // full casualties.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CountryId, UnitTypeId};
    use crate::testing::GameStateBuilder;

    fn battle_state() -> GameState {
        let mut state = GameStateBuilder::new()
            .with_country("AAA")
            .with_country("BBB")
            .with_province(1, Some("AAA"))
            .with_province(2, Some("AAA"))
            .with_province(3, Some("BBB"))
            .with_adjacency(1, 2)
            .with_adjacency(2, 3)
            .build();
        assert!(state.diplomacy.set_at_war(CountryId(1), CountryId(2)));
        state
    }

    #[test]
    fn test_no_combat_at_peace() {
        let mut state = GameStateBuilder::new()
            .with_country("AAA")
            .with_country("BBB")
            .with_province(1, Some("AAA"))
            .build();
        let a = state.units.spawn(ProvinceId(1), CountryId(1), UnitTypeId(1)).unwrap();
        let b = state.units.spawn(ProvinceId(1), CountryId(2), UnitTypeId(1)).unwrap();

        let mut pending = Vec::new();
        let mut roster = Vec::new();
        run_combat_tick(&mut state, 1, &mut pending, &mut roster);

        assert_eq!(state.units.get(a).unwrap().strength, 100);
        assert_eq!(state.units.get(b).unwrap().strength, 100);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_co_located_hostiles_take_casualties() {
        let mut state = battle_state();
        let a = state.units.spawn(ProvinceId(2), CountryId(1), UnitTypeId(1)).unwrap();
        let b = state.units.spawn(ProvinceId(2), CountryId(2), UnitTypeId(1)).unwrap();

        let mut pending = Vec::new();
        let mut roster = Vec::new();
        run_combat_tick(&mut state, 1, &mut pending, &mut roster);

        let ua = state.units.get(a).unwrap();
        let ub = state.units.get(b).unwrap();
        assert!(ua.strength < 100);
        assert!(ub.strength < 100);
        assert_eq!(ua.morale, 100 - MORALE_DAMAGE);
        assert_eq!(ub.morale, 100 - MORALE_DAMAGE);
    }

    #[test]
    fn test_units_in_different_provinces_do_not_fight() {
        let mut state = battle_state();
        let a = state.units.spawn(ProvinceId(1), CountryId(1), UnitTypeId(1)).unwrap();
        let b = state.units.spawn(ProvinceId(3), CountryId(2), UnitTypeId(1)).unwrap();

        let mut pending = Vec::new();
        let mut roster = Vec::new();
        run_combat_tick(&mut state, 1, &mut pending, &mut roster);

        assert_eq!(state.units.get(a).unwrap().strength, 100);
        assert_eq!(state.units.get(b).unwrap().strength, 100);
    }

    #[test]
    fn test_morale_break_retreats_to_lowest_neighbor() {
        let mut state = battle_state();
        let a = state.units.spawn(ProvinceId(2), CountryId(1), UnitTypeId(1)).unwrap();
        let _b = state.units.spawn(ProvinceId(2), CountryId(2), UnitTypeId(1)).unwrap();

        let mut pending = Vec::new();
        let mut roster = Vec::new();
        // Ten rounds drain 100 morale at 10 per round
        for t in 1..=10u64 {
            run_combat_tick(&mut state, t, &mut pending, &mut roster);
            if state.units.get(a).map(|u| u.province) != Some(ProvinceId(2)) {
                break;
            }
        }

        let ua = state.units.get(a).expect("survived to retreat");
        // Province 2 neighbors are 1 and 3; 1 is own land and lowest
        assert_eq!(ua.province, ProvinceId(1));
        assert_eq!(ua.morale, RETREAT_MORALE);
        assert!(state.units.order_of(a).is_none());
    }

    #[test]
    fn test_destroyed_at_zero_strength() {
        let mut state = battle_state();
        let a = state.units.spawn(ProvinceId(2), CountryId(1), UnitTypeId(1)).unwrap();
        let b = state.units.spawn(ProvinceId(2), CountryId(2), UnitTypeId(1)).unwrap();
        state.units.get_mut(b).unwrap().strength = 1;

        let mut pending = Vec::new();
        let mut roster = Vec::new();
        run_combat_tick(&mut state, 1, &mut pending, &mut roster);

        assert!(state.units.get(b).is_none());
        assert!(state.units.get(a).is_some());
        assert!(pending
            .iter()
            .any(|e| matches!(e, PendingEvent::UnitDestroyed(d) if d.unit == b)));
    }

    #[test]
    fn test_combat_deterministic() {
        let run = || {
            let mut state = battle_state();
            let _ = state.units.spawn(ProvinceId(2), CountryId(1), UnitTypeId(1)).unwrap();
            let _ = state.units.spawn(ProvinceId(2), CountryId(2), UnitTypeId(1)).unwrap();
            let mut pending = Vec::new();
            let mut roster = Vec::new();
            for t in 1..=6u64 {
                run_combat_tick(&mut state, t, &mut pending, &mut roster);
            }
            state.units.raw_slots().to_vec()
        };
        assert_eq!(run(), run());
    }
}
