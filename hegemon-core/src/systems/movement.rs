//! Hourly movement-queue progression.
//!
//! Each moving unit counts down its current segment; on reaching zero it
//! steps to the next waypoint and re-arms the timer. Passability is
//! re-checked at every waypoint: a path that was valid when ordered can be
//! cut by an ownership change mid-journey, in which case the unit stops
//! where it is and a cancellation event fires.

use crate::events::{PendingEvent, UnitMoved, UnitMovementCancelled};
use crate::ids::{ProvinceId, Tick, UnitId};
use crate::pathfind::PathFlags;
use crate::state::GameState;
use crate::units::MovementOrder;

enum Step {
    /// Keep counting down.
    InTransit,
    /// Enter `to`; None order means the destination was reached.
    Advance { to: ProvinceId, finished: bool },
    /// Waypoint became impassable; stop here.
    Cancel,
}

/// Advance every movement order by one hour.
pub fn run_movement_tick(state: &mut GameState, tick: Tick, pending: &mut Vec<PendingEvent>, scratch: &mut Vec<UnitId>) {
    state.units.moving_units(scratch);

    for &unit_id in scratch.iter() {
        // Phase 1: read-only decision against the READ buffers.
        let decision = {
            let Some(unit) = state.units.get(unit_id) else {
                continue;
            };
            let Some(order) = state.units.order_of(unit_id) else {
                continue;
            };
            if order.ticks_remaining > 1 {
                Step::InTransit
            } else {
                match order.next_waypoint() {
                    Some(waypoint) => {
                        if state.can_enter(unit.country, waypoint, PathFlags::default()) {
                            Step::Advance {
                                to: waypoint,
                                finished: order.waypoint_index as usize + 1 >= order.path.len(),
                            }
                        } else {
                            Step::Cancel
                        }
                    }
                    // Exhausted path with the order still present: clear it.
                    None => Step::Advance {
                        to: state.units.get(unit_id).map(|u| u.province).unwrap_or_default(),
                        finished: true,
                    },
                }
            }
        };

        // Phase 2: apply.
        match decision {
            Step::InTransit => {
                if let Some(order) = state.units.order_mut(unit_id) {
                    order.ticks_remaining -= 1;
                }
            }
            Step::Cancel => {
                let at = state.units.get(unit_id).map(|u| u.province).unwrap_or_default();
                state.units.clear_order(unit_id);
                log::debug!("unit {unit_id} movement cancelled at {at}");
                pending.push(PendingEvent::UnitMovementCancelled(UnitMovementCancelled {
                    unit: unit_id,
                    at,
                    tick,
                }));
            }
            Step::Advance { to, finished } => {
                let from = {
                    let unit = state.units.get_mut(unit_id).expect("moving unit exists");
                    let from = unit.province;
                    unit.province = to;
                    from
                };
                if from != to {
                    pending.push(PendingEvent::UnitMoved(UnitMoved {
                        unit: unit_id,
                        from,
                        to,
                        tick,
                    }));
                }
                if finished {
                    state.units.clear_order(unit_id);
                } else {
                    let travel = state
                        .units
                        .get(unit_id)
                        .map(|u| state.unit_travel_ticks(u.unit_type))
                        .unwrap_or(24);
                    if let Some(order) = state.units.order_mut(unit_id) {
                        order.waypoint_index += 1;
                        order.ticks_remaining = travel;
                    }
                }
            }
        }
    }
}

/// Build the order for a freshly validated move command.
pub fn order_from_path(
    segment_ticks: u32,
    destination: ProvinceId,
    path_with_start: &[ProvinceId],
    tick: Tick,
) -> MovementOrder {
    MovementOrder {
        destination,
        waypoint_index: 0,
        ticks_remaining: segment_ticks,
        path: path_with_start[1..].to_vec(),
        issued_tick: tick,
    }
}
