//! Per-tick simulation systems, run by the dispatcher in dependency order.

pub mod combat;
pub mod economy;
pub mod movement;

pub use combat::run_combat_tick;
pub use economy::{run_economy_tick, BuildingDef, BuildingRegistry, EconomyState};
pub use movement::run_movement_tick;
