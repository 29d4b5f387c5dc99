//! Default alliance policy: honor defensive calls to arms.
//!
//! The core's diplomacy store only provides mechanism (who is allied to
//! whom, transitively). Whether allies actually join a war is policy, so it
//! lives here as an ordinary bus subscriber the host installs at load. On
//! every war declaration the handler walks the defender's recursive
//! alliance graph and submits one war declaration per ally, plus a decaying
//! goodwill bonus toward the defender for honoring the call. Each
//! declaration passes through normal command validation: an ally shielded
//! by a NAP with the attacker simply fails to join, visible as a rejected
//! command in the log.

use crate::command::Command;
use crate::events::{CompositeDisposable, EventBus, WarDeclared};
use crate::fixed::Fixed;

/// Opinion bonus an ally gains toward the defender it helped.
pub const WAR_HELP_OPINION: i64 = 30;
/// The bonus decays over five years.
pub const WAR_HELP_DECAY_TICKS: u32 = 5 * 360 * 24;

/// Install the auto-join handler. The returned group detaches it.
pub fn install_alliance_policy(bus: &mut EventBus) -> CompositeDisposable {
    let mut group = CompositeDisposable::default();

    group.add(bus.subscribe::<WarDeclared, _>(|event, state, buffer| {
        let mut allies = Vec::new();
        state
            .diplomacy
            .get_allies_recursive(event.defender, &mut allies);

        for ally in allies {
            if ally == event.attacker {
                continue;
            }
            log::info!(
                "alliance policy: {ally} honors the defense of {} against {}",
                event.defender,
                event.attacker
            );
            buffer.submit(Command::DeclareWar {
                attacker: ally,
                defender: event.attacker,
            });
            buffer.submit(Command::AddOpinionModifier {
                a: ally,
                b: event.defender,
                kind: state.well_known.defensive_war_help,
                magnitude: Fixed::from_int(WAR_HELP_OPINION),
                decay_ticks: WAR_HELP_DECAY_TICKS,
            });
        }
    }));

    group
}
