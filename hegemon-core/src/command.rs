//! The command pipeline's data types.
//!
//! Every authoritative mutation is a typed command. Validation and
//! application live in [`crate::step`]; this module owns the command set,
//! the rejection taxonomy, the stable wire codec (type tag + little-endian
//! payload) used by the save-file command log, and the ring buffer that
//! retains the most recent ticks' worth of commands for replay
//! verification.

use crate::fixed::Fixed;
use crate::ids::{
    BuildingTypeId, CountryId, ModifierTypeId, ProvinceId, ResourceTypeId, Tick, UnitId,
    UnitTypeId,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

/// Why a command was rejected. Rejections leave the state untouched; the
/// core never throws for routine failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    #[error("unknown province {0:?}")]
    UnknownProvince(ProvinceId),
    #[error("unknown country {0:?}")]
    UnknownCountry(CountryId),
    #[error("unknown unit {0:?}")]
    UnknownUnit(UnitId),
    #[error("target is invalid for this command")]
    UnknownTarget,
    #[error("insufficient resources")]
    InsufficientResources,
    #[error("already at war")]
    AlreadyAtWar,
    #[error("not at war")]
    NotAtWar,
    #[error("blocked by non-aggression pact")]
    BlockedByNAP,
    #[error("blocked by alliance")]
    BlockedByAlliance,
    #[error("no path to destination")]
    NoPath,
    #[error("forbidden target")]
    ForbiddenTarget,
    #[error("capacity exceeded")]
    CapacityExceeded,
}

/// Summary of a successfully applied command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Effects {
    /// Unit allocated by a `CreateUnit`.
    pub created_unit: Option<UnitId>,
    /// State-change events queued for the barrier.
    pub events_queued: u32,
}

/// The closed set of authoritative mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    // Diplomacy - war
    DeclareWar {
        attacker: CountryId,
        defender: CountryId,
    },
    MakePeace {
        a: CountryId,
        b: CountryId,
    },
    /// Spend resources to raise base opinion with another country.
    ImproveRelations {
        from: CountryId,
        to: CountryId,
        spend: Fixed,
    },

    // Diplomacy - treaties
    FormAlliance {
        a: CountryId,
        b: CountryId,
    },
    BreakAlliance {
        a: CountryId,
        b: CountryId,
    },
    FormNonAggressionPact {
        a: CountryId,
        b: CountryId,
    },
    BreakNonAggressionPact {
        a: CountryId,
        b: CountryId,
    },
    FormGuarantee {
        from: CountryId,
        to: CountryId,
    },
    BreakGuarantee {
        from: CountryId,
        to: CountryId,
    },
    GrantMilitaryAccess {
        from: CountryId,
        to: CountryId,
    },
    RevokeMilitaryAccess {
        from: CountryId,
        to: CountryId,
    },
    /// Attach a timed opinion modifier to a pair (also used by policy
    /// handlers, e.g. the defensive-war-help bonus).
    AddOpinionModifier {
        a: CountryId,
        b: CountryId,
        kind: ModifierTypeId,
        magnitude: Fixed,
        decay_ticks: u32,
    },

    // Military
    CreateUnit {
        province: ProvinceId,
        country: CountryId,
        unit_type: UnitTypeId,
    },
    MoveUnit {
        unit: UnitId,
        destination: ProvinceId,
    },
    DisbandUnit {
        unit: UnitId,
    },

    // Economy
    Build {
        province: ProvinceId,
        building: BuildingTypeId,
    },
    AddResource {
        country: CountryId,
        resource: ResourceTypeId,
        amount: Fixed,
    },

    // Province administration
    SetProvinceOwner {
        province: ProvinceId,
        owner: CountryId,
    },
}

// Wire type tags. Stable across versions; append-only.
const TAG_DECLARE_WAR: u8 = 1;
const TAG_MAKE_PEACE: u8 = 2;
const TAG_IMPROVE_RELATIONS: u8 = 3;
const TAG_FORM_ALLIANCE: u8 = 4;
const TAG_BREAK_ALLIANCE: u8 = 5;
const TAG_FORM_NAP: u8 = 6;
const TAG_BREAK_NAP: u8 = 7;
const TAG_FORM_GUARANTEE: u8 = 8;
const TAG_BREAK_GUARANTEE: u8 = 9;
const TAG_GRANT_ACCESS: u8 = 10;
const TAG_REVOKE_ACCESS: u8 = 11;
const TAG_ADD_OPINION_MODIFIER: u8 = 12;
const TAG_CREATE_UNIT: u8 = 13;
const TAG_MOVE_UNIT: u8 = 14;
const TAG_DISBAND_UNIT: u8 = 15;
const TAG_BUILD: u8 = 16;
const TAG_ADD_RESOURCE: u8 = 17;
const TAG_SET_PROVINCE_OWNER: u8 = 18;

pub(crate) fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_i64(out: &mut Vec<u8>, v: i64) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn take_u16(input: &mut &[u8]) -> Option<u16> {
    let (bytes, rest) = input.split_first_chunk::<2>()?;
    *input = rest;
    Some(u16::from_le_bytes(*bytes))
}

pub(crate) fn take_u32(input: &mut &[u8]) -> Option<u32> {
    let (bytes, rest) = input.split_first_chunk::<4>()?;
    *input = rest;
    Some(u32::from_le_bytes(*bytes))
}

pub(crate) fn take_i64(input: &mut &[u8]) -> Option<i64> {
    let (bytes, rest) = input.split_first_chunk::<8>()?;
    *input = rest;
    Some(i64::from_le_bytes(*bytes))
}

impl Command {
    /// Append the stable byte encoding: one type tag, then the payload
    /// fields little-endian in declaration order. Fixed values serialize
    /// as their raw i64.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match *self {
            Command::DeclareWar { attacker, defender } => {
                out.push(TAG_DECLARE_WAR);
                put_u16(out, attacker.0);
                put_u16(out, defender.0);
            }
            Command::MakePeace { a, b } => {
                out.push(TAG_MAKE_PEACE);
                put_u16(out, a.0);
                put_u16(out, b.0);
            }
            Command::ImproveRelations { from, to, spend } => {
                out.push(TAG_IMPROVE_RELATIONS);
                put_u16(out, from.0);
                put_u16(out, to.0);
                put_i64(out, spend.raw());
            }
            Command::FormAlliance { a, b } => {
                out.push(TAG_FORM_ALLIANCE);
                put_u16(out, a.0);
                put_u16(out, b.0);
            }
            Command::BreakAlliance { a, b } => {
                out.push(TAG_BREAK_ALLIANCE);
                put_u16(out, a.0);
                put_u16(out, b.0);
            }
            Command::FormNonAggressionPact { a, b } => {
                out.push(TAG_FORM_NAP);
                put_u16(out, a.0);
                put_u16(out, b.0);
            }
            Command::BreakNonAggressionPact { a, b } => {
                out.push(TAG_BREAK_NAP);
                put_u16(out, a.0);
                put_u16(out, b.0);
            }
            Command::FormGuarantee { from, to } => {
                out.push(TAG_FORM_GUARANTEE);
                put_u16(out, from.0);
                put_u16(out, to.0);
            }
            Command::BreakGuarantee { from, to } => {
                out.push(TAG_BREAK_GUARANTEE);
                put_u16(out, from.0);
                put_u16(out, to.0);
            }
            Command::GrantMilitaryAccess { from, to } => {
                out.push(TAG_GRANT_ACCESS);
                put_u16(out, from.0);
                put_u16(out, to.0);
            }
            Command::RevokeMilitaryAccess { from, to } => {
                out.push(TAG_REVOKE_ACCESS);
                put_u16(out, from.0);
                put_u16(out, to.0);
            }
            Command::AddOpinionModifier {
                a,
                b,
                kind,
                magnitude,
                decay_ticks,
            } => {
                out.push(TAG_ADD_OPINION_MODIFIER);
                put_u16(out, a.0);
                put_u16(out, b.0);
                put_u16(out, kind.0);
                put_i64(out, magnitude.raw());
                put_u32(out, decay_ticks);
            }
            Command::CreateUnit {
                province,
                country,
                unit_type,
            } => {
                out.push(TAG_CREATE_UNIT);
                put_u16(out, province.0);
                put_u16(out, country.0);
                put_u16(out, unit_type.0);
            }
            Command::MoveUnit { unit, destination } => {
                out.push(TAG_MOVE_UNIT);
                put_u16(out, unit.0);
                put_u16(out, destination.0);
            }
            Command::DisbandUnit { unit } => {
                out.push(TAG_DISBAND_UNIT);
                put_u16(out, unit.0);
            }
            Command::Build { province, building } => {
                out.push(TAG_BUILD);
                put_u16(out, province.0);
                put_u16(out, building.0);
            }
            Command::AddResource {
                country,
                resource,
                amount,
            } => {
                out.push(TAG_ADD_RESOURCE);
                put_u16(out, country.0);
                put_u16(out, resource.0);
                put_i64(out, amount.raw());
            }
            Command::SetProvinceOwner { province, owner } => {
                out.push(TAG_SET_PROVINCE_OWNER);
                put_u16(out, province.0);
                put_u16(out, owner.0);
            }
        }
    }

    /// Decode one command from the front of `input`, advancing it.
    /// None on a truncated or unknown encoding.
    pub fn decode(input: &mut &[u8]) -> Option<Command> {
        let (&tag, rest) = input.split_first()?;
        *input = rest;
        Some(match tag {
            TAG_DECLARE_WAR => Command::DeclareWar {
                attacker: CountryId(take_u16(input)?),
                defender: CountryId(take_u16(input)?),
            },
            TAG_MAKE_PEACE => Command::MakePeace {
                a: CountryId(take_u16(input)?),
                b: CountryId(take_u16(input)?),
            },
            TAG_IMPROVE_RELATIONS => Command::ImproveRelations {
                from: CountryId(take_u16(input)?),
                to: CountryId(take_u16(input)?),
                spend: Fixed::from_raw(take_i64(input)?),
            },
            TAG_FORM_ALLIANCE => Command::FormAlliance {
                a: CountryId(take_u16(input)?),
                b: CountryId(take_u16(input)?),
            },
            TAG_BREAK_ALLIANCE => Command::BreakAlliance {
                a: CountryId(take_u16(input)?),
                b: CountryId(take_u16(input)?),
            },
            TAG_FORM_NAP => Command::FormNonAggressionPact {
                a: CountryId(take_u16(input)?),
                b: CountryId(take_u16(input)?),
            },
            TAG_BREAK_NAP => Command::BreakNonAggressionPact {
                a: CountryId(take_u16(input)?),
                b: CountryId(take_u16(input)?),
            },
            TAG_FORM_GUARANTEE => Command::FormGuarantee {
                from: CountryId(take_u16(input)?),
                to: CountryId(take_u16(input)?),
            },
            TAG_BREAK_GUARANTEE => Command::BreakGuarantee {
                from: CountryId(take_u16(input)?),
                to: CountryId(take_u16(input)?),
            },
            TAG_GRANT_ACCESS => Command::GrantMilitaryAccess {
                from: CountryId(take_u16(input)?),
                to: CountryId(take_u16(input)?),
            },
            TAG_REVOKE_ACCESS => Command::RevokeMilitaryAccess {
                from: CountryId(take_u16(input)?),
                to: CountryId(take_u16(input)?),
            },
            TAG_ADD_OPINION_MODIFIER => Command::AddOpinionModifier {
                a: CountryId(take_u16(input)?),
                b: CountryId(take_u16(input)?),
                kind: ModifierTypeId(take_u16(input)?),
                magnitude: Fixed::from_raw(take_i64(input)?),
                decay_ticks: take_u32(input)?,
            },
            TAG_CREATE_UNIT => Command::CreateUnit {
                province: ProvinceId(take_u16(input)?),
                country: CountryId(take_u16(input)?),
                unit_type: UnitTypeId(take_u16(input)?),
            },
            TAG_MOVE_UNIT => Command::MoveUnit {
                unit: UnitId(take_u16(input)?),
                destination: ProvinceId(take_u16(input)?),
            },
            TAG_DISBAND_UNIT => Command::DisbandUnit {
                unit: UnitId(take_u16(input)?),
            },
            TAG_BUILD => Command::Build {
                province: ProvinceId(take_u16(input)?),
                building: BuildingTypeId(take_u16(input)?),
            },
            TAG_ADD_RESOURCE => Command::AddResource {
                country: CountryId(take_u16(input)?),
                resource: ResourceTypeId(take_u16(input)?),
                amount: Fixed::from_raw(take_i64(input)?),
            },
            TAG_SET_PROVINCE_OWNER => Command::SetProvinceOwner {
                province: ProvinceId(take_u16(input)?),
                owner: CountryId(take_u16(input)?),
            },
            _ => return None,
        })
    }
}

/// Ring buffer of applied commands, retaining the most recent K ticks for
/// replay verification. ~60 commands/tick puts the default retention of
/// 100 ticks around six thousand commands.
#[derive(Debug, Clone)]
pub struct CommandLog {
    retention_ticks: u64,
    entries: VecDeque<(Tick, Command)>,
}

impl CommandLog {
    pub fn new(retention_ticks: u64) -> Self {
        Self {
            retention_ticks,
            entries: VecDeque::with_capacity(8192),
        }
    }

    /// Record an applied command.
    pub fn push(&mut self, tick: Tick, command: Command) {
        self.entries.push_back((tick, command));
    }

    /// Drop entries older than the retention window.
    pub fn prune(&mut self, current_tick: Tick) {
        let cutoff = current_tick.saturating_sub(self.retention_ticks);
        while let Some(&(tick, _)) = self.entries.front() {
            if tick < cutoff {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn retention_ticks(&self) -> u64 {
        self.retention_ticks
    }

    /// Entries at or after `tick`, oldest first.
    pub fn entries_since(&self, tick: Tick) -> impl Iterator<Item = &(Tick, Command)> {
        self.entries.iter().filter(move |(t, _)| *t >= tick)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Tick, Command)> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_commands() -> Vec<Command> {
        vec![
            Command::DeclareWar {
                attacker: CountryId(4),
                defender: CountryId(1),
            },
            Command::ImproveRelations {
                from: CountryId(1),
                to: CountryId(2),
                spend: Fixed::from_ratio(25, 2),
            },
            Command::AddOpinionModifier {
                a: CountryId(2),
                b: CountryId(1),
                kind: ModifierTypeId(3),
                magnitude: Fixed::from_int(30),
                decay_ticks: 43_200,
            },
            Command::CreateUnit {
                province: ProvinceId(10),
                country: CountryId(1),
                unit_type: UnitTypeId(1),
            },
            Command::MoveUnit {
                unit: UnitId(1),
                destination: ProvinceId(12),
            },
            Command::Build {
                province: ProvinceId(10),
                building: BuildingTypeId(2),
            },
            Command::AddResource {
                country: CountryId(1),
                resource: ResourceTypeId(1),
                amount: Fixed::from_int(-500),
            },
            Command::SetProvinceOwner {
                province: ProvinceId(3),
                owner: CountryId::NONE,
            },
            Command::GrantMilitaryAccess {
                from: CountryId(2),
                to: CountryId(3),
            },
        ]
    }

    #[test]
    fn test_codec_roundtrip() {
        for command in sample_commands() {
            let mut bytes = Vec::new();
            command.encode(&mut bytes);
            let mut cursor = bytes.as_slice();
            let decoded = Command::decode(&mut cursor).expect("decode");
            assert_eq!(decoded, command);
            assert!(cursor.is_empty(), "decoder must consume the payload");
        }
    }

    #[test]
    fn test_codec_stream_of_commands() {
        let commands = sample_commands();
        let mut bytes = Vec::new();
        for command in &commands {
            command.encode(&mut bytes);
        }

        let mut cursor = bytes.as_slice();
        let mut decoded = Vec::new();
        while !cursor.is_empty() {
            decoded.push(Command::decode(&mut cursor).expect("decode"));
        }
        assert_eq!(decoded, commands);
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let bytes = [0xFFu8, 0, 0];
        let mut cursor = &bytes[..];
        assert_eq!(Command::decode(&mut cursor), None);
    }

    #[test]
    fn test_decode_rejects_truncated() {
        let mut bytes = Vec::new();
        Command::DeclareWar {
            attacker: CountryId(1),
            defender: CountryId(2),
        }
        .encode(&mut bytes);
        bytes.truncate(bytes.len() - 1);
        let mut cursor = bytes.as_slice();
        assert_eq!(Command::decode(&mut cursor), None);
    }

    #[test]
    fn test_log_prunes_by_tick() {
        let mut log = CommandLog::new(10);
        for tick in 0..20u64 {
            log.push(
                tick,
                Command::MakePeace {
                    a: CountryId(1),
                    b: CountryId(2),
                },
            );
        }
        log.prune(20);
        // Ticks 10..20 survive
        assert_eq!(log.len(), 10);
        assert!(log.iter().all(|(t, _)| *t >= 10));
    }

    #[test]
    fn test_log_entries_since() {
        let mut log = CommandLog::new(100);
        for tick in [5u64, 6, 7, 8] {
            log.push(
                tick,
                Command::MakePeace {
                    a: CountryId(1),
                    b: CountryId(2),
                },
            );
        }
        assert_eq!(log.entries_since(7).count(), 2);
        assert_eq!(log.entries_since(0).count(), 4);
    }
}
