//! Durable save/load with determinism verification.
//!
//! File layout:
//!
//! 1. Magic `"HGSV"`, version major.minor (two u16), flags byte
//!    (bit 0 = deflate-compressed body).
//! 2. Body (optionally deflated as a transparent stream layer):
//!    header checksum (crc32 of the metadata), metadata length (i32),
//!    JSON metadata, the state snapshot as named length-prefixed blocks in
//!    subsystem dependency order, the recent command log, and the expected
//!    state checksum.
//!
//! The state checksum is the crc32 of the canonical snapshot bytes, so
//! `load(save(X)) == X` is checked bit-for-bit. A mismatch after load is a
//! determinism break: logged as a warning in production, a hard failure in
//! verification mode. Writes go to a temp file and rename into place.

use crate::command::{put_i64, put_u16, put_u32, take_i64, take_u16, take_u32, Command, CommandLog};
use crate::diplomacy::{RelationData, TaggedModifier, TreatyFlags};
use crate::fixed::Fixed;
use crate::ids::{
    BuildingTypeId, CountryId, ModifierTypeId, ProvinceId, RelationKey, TerrainId, Tick, UnitId,
    UnitTypeId,
};
use crate::modifiers::TimedModifier;
use crate::provinces::{ProvinceFlags, ProvinceState};
use crate::state::GameState;
use crate::units::{MovementOrder, UnitState};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SAVE_MAGIC: &[u8; 4] = b"HGSV";
pub const SAVE_VERSION_MAJOR: u16 = 1;
pub const SAVE_VERSION_MINOR: u16 = 0;
const FLAG_DEFLATE: u8 = 1;

/// The save file extension.
pub const SAVE_EXTENSION: &str = "sav";

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a save file (bad magic)")]
    BadMagic,
    #[error("unsupported save version {0}.{1} (no registered migrator)")]
    UnsupportedVersion(u16, u16),
    #[error("metadata checksum mismatch")]
    HeaderChecksumMismatch,
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("corrupt save: {0}")]
    Corrupt(&'static str),
    #[error("save is for scenario '{found}', current scenario is '{expected}'")]
    ScenarioMismatch { expected: String, found: String },
    #[error("state checksum mismatch after load: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

/// Human-facing save metadata, stored as JSON inside the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveMetadata {
    pub save_name: String,
    /// Wall-clock save time (Unix seconds). Display only; never enters a
    /// checksum.
    pub saved_at_unix: u64,
    pub tick: Tick,
    pub speed_index: usize,
    pub scenario_name: String,
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(bytes);
    crc.sum()
}

// === Canonical snapshot ===

fn write_block(out: &mut Vec<u8>, name: &str, payload: &[u8]) {
    put_u16(out, name.len() as u16);
    out.extend_from_slice(name.as_bytes());
    put_u32(out, payload.len() as u32);
    out.extend_from_slice(payload);
}

fn read_block<'a>(input: &mut &'a [u8], expected: &'static str) -> Result<&'a [u8], SaveError> {
    let name_len = take_u16(input).ok_or(SaveError::Corrupt("block name length"))? as usize;
    if input.len() < name_len {
        return Err(SaveError::Corrupt("block name"));
    }
    let (name, rest) = input.split_at(name_len);
    *input = rest;
    if name != expected.as_bytes() {
        return Err(SaveError::Corrupt("block out of order"));
    }
    let payload_len = take_u32(input).ok_or(SaveError::Corrupt("block length"))? as usize;
    if input.len() < payload_len {
        return Err(SaveError::Corrupt("block payload"));
    }
    let (payload, rest) = input.split_at(payload_len);
    *input = rest;
    Ok(payload)
}

/// Serialize the authoritative state as named blocks in subsystem
/// dependency order. This byte sequence is the checksum input.
pub fn write_snapshot(state: &GameState, out: &mut Vec<u8>) {
    let mut payload = Vec::new();

    // provinces
    payload.clear();
    put_u32(&mut payload, state.provinces.len() as u32);
    for province in state.provinces.read_buffer() {
        put_u16(&mut payload, province.owner.0);
        put_u16(&mut payload, province.controller.0);
        put_u16(&mut payload, province.terrain.0);
        put_u16(&mut payload, province.flags.0);
    }
    write_block(out, "provinces", &payload);

    // resources
    payload.clear();
    let values = state.resources.raw_values();
    put_u32(&mut payload, values.len() as u32);
    for value in values {
        put_i64(&mut payload, value.raw());
    }
    write_block(out, "resources", &payload);

    // economy
    payload.clear();
    let built = state.economy.built_sorted();
    put_u32(&mut payload, built.len() as u32);
    for (province, building, count) in built {
        put_u16(&mut payload, province.0);
        put_u16(&mut payload, building.0);
        put_u16(&mut payload, count);
    }
    let income_mods = state.economy.income_modifiers_raw();
    put_u32(&mut payload, income_mods.len() as u32);
    for (country, modifier) in income_mods {
        put_u16(&mut payload, country.0);
        write_modifier(&mut payload, modifier);
    }
    write_block(out, "economy", &payload);

    // units
    payload.clear();
    let slots = state.units.raw_slots();
    put_u32(&mut payload, slots.len() as u32);
    for slot in slots {
        put_u16(&mut payload, slot.province.0);
        put_u16(&mut payload, slot.country.0);
        put_u16(&mut payload, slot.unit_type.0);
        payload.push(slot.strength);
        payload.push(slot.morale);
    }
    let mut order_ids: Vec<UnitId> = state.units.orders().keys().copied().collect();
    order_ids.sort_unstable();
    put_u32(&mut payload, order_ids.len() as u32);
    for unit in order_ids {
        let order = &state.units.orders()[&unit];
        put_u16(&mut payload, unit.0);
        put_u16(&mut payload, order.destination.0);
        put_u16(&mut payload, order.waypoint_index);
        put_u32(&mut payload, order.ticks_remaining);
        payload.extend_from_slice(&order.issued_tick.to_le_bytes());
        put_u16(&mut payload, order.path.len() as u16);
        for p in &order.path {
            put_u16(&mut payload, p.0);
        }
    }
    write_block(out, "units", &payload);

    // diplomacy
    payload.clear();
    let relations = state.diplomacy.relations_sorted();
    put_u32(&mut payload, relations.len() as u32);
    for rel in relations {
        put_u16(&mut payload, rel.low.0);
        put_u16(&mut payload, rel.high.0);
        put_i64(&mut payload, rel.base_opinion.raw());
        payload.push(rel.at_war as u8);
        payload.push(rel.treaties.0);
        payload.extend_from_slice(&rel.reserved);
    }
    let modifiers = state.diplomacy.modifiers_raw();
    put_u32(&mut payload, modifiers.len() as u32);
    for tagged in modifiers {
        put_u32(&mut payload, tagged.key.0);
        write_modifier(&mut payload, &tagged.modifier);
    }
    write_block(out, "diplomacy", &payload);

    // time
    payload.clear();
    payload.extend_from_slice(&state.tick.to_le_bytes());
    payload.extend_from_slice(&state.seed.to_le_bytes());
    put_u32(&mut payload, state.time.year);
    payload.push(state.time.month);
    payload.push(state.time.day);
    payload.push(state.time.hour);
    write_block(out, "time", &payload);

    // ai
    payload.clear();
    put_u32(&mut payload, state.ai.len() as u32);
    for slot in &state.ai {
        put_u16(&mut payload, slot.last_goal);
        put_u16(&mut payload, slot.flags);
        put_u32(&mut payload, slot.last_processed_tick);
    }
    write_block(out, "ai", &payload);
}

fn write_modifier(out: &mut Vec<u8>, modifier: &TimedModifier) {
    put_u16(out, modifier.kind.0);
    put_u32(out, modifier.start_tick);
    put_u32(out, modifier.decay_ticks);
    put_i64(out, modifier.magnitude.raw());
}

fn read_modifier(input: &mut &[u8]) -> Option<TimedModifier> {
    Some(TimedModifier {
        kind: ModifierTypeId(take_u16(input)?),
        start_tick: take_u32(input)?,
        decay_ticks: take_u32(input)?,
        magnitude: Fixed::from_raw(take_i64(input)?),
    })
}

fn take_u64(input: &mut &[u8]) -> Option<u64> {
    let (bytes, rest) = input.split_first_chunk::<8>()?;
    *input = rest;
    Some(u64::from_le_bytes(*bytes))
}

/// Restore a snapshot into a state built from the same scenario, advancing
/// `input` past it. Stores rebuild their derived indices from the
/// authoritative data.
pub fn read_snapshot(state: &mut GameState, input: &mut &[u8]) -> Result<(), SaveError> {
    // provinces
    {
        let mut block = read_block(input, "provinces")?;
        let count = take_u32(&mut block).ok_or(SaveError::Corrupt("province count"))? as usize;
        if count != state.provinces.len() {
            return Err(SaveError::Corrupt("province count mismatch"));
        }
        let mut states = Vec::with_capacity(count);
        for _ in 0..count {
            states.push(ProvinceState {
                owner: CountryId(take_u16(&mut block).ok_or(SaveError::Corrupt("province"))?),
                controller: CountryId(take_u16(&mut block).ok_or(SaveError::Corrupt("province"))?),
                terrain: TerrainId(take_u16(&mut block).ok_or(SaveError::Corrupt("province"))?),
                flags: ProvinceFlags(take_u16(&mut block).ok_or(SaveError::Corrupt("province"))?),
            });
        }
        state.provinces.restore(&states);
    }

    // resources
    {
        let mut block = read_block(input, "resources")?;
        let count = take_u32(&mut block).ok_or(SaveError::Corrupt("resource count"))? as usize;
        if count != state.resources.raw_values().len() {
            return Err(SaveError::Corrupt("resource count mismatch"));
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(Fixed::from_raw(
                take_i64(&mut block).ok_or(SaveError::Corrupt("resource value"))?,
            ));
        }
        state.resources.restore(&values);
    }

    // economy
    {
        let mut block = read_block(input, "economy")?;
        let count = take_u32(&mut block).ok_or(SaveError::Corrupt("building count"))? as usize;
        let mut built = Vec::with_capacity(count);
        for _ in 0..count {
            built.push((
                ProvinceId(take_u16(&mut block).ok_or(SaveError::Corrupt("building"))?),
                BuildingTypeId(take_u16(&mut block).ok_or(SaveError::Corrupt("building"))?),
                take_u16(&mut block).ok_or(SaveError::Corrupt("building"))?,
            ));
        }
        let count = take_u32(&mut block).ok_or(SaveError::Corrupt("income modifiers"))? as usize;
        let mut income_mods = Vec::with_capacity(count);
        for _ in 0..count {
            let country = CountryId(take_u16(&mut block).ok_or(SaveError::Corrupt("income"))?);
            let modifier = read_modifier(&mut block).ok_or(SaveError::Corrupt("income"))?;
            income_mods.push((country, modifier));
        }
        state.economy.restore(built, income_mods);
    }

    // units
    {
        let mut block = read_block(input, "units")?;
        let count = take_u32(&mut block).ok_or(SaveError::Corrupt("unit count"))? as usize;
        if count > state.units.capacity() {
            return Err(SaveError::Corrupt("unit count exceeds capacity"));
        }
        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            slots.push(UnitState {
                province: ProvinceId(take_u16(&mut block).ok_or(SaveError::Corrupt("unit"))?),
                country: CountryId(take_u16(&mut block).ok_or(SaveError::Corrupt("unit"))?),
                unit_type: UnitTypeId(take_u16(&mut block).ok_or(SaveError::Corrupt("unit"))?),
                strength: *block.first().ok_or(SaveError::Corrupt("unit"))?,
                morale: *block.get(1).ok_or(SaveError::Corrupt("unit"))?,
            });
            block = &block[2..];
        }
        let count = take_u32(&mut block).ok_or(SaveError::Corrupt("order count"))? as usize;
        let mut orders = Vec::with_capacity(count);
        for _ in 0..count {
            let unit = UnitId(take_u16(&mut block).ok_or(SaveError::Corrupt("order"))?);
            let destination = ProvinceId(take_u16(&mut block).ok_or(SaveError::Corrupt("order"))?);
            let waypoint_index = take_u16(&mut block).ok_or(SaveError::Corrupt("order"))?;
            let ticks_remaining = take_u32(&mut block).ok_or(SaveError::Corrupt("order"))?;
            let issued_tick = take_u64(&mut block).ok_or(SaveError::Corrupt("order"))?;
            let path_len = take_u16(&mut block).ok_or(SaveError::Corrupt("order"))? as usize;
            let mut path = Vec::with_capacity(path_len);
            for _ in 0..path_len {
                path.push(ProvinceId(
                    take_u16(&mut block).ok_or(SaveError::Corrupt("order path"))?,
                ));
            }
            orders.push((
                unit,
                MovementOrder {
                    destination,
                    waypoint_index,
                    ticks_remaining,
                    path,
                    issued_tick,
                },
            ));
        }
        state.units.restore(&slots, orders);
    }

    // diplomacy
    {
        let mut block = read_block(input, "diplomacy")?;
        let count = take_u32(&mut block).ok_or(SaveError::Corrupt("relation count"))? as usize;
        let mut relations = Vec::with_capacity(count);
        for _ in 0..count {
            let low = CountryId(take_u16(&mut block).ok_or(SaveError::Corrupt("relation"))?);
            let high = CountryId(take_u16(&mut block).ok_or(SaveError::Corrupt("relation"))?);
            let base_opinion =
                Fixed::from_raw(take_i64(&mut block).ok_or(SaveError::Corrupt("relation"))?);
            let at_war = *block.first().ok_or(SaveError::Corrupt("relation"))? != 0;
            let treaties = TreatyFlags(*block.get(1).ok_or(SaveError::Corrupt("relation"))?);
            let reserved = [
                *block.get(2).ok_or(SaveError::Corrupt("relation"))?,
                *block.get(3).ok_or(SaveError::Corrupt("relation"))?,
            ];
            block = &block[4..];
            relations.push(RelationData {
                low,
                high,
                base_opinion,
                at_war,
                treaties,
                reserved,
            });
        }
        let count = take_u32(&mut block).ok_or(SaveError::Corrupt("modifier count"))? as usize;
        let mut modifiers = Vec::with_capacity(count);
        for _ in 0..count {
            let key = RelationKey(take_u32(&mut block).ok_or(SaveError::Corrupt("modifier"))?);
            let modifier = read_modifier(&mut block).ok_or(SaveError::Corrupt("modifier"))?;
            modifiers.push(TaggedModifier { key, modifier });
        }
        state.diplomacy.restore(relations, modifiers);
    }

    // time
    {
        let mut block = read_block(input, "time")?;
        state.tick = take_u64(&mut block).ok_or(SaveError::Corrupt("tick"))?;
        state.seed = take_u64(&mut block).ok_or(SaveError::Corrupt("seed"))?;
        let year = take_u32(&mut block).ok_or(SaveError::Corrupt("time"))?;
        let month = *block.first().ok_or(SaveError::Corrupt("time"))?;
        let day = *block.get(1).ok_or(SaveError::Corrupt("time"))?;
        let hour = *block.get(2).ok_or(SaveError::Corrupt("time"))?;
        state.time = crate::calendar::GameTime::new(year, month, day, hour);
    }

    // ai
    {
        let mut block = read_block(input, "ai")?;
        let count = take_u32(&mut block).ok_or(SaveError::Corrupt("ai count"))? as usize;
        if count != state.ai.len() {
            return Err(SaveError::Corrupt("ai count mismatch"));
        }
        for slot in state.ai.iter_mut() {
            slot.last_goal = take_u16(&mut block).ok_or(SaveError::Corrupt("ai"))?;
            slot.flags = take_u16(&mut block).ok_or(SaveError::Corrupt("ai"))?;
            slot.last_processed_tick = take_u32(&mut block).ok_or(SaveError::Corrupt("ai"))?;
        }
    }

    Ok(())
}

/// Deterministic crc32 of the canonical snapshot.
pub fn state_checksum(state: &GameState) -> u32 {
    let mut snapshot = Vec::with_capacity(64 * 1024);
    write_snapshot(state, &mut snapshot);
    crc32(&snapshot)
}

// === Whole files ===

/// Serialize the save body: metadata, snapshot, command log, checksum.
fn build_body(
    state: &GameState,
    log: &CommandLog,
    metadata: &SaveMetadata,
) -> Result<Vec<u8>, SaveError> {
    let metadata_json = serde_json::to_vec(metadata)?;

    let mut body = Vec::with_capacity(128 * 1024);
    put_u32(&mut body, crc32(&metadata_json));
    body.extend_from_slice(&(metadata_json.len() as i32).to_le_bytes());
    body.extend_from_slice(&metadata_json);

    write_snapshot(state, &mut body);

    put_u32(&mut body, log.len() as u32);
    for (tick, command) in log.iter() {
        body.extend_from_slice(&tick.to_le_bytes());
        command.encode(&mut body);
    }

    put_u32(&mut body, state_checksum(state));
    Ok(body)
}

/// Wrap a body in the file frame, compressing if asked.
fn frame_body(body: &[u8], compress: bool) -> Result<Vec<u8>, SaveError> {
    let mut out = Vec::with_capacity(body.len() + 16);
    out.extend_from_slice(SAVE_MAGIC);
    put_u16(&mut out, SAVE_VERSION_MAJOR);
    put_u16(&mut out, SAVE_VERSION_MINOR);
    if compress {
        out.push(FLAG_DEFLATE);
        let mut encoder =
            flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(body)?;
        out.extend_from_slice(&encoder.finish()?);
    } else {
        out.push(0);
        out.extend_from_slice(body);
    }
    Ok(out)
}

/// Serialize a complete save.
pub fn save_to_bytes(
    state: &GameState,
    log: &CommandLog,
    metadata: &SaveMetadata,
    compress: bool,
) -> Result<Vec<u8>, SaveError> {
    let body = build_body(state, log, metadata)?;
    frame_body(&body, compress)
}

/// Deserialize a save into a state built from the same scenario.
///
/// Returns the metadata and the stored command log. On a checksum mismatch
/// the load still succeeds unless `strict` is set; the break is logged
/// either way.
pub fn load_from_bytes(
    bytes: &[u8],
    state: &mut GameState,
    strict: bool,
) -> Result<(SaveMetadata, Vec<(Tick, Command)>), SaveError> {
    let mut input = bytes;
    if input.len() < 9 {
        return Err(SaveError::BadMagic);
    }
    let (magic, rest) = input.split_at(4);
    input = rest;
    if magic != SAVE_MAGIC {
        return Err(SaveError::BadMagic);
    }
    let major = take_u16(&mut input).ok_or(SaveError::BadMagic)?;
    let minor = take_u16(&mut input).ok_or(SaveError::BadMagic)?;
    if major != SAVE_VERSION_MAJOR {
        return Err(SaveError::UnsupportedVersion(major, minor));
    }
    let (&flags, rest) = input.split_first().ok_or(SaveError::BadMagic)?;
    input = rest;

    let inflated;
    let mut body: &[u8] = if flags & FLAG_DEFLATE != 0 {
        let mut decoder = flate2::read::DeflateDecoder::new(input);
        let mut buf = Vec::with_capacity(input.len() * 4);
        decoder.read_to_end(&mut buf)?;
        inflated = buf;
        &inflated
    } else {
        input
    };

    let header_checksum = take_u32(&mut body).ok_or(SaveError::Corrupt("header checksum"))?;
    let metadata_len_bytes = body
        .split_first_chunk::<4>()
        .ok_or(SaveError::Corrupt("metadata length"))?;
    let metadata_len = i32::from_le_bytes(*metadata_len_bytes.0);
    body = metadata_len_bytes.1;
    if metadata_len < 0 || body.len() < metadata_len as usize {
        return Err(SaveError::Corrupt("metadata length"));
    }
    let (metadata_json, rest) = body.split_at(metadata_len as usize);
    body = rest;
    if crc32(metadata_json) != header_checksum {
        return Err(SaveError::HeaderChecksumMismatch);
    }
    let metadata: SaveMetadata = serde_json::from_slice(metadata_json)?;
    if metadata.scenario_name != state.scenario_name {
        return Err(SaveError::ScenarioMismatch {
            expected: state.scenario_name.clone(),
            found: metadata.scenario_name,
        });
    }

    read_snapshot(state, &mut body)?;

    let log_count = take_u32(&mut body).ok_or(SaveError::Corrupt("command log count"))? as usize;
    let mut log = Vec::with_capacity(log_count);
    for _ in 0..log_count {
        let tick = take_u64(&mut body).ok_or(SaveError::Corrupt("command log tick"))?;
        let command = Command::decode(&mut body).ok_or(SaveError::Corrupt("command log entry"))?;
        log.push((tick, command));
    }

    let expected = take_u32(&mut body).ok_or(SaveError::Corrupt("state checksum"))?;
    let actual = state_checksum(state);
    if expected != actual {
        if strict {
            return Err(SaveError::ChecksumMismatch { expected, actual });
        }
        log::warn!(
            "determinism break: loaded state checksum {actual:08x} != saved {expected:08x}"
        );
    }

    Ok((metadata, log))
}

/// Write a save atomically: temp file in the same directory, then rename.
pub fn save_to_file(
    path: &Path,
    state: &GameState,
    log: &CommandLog,
    metadata: &SaveMetadata,
    compress: bool,
) -> Result<(), SaveError> {
    let bytes = save_to_bytes(state, log, metadata, compress)?;
    let tmp = path.with_extension("sav.tmp");
    std::fs::write(&tmp, &bytes)?;
    std::fs::rename(&tmp, path)?;
    log::info!("saved {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

pub fn load_from_file(
    path: &Path,
    state: &mut GameState,
    strict: bool,
) -> Result<(SaveMetadata, Vec<(Tick, Command)>), SaveError> {
    let bytes = std::fs::read(path)?;
    load_from_bytes(&bytes, state, strict)
}

/// Write a save on a background thread.
///
/// The body is serialized synchronously before this returns, so the main
/// loop never exposes a half-written state to the worker; only compression
/// and file IO run off-thread. `on_complete` fires on the worker when the
/// rename has landed (or failed).
pub fn save_to_file_background(
    path: PathBuf,
    state: &GameState,
    log: &CommandLog,
    metadata: &SaveMetadata,
    compress: bool,
    on_complete: impl FnOnce(Result<(), SaveError>) + Send + 'static,
) -> Result<std::thread::JoinHandle<()>, SaveError> {
    let body = build_body(state, log, metadata)?;
    let handle = std::thread::spawn(move || {
        let result = (|| -> Result<(), SaveError> {
            let bytes = frame_body(&body, compress)?;
            let tmp = path.with_extension("sav.tmp");
            std::fs::write(&tmp, &bytes)?;
            std::fs::rename(&tmp, &path)?;
            log::info!("background save wrote {} bytes to {}", bytes.len(), path.display());
            Ok(())
        })();
        on_complete(result);
    });
    Ok(handle)
}

// === Save slots ===

pub fn quicksave_path(dir: &Path) -> PathBuf {
    dir.join(format!("quicksave.{SAVE_EXTENSION}"))
}

pub fn autosave_path(dir: &Path, tick: Tick) -> PathBuf {
    dir.join(format!("autosave-{tick:012}.{SAVE_EXTENSION}"))
}

/// Sanitized path for a named manual save.
pub fn named_save_path(dir: &Path, name: &str) -> PathBuf {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    dir.join(format!("{safe}.{SAVE_EXTENSION}"))
}

/// Delete the oldest autosaves beyond `keep`. Returns how many were removed.
pub fn rotate_autosaves(dir: &Path, keep: usize) -> std::io::Result<usize> {
    let mut autosaves: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("autosave-") && n.ends_with(".sav"))
        })
        .collect();
    // Tick is zero-padded, so name order is age order.
    autosaves.sort();

    let mut removed = 0;
    while autosaves.len() > keep {
        let victim = autosaves.remove(0);
        std::fs::remove_file(&victim)?;
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::CountryId;
    use crate::testing::GameStateBuilder;

    fn populated_state() -> GameState {
        let mut state = GameStateBuilder::new()
            .with_country("AAA")
            .with_country("BBB")
            .with_province(1, Some("AAA"))
            .with_province(2, Some("BBB"))
            .with_adjacency(1, 2)
            .build();
        assert!(state.diplomacy.set_at_war(CountryId(1), CountryId(2)));
        state
            .diplomacy
            .adjust_base_opinion(CountryId(1), CountryId(2), Fixed::from_int(-30));
        assert!(state.diplomacy.add_modifier(
            CountryId(1),
            CountryId(2),
            TimedModifier::new(ModifierTypeId(1), 0, 3600, Fixed::from_int(-50)),
        ));
        let _ = state
            .units
            .spawn(ProvinceId(1), CountryId(1), UnitTypeId(1))
            .unwrap();
        state.tick = 1000;
        state
    }

    fn metadata(state: &GameState) -> SaveMetadata {
        SaveMetadata {
            save_name: "test".into(),
            saved_at_unix: 0,
            tick: state.tick,
            speed_index: 2,
            scenario_name: state.scenario_name.clone(),
        }
    }

    fn fresh_base() -> GameState {
        GameStateBuilder::new()
            .with_country("AAA")
            .with_country("BBB")
            .with_province(1, Some("AAA"))
            .with_province(2, Some("BBB"))
            .with_adjacency(1, 2)
            .build()
    }

    #[test]
    fn test_checksum_deterministic_and_sensitive() {
        let state = populated_state();
        assert_eq!(state_checksum(&state), state_checksum(&state));

        let mut other = populated_state();
        other.tick += 1;
        assert_ne!(state_checksum(&state), state_checksum(&other));
    }

    #[test]
    fn test_roundtrip_uncompressed() {
        let state = populated_state();
        let mut log = CommandLog::new(100);
        log.push(
            999,
            Command::DeclareWar {
                attacker: CountryId(1),
                defender: CountryId(2),
            },
        );

        let bytes = save_to_bytes(&state, &log, &metadata(&state), false).unwrap();
        assert_eq!(&bytes[..4], SAVE_MAGIC);

        let mut loaded = fresh_base();
        let (meta, commands) = load_from_bytes(&bytes, &mut loaded, true).unwrap();

        assert_eq!(meta.tick, 1000);
        assert_eq!(commands.len(), 1);
        assert_eq!(loaded.tick, 1000);
        assert_eq!(loaded.time, state.time);
        assert!(loaded.at_war(CountryId(1), CountryId(2)));
        assert_eq!(
            loaded.opinion(CountryId(1), CountryId(2)),
            state.opinion(CountryId(1), CountryId(2))
        );
        assert_eq!(state_checksum(&loaded), state_checksum(&state));
    }

    #[test]
    fn test_roundtrip_compressed() {
        let state = populated_state();
        let log = CommandLog::new(100);
        let plain = save_to_bytes(&state, &log, &metadata(&state), false).unwrap();
        let packed = save_to_bytes(&state, &log, &metadata(&state), true).unwrap();

        let mut a = fresh_base();
        let mut b = fresh_base();
        load_from_bytes(&plain, &mut a, true).unwrap();
        load_from_bytes(&packed, &mut b, true).unwrap();
        assert_eq!(state_checksum(&a), state_checksum(&b));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut state = fresh_base();
        assert!(matches!(
            load_from_bytes(b"NOPE\0\0\0\0\0\0", &mut state, false),
            Err(SaveError::BadMagic)
        ));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let state = populated_state();
        let log = CommandLog::new(100);
        let mut bytes = save_to_bytes(&state, &log, &metadata(&state), false).unwrap();
        bytes[4] = 99; // major version
        let mut base = fresh_base();
        assert!(matches!(
            load_from_bytes(&bytes, &mut base, false),
            Err(SaveError::UnsupportedVersion(99, _))
        ));
    }

    #[test]
    fn test_corrupt_metadata_rejected() {
        let state = populated_state();
        let log = CommandLog::new(100);
        let mut bytes = save_to_bytes(&state, &log, &metadata(&state), false).unwrap();
        // Flip a metadata byte (after magic+version+flag+crc+len = 17)
        bytes[20] ^= 0xFF;
        let mut base = fresh_base();
        assert!(matches!(
            load_from_bytes(&bytes, &mut base, false),
            Err(SaveError::HeaderChecksumMismatch)
        ));
    }

    #[test]
    fn test_scenario_mismatch_rejected() {
        let state = populated_state();
        let log = CommandLog::new(100);
        let bytes = save_to_bytes(&state, &log, &metadata(&state), false).unwrap();
        let mut other = GameStateBuilder::new().build();
        other.scenario_name = "different".into();
        assert!(matches!(
            load_from_bytes(&bytes, &mut other, false),
            Err(SaveError::ScenarioMismatch { .. })
        ));
    }

    #[test]
    fn test_atomic_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = named_save_path(dir.path(), "my save!");
        assert!(path.to_str().unwrap().ends_with("my_save_.sav"));

        let state = populated_state();
        let log = CommandLog::new(100);
        save_to_file(&path, &state, &log, &metadata(&state), true).unwrap();

        let mut loaded = fresh_base();
        load_from_file(&path, &mut loaded, true).unwrap();
        assert_eq!(state_checksum(&loaded), state_checksum(&state));

        // No temp file left behind
        assert!(!path.with_extension("sav.tmp").exists());
    }

    #[test]
    fn test_background_save_completes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bg.sav");
        let state = populated_state();
        let log = CommandLog::new(100);

        let (tx, rx) = std::sync::mpsc::channel();
        let handle = save_to_file_background(
            path.clone(),
            &state,
            &log,
            &metadata(&state),
            true,
            move |result| {
                tx.send(result.is_ok()).unwrap();
            },
        )
        .unwrap();

        assert!(rx.recv().unwrap(), "background save reported failure");
        handle.join().unwrap();

        let mut loaded = fresh_base();
        load_from_file(&path, &mut loaded, true).unwrap();
        assert_eq!(state_checksum(&loaded), state_checksum(&state));
    }

    #[test]
    fn test_autosave_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let state = populated_state();
        let log = CommandLog::new(100);
        for tick in [100u64, 200, 300, 400] {
            save_to_file(
                &autosave_path(dir.path(), tick),
                &state,
                &log,
                &metadata(&state),
                false,
            )
            .unwrap();
        }

        let removed = rotate_autosaves(dir.path(), 2).unwrap();
        assert_eq!(removed, 2);
        assert!(!autosave_path(dir.path(), 100).exists());
        assert!(!autosave_path(dir.path(), 200).exists());
        assert!(autosave_path(dir.path(), 300).exists());
        assert!(autosave_path(dir.path(), 400).exists());
    }
}
