//! Flat, double-buffered province storage.
//!
//! Every province is an 8-byte record in a dense array indexed by
//! `province_index` (not id). Two full copies exist: a READ buffer exposed
//! to queries and a WRITE buffer mutated by command application. A dirty
//! index set tracks modified slots; [`ProvinceStore::swap_buffers`] copies
//! only those slots at the tick barrier.
//!
//! The set of province ids and the id→index mapping are frozen after
//! scenario load. Nothing here allocates during steady-state play.

use crate::ids::{CountryId, ProvinceId, TerrainId};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Per-province flag bits, stored in the fourth u16 of the record.
/// The upper bits are reserved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProvinceFlags(pub u16);

impl ProvinceFlags {
    /// Sea province: never ownable, passable only to naval movement.
    pub const SEA: u16 = 1 << 0;
    /// Impassable wasteland.
    pub const IMPASSABLE: u16 = 1 << 1;

    #[inline]
    pub const fn contains(self, mask: u16) -> bool {
        self.0 & mask != 0
    }

    #[inline]
    pub fn insert(&mut self, mask: u16) {
        self.0 |= mask;
    }

    #[inline]
    pub fn remove(&mut self, mask: u16) {
        self.0 &= !mask;
    }
}

/// Hot province state: exactly 8 bytes.
///
/// `owner == CountryId::NONE` means unowned. A controller different from
/// the owner marks wartime occupation.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProvinceState {
    pub owner: CountryId,
    pub controller: CountryId,
    pub terrain: TerrainId,
    pub flags: ProvinceFlags,
}

const _: () = assert!(std::mem::size_of::<ProvinceState>() == 8);

impl ProvinceState {
    #[inline]
    pub fn is_sea(&self) -> bool {
        self.flags.contains(ProvinceFlags::SEA)
    }

    #[inline]
    pub fn is_impassable(&self) -> bool {
        self.flags.contains(ProvinceFlags::IMPASSABLE)
    }

    /// Whether the province is occupied by someone other than its owner.
    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.controller != self.owner
    }
}

/// Record of an owner change, drained at the buffer-swap barrier and
/// published as events there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnershipChange {
    pub province: ProvinceId,
    pub old_owner: CountryId,
    pub new_owner: CountryId,
}

/// The province store.
pub struct ProvinceStore {
    /// Dense index → id. Frozen after load.
    ids: Vec<ProvinceId>,
    /// Id → dense index. Frozen after load.
    index_of: FxHashMap<ProvinceId, u32>,
    /// READ buffer: queries only.
    read: Vec<ProvinceState>,
    /// WRITE buffer: command application only.
    write: Vec<ProvinceState>,
    /// Indices modified since the last swap, in modification order.
    dirty: Vec<u32>,
    /// Dedup mask for `dirty`.
    dirty_mask: Vec<bool>,
    /// Owner changes awaiting publication at the barrier.
    pending_owner_changes: Vec<OwnershipChange>,
}

impl ProvinceStore {
    /// Build the store from scenario definitions.
    ///
    /// Duplicate province registration is an invariant breach surfaced to
    /// the loader.
    pub fn new(defs: Vec<(ProvinceId, ProvinceState)>) -> Result<Self, ProvinceId> {
        let n = defs.len();
        let mut ids = Vec::with_capacity(n);
        let mut index_of = FxHashMap::default();
        index_of.reserve(n);
        let mut read = Vec::with_capacity(n);

        for (id, state) in defs {
            if index_of.insert(id, ids.len() as u32).is_some() {
                return Err(id);
            }
            ids.push(id);
            read.push(state);
        }

        let write = read.clone();
        Ok(Self {
            ids,
            index_of,
            read,
            write,
            dirty: Vec::with_capacity(n.min(4096)),
            dirty_mask: vec![false; n],
            pending_owner_changes: Vec::with_capacity(256),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// All province ids in dense-index order.
    pub fn ids(&self) -> &[ProvinceId] {
        &self.ids
    }

    #[inline]
    pub fn index_of(&self, id: ProvinceId) -> Option<u32> {
        self.index_of.get(&id).copied()
    }

    #[inline]
    pub fn contains(&self, id: ProvinceId) -> bool {
        self.index_of.contains_key(&id)
    }

    /// Read the province state. Unknown ids return the documented empty
    /// state (all-zero) and mark nothing dirty.
    #[inline]
    pub fn get_state(&self, id: ProvinceId) -> ProvinceState {
        match self.index_of(id) {
            Some(i) => self.read[i as usize],
            None => ProvinceState::default(),
        }
    }

    #[inline]
    pub fn get_owner(&self, id: ProvinceId) -> CountryId {
        self.get_state(id).owner
    }

    #[inline]
    pub fn get_controller(&self, id: ProvinceId) -> CountryId {
        self.get_state(id).controller
    }

    #[inline]
    pub fn get_terrain(&self, id: ProvinceId) -> TerrainId {
        self.get_state(id).terrain
    }

    #[inline]
    fn mark_dirty(&mut self, index: u32) {
        let slot = &mut self.dirty_mask[index as usize];
        if !*slot {
            *slot = true;
            self.dirty.push(index);
        }
    }

    /// Set the owner in the WRITE buffer. Same-value writes are no-ops and
    /// record no change. Sea provinces reject ownership outright.
    pub fn set_owner(&mut self, id: ProvinceId, new_owner: CountryId) {
        let Some(index) = self.index_of(id) else {
            return;
        };
        let state = &mut self.write[index as usize];
        if state.is_sea() || state.owner == new_owner {
            return;
        }
        let old_owner = state.owner;
        state.owner = new_owner;
        // Ownership implies control unless a later command occupies it.
        state.controller = new_owner;
        self.mark_dirty(index);
        self.pending_owner_changes.push(OwnershipChange {
            province: id,
            old_owner,
            new_owner,
        });
    }

    /// Set the controller in the WRITE buffer (occupation).
    pub fn set_controller(&mut self, id: ProvinceId, controller: CountryId) {
        let Some(index) = self.index_of(id) else {
            return;
        };
        let state = &mut self.write[index as usize];
        if state.controller == controller {
            return;
        }
        state.controller = controller;
        self.mark_dirty(index);
    }

    /// Set the terrain in the WRITE buffer.
    pub fn set_terrain(&mut self, id: ProvinceId, terrain: TerrainId) {
        let Some(index) = self.index_of(id) else {
            return;
        };
        let state = &mut self.write[index as usize];
        if state.terrain == terrain {
            return;
        }
        state.terrain = terrain;
        self.mark_dirty(index);
    }

    /// Collect all provinces owned by `country` into `out` (cleared first).
    /// O(N) scan of the READ buffer; the caller supplies the buffer so the
    /// hot path never allocates.
    pub fn get_provinces_of(&self, country: CountryId, out: &mut Vec<ProvinceId>) {
        out.clear();
        for (i, state) in self.read.iter().enumerate() {
            if state.owner == country {
                out.push(self.ids[i]);
            }
        }
    }

    /// Count provinces owned by `country`. O(N).
    pub fn count_provinces_of(&self, country: CountryId) -> u32 {
        self.read.iter().filter(|s| s.owner == country).count() as u32
    }

    /// Copy dirty slots WRITE→READ and clear the dirty set. Called at the
    /// barrier between command application and event publication.
    pub fn swap_buffers(&mut self) {
        for &index in &self.dirty {
            self.read[index as usize] = self.write[index as usize];
            self.dirty_mask[index as usize] = false;
        }
        self.dirty.clear();
    }

    /// Move pending owner changes into `out` (appended).
    pub fn drain_ownership_changes(&mut self, out: &mut Vec<OwnershipChange>) {
        out.append(&mut self.pending_owner_changes);
    }

    /// Number of slots currently dirty.
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Iterate `(id, state)` over the READ buffer in dense-index order.
    pub fn iter(&self) -> impl Iterator<Item = (ProvinceId, &ProvinceState)> {
        self.ids.iter().copied().zip(self.read.iter())
    }

    /// Direct READ-buffer access for checksum/serialization.
    pub fn read_buffer(&self) -> &[ProvinceState] {
        &self.read
    }

    /// Overwrite both buffers from a snapshot (load path only).
    /// The slice must match the frozen province set.
    pub fn restore(&mut self, states: &[ProvinceState]) {
        debug_assert_eq!(states.len(), self.read.len(), "snapshot size mismatch");
        self.read.copy_from_slice(states);
        self.write.copy_from_slice(states);
        for flag in &mut self.dirty_mask {
            *flag = false;
        }
        self.dirty.clear();
        self.pending_owner_changes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn land(owner: u16) -> ProvinceState {
        ProvinceState {
            owner: CountryId(owner),
            controller: CountryId(owner),
            terrain: TerrainId(1),
            flags: ProvinceFlags::default(),
        }
    }

    fn sea() -> ProvinceState {
        ProvinceState {
            terrain: TerrainId(9),
            flags: ProvinceFlags(ProvinceFlags::SEA),
            ..Default::default()
        }
    }

    fn store() -> ProvinceStore {
        ProvinceStore::new(vec![
            (ProvinceId(1), land(1)),
            (ProvinceId(2), land(1)),
            (ProvinceId(3), land(2)),
            (ProvinceId(4), ProvinceState::default()),
            (ProvinceId(5), sea()),
        ])
        .unwrap()
    }

    #[test]
    fn test_record_is_8_bytes() {
        assert_eq!(std::mem::size_of::<ProvinceState>(), 8);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let result = ProvinceStore::new(vec![(ProvinceId(1), land(1)), (ProvinceId(1), land(2))]);
        assert_eq!(result.err(), Some(ProvinceId(1)));
    }

    #[test]
    fn test_unknown_id_returns_empty_state() {
        let s = store();
        assert_eq!(s.get_state(ProvinceId(99)), ProvinceState::default());
        assert_eq!(s.get_owner(ProvinceId(99)), CountryId::NONE);
    }

    #[test]
    fn test_write_invisible_until_swap() {
        let mut s = store();
        s.set_owner(ProvinceId(3), CountryId(1));

        // READ buffer still shows the old owner
        assert_eq!(s.get_owner(ProvinceId(3)), CountryId(2));
        assert_eq!(s.dirty_count(), 1);

        s.swap_buffers();
        assert_eq!(s.get_owner(ProvinceId(3)), CountryId(1));
        assert_eq!(s.dirty_count(), 0);
    }

    #[test]
    fn test_same_value_write_is_noop() {
        let mut s = store();
        s.set_owner(ProvinceId(1), CountryId(1));
        assert_eq!(s.dirty_count(), 0);

        let mut changes = Vec::new();
        s.drain_ownership_changes(&mut changes);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_sea_cannot_be_owned() {
        let mut s = store();
        s.set_owner(ProvinceId(5), CountryId(1));
        s.swap_buffers();
        assert_eq!(s.get_owner(ProvinceId(5)), CountryId::NONE);
    }

    #[test]
    fn test_ownership_change_recorded_once() {
        let mut s = store();
        s.set_owner(ProvinceId(3), CountryId(1));
        s.set_owner(ProvinceId(4), CountryId(2));

        let mut changes = Vec::new();
        s.drain_ownership_changes(&mut changes);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].province, ProvinceId(3));
        assert_eq!(changes[0].old_owner, CountryId(2));
        assert_eq!(changes[0].new_owner, CountryId(1));
    }

    #[test]
    fn test_get_provinces_of_reuses_buffer() {
        let s = store();
        let mut buf = Vec::new();
        s.get_provinces_of(CountryId(1), &mut buf);
        assert_eq!(buf, vec![ProvinceId(1), ProvinceId(2)]);

        s.get_provinces_of(CountryId(2), &mut buf);
        assert_eq!(buf, vec![ProvinceId(3)]);

        assert_eq!(s.count_provinces_of(CountryId(1)), 2);
        assert_eq!(s.count_provinces_of(CountryId(9)), 0);
    }

    #[test]
    fn test_swap_idempotent() {
        let mut s = store();
        s.set_owner(ProvinceId(3), CountryId(1));
        s.swap_buffers();
        let snapshot: Vec<_> = s.read_buffer().to_vec();
        s.swap_buffers();
        assert_eq!(s.read_buffer(), snapshot.as_slice());
    }

    #[test]
    fn test_owner_change_sets_controller() {
        let mut s = store();
        s.set_controller(ProvinceId(3), CountryId(1)); // occupied
        s.set_owner(ProvinceId(3), CountryId(1)); // then annexed
        s.swap_buffers();
        let state = s.get_state(ProvinceId(3));
        assert_eq!(state.owner, CountryId(1));
        assert_eq!(state.controller, CountryId(1));
        assert!(!state.is_occupied());
    }
}
