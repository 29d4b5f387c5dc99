//! Diplomacy: relations, treaties and the opinion modifier store.
//!
//! Relations are 16-byte records keyed by the canonical unordered pair, so
//! opinion is symmetric by construction. The treaty bitfield in the record
//! is the sole authority for alliance / NAP / guarantee / military access.
//!
//! Opinion modifiers live in one flat append-only array, each tagged with
//! its relationship key; an auxiliary index maps key → positions so opinion
//! lookup never scans the array. The monthly decay pass is three-phase:
//! a data-parallel mark over the flat array, a sequential (bit-exact)
//! compaction, and an index rebuild from the compacted array.

use crate::fixed::Fixed;
use crate::ids::{CountryId, RelationKey, Tick};
use crate::modifiers::TimedModifier;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Opinion is clamped to this range after summing base + modifiers.
pub const OPINION_MIN: Fixed = Fixed::from_int(-200);
pub const OPINION_MAX: Fixed = Fixed::from_int(200);

/// Treaty flag bits. Guarantee and military access are directional, so
/// they take one bit per direction; "1" is the lower-numbered country of
/// the pair. The top two bits are reserved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatyFlags(pub u8);

impl TreatyFlags {
    pub const ALLIANCE: u8 = 1 << 0;
    pub const NON_AGGRESSION: u8 = 1 << 1;
    pub const GUARANTEE_1_TO_2: u8 = 1 << 2;
    pub const GUARANTEE_2_TO_1: u8 = 1 << 3;
    pub const ACCESS_1_TO_2: u8 = 1 << 4;
    pub const ACCESS_2_TO_1: u8 = 1 << 5;

    #[inline]
    pub const fn contains(self, mask: u8) -> bool {
        self.0 & mask != 0
    }

    #[inline]
    pub fn insert(&mut self, mask: u8) {
        self.0 |= mask;
    }

    #[inline]
    pub fn remove(&mut self, mask: u8) {
        self.0 &= !mask;
    }
}

/// 16-byte relation record for one unordered country pair.
///
/// The 8-byte opinion leads the record so its alignment adds no padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationData {
    pub base_opinion: Fixed,
    /// Lower-numbered country of the pair.
    pub low: CountryId,
    /// Higher-numbered country of the pair.
    pub high: CountryId,
    pub at_war: bool,
    pub treaties: TreatyFlags,
    pub reserved: [u8; 2],
}

const _: () = assert!(std::mem::size_of::<RelationData>() == 16);

impl RelationData {
    fn new(key: RelationKey) -> Self {
        Self {
            low: key.low(),
            high: key.high(),
            base_opinion: Fixed::ZERO,
            at_war: false,
            treaties: TreatyFlags::default(),
            reserved: [0; 2],
        }
    }
}

/// One entry of the flat opinion-modifier array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedModifier {
    pub key: RelationKey,
    pub modifier: TimedModifier,
}

/// Directional treaty kinds used by the query/mutation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directional {
    Guarantee,
    MilitaryAccess,
}

impl Directional {
    /// Bit for the `from → to` direction within the pair of `key`.
    fn mask(self, key: RelationKey, from: CountryId) -> u8 {
        let from_is_low = from == key.low();
        match (self, from_is_low) {
            (Directional::Guarantee, true) => TreatyFlags::GUARANTEE_1_TO_2,
            (Directional::Guarantee, false) => TreatyFlags::GUARANTEE_2_TO_1,
            (Directional::MilitaryAccess, true) => TreatyFlags::ACCESS_1_TO_2,
            (Directional::MilitaryAccess, false) => TreatyFlags::ACCESS_2_TO_1,
        }
    }
}

/// The diplomacy store. Sparse: only pairs that have ever interacted exist.
pub struct DiplomacyStore {
    relations: FxHashMap<RelationKey, RelationData>,
    /// Flat append-only modifier array; compacted monthly.
    modifiers: Vec<TaggedModifier>,
    /// key → positions into `modifiers`. Rebuilt after compaction.
    index: FxHashMap<RelationKey, Vec<u32>>,
    /// Scratch bitmap for the parallel mark phase.
    expired_scratch: Vec<bool>,
    relation_capacity: usize,
    modifier_capacity: usize,
}

impl DiplomacyStore {
    pub fn with_capacity(relation_capacity: usize, modifier_capacity: usize) -> Self {
        let mut relations = FxHashMap::default();
        relations.reserve(relation_capacity);
        let mut index = FxHashMap::default();
        index.reserve(relation_capacity);
        Self {
            relations,
            modifiers: Vec::with_capacity(modifier_capacity),
            index,
            expired_scratch: Vec::with_capacity(modifier_capacity),
            relation_capacity,
            modifier_capacity,
        }
    }

    pub fn relation(&self, a: CountryId, b: CountryId) -> Option<&RelationData> {
        self.relations.get(&RelationKey::new(a, b))
    }

    /// Get or create the relation record for a pair. Returns None for a
    /// degenerate pair or when the pre-reserved capacity is exhausted.
    pub fn relation_mut(&mut self, a: CountryId, b: CountryId) -> Option<&mut RelationData> {
        if a == b || a.is_none() || b.is_none() {
            return None;
        }
        let key = RelationKey::new(a, b);
        if !self.relations.contains_key(&key) && self.relations.len() >= self.relation_capacity {
            log::warn!("relation capacity {} exhausted", self.relation_capacity);
            return None;
        }
        Some(self.relations.entry(key).or_insert_with(|| RelationData::new(key)))
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    // === Opinion ===

    /// Append an opinion modifier for the pair. False when the modifier
    /// capacity is exhausted.
    #[must_use]
    pub fn add_modifier(&mut self, a: CountryId, b: CountryId, modifier: TimedModifier) -> bool {
        if a == b || a.is_none() || b.is_none() {
            return false;
        }
        if self.modifiers.len() >= self.modifier_capacity {
            log::warn!("modifier capacity {} exhausted", self.modifier_capacity);
            return false;
        }
        // Pairs acquire a relation record on first interaction.
        if self.relation_mut(a, b).is_none() {
            return false;
        }
        let key = RelationKey::new(a, b);
        let position = self.modifiers.len() as u32;
        self.modifiers.push(TaggedModifier { key, modifier });
        self.index.entry(key).or_default().push(position);
        true
    }

    /// Total opinion for a pair at `tick`: base + all live modifiers,
    /// clamped to ±200. Symmetric in its arguments.
    pub fn opinion(&self, a: CountryId, b: CountryId, tick: Tick) -> Fixed {
        let key = RelationKey::new(a, b);
        let base = self
            .relations
            .get(&key)
            .map(|r| r.base_opinion)
            .unwrap_or(Fixed::ZERO);
        let mut total = base;
        if let Some(positions) = self.index.get(&key) {
            for &p in positions {
                total = total + self.modifiers[p as usize].modifier.value_at(tick);
            }
        }
        total.clamp(OPINION_MIN, OPINION_MAX)
    }

    pub fn adjust_base_opinion(&mut self, a: CountryId, b: CountryId, delta: Fixed) {
        if let Some(rel) = self.relation_mut(a, b) {
            rel.base_opinion = (rel.base_opinion + delta).clamp(OPINION_MIN, OPINION_MAX);
        }
    }

    pub fn modifier_count(&self) -> usize {
        self.modifiers.len()
    }

    /// Modifier count for one pair (live and expired-but-uncompacted).
    pub fn modifier_count_for(&self, a: CountryId, b: CountryId) -> usize {
        self.index
            .get(&RelationKey::new(a, b))
            .map(|v| v.len())
            .unwrap_or(0)
    }

    // === Monthly decay: mark (parallel) / compact (sequential) / rebuild ===

    /// Remove fully-decayed modifiers and rebuild the index.
    /// Returns the number of modifiers compacted out.
    pub fn run_decay(&mut self, tick: Tick) -> usize {
        // Phase 1: mark. Read-only over the flat array, data-parallel; each
        // entry's verdict is independent so the bitmap is order-free.
        self.modifiers
            .par_iter()
            .map(|tagged| tagged.modifier.is_expired(tick))
            .collect_into_vec(&mut self.expired_scratch);

        // Phase 2: compact. Sequential in-order copy; the surviving order
        // (and therefore the rebuilt index) is bit-exact on every run.
        let before = self.modifiers.len();
        let mut write = 0usize;
        for read in 0..before {
            if !self.expired_scratch[read] {
                if write != read {
                    self.modifiers[write] = self.modifiers[read];
                }
                write += 1;
            }
        }
        self.modifiers.truncate(write);

        // Phase 3: rebuild the index from the compacted array. Position
        // lists keep their allocations across rebuilds.
        for positions in self.index.values_mut() {
            positions.clear();
        }
        for (position, tagged) in self.modifiers.iter().enumerate() {
            self.index
                .entry(tagged.key)
                .or_default()
                .push(position as u32);
        }

        before - write
    }

    // === Treaties ===

    pub fn are_allied(&self, a: CountryId, b: CountryId) -> bool {
        self.relation(a, b)
            .is_some_and(|r| r.treaties.contains(TreatyFlags::ALLIANCE))
    }

    pub fn has_nap(&self, a: CountryId, b: CountryId) -> bool {
        self.relation(a, b)
            .is_some_and(|r| r.treaties.contains(TreatyFlags::NON_AGGRESSION))
    }

    pub fn is_guaranteeing(&self, from: CountryId, to: CountryId) -> bool {
        let key = RelationKey::new(from, to);
        self.relations
            .get(&key)
            .is_some_and(|r| r.treaties.contains(Directional::Guarantee.mask(key, from)))
    }

    pub fn has_military_access(&self, from: CountryId, to: CountryId) -> bool {
        let key = RelationKey::new(from, to);
        self.relations
            .get(&key)
            .is_some_and(|r| r.treaties.contains(Directional::MilitaryAccess.mask(key, from)))
    }

    /// Set or clear a symmetric treaty bit. False on capacity exhaustion.
    #[must_use]
    pub fn set_symmetric_treaty(&mut self, a: CountryId, b: CountryId, mask: u8, on: bool) -> bool {
        match self.relation_mut(a, b) {
            Some(rel) => {
                if on {
                    rel.treaties.insert(mask);
                } else {
                    rel.treaties.remove(mask);
                }
                true
            }
            None => false,
        }
    }

    /// Set or clear a directional treaty bit (`from → to`).
    #[must_use]
    pub fn set_directional_treaty(
        &mut self,
        kind: Directional,
        from: CountryId,
        to: CountryId,
        on: bool,
    ) -> bool {
        let key = RelationKey::new(from, to);
        let mask = kind.mask(key, from);
        match self.relation_mut(from, to) {
            Some(rel) => {
                if on {
                    rel.treaties.insert(mask);
                } else {
                    rel.treaties.remove(mask);
                }
                true
            }
            None => false,
        }
    }

    // === War state ===

    pub fn at_war(&self, a: CountryId, b: CountryId) -> bool {
        self.relation(a, b).is_some_and(|r| r.at_war)
    }

    /// Transition a pair to war. Clears alliance and NAP bits; validation
    /// upstream has already rejected declarations those bits forbid, this
    /// keeps the §8 war-treaty invariant unconditionally.
    #[must_use]
    pub fn set_at_war(&mut self, a: CountryId, b: CountryId) -> bool {
        match self.relation_mut(a, b) {
            Some(rel) => {
                rel.at_war = true;
                rel.treaties
                    .remove(TreatyFlags::ALLIANCE | TreatyFlags::NON_AGGRESSION);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn set_at_peace(&mut self, a: CountryId, b: CountryId) -> bool {
        match self.relation_mut(a, b) {
            Some(rel) => {
                rel.at_war = false;
                true
            }
            None => false,
        }
    }

    /// Whether `id` is at war with anyone. Allocation-free.
    pub fn at_war_any(&self, id: CountryId) -> bool {
        self.relations
            .iter()
            .any(|(key, rel)| rel.at_war && (key.low() == id || key.high() == id))
    }

    /// Countries `id` is currently at war with, ascending.
    pub fn wars_of(&self, id: CountryId, out: &mut Vec<CountryId>) {
        out.clear();
        for (key, rel) in &self.relations {
            if rel.at_war {
                if key.low() == id {
                    out.push(key.high());
                } else if key.high() == id {
                    out.push(key.low());
                }
            }
        }
        out.sort_unstable();
    }

    /// Direct allies of `id`, ascending (deterministic regardless of map
    /// iteration order).
    pub fn get_allies(&self, id: CountryId, out: &mut Vec<CountryId>) {
        out.clear();
        for (key, rel) in &self.relations {
            if rel.treaties.contains(TreatyFlags::ALLIANCE) {
                if key.low() == id {
                    out.push(key.high());
                } else if key.high() == id {
                    out.push(key.low());
                }
            }
        }
        out.sort_unstable();
    }

    /// Transitive closure of the alliance graph from `id` (excluding `id`
    /// itself), ascending. BFS with a visited check, so alliance cycles
    /// terminate.
    pub fn get_allies_recursive(&self, id: CountryId, out: &mut Vec<CountryId>) {
        out.clear();
        let mut frontier = Vec::new();
        self.get_allies(id, out);
        let mut cursor = 0;
        while cursor < out.len() {
            let current = out[cursor];
            cursor += 1;
            self.get_allies(current, &mut frontier);
            for &ally in &frontier {
                if ally != id && !out.contains(&ally) {
                    out.push(ally);
                }
            }
        }
        out.sort_unstable();
    }

    // === Snapshot access ===

    /// Relations sorted by key (stable serialization order).
    pub fn relations_sorted(&self) -> Vec<RelationData> {
        let mut keys: Vec<_> = self.relations.keys().copied().collect();
        keys.sort_unstable();
        keys.iter().map(|k| self.relations[k]).collect()
    }

    /// The flat modifier array in its authoritative order.
    pub fn modifiers_raw(&self) -> &[TaggedModifier] {
        &self.modifiers
    }

    /// Restore from a snapshot (load path only). Rebuilds the index.
    pub fn restore(&mut self, relations: Vec<RelationData>, modifiers: Vec<TaggedModifier>) {
        self.relations.clear();
        for rel in relations {
            let key = RelationKey::new(rel.low, rel.high);
            self.relations.insert(key, rel);
        }
        self.modifiers.clear();
        self.modifiers.extend_from_slice(&modifiers);
        self.index.clear();
        for (position, tagged) in self.modifiers.iter().enumerate() {
            self.index
                .entry(tagged.key)
                .or_default()
                .push(position as u32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ModifierTypeId;

    fn c(id: u16) -> CountryId {
        CountryId(id)
    }

    fn store() -> DiplomacyStore {
        DiplomacyStore::with_capacity(64, 1024)
    }

    fn modifier(magnitude: i64, start: Tick, decay: u32) -> TimedModifier {
        TimedModifier::new(ModifierTypeId(1), start, decay, Fixed::from_int(magnitude))
    }

    #[test]
    fn test_relation_record_is_16_bytes() {
        assert_eq!(std::mem::size_of::<RelationData>(), 16);
    }

    #[test]
    fn test_opinion_symmetric() {
        let mut d = store();
        d.adjust_base_opinion(c(1), c(2), Fixed::from_int(40));
        assert!(d.add_modifier(c(2), c(1), modifier(-15, 0, 0)));
        assert_eq!(d.opinion(c(1), c(2), 10), d.opinion(c(2), c(1), 10));
        assert_eq!(d.opinion(c(1), c(2), 10), Fixed::from_int(25));
    }

    #[test]
    fn test_opinion_clamped() {
        let mut d = store();
        d.adjust_base_opinion(c(1), c(2), Fixed::from_int(150));
        assert!(d.add_modifier(c(1), c(2), modifier(100, 0, 0)));
        assert_eq!(d.opinion(c(1), c(2), 0), OPINION_MAX);

        d.adjust_base_opinion(c(3), c(4), Fixed::from_int(-150));
        assert!(d.add_modifier(c(3), c(4), modifier(-100, 0, 0)));
        assert_eq!(d.opinion(c(3), c(4), 0), OPINION_MIN);

        // Two pairs clamped to the same bound compare equal (sort stability)
        d.adjust_base_opinion(c(5), c(6), Fixed::from_int(180));
        assert!(d.add_modifier(c(5), c(6), modifier(90, 0, 0)));
        assert_eq!(d.opinion(c(1), c(2), 0), d.opinion(c(5), c(6), 0));
    }

    #[test]
    fn test_unknown_pair_opinion_zero() {
        let d = store();
        assert_eq!(d.opinion(c(1), c(9), 0), Fixed::ZERO);
    }

    #[test]
    fn test_decay_compacts_expired() {
        let mut d = store();
        assert!(d.add_modifier(c(1), c(2), modifier(-50, 0, 3600)));
        assert!(d.add_modifier(c(1), c(2), modifier(10, 0, 0))); // permanent
        assert!(d.add_modifier(c(1), c(3), modifier(20, 100, 200)));
        assert_eq!(d.modifier_count(), 3);

        // Before expiry nothing is removed
        assert_eq!(d.run_decay(3599), 0);
        assert_eq!(d.modifier_count(), 3);

        // At 3600 the war modifier expires; at 300 the (1,3) one did too
        let removed = d.run_decay(3600);
        assert_eq!(removed, 2);
        assert_eq!(d.modifier_count(), 1);
        assert_eq!(d.modifier_count_for(c(1), c(2)), 1);
        assert_eq!(d.modifier_count_for(c(1), c(3)), 0);
        assert_eq!(d.opinion(c(1), c(2), 3600), Fixed::from_int(10));

        // Functional check: no surviving modifier is expired
        assert!(!d.modifiers_raw().iter().any(|t| t.modifier.is_expired(3600)));
    }

    #[test]
    fn test_decay_preserves_order_and_index() {
        let mut d = store();
        assert!(d.add_modifier(c(1), c(2), modifier(1, 0, 0)));
        assert!(d.add_modifier(c(1), c(3), modifier(2, 0, 10)));
        assert!(d.add_modifier(c(1), c(2), modifier(3, 0, 0)));
        assert!(d.add_modifier(c(2), c(3), modifier(4, 0, 0)));

        d.run_decay(10);
        let mags: Vec<i64> = d
            .modifiers_raw()
            .iter()
            .map(|t| t.modifier.magnitude.to_int())
            .collect();
        assert_eq!(mags, vec![1, 3, 4]);
        assert_eq!(
            d.opinion(c(1), c(2), 10),
            Fixed::from_int(4),
            "index must resolve to the surviving modifiers"
        );
    }

    #[test]
    fn test_decay_deterministic() {
        let build = || {
            let mut d = store();
            for i in 0..50u16 {
                let a = c(1 + i % 5);
                let b = c(6 + i % 7);
                assert!(d.add_modifier(a, b, modifier(i as i64, (i as u64) * 3, 100 + i as u32)));
            }
            d.run_decay(200);
            d.modifiers_raw().to_vec()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_treaty_bits_symmetric() {
        let mut d = store();
        assert!(d.set_symmetric_treaty(c(1), c(2), TreatyFlags::ALLIANCE, true));
        assert!(d.are_allied(c(1), c(2)));
        assert!(d.are_allied(c(2), c(1)));
        assert!(!d.has_nap(c(1), c(2)));

        assert!(d.set_symmetric_treaty(c(1), c(2), TreatyFlags::ALLIANCE, false));
        assert!(!d.are_allied(c(1), c(2)));
    }

    #[test]
    fn test_directional_treaties() {
        let mut d = store();
        // 5 guarantees 2: direction must survive the pair canonicalization
        assert!(d.set_directional_treaty(Directional::Guarantee, c(5), c(2), true));
        assert!(d.is_guaranteeing(c(5), c(2)));
        assert!(!d.is_guaranteeing(c(2), c(5)));

        assert!(d.set_directional_treaty(Directional::MilitaryAccess, c(2), c(5), true));
        assert!(d.has_military_access(c(2), c(5)));
        assert!(!d.has_military_access(c(5), c(2)));
    }

    #[test]
    fn test_war_clears_alliance_and_nap() {
        let mut d = store();
        assert!(d.set_symmetric_treaty(c(1), c(2), TreatyFlags::ALLIANCE, true));
        assert!(d.set_symmetric_treaty(
            c(1),
            c(2),
            TreatyFlags::NON_AGGRESSION,
            true
        ));
        assert!(d.set_at_war(c(1), c(2)));

        assert!(d.at_war(c(1), c(2)));
        assert!(!d.are_allied(c(1), c(2)));
        assert!(!d.has_nap(c(1), c(2)));

        assert!(d.set_at_peace(c(1), c(2)));
        assert!(!d.at_war(c(1), c(2)));
    }

    #[test]
    fn test_get_allies_sorted() {
        let mut d = store();
        assert!(d.set_symmetric_treaty(c(5), c(9), TreatyFlags::ALLIANCE, true));
        assert!(d.set_symmetric_treaty(c(5), c(2), TreatyFlags::ALLIANCE, true));
        assert!(d.set_symmetric_treaty(c(5), c(7), TreatyFlags::ALLIANCE, true));

        let mut out = Vec::new();
        d.get_allies(c(5), &mut out);
        assert_eq!(out, vec![c(2), c(7), c(9)]);
    }

    #[test]
    fn test_allies_recursive_chain_and_cycle() {
        let mut d = store();
        // Chain 1-2-3 plus cycle edge 3-1
        assert!(d.set_symmetric_treaty(c(1), c(2), TreatyFlags::ALLIANCE, true));
        assert!(d.set_symmetric_treaty(c(2), c(3), TreatyFlags::ALLIANCE, true));
        assert!(d.set_symmetric_treaty(c(3), c(1), TreatyFlags::ALLIANCE, true));

        let mut out = Vec::new();
        d.get_allies_recursive(c(1), &mut out);
        assert_eq!(out, vec![c(2), c(3)]);

        // Unconnected country has no allies
        d.get_allies_recursive(c(9), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_modifier_capacity_exhaustion() {
        let mut d = DiplomacyStore::with_capacity(8, 2);
        assert!(d.add_modifier(c(1), c(2), modifier(1, 0, 0)));
        assert!(d.add_modifier(c(1), c(2), modifier(2, 0, 0)));
        assert!(!d.add_modifier(c(1), c(2), modifier(3, 0, 0)));
        assert_eq!(d.modifier_count(), 2);
    }

    #[test]
    fn test_degenerate_pairs_rejected() {
        let mut d = store();
        assert!(d.relation_mut(c(3), c(3)).is_none());
        assert!(d.relation_mut(CountryId::NONE, c(3)).is_none());
        assert!(!d.add_modifier(c(3), c(3), modifier(1, 0, 0)));
    }

    #[test]
    fn test_restore_roundtrip() {
        let mut d = store();
        d.adjust_base_opinion(c(1), c(2), Fixed::from_int(30));
        assert!(d.set_at_war(c(2), c(3)));
        assert!(d.add_modifier(c(1), c(2), modifier(-10, 5, 100)));
        assert!(d.add_modifier(c(2), c(3), modifier(25, 0, 0)));

        let relations = d.relations_sorted();
        let modifiers = d.modifiers_raw().to_vec();

        let mut restored = store();
        restored.restore(relations, modifiers);

        assert_eq!(restored.opinion(c(1), c(2), 5), d.opinion(c(1), c(2), 5));
        assert!(restored.at_war(c(2), c(3)));
        assert_eq!(restored.modifier_count(), 2);
        assert_eq!(restored.relations_sorted(), d.relations_sorted());
    }
}
