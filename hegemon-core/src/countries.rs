//! Country registry: tag↔id mapping with a hot/cold data split.
//!
//! Dense ids are assigned in registration order starting at 1 (0 is the
//! "none" sentinel) and are stable for the whole session. Hot data is the
//! fixed-size state touched every tick; cold data holds names and other
//! rarely-read fields.

use crate::fixed::Fixed;
use crate::ids::{CountryId, ProvinceId};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Per-country flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryFlags(pub u16);

impl CountryFlags {
    /// Country is controlled by the AI scheduler.
    pub const AI_CONTROLLED: u16 = 1 << 0;
    /// Country has been eliminated (owns no provinces).
    pub const ELIMINATED: u16 = 1 << 1;

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

/// Frequently-accessed fixed-size country data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryHot {
    /// Map display color.
    pub color: [u8; 3],
    pub flags: CountryFlags,
}

/// Rarely-accessed auxiliary country data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountryCold {
    pub display_name: String,
    pub capital: ProvinceId,
    /// AI goal-score multiplier; ONE is neutral.
    pub ai_aggression: Fixed,
}

/// The country store. Created once at scenario load; never grows afterwards.
pub struct CountryRegistry {
    tags: Vec<String>,
    by_tag: FxHashMap<String, CountryId>,
    hot: Vec<CountryHot>,
    cold: Vec<CountryCold>,
}

impl CountryRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tags: Vec::with_capacity(capacity),
            by_tag: FxHashMap::default(),
            hot: Vec::with_capacity(capacity),
            cold: Vec::with_capacity(capacity),
        }
    }

    /// Register a country. Duplicate tags are a scenario error.
    pub fn register(
        &mut self,
        tag: &str,
        hot: CountryHot,
        cold: CountryCold,
    ) -> Result<CountryId, String> {
        if self.by_tag.contains_key(tag) {
            return Err(tag.to_string());
        }
        if self.tags.len() >= u16::MAX as usize - 1 {
            return Err(tag.to_string());
        }
        let id = CountryId(self.tags.len() as u16 + 1);
        self.tags.push(tag.to_string());
        self.by_tag.insert(tag.to_string(), id);
        self.hot.push(hot);
        self.cold.push(cold);
        Ok(id)
    }

    #[inline]
    pub fn count(&self) -> u16 {
        self.tags.len() as u16
    }

    #[inline]
    pub fn contains(&self, id: CountryId) -> bool {
        id.is_some() && (id.0 as usize) <= self.tags.len()
    }

    pub fn id_of(&self, tag: &str) -> Option<CountryId> {
        self.by_tag.get(tag).copied()
    }

    pub fn tag_of(&self, id: CountryId) -> Option<&str> {
        if self.contains(id) {
            Some(&self.tags[id.0 as usize - 1])
        } else {
            None
        }
    }

    pub fn hot(&self, id: CountryId) -> Option<&CountryHot> {
        if self.contains(id) {
            Some(&self.hot[id.0 as usize - 1])
        } else {
            None
        }
    }

    pub fn hot_mut(&mut self, id: CountryId) -> Option<&mut CountryHot> {
        if self.contains(id) {
            Some(&mut self.hot[id.0 as usize - 1])
        } else {
            None
        }
    }

    pub fn cold(&self, id: CountryId) -> Option<&CountryCold> {
        if self.contains(id) {
            Some(&self.cold[id.0 as usize - 1])
        } else {
            None
        }
    }

    /// Iterate ids in ascending (registration) order.
    pub fn iter_ids(&self) -> impl Iterator<Item = CountryId> + '_ {
        (1..=self.tags.len() as u16).map(CountryId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CountryRegistry {
        let mut r = CountryRegistry::with_capacity(8);
        r.register("SWE", CountryHot::default(), CountryCold::default())
            .unwrap();
        r.register("DAN", CountryHot::default(), CountryCold::default())
            .unwrap();
        r
    }

    #[test]
    fn test_ids_start_at_one() {
        let r = registry();
        assert_eq!(r.id_of("SWE"), Some(CountryId(1)));
        assert_eq!(r.id_of("DAN"), Some(CountryId(2)));
        assert_eq!(r.count(), 2);
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let mut r = registry();
        assert!(r
            .register("SWE", CountryHot::default(), CountryCold::default())
            .is_err());
    }

    #[test]
    fn test_sentinel_not_contained() {
        let r = registry();
        assert!(!r.contains(CountryId::NONE));
        assert!(r.contains(CountryId(1)));
        assert!(!r.contains(CountryId(3)));
        assert_eq!(r.tag_of(CountryId::NONE), None);
    }

    #[test]
    fn test_tag_roundtrip() {
        let r = registry();
        let id = r.id_of("DAN").unwrap();
        assert_eq!(r.tag_of(id), Some("DAN"));
    }

    #[test]
    fn test_iter_ids_ordered() {
        let r = registry();
        let ids: Vec<_> = r.iter_ids().collect();
        assert_eq!(ids, vec![CountryId(1), CountryId(2)]);
    }
}
