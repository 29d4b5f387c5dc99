//! Typed entity identifiers.
//!
//! Every cross-store relationship in the simulation is a plain id
//! interpreted by the owning store, never a pointer. All ids are u16 with
//! 0 reserved as the "none" sentinel, which keeps hot records at their
//! fixed byte budgets and makes serialization trivial.

use serde::{Deserialize, Serialize};

/// The monotonic simulation tick (one in-game hour). Never wraps in practice.
pub type Tick = u64;

/// Province identifier. Distinct from the dense array index; translate
/// through the province store's id→index map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ProvinceId(pub u16);

/// Country identifier (dense, stable across a session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct CountryId(pub u16);

/// Unit identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct UnitId(pub u16);

/// Terrain type identifier (registry index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TerrainId(pub u16);

/// Unit type identifier (registry index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct UnitTypeId(pub u16);

/// Opinion/economy modifier type identifier (registry index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ModifierTypeId(pub u16);

/// Building type identifier (registry index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BuildingTypeId(pub u16);

/// Resource type identifier (registry index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ResourceTypeId(pub u16);

macro_rules! sentinel_impl {
    ($($ty:ident),*) => {
        $(
            impl $ty {
                /// The reserved "none" value.
                pub const NONE: $ty = $ty(0);

                #[inline]
                pub const fn is_none(self) -> bool {
                    self.0 == 0
                }

                #[inline]
                pub const fn is_some(self) -> bool {
                    self.0 != 0
                }
            }

            impl std::fmt::Display for $ty {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

sentinel_impl!(
    ProvinceId,
    CountryId,
    UnitId,
    TerrainId,
    UnitTypeId,
    ModifierTypeId,
    BuildingTypeId,
    ResourceTypeId
);

/// Canonical key for an unordered country pair: `(min << 16) | max`.
///
/// Ordering the pair at construction means every store agrees on which
/// country is "first" without consulting anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationKey(pub u32);

impl RelationKey {
    pub fn new(a: CountryId, b: CountryId) -> Self {
        let (lo, hi) = if a.0 <= b.0 { (a.0, b.0) } else { (b.0, a.0) };
        Self(((lo as u32) << 16) | hi as u32)
    }

    /// The lower-numbered country of the pair.
    #[inline]
    pub const fn low(self) -> CountryId {
        CountryId((self.0 >> 16) as u16)
    }

    /// The higher-numbered country of the pair.
    #[inline]
    pub const fn high(self) -> CountryId {
        CountryId((self.0 & 0xFFFF) as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel() {
        assert!(ProvinceId::NONE.is_none());
        assert!(ProvinceId(1).is_some());
        assert_eq!(CountryId::default(), CountryId::NONE);
    }

    #[test]
    fn test_relation_key_orders_pair() {
        let k1 = RelationKey::new(CountryId(5), CountryId(2));
        let k2 = RelationKey::new(CountryId(2), CountryId(5));
        assert_eq!(k1, k2);
        assert_eq!(k1.low(), CountryId(2));
        assert_eq!(k1.high(), CountryId(5));
    }

    #[test]
    fn test_relation_key_same_country() {
        let k = RelationKey::new(CountryId(7), CountryId(7));
        assert_eq!(k.low(), k.high());
    }
}
