//! Per-country resource buckets.
//!
//! A dense `(country, resource type)` matrix of [`Fixed`] values, sized once
//! at scenario load. Spending is validated; balances never go negative.

use crate::fixed::Fixed;
use crate::ids::{CountryId, ResourceTypeId};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Registry of resource type names (scenario-defined, e.g. "gold",
/// "manpower", "diplomatic_capital").
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ResourceTypeRegistry {
    names: Vec<String>,
    #[serde(skip)]
    by_name: FxHashMap<String, ResourceTypeId>,
}

impl ResourceTypeRegistry {
    pub fn register(&mut self, name: &str) -> ResourceTypeId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = ResourceTypeId(self.names.len() as u16 + 1);
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn id_of(&self, name: &str) -> Option<ResourceTypeId> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: ResourceTypeId) -> Option<&str> {
        if id.is_some() && (id.0 as usize) <= self.names.len() {
            Some(&self.names[id.0 as usize - 1])
        } else {
            None
        }
    }

    pub fn count(&self) -> u16 {
        self.names.len() as u16
    }

    pub fn rebuild_index(&mut self) {
        self.by_name = self
            .names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), ResourceTypeId(i as u16 + 1)))
            .collect();
    }
}

/// The resource store: one Fixed per `(country, type)` pair.
pub struct ResourceStore {
    values: Vec<Fixed>,
    n_types: usize,
    n_countries: usize,
}

impl ResourceStore {
    pub fn new(n_countries: u16, n_types: u16) -> Self {
        Self {
            values: vec![Fixed::ZERO; n_countries as usize * n_types as usize],
            n_types: n_types as usize,
            n_countries: n_countries as usize,
        }
    }

    #[inline]
    fn slot(&self, country: CountryId, resource: ResourceTypeId) -> Option<usize> {
        if country.is_none()
            || resource.is_none()
            || country.0 as usize > self.n_countries
            || resource.0 as usize > self.n_types
        {
            return None;
        }
        Some((country.0 as usize - 1) * self.n_types + resource.0 as usize - 1)
    }

    /// Current balance; unknown keys read as zero.
    #[inline]
    pub fn get(&self, country: CountryId, resource: ResourceTypeId) -> Fixed {
        self.slot(country, resource)
            .map(|i| self.values[i])
            .unwrap_or(Fixed::ZERO)
    }

    pub fn set(&mut self, country: CountryId, resource: ResourceTypeId, value: Fixed) {
        if let Some(i) = self.slot(country, resource) {
            self.values[i] = value;
        }
    }

    /// Credit (or debit, with a negative amount — floored at zero).
    pub fn add(&mut self, country: CountryId, resource: ResourceTypeId, amount: Fixed) {
        if let Some(i) = self.slot(country, resource) {
            self.values[i] = (self.values[i] + amount).max(Fixed::ZERO);
        }
    }

    /// Spend `amount` if the balance covers it. Returns false (and leaves
    /// the balance untouched) otherwise.
    #[must_use]
    pub fn try_spend(&mut self, country: CountryId, resource: ResourceTypeId, amount: Fixed) -> bool {
        let Some(i) = self.slot(country, resource) else {
            return false;
        };
        if self.values[i] < amount {
            return false;
        }
        self.values[i] -= amount;
        true
    }

    /// Raw values for checksum/serialization, row-major by country.
    pub fn raw_values(&self) -> &[Fixed] {
        &self.values
    }

    pub fn restore(&mut self, values: &[Fixed]) {
        debug_assert_eq!(values.len(), self.values.len(), "snapshot size mismatch");
        self.values.copy_from_slice(values);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_add() {
        let mut store = ResourceStore::new(3, 2);
        let c = CountryId(2);
        let gold = ResourceTypeId(1);

        assert_eq!(store.get(c, gold), Fixed::ZERO);
        store.set(c, gold, Fixed::from_int(100));
        store.add(c, gold, Fixed::from_int(50));
        assert_eq!(store.get(c, gold), Fixed::from_int(150));
    }

    #[test]
    fn test_spend_validates_balance() {
        let mut store = ResourceStore::new(2, 1);
        let c = CountryId(1);
        let gold = ResourceTypeId(1);
        store.set(c, gold, Fixed::from_int(30));

        assert!(store.try_spend(c, gold, Fixed::from_int(20)));
        assert_eq!(store.get(c, gold), Fixed::from_int(10));
        assert!(!store.try_spend(c, gold, Fixed::from_int(11)));
        assert_eq!(store.get(c, gold), Fixed::from_int(10));
    }

    #[test]
    fn test_debit_floors_at_zero() {
        let mut store = ResourceStore::new(1, 1);
        let c = CountryId(1);
        let gold = ResourceTypeId(1);
        store.set(c, gold, Fixed::from_int(5));
        store.add(c, gold, Fixed::from_int(-20));
        assert_eq!(store.get(c, gold), Fixed::ZERO);
    }

    #[test]
    fn test_sentinel_keys_are_inert() {
        let mut store = ResourceStore::new(2, 2);
        store.add(CountryId::NONE, ResourceTypeId(1), Fixed::ONE);
        store.add(CountryId(1), ResourceTypeId::NONE, Fixed::ONE);
        store.add(CountryId(9), ResourceTypeId(1), Fixed::ONE);
        assert!(store.raw_values().iter().all(|&v| v == Fixed::ZERO));
        assert!(!store.try_spend(CountryId::NONE, ResourceTypeId(1), Fixed::ZERO));
    }
}
