//! Scenario blob consumption.
//!
//! The core does not parse game files. A loader layer hands it this typed
//! blob (here deserialized from JSON) and [`build_state`] turns it into a
//! fully sized [`GameState`]. Every store is allocated for its worst case
//! right here; capacity exhaustion is a load error, never a silent
//! downgrade during play.

use crate::calendar::GameTime;
use crate::countries::{CountryCold, CountryFlags, CountryHot, CountryRegistry};
use crate::diplomacy::DiplomacyStore;
use crate::fixed::Fixed;
use crate::ids::{ProvinceId, TerrainId};
use crate::provinces::{ProvinceFlags, ProvinceState, ProvinceStore};
use crate::resources::{ResourceStore, ResourceTypeRegistry};
use crate::state::{GameState, WellKnown};
use crate::systems::economy::{BuildingDef, BuildingRegistry, EconomyState};
use crate::units::{UnitStore, UnitTypeDef, UnitTypeRegistry};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terrain registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainDef {
    pub name: String,
    /// Base days to enter a province of this terrain.
    pub move_cost_days: u16,
    /// Monthly income per owned province (whole treasury units).
    #[serde(default)]
    pub income: i64,
    #[serde(default)]
    pub water: bool,
    #[serde(default)]
    pub impassable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvinceDef {
    pub id: u16,
    /// Map-identifier color, owned by the renderer; carried opaque.
    #[serde(default)]
    pub rgb: [u8; 3],
    pub terrain: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub culture: Option<String>,
    #[serde(default)]
    pub religion: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_aggression() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryDef {
    pub tag: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: [u8; 3],
    #[serde(default)]
    pub capital: u16,
    /// AI-controlled unless a human claims the seat.
    #[serde(default = "default_true")]
    pub ai: bool,
    /// Goal-score multiplier for aggressive goals, in percent.
    #[serde(default = "default_aggression")]
    pub aggression_percent: u32,
    /// Starting resources as (type name, whole units).
    #[serde(default)]
    pub resources: Vec<(String, i64)>,
}

fn default_stat() -> i64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitTypeSpec {
    pub name: String,
    pub traversal_days: u16,
    #[serde(default = "default_stat")]
    pub attack: i64,
    #[serde(default = "default_stat")]
    pub defense: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingSpec {
    pub name: String,
    pub cost: i64,
    pub income: i64,
}

/// Worst-case sizes every sparse store reserves at load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capacities {
    pub max_units: u16,
    pub max_relations: u32,
    pub max_opinion_modifiers: u32,
    pub max_income_modifiers: u32,
}

impl Default for Capacities {
    fn default() -> Self {
        Self {
            max_units: 512,
            max_relations: 16_384,
            max_opinion_modifiers: 1 << 20,
            max_income_modifiers: 4_096,
        }
    }
}

/// The parsed scenario blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioBlob {
    pub name: String,
    pub seed: u64,
    pub start_year: u32,
    pub start_month: u8,
    pub start_day: u8,
    pub terrain: Vec<TerrainDef>,
    pub provinces: Vec<ProvinceDef>,
    /// Undirected adjacency edges between province ids.
    pub adjacency: Vec<(u16, u16)>,
    pub countries: Vec<CountryDef>,
    pub unit_types: Vec<UnitTypeSpec>,
    #[serde(default)]
    pub buildings: Vec<BuildingSpec>,
    #[serde(default)]
    pub capacities: Capacities,
}

impl ScenarioBlob {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Error, Debug)]
pub enum ScenarioLoadError {
    #[error("duplicate province id {0}")]
    DuplicateProvince(u16),
    #[error("duplicate country tag {0}")]
    DuplicateCountry(String),
    #[error("too many countries (max {0})")]
    TooManyCountries(usize),
    #[error("province {province} references unknown terrain '{terrain}'")]
    UnknownTerrain { province: u16, terrain: String },
    #[error("province {province} references unknown owner tag '{tag}'")]
    UnknownOwner { province: u16, tag: String },
    #[error("sea province {0} cannot have an owner")]
    SeaProvinceOwned(u16),
    #[error("scenario defines no terrain types")]
    NoTerrain,
    #[error("invalid start date {0}.{1}.{2}")]
    InvalidStartDate(u32, u8, u8),
}

/// Build the complete game state from a scenario blob.
pub fn build_state(blob: &ScenarioBlob) -> Result<GameState, ScenarioLoadError> {
    if blob.terrain.is_empty() {
        return Err(ScenarioLoadError::NoTerrain);
    }
    if !(1..=12).contains(&blob.start_month) || !(1..=30).contains(&blob.start_day) {
        return Err(ScenarioLoadError::InvalidStartDate(
            blob.start_year,
            blob.start_month,
            blob.start_day,
        ));
    }

    // Terrain registry: ids are 1-based positions in declaration order.
    let mut terrain_ids: FxHashMap<&str, TerrainId> = FxHashMap::default();
    for (index, def) in blob.terrain.iter().enumerate() {
        terrain_ids.insert(def.name.as_str(), TerrainId(index as u16 + 1));
    }

    // Countries.
    if blob.countries.len() >= u16::MAX as usize {
        return Err(ScenarioLoadError::TooManyCountries(u16::MAX as usize - 1));
    }
    let mut countries = CountryRegistry::with_capacity(blob.countries.len());
    for def in &blob.countries {
        let mut flags = CountryFlags::default();
        if def.ai {
            flags.insert(CountryFlags::AI_CONTROLLED);
        }
        let display_name = if def.name.is_empty() {
            def.tag.clone()
        } else {
            def.name.clone()
        };
        countries
            .register(
                &def.tag,
                CountryHot {
                    color: def.color,
                    flags,
                },
                CountryCold {
                    display_name,
                    capital: ProvinceId(def.capital),
                    ai_aggression: Fixed::from_ratio(def.aggression_percent as i64, 100),
                },
            )
            .map_err(ScenarioLoadError::DuplicateCountry)?;
    }

    // Provinces.
    let mut province_defs = Vec::with_capacity(blob.provinces.len());
    for def in &blob.provinces {
        let terrain =
            *terrain_ids
                .get(def.terrain.as_str())
                .ok_or_else(|| ScenarioLoadError::UnknownTerrain {
                    province: def.id,
                    terrain: def.terrain.clone(),
                })?;
        let terrain_def = &blob.terrain[terrain.0 as usize - 1];

        let mut flags = ProvinceFlags::default();
        if terrain_def.water {
            flags.insert(ProvinceFlags::SEA);
        }
        if terrain_def.impassable {
            flags.insert(ProvinceFlags::IMPASSABLE);
        }

        let owner = match &def.owner {
            Some(tag) => {
                if terrain_def.water {
                    return Err(ScenarioLoadError::SeaProvinceOwned(def.id));
                }
                countries
                    .id_of(tag)
                    .ok_or_else(|| ScenarioLoadError::UnknownOwner {
                        province: def.id,
                        tag: tag.clone(),
                    })?
            }
            None => crate::ids::CountryId::NONE,
        };

        province_defs.push((
            ProvinceId(def.id),
            ProvinceState {
                owner,
                controller: owner,
                terrain,
                flags,
            },
        ));
    }
    let provinces =
        ProvinceStore::new(province_defs).map_err(|id| ScenarioLoadError::DuplicateProvince(id.0))?;

    // Adjacency.
    let edges: Vec<(ProvinceId, ProvinceId)> = blob
        .adjacency
        .iter()
        .map(|&(a, b)| (ProvinceId(a), ProvinceId(b)))
        .collect();
    let adjacency = crate::adjacency::AdjacencyGraph::from_edges(&edges);

    // Registries the ambient systems rely on unconditionally.
    let mut resource_types = ResourceTypeRegistry::default();
    let gold = resource_types.register("gold");
    for def in &blob.countries {
        for (name, _) in &def.resources {
            resource_types.register(name);
        }
    }

    let mut modifier_types = crate::modifiers::ModifierTypeRegistry::default();
    let declared_war = modifier_types.register("declared_war");
    let defensive_war_help = modifier_types.register("defensive_war_help");

    let mut unit_types = UnitTypeRegistry::default();
    for spec in &blob.unit_types {
        unit_types.register(UnitTypeDef {
            name: spec.name.clone(),
            traversal_days: spec.traversal_days,
            attack: Fixed::from_int(spec.attack),
            defense: Fixed::from_int(spec.defense),
        });
    }

    let mut buildings = BuildingRegistry::default();
    for spec in &blob.buildings {
        buildings.register(BuildingDef {
            name: spec.name.clone(),
            cost: Fixed::from_int(spec.cost),
            income: Fixed::from_int(spec.income),
        });
    }

    // Stores, sized once.
    let mut resources = ResourceStore::new(countries.count(), resource_types.count());
    for def in &blob.countries {
        let country = countries.id_of(&def.tag).expect("registered above");
        for (name, amount) in &def.resources {
            let resource = resource_types.id_of(name).expect("registered above");
            resources.set(country, resource, Fixed::from_int(*amount));
        }
    }

    let caps = &blob.capacities;
    let diplomacy = DiplomacyStore::with_capacity(
        caps.max_relations as usize,
        caps.max_opinion_modifiers as usize,
    );
    let units = UnitStore::with_capacity(caps.max_units);
    let economy = EconomyState::with_capacity(
        blob.provinces.len().max(64),
        caps.max_income_modifiers as usize,
    );
    let ai = vec![crate::ai::AiState::default(); countries.count() as usize];

    log::info!(
        "scenario '{}' loaded: {} provinces, {} countries, {} terrain types",
        blob.name,
        provinces.len(),
        countries.count(),
        blob.terrain.len()
    );

    Ok(GameState {
        scenario_name: blob.name.clone(),
        seed: blob.seed,
        tick: 0,
        time: GameTime::new(blob.start_year, blob.start_month, blob.start_day, 0),
        provinces,
        countries,
        adjacency,
        terrain: blob.terrain.clone(),
        resource_types,
        resources,
        modifier_types,
        unit_types,
        buildings,
        economy,
        diplomacy,
        units,
        ai,
        well_known: WellKnown {
            gold,
            declared_war,
            defensive_war_help,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::CountryId;

    fn minimal_blob() -> ScenarioBlob {
        ScenarioBlob {
            name: "test".into(),
            seed: 7,
            start_year: 1444,
            start_month: 11,
            start_day: 11,
            terrain: vec![
                TerrainDef {
                    name: "plains".into(),
                    move_cost_days: 5,
                    income: 1,
                    water: false,
                    impassable: false,
                },
                TerrainDef {
                    name: "ocean".into(),
                    move_cost_days: 1,
                    income: 0,
                    water: true,
                    impassable: false,
                },
            ],
            provinces: vec![
                ProvinceDef {
                    id: 1,
                    rgb: [10, 20, 30],
                    terrain: "plains".into(),
                    owner: Some("AAA".into()),
                    culture: None,
                    religion: None,
                },
                ProvinceDef {
                    id: 2,
                    rgb: [0, 0, 0],
                    terrain: "ocean".into(),
                    owner: None,
                    culture: None,
                    religion: None,
                },
            ],
            adjacency: vec![(1, 2)],
            countries: vec![CountryDef {
                tag: "AAA".into(),
                name: "Avalon".into(),
                color: [200, 10, 10],
                capital: 1,
                ai: true,
                aggression_percent: 120,
                resources: vec![("gold".into(), 100)],
            }],
            unit_types: vec![UnitTypeSpec {
                name: "infantry".into(),
                traversal_days: 5,
                attack: 1,
                defense: 1,
            }],
            buildings: vec![BuildingSpec {
                name: "market".into(),
                cost: 50,
                income: 2,
            }],
            capacities: Capacities::default(),
        }
    }

    #[test]
    fn test_build_minimal_state() {
        let state = build_state(&minimal_blob()).unwrap();
        assert_eq!(state.provinces.len(), 2);
        assert_eq!(state.countries.count(), 1);
        assert_eq!(state.time, GameTime::new(1444, 11, 11, 0));
        assert_eq!(state.tick, 0);

        let aaa = state.countries.id_of("AAA").unwrap();
        assert_eq!(state.provinces.get_owner(ProvinceId(1)), aaa);
        assert_eq!(
            state.resources.get(aaa, state.well_known.gold),
            Fixed::from_int(100)
        );
        assert!(state.provinces.get_state(ProvinceId(2)).is_sea());
        assert!(state.adjacency.are_adjacent(ProvinceId(1), ProvinceId(2)));
        assert!(state.validate_invariants().is_ok());

        // Personality carried into cold data
        assert_eq!(
            state.countries.cold(aaa).unwrap().ai_aggression,
            Fixed::from_ratio(6, 5)
        );
    }

    #[test]
    fn test_duplicate_province_rejected() {
        let mut blob = minimal_blob();
        blob.provinces.push(blob.provinces[0].clone());
        assert!(matches!(
            build_state(&blob),
            Err(ScenarioLoadError::DuplicateProvince(1))
        ));
    }

    #[test]
    fn test_unknown_terrain_rejected() {
        let mut blob = minimal_blob();
        blob.provinces[0].terrain = "swamp".into();
        assert!(matches!(
            build_state(&blob),
            Err(ScenarioLoadError::UnknownTerrain { province: 1, .. })
        ));
    }

    #[test]
    fn test_unknown_owner_rejected() {
        let mut blob = minimal_blob();
        blob.provinces[0].owner = Some("ZZZ".into());
        assert!(matches!(
            build_state(&blob),
            Err(ScenarioLoadError::UnknownOwner { province: 1, .. })
        ));
    }

    #[test]
    fn test_sea_owner_rejected() {
        let mut blob = minimal_blob();
        blob.provinces[1].owner = Some("AAA".into());
        assert!(matches!(
            build_state(&blob),
            Err(ScenarioLoadError::SeaProvinceOwned(2))
        ));
    }

    #[test]
    fn test_bad_start_date_rejected() {
        let mut blob = minimal_blob();
        blob.start_day = 31;
        assert!(matches!(
            build_state(&blob),
            Err(ScenarioLoadError::InvalidStartDate(_, _, 31))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let blob = minimal_blob();
        let json = serde_json::to_string(&blob).unwrap();
        let parsed = ScenarioBlob::from_json(&json).unwrap();
        assert_eq!(parsed.provinces.len(), blob.provinces.len());
        assert_eq!(parsed.countries[0].tag, "AAA");
        let state = build_state(&parsed).unwrap();
        assert_eq!(state.countries.id_of("AAA"), Some(CountryId(1)));
    }
}
