//! Test fixtures: a compact builder for game states.
//!
//! Routes through the real scenario loader so tests exercise the same
//! construction path as the host binary.

use crate::scenario::{
    build_state, BuildingSpec, Capacities, CountryDef, ProvinceDef, ScenarioBlob, TerrainDef,
    UnitTypeSpec,
};
use crate::state::GameState;

pub struct GameStateBuilder {
    blob: ScenarioBlob,
}

impl GameStateBuilder {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            blob: ScenarioBlob {
                name: "test-scenario".into(),
                seed: 42,
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
                provinces: Vec::new(),
                adjacency: Vec::new(),
                countries: Vec::new(),
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
                capacities: Capacities {
                    max_units: 64,
                    max_relations: 1024,
                    max_opinion_modifiers: 8192,
                    max_income_modifiers: 256,
                },
            },
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.blob.seed = seed;
        self
    }

    /// Add a country with 100 starting gold. Not AI-controlled; tests that
    /// exercise the scheduler set the flag explicitly.
    pub fn with_country(self, tag: &str) -> Self {
        self.with_country_funds(tag, 100)
    }

    pub fn with_country_funds(mut self, tag: &str, gold: i64) -> Self {
        self.blob.countries.push(CountryDef {
            tag: tag.into(),
            name: String::new(),
            color: [0; 3],
            capital: 0,
            ai: false,
            aggression_percent: 100,
            resources: vec![("gold".into(), gold)],
        });
        self
    }

    pub fn with_province(mut self, id: u16, owner: Option<&str>) -> Self {
        self.blob.provinces.push(ProvinceDef {
            id,
            rgb: [0; 3],
            terrain: "plains".into(),
            owner: owner.map(str::to_string),
            culture: None,
            religion: None,
        });
        self
    }

    pub fn with_sea_province(mut self, id: u16) -> Self {
        self.blob.provinces.push(ProvinceDef {
            id,
            rgb: [0; 3],
            terrain: "ocean".into(),
            owner: None,
            culture: None,
            religion: None,
        });
        self
    }

    pub fn with_adjacency(mut self, a: u16, b: u16) -> Self {
        self.blob.adjacency.push((a, b));
        self
    }

    pub fn with_capacities(mut self, capacities: Capacities) -> Self {
        self.blob.capacities = capacities;
        self
    }

    /// The blob itself, for tests targeting the loader.
    pub fn into_blob(self) -> ScenarioBlob {
        self.blob
    }

    pub fn build(self) -> GameState {
        build_state(&self.blob).expect("builder scenario must load")
    }
}
