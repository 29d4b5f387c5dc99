//! Scenario acquisition for the host binary.
//!
//! Real scenarios arrive as a parsed JSON blob from the (external) content
//! pipeline. The mock scenario exists so smoke runs and CI need no files:
//! a small grid of provinces, four powers, and a neutral frontier.

use anyhow::Context;
use hegemon_core::scenario::{
    BuildingSpec, Capacities, CountryDef, ProvinceDef, ScenarioBlob, TerrainDef, UnitTypeSpec,
};
use std::path::Path;

/// Read a scenario blob from a JSON file.
pub fn load_scenario(path: &Path) -> anyhow::Result<ScenarioBlob> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario {}", path.display()))?;
    ScenarioBlob::from_json(&json).with_context(|| format!("parsing scenario {}", path.display()))
}

/// Built-in mock scenario: a 4×3 province grid.
///
/// ```text
///   1  2  3  4      AAA: 1 2 5   BBB: 3 4
///   5  6  7  8      CCC: 7 8     DDD: 11 12
///   9 10 11 12      neutral: 6 9; 10 is ocean
/// ```
pub fn mock_scenario(seed: u64) -> ScenarioBlob {
    let mut provinces = Vec::new();
    let owner_of = |id: u16| -> Option<&'static str> {
        match id {
            1 | 2 | 5 => Some("AAA"),
            3 | 4 => Some("BBB"),
            7 | 8 => Some("CCC"),
            11 | 12 => Some("DDD"),
            _ => None,
        }
    };
    for id in 1..=12u16 {
        let terrain = match id {
            10 => "ocean",
            4 | 8 => "hills",
            12 => "mountains",
            _ => "plains",
        };
        provinces.push(ProvinceDef {
            id,
            rgb: [(id * 19) as u8, (id * 37) as u8, (id * 53) as u8],
            terrain: terrain.into(),
            owner: owner_of(id).map(str::to_string),
            culture: None,
            religion: None,
        });
    }

    // Grid adjacency: 4 columns × 3 rows.
    let mut adjacency = Vec::new();
    for row in 0..3u16 {
        for col in 0..4u16 {
            let id = row * 4 + col + 1;
            if col < 3 {
                adjacency.push((id, id + 1));
            }
            if row < 2 {
                adjacency.push((id, id + 4));
            }
        }
    }

    let country = |tag: &str, color: [u8; 3], capital: u16, aggression: u32| CountryDef {
        tag: tag.into(),
        name: String::new(),
        color,
        capital,
        ai: true,
        aggression_percent: aggression,
        resources: vec![("gold".into(), 100)],
    };

    ScenarioBlob {
        name: "mock-grid".into(),
        seed,
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
                name: "hills".into(),
                move_cost_days: 8,
                income: 1,
                water: false,
                impassable: false,
            },
            TerrainDef {
                name: "mountains".into(),
                move_cost_days: 10,
                income: 0,
                water: false,
                impassable: false,
            },
            TerrainDef {
                name: "ocean".into(),
                move_cost_days: 2,
                income: 0,
                water: true,
                impassable: false,
            },
        ],
        provinces,
        adjacency,
        countries: vec![
            country("AAA", [220, 50, 50], 1, 120),
            country("BBB", [50, 90, 220], 3, 100),
            country("CCC", [60, 180, 75], 7, 100),
            country("DDD", [230, 180, 40], 11, 80),
        ],
        unit_types: vec![
            UnitTypeSpec {
                name: "infantry".into(),
                traversal_days: 5,
                attack: 1,
                defense: 1,
            },
            UnitTypeSpec {
                name: "cavalry".into(),
                traversal_days: 3,
                attack: 2,
                defense: 1,
            },
        ],
        buildings: vec![
            BuildingSpec {
                name: "market".into(),
                cost: 50,
                income: 2,
            },
            BuildingSpec {
                name: "fortress".into(),
                cost: 80,
                income: 0,
            },
        ],
        capacities: Capacities::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hegemon_core::build_state;

    #[test]
    fn test_mock_scenario_loads() {
        let blob = mock_scenario(42);
        let state = build_state(&blob).unwrap();
        assert_eq!(state.provinces.len(), 12);
        assert_eq!(state.countries.count(), 4);
        assert!(state.validate_invariants().is_ok());
    }

    #[test]
    fn test_mock_scenario_json_roundtrip() {
        let blob = mock_scenario(7);
        let json = serde_json::to_string_pretty(&blob).unwrap();
        let parsed = ScenarioBlob::from_json(&json).unwrap();
        assert_eq!(parsed.provinces.len(), blob.provinces.len());
        assert_eq!(parsed.seed, 7);
    }
}
