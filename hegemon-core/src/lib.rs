//! # Hegemon Simulation Core
//!
//! Deterministic grand-strategy simulation engine: hundreds of countries
//! acting on tens of thousands of provinces over simulated game time.
//!
//! The core owns all authoritative state and progresses only via time
//! ticks and command application. It is designed for lockstep multiplayer
//! and replay determinism: no floats in the state path, no unordered
//! iteration feeding logic, no wall-clock reads outside the AI timeout.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Host / AI /  │────▶│   Commands   │────▶│  Simulation  │
//! │   Console    │     │ (validated)  │     │   ::tick()   │
//! └──────────────┘     └──────────────┘     └──────┬───────┘
//!                                                  │ barrier
//!                      ┌──────────────┐     ┌──────▼───────┐
//!                      │  Subscribers │◀────│  Event bus   │
//!                      │ (emit cmds)  │     │  GameState   │
//!                      └──────────────┘     └──────────────┘
//! ```
//!
//! ## Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`GameState`] | Complete simulation state (provinces, countries, units, diplomacy) |
//! | [`Command`] | The sole authoritative mutation unit, validated then applied |
//! | [`Simulation`] | Tick dispatcher, command pipeline, event barrier |
//! | [`Fixed`] | 32.32 fixed point; the only scalar type in the state path |
//! | [`EventBus`] | Typed publish/subscribe; handlers react by submitting commands |
//! | [`AiScheduler`] | Bucketed goal scoring and execution |
//!
//! ## Determinism rules
//!
//! - All authoritative math is [`Fixed`]; floats exist only at the
//!   parse/display boundary.
//! - Randomness comes from [`rng::StreamRng`], keyed by
//!   `(seed, tick, stream)`.
//! - Hash-map iteration never feeds logic without an explicit sort.
//! - The only wall-clock read is the AI goal timeout, which can only
//!   discard (never reorder) commands.

pub mod adjacency;
pub mod ai;
pub mod alliance;
pub mod calendar;
pub mod clock;
pub mod command;
pub mod config;
pub mod countries;
pub mod diplomacy;
pub mod events;
pub mod fixed;
pub mod ids;
pub mod metrics;
pub mod modifiers;
pub mod pathfind;
pub mod provinces;
pub mod resources;
pub mod rng;
pub mod save;
pub mod scenario;
pub mod state;
pub mod step;
pub mod systems;
pub mod testing;
pub mod units;


pub use ai::AiScheduler;
pub use calendar::GameTime;
pub use clock::TimeManager;
pub use command::{Command, CommandLog, Effects, RejectReason};
pub use config::SimConfig;
pub use diplomacy::{DiplomacyStore, TreatyFlags};
pub use events::{CommandBuffer, CompositeDisposable, EventBus};
pub use fixed::{Fixed, MathError};
pub use ids::{CountryId, ProvinceId, Tick, UnitId};
pub use metrics::SimMetrics;
pub use pathfind::{PathContext, PathOptions, PathResult, Pathfinder};
pub use scenario::{build_state, ScenarioBlob, ScenarioLoadError};
pub use state::GameState;
pub use step::{validate_command, Simulation};
