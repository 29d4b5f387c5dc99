//! AI decision-making: bucketed scheduling over a goal registry.
//!
//! The strategic tier partitions countries across the 30 days of the month
//! so no single tick bears the full cost; countries in crisis (at war or
//! bankrupt) are promoted to immediate processing. Each processed country
//! scores every goal whose constraints pass, a selector picks the winner,
//! and the winning goal emits commands. Goals never touch stores directly.

pub mod goals;

use crate::command::Command;
use crate::events::CommandBuffer;
use crate::fixed::Fixed;
use crate::ids::{CountryId, ProvinceId, ResourceTypeId, Tick, UnitId};
use crate::state::GameState;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Buckets in the strategic (monthly) tier: one per day of the month.
pub const STRATEGIC_BUCKETS: u16 = 30;

/// Per-country AI bookkeeping: exactly 8 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiState {
    /// Registry index + 1 of the last executed goal (0 = none yet).
    pub last_goal: u16,
    pub flags: u16,
    /// Low 32 bits of the tick the country was last processed.
    pub last_processed_tick: u32,
}

const _: () = assert!(std::mem::size_of::<AiState>() == 8);

/// Declarative gate evaluated before a goal is scored. Failing constraints
/// short-circuit evaluation and are recorded for debugging.
pub enum Constraint {
    MinProvinces(u16),
    AtWar(bool),
    MinResource(ResourceTypeId, Fixed),
    Custom(&'static str, fn(CountryId, &GameState) -> bool),
}

impl Constraint {
    pub fn check(&self, country: CountryId, state: &GameState) -> bool {
        match *self {
            Constraint::MinProvinces(min) => {
                state.provinces.count_provinces_of(country) >= min as u32
            }
            Constraint::AtWar(wanted) => state.diplomacy.at_war_any(country) == wanted,
            Constraint::MinResource(resource, min) => state.resources.get(country, resource) >= min,
            Constraint::Custom(_, predicate) => predicate(country, state),
        }
    }

    pub fn describe(&self) -> String {
        match *self {
            Constraint::MinProvinces(min) => format!("min_provinces({min})"),
            Constraint::AtWar(wanted) => format!("at_war({wanted})"),
            Constraint::MinResource(resource, min) => {
                format!("min_resource({resource}, {min})")
            }
            Constraint::Custom(name, _) => format!("custom({name})"),
        }
    }
}

/// Reusable scratch owned by the scheduler. Goals draw their temporary
/// buffers from here; the hot path performs no allocator calls.
#[derive(Default)]
pub struct GoalScratch {
    pub provinces: Vec<ProvinceId>,
    pub units: Vec<UnitId>,
    pub countries: Vec<CountryId>,
    pub neighbors: Vec<CountryId>,
}

/// A strategic objective the AI can pursue.
pub trait Goal {
    fn name(&self) -> &str;

    fn constraints(&self) -> &[Constraint];

    /// Score the goal for a country. Higher wins.
    fn evaluate(&self, country: CountryId, state: &GameState, scratch: &mut GoalScratch) -> Fixed;

    /// Country-personality multiplier applied to the score. ONE is neutral.
    fn personality(&self, country: CountryId, state: &GameState) -> Fixed {
        let _ = (country, state);
        Fixed::ONE
    }

    /// Emit the commands that pursue the goal.
    fn execute(
        &self,
        country: CountryId,
        state: &GameState,
        scratch: &mut GoalScratch,
        out: &mut CommandBuffer,
    );
}

/// Picks the winning goal from `(registry_index, score)` pairs.
pub trait GoalSelector {
    fn select(&self, scores: &[(usize, Fixed)]) -> Option<usize>;
}

/// Default selector: maximum score; ties break toward the earlier registry
/// entry (the iteration keeps only strictly-greater scores).
pub struct MaxByScore;

impl GoalSelector for MaxByScore {
    fn select(&self, scores: &[(usize, Fixed)]) -> Option<usize> {
        let mut best: Option<(usize, Fixed)> = None;
        for &(index, score) in scores {
            if score <= Fixed::ZERO {
                continue;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((index, score)),
            }
        }
        best.map(|(index, _)| index)
    }
}

/// A constraint failure recorded during the last scheduling pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintFailure {
    pub country: CountryId,
    pub goal: String,
    pub constraint: String,
}

/// Scheduler statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct AiStats {
    pub countries_processed: u64,
    pub goals_executed: u64,
    pub timeouts: u64,
    pub commands_emitted: u64,
}

/// The bucketed goal scheduler.
pub struct AiScheduler {
    registry: Vec<Box<dyn Goal>>,
    selector: Box<dyn GoalSelector>,
    /// Wall-clock budget per goal execution. On expiry the goal's pending
    /// command buffer is dropped wholesale; no partial application.
    pub execution_timeout: Duration,
    stats: AiStats,
    scratch: GoalScratch,
    scores: Vec<(usize, Fixed)>,
    buffer: CommandBuffer,
    failures: Vec<ConstraintFailure>,
}

impl AiScheduler {
    pub fn new(execution_timeout: Duration) -> Self {
        Self {
            registry: Vec::new(),
            selector: Box::new(MaxByScore),
            execution_timeout,
            stats: AiStats::default(),
            scratch: GoalScratch::default(),
            scores: Vec::with_capacity(16),
            buffer: CommandBuffer::with_capacity(32),
            failures: Vec::with_capacity(64),
        }
    }

    /// Register a goal. Registry order is the deterministic tie-break.
    pub fn register(&mut self, goal: Box<dyn Goal>) {
        self.registry.push(goal);
    }

    pub fn set_selector(&mut self, selector: Box<dyn GoalSelector>) {
        self.selector = selector;
    }

    pub fn goal_count(&self) -> usize {
        self.registry.len()
    }

    pub fn stats(&self) -> AiStats {
        self.stats
    }

    /// Constraint failures from the most recent scheduling pass.
    pub fn last_failures(&self) -> &[ConstraintFailure] {
        &self.failures
    }

    /// Run the strategic tier for one day-of-month. Processes the day's
    /// bucket plus every crisis country, in ascending country order, and
    /// appends the emitted commands to `out`.
    pub fn run_strategic(
        &mut self,
        state: &mut GameState,
        day_of_month: u8,
        tick: Tick,
        out: &mut Vec<Command>,
    ) {
        debug_assert!((1..=30).contains(&day_of_month));
        let bucket = (day_of_month - 1) as u16;
        self.failures.clear();

        let country_ids: Vec<CountryId> = state.countries.iter_ids().collect();
        for country in country_ids {
            let ai_controlled = state
                .countries
                .hot(country)
                .is_some_and(|h| h.flags.contains(crate::countries::CountryFlags::AI_CONTROLLED));
            if !ai_controlled {
                continue;
            }
            let in_bucket = (country.0 - 1) % STRATEGIC_BUCKETS == bucket;
            if in_bucket || state.in_crisis(country) {
                self.process_country(state, country, tick, out);
            }
        }
    }

    fn process_country(
        &mut self,
        state: &mut GameState,
        country: CountryId,
        tick: Tick,
        out: &mut Vec<Command>,
    ) {
        self.stats.countries_processed += 1;
        self.scores.clear();

        'goals: for (index, goal) in self.registry.iter().enumerate() {
            for constraint in goal.constraints() {
                if !constraint.check(country, state) {
                    self.failures.push(ConstraintFailure {
                        country,
                        goal: goal.name().to_string(),
                        constraint: constraint.describe(),
                    });
                    continue 'goals;
                }
            }
            let base = goal.evaluate(country, state, &mut self.scratch);
            let score = base * goal.personality(country, state);
            self.scores.push((index, score));
        }

        let Some(winner) = self.selector.select(&self.scores) else {
            return;
        };

        let goal = &self.registry[winner];
        self.buffer.clear();
        let started = Instant::now();
        goal.execute(country, state, &mut self.scratch, &mut self.buffer);
        let elapsed = started.elapsed();

        if elapsed > self.execution_timeout {
            // Abort: drop the whole buffer, never apply part of a goal.
            log::warn!(
                "AI goal '{}' for {country} timed out ({} ms), discarding {} commands",
                goal.name(),
                elapsed.as_millis(),
                self.buffer.len()
            );
            self.buffer.clear();
            self.stats.timeouts += 1;
        } else {
            self.stats.goals_executed += 1;
            self.stats.commands_emitted += self.buffer.len() as u64;
            self.buffer.drain_into(out);
        }

        let slot = &mut state.ai[country.0 as usize - 1];
        slot.last_goal = winner as u16 + 1;
        slot.last_processed_tick = tick as u32;
    }
}
