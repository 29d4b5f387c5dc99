use crate::pathfind::PathCacheStats;
use std::time::Duration;

/// Accumulated timing and throughput metrics for the simulation.
#[derive(Default, Clone, Debug)]
pub struct SimMetrics {
    pub total_ticks: u64,
    pub total_time: Duration,
    pub movement_time: Duration,
    pub combat_time: Duration,
    pub economy_time: Duration,
    pub diplomacy_time: Duration,
    pub ai_time: Duration,
    pub commands_applied: u64,
    pub commands_rejected: u64,
    pub events_published: u64,
    pub modifiers_compacted: u64,
    /// Snapshot of the pathfinder cache counters.
    pub path_cache: PathCacheStats,
}

impl SimMetrics {
    pub fn tick_avg_ms(&self) -> f64 {
        if self.total_ticks == 0 {
            0.0
        } else {
            self.total_time.as_secs_f64() * 1000.0 / self.total_ticks as f64
        }
    }

    pub fn days_per_second(&self) -> f64 {
        if self.total_time.as_secs_f64() == 0.0 {
            0.0
        } else {
            (self.total_ticks as f64 / 24.0) / self.total_time.as_secs_f64()
        }
    }
}
