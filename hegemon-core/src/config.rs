use serde::{Deserialize, Serialize};

/// Simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Log a state checksum every N ticks (0 = disabled).
    ///
    /// Recommended values:
    /// - `24`: daily (safest for desync hunts)
    /// - `720`: monthly (balanced)
    /// - `8640`: yearly (lowest overhead)
    pub checksum_frequency: u32,
    /// Ticks of applied commands the replay log retains.
    pub command_log_ticks: u64,
    /// Wall-clock budget per AI goal execution, in milliseconds.
    pub ai_timeout_ms: u64,
    /// Entries the pathfinding result cache holds.
    pub path_cache_capacity: usize,
    /// Autosaves kept before rotation deletes the oldest.
    pub autosave_keep: usize,
    /// Hard-fail on a replay checksum mismatch instead of warning.
    pub strict_verification: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            checksum_frequency: 720,
            command_log_ticks: 100,
            ai_timeout_ms: 5,
            path_cache_capacity: 1024,
            autosave_keep: 3,
            strict_verification: false,
        }
    }
}
