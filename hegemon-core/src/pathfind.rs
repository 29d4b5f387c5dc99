//! Province pathfinding: pluggable costs and a cached A* front end.
//!
//! The generic search lives in `hegemon-pathfinding`; this module adapts it
//! to the province graph, defines the cost-calculator seam, and caches
//! results keyed on `(from, to, calculator, context)`. The pathfinder is
//! the cache's single writer; readers tolerate stale entries until the
//! ownership-change invalidation propagates at the barrier.

use crate::adjacency::AdjacencyGraph;
use crate::fixed::Fixed;
use crate::ids::{CountryId, ProvinceId};
use crate::state::GameState;
use hegemon_pathfinding::{AStar, EdgeCost, Graph, SearchResult};
use rustc_hash::FxHashMap;

/// Request flags carried in the path context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PathFlags(pub u16);

impl PathFlags {
    /// Treat every land province as enterable (AI reachability queries).
    pub const IGNORE_BORDERS: u16 = 1 << 0;

    #[inline]
    pub const fn contains(self, mask: u16) -> bool {
        self.0 & mask != 0
    }
}

/// Who is asking, and under what rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathContext {
    pub country: CountryId,
    pub flags: PathFlags,
}

impl PathContext {
    pub fn for_country(country: CountryId) -> Self {
        Self {
            country,
            flags: PathFlags::default(),
        }
    }

    /// Stable cache-key component.
    fn key(&self) -> u64 {
        ((self.country.0 as u64) << 16) | self.flags.0 as u64
    }
}

/// Cost of entering a province, or refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveCost {
    Passable(Fixed),
    Blocked,
}

/// The pluggable cost seam. Implementations must be pure functions of the
/// READ state: the cache assumes two calls with equal keys agree.
pub trait PathCostCalculator {
    fn cost(&self, from: ProvinceId, to: ProvinceId, ctx: &PathContext) -> MoveCost;

    /// Stable identity for cache keying. Distinct calculators (or the same
    /// calculator over different rule sets) must return distinct keys.
    fn calculator_key(&self) -> u64;
}

/// Standard movement rules: terrain sets the cost, borders and terrain
/// flags decide passability.
pub struct StandardMovement<'a> {
    pub state: &'a GameState,
}

impl PathCostCalculator for StandardMovement<'_> {
    fn cost(&self, _from: ProvinceId, to: ProvinceId, ctx: &PathContext) -> MoveCost {
        if !self.state.can_enter(ctx.country, to, ctx.flags) {
            return MoveCost::Blocked;
        }
        MoveCost::Passable(self.state.terrain_move_cost(to))
    }

    fn calculator_key(&self) -> u64 {
        0x5354_444d // "STDM"
    }
}

/// Outcome of a path query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathResult {
    /// Waypoint sequence including the start province.
    Found(Vec<ProvinceId>),
    NoPath,
    /// The destination itself is excluded by the request.
    Forbidden,
}

/// Per-request options. Queries with non-default options bypass the cache:
/// their results are not a function of the cache key alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathOptions {
    /// Reject paths longer than this many waypoints (start included).
    pub max_length: Option<u16>,
    /// A* expansion budget; exhaustion reports NoPath.
    pub max_expansions: usize,
    /// Provinces that must not appear on the path (sorted at use).
    pub forbidden: Vec<ProvinceId>,
    /// Provinces to route around if any alternative exists.
    pub avoid: Vec<ProvinceId>,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            max_length: None,
            max_expansions: 100_000,
            forbidden: Vec::new(),
            avoid: Vec::new(),
        }
    }
}

impl PathOptions {
    fn is_default(&self) -> bool {
        self.max_length.is_none()
            && self.max_expansions == 100_000
            && self.forbidden.is_empty()
            && self.avoid.is_empty()
    }
}

/// Cache hit/miss counters (exposed through SimMetrics).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

type CacheKey = (ProvinceId, ProvinceId, u64, u64);

struct CacheEntry {
    result: PathResult,
    stamp: u64,
}

/// Cached pathfinder. Single writer by construction (`&mut self`).
pub struct Pathfinder {
    cache: FxHashMap<CacheKey, CacheEntry>,
    capacity: usize,
    stamp: u64,
    stats: PathCacheStats,
}

impl Pathfinder {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut cache = FxHashMap::default();
        cache.reserve(capacity);
        Self {
            cache,
            capacity: capacity.max(1),
            stamp: 0,
            stats: PathCacheStats::default(),
        }
    }

    pub fn stats(&self) -> PathCacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drop every cached result. Called when ownership changes touch any
    /// restricted-passage rule.
    pub fn invalidate(&mut self) {
        if !self.cache.is_empty() {
            self.cache.clear();
        }
        self.stats.invalidations += 1;
    }

    /// Find a path from `from` to `to` under `calculator` and `ctx`.
    pub fn find_path<C: PathCostCalculator>(
        &mut self,
        graph: &AdjacencyGraph,
        calculator: &C,
        ctx: &PathContext,
        from: ProvinceId,
        to: ProvinceId,
        options: &PathOptions,
    ) -> PathResult {
        if options.forbidden.binary_search(&to).is_ok() {
            return PathResult::Forbidden;
        }

        let cacheable = options.is_default();
        let key: CacheKey = (from, to, calculator.calculator_key(), ctx.key());

        if cacheable {
            // LRU touch on hit.
            if let Some(entry) = self.cache.get_mut(&key) {
                self.stamp += 1;
                entry.stamp = self.stamp;
                self.stats.hits += 1;
                return entry.result.clone();
            }
            self.stats.misses += 1;
        }

        let adapter = GraphAdapter {
            graph,
            calculator,
            options,
        };
        let result = match AStar::find_path_bounded(
            &adapter,
            from,
            to,
            ctx,
            options.max_expansions,
        ) {
            SearchResult::Found { path, .. } => {
                if options
                    .max_length
                    .is_some_and(|limit| path.len() > limit as usize)
                {
                    PathResult::NoPath
                } else {
                    PathResult::Found(path)
                }
            }
            SearchResult::NoPath => PathResult::NoPath,
            SearchResult::BudgetExhausted => {
                log::debug!(
                    "path {from}->{to} exhausted expansion budget {}",
                    options.max_expansions
                );
                PathResult::NoPath
            }
        };

        if cacheable {
            self.insert(key, result.clone());
        }
        result
    }

    fn insert(&mut self, key: CacheKey, result: PathResult) {
        if self.cache.len() >= self.capacity {
            // Evict the least-recently-used entry. Linear scan: the cache
            // is small and eviction only happens when full.
            if let Some(&victim) = self
                .cache
                .iter()
                .min_by_key(|&(k, e)| (e.stamp, *k))
                .map(|(k, _)| k)
            {
                self.cache.remove(&victim);
                self.stats.evictions += 1;
            }
        }
        self.stamp += 1;
        self.cache.insert(
            key,
            CacheEntry {
                result,
                stamp: self.stamp,
            },
        );
        self.stats.insertions += 1;
    }
}

/// Bridges the province graph + cost calculator into the generic search.
struct GraphAdapter<'a, C> {
    graph: &'a AdjacencyGraph,
    calculator: &'a C,
    options: &'a PathOptions,
}

impl<C: PathCostCalculator> Graph<ProvinceId, PathContext> for GraphAdapter<'_, C> {
    fn neighbors(&self, node: ProvinceId, _ctx: &PathContext) -> Vec<ProvinceId> {
        self.graph.neighbors(node).to_vec()
    }

    fn cost(&self, from: ProvinceId, to: ProvinceId, ctx: &PathContext) -> EdgeCost {
        if self.options.forbidden.binary_search(&to).is_ok() {
            return EdgeCost::Blocked;
        }
        match self.calculator.cost(from, to, ctx) {
            MoveCost::Blocked => EdgeCost::Blocked,
            MoveCost::Passable(cost) => {
                let mut raw = cost.raw().max(1) as u64;
                if self.options.avoid.binary_search(&to).is_ok() {
                    raw = raw.saturating_mul(8);
                }
                EdgeCost::Passable(raw)
            }
        }
    }

    fn heuristic(&self, _from: ProvinceId, _to: ProvinceId, _ctx: &PathContext) -> u64 {
        // Dijkstra until province centroids exist for a spatial heuristic.
        0
    }
}
