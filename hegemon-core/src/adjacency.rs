//! Province adjacency graph in compressed sparse row layout.
//!
//! `offsets` has one entry per possible province id plus one; `data` holds
//! the concatenated neighbor lists, each sorted ascending. Sorted lists make
//! neighbor iteration order deterministic, which the pathfinder and the
//! flood-fill queries rely on.

use crate::ids::ProvinceId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A reusable bitset for visited tracking in graph queries.
#[derive(Debug, Clone, Default)]
pub struct Bitset {
    words: Vec<u64>,
}

impl Bitset {
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            words: vec![0; bits.div_ceil(64)],
        }
    }

    /// Grow to hold at least `bits` bits (load time only).
    pub fn ensure(&mut self, bits: usize) {
        let words = bits.div_ceil(64);
        if self.words.len() < words {
            self.words.resize(words, 0);
        }
    }

    #[inline]
    pub fn set(&mut self, bit: usize) {
        self.words[bit / 64] |= 1 << (bit % 64);
    }

    #[inline]
    pub fn get(&self, bit: usize) -> bool {
        self.words
            .get(bit / 64)
            .is_some_and(|w| w & (1 << (bit % 64)) != 0)
    }

    pub fn clear(&mut self) {
        for w in &mut self.words {
            *w = 0;
        }
    }
}

/// Scratch buffers for flood-fill style queries. Owned by the caller so
/// repeated queries never allocate.
#[derive(Debug, Default)]
pub struct FloodScratch {
    visited: Bitset,
    queue: VecDeque<ProvinceId>,
}

impl FloodScratch {
    pub fn with_capacity(provinces: usize) -> Self {
        Self {
            visited: Bitset::with_capacity(provinces),
            queue: VecDeque::with_capacity(provinces.min(4096)),
        }
    }
}

/// Compressed neighbor graph over province ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdjacencyGraph {
    /// Indexed by raw province id; length `max_id + 2`.
    offsets: Vec<u32>,
    /// Concatenated, per-node-sorted neighbor ids.
    data: Vec<ProvinceId>,
}

impl AdjacencyGraph {
    /// Build from an undirected edge list. Duplicate and self edges are
    /// dropped; both directions are stored.
    pub fn from_edges(edges: &[(ProvinceId, ProvinceId)]) -> Self {
        let max_id = edges
            .iter()
            .map(|&(a, b)| a.0.max(b.0))
            .max()
            .unwrap_or(0) as usize;

        let mut pairs: Vec<(u16, u16)> = Vec::with_capacity(edges.len() * 2);
        for &(a, b) in edges {
            if a == b {
                continue;
            }
            pairs.push((a.0, b.0));
            pairs.push((b.0, a.0));
        }
        pairs.sort_unstable();
        pairs.dedup();

        let mut offsets = vec![0u32; max_id + 2];
        for &(from, _) in &pairs {
            offsets[from as usize + 1] += 1;
        }
        for i in 1..offsets.len() {
            offsets[i] += offsets[i - 1];
        }
        let data = pairs.iter().map(|&(_, to)| ProvinceId(to)).collect();

        Self { offsets, data }
    }

    /// Neighbors of `id`, sorted ascending. Unknown ids have none.
    #[inline]
    pub fn neighbors(&self, id: ProvinceId) -> &[ProvinceId] {
        let i = id.0 as usize;
        if i + 1 >= self.offsets.len() {
            return &[];
        }
        &self.data[self.offsets[i] as usize..self.offsets[i + 1] as usize]
    }

    /// Neighbors of `id` satisfying `pred`.
    pub fn neighbors_where<'a, F>(
        &'a self,
        id: ProvinceId,
        pred: F,
    ) -> impl Iterator<Item = ProvinceId> + 'a
    where
        F: Fn(ProvinceId) -> bool + 'a,
    {
        self.neighbors(id).iter().copied().filter(move |&p| pred(p))
    }

    #[inline]
    pub fn are_adjacent(&self, a: ProvinceId, b: ProvinceId) -> bool {
        self.neighbors(a).binary_search(&b).is_ok()
    }

    /// Total directed edge count.
    pub fn edge_count(&self) -> usize {
        self.data.len()
    }

    /// BFS flood fill from `start` over provinces satisfying `pred`.
    /// Writes the region (in BFS order, deterministic) into `out`.
    /// `start` itself must satisfy `pred` or the region is empty.
    pub fn connected_region<F>(
        &self,
        start: ProvinceId,
        pred: F,
        scratch: &mut FloodScratch,
        out: &mut Vec<ProvinceId>,
    ) where
        F: Fn(ProvinceId) -> bool,
    {
        out.clear();
        scratch.visited.ensure(self.offsets.len().max(1));
        scratch.visited.clear();
        scratch.queue.clear();

        if !pred(start) {
            return;
        }

        scratch.visited.set(start.0 as usize);
        scratch.queue.push_back(start);

        while let Some(current) = scratch.queue.pop_front() {
            out.push(current);
            for &next in self.neighbors(current) {
                if !scratch.visited.get(next.0 as usize) && pred(next) {
                    scratch.visited.set(next.0 as usize);
                    scratch.queue.push_back(next);
                }
            }
        }
    }

    /// Provinces in `set_a` that border at least one province of `set_b`.
    /// Output preserves `set_a` order.
    pub fn shared_border_provinces(
        &self,
        set_a: &[ProvinceId],
        set_b: &[ProvinceId],
        scratch: &mut FloodScratch,
        out: &mut Vec<ProvinceId>,
    ) {
        out.clear();
        scratch.visited.ensure(self.offsets.len().max(1));
        scratch.visited.clear();
        for &b in set_b {
            scratch.visited.set(b.0 as usize);
        }
        for &a in set_a {
            if self
                .neighbors(a)
                .iter()
                .any(|n| scratch.visited.get(n.0 as usize))
            {
                out.push(a);
            }
        }
    }

    /// Whether removing `province` disconnects its predicate-region.
    ///
    /// Re-runs BFS in the component with the node removed: O(N+E) per call.
    /// Intended for AI queries only, never per-tick bookkeeping.
    pub fn is_bridge<F>(&self, province: ProvinceId, pred: F, scratch: &mut FloodScratch) -> bool
    where
        F: Fn(ProvinceId) -> bool,
    {
        let mut gate_neighbors = self
            .neighbors(province)
            .iter()
            .copied()
            .filter(|&p| pred(p));

        let Some(first) = gate_neighbors.next() else {
            return false;
        };
        // A single qualifying neighbor can't be disconnected from itself.
        if self.neighbors(province).iter().filter(|&&p| pred(p)).count() < 2 {
            return false;
        }

        scratch.visited.ensure(self.offsets.len().max(1));
        scratch.visited.clear();
        scratch.queue.clear();

        // BFS from one neighbor with `province` masked out.
        scratch.visited.set(first.0 as usize);
        scratch.queue.push_back(first);
        while let Some(current) = scratch.queue.pop_front() {
            for &next in self.neighbors(current) {
                if next == province {
                    continue;
                }
                if !scratch.visited.get(next.0 as usize) && pred(next) {
                    scratch.visited.set(next.0 as usize);
                    scratch.queue.push_back(next);
                }
            }
        }

        // If any other qualifying neighbor was not reached, the node is a bridge.
        self.neighbors(province)
            .iter()
            .any(|&p| pred(p) && !scratch.visited.get(p.0 as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: u16) -> ProvinceId {
        ProvinceId(id)
    }

    /// Line 1-2-3-4 with a spur 2-5.
    fn line_graph() -> AdjacencyGraph {
        AdjacencyGraph::from_edges(&[(p(1), p(2)), (p(2), p(3)), (p(3), p(4)), (p(2), p(5))])
    }

    #[test]
    fn test_neighbors_sorted() {
        let g = line_graph();
        assert_eq!(g.neighbors(p(2)), &[p(1), p(3), p(5)]);
        assert_eq!(g.neighbors(p(4)), &[p(3)]);
        assert_eq!(g.neighbors(p(99)), &[] as &[ProvinceId]);
    }

    #[test]
    fn test_are_adjacent_bidirectional() {
        let g = line_graph();
        assert!(g.are_adjacent(p(1), p(2)));
        assert!(g.are_adjacent(p(2), p(1)));
        assert!(!g.are_adjacent(p(1), p(3)));
    }

    #[test]
    fn test_self_and_duplicate_edges_dropped() {
        let g = AdjacencyGraph::from_edges(&[(p(1), p(2)), (p(2), p(1)), (p(1), p(1))]);
        assert_eq!(g.neighbors(p(1)), &[p(2)]);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn test_neighbors_where() {
        let g = line_graph();
        let even: Vec<_> = g.neighbors_where(p(2), |n| n.0 % 2 == 1).collect();
        assert_eq!(even, vec![p(1), p(3), p(5)]);
        let none: Vec<_> = g.neighbors_where(p(2), |_| false).collect();
        assert!(none.is_empty());
    }

    #[test]
    fn test_connected_region() {
        let g = line_graph();
        let mut scratch = FloodScratch::default();
        let mut out = Vec::new();

        g.connected_region(p(1), |_| true, &mut scratch, &mut out);
        assert_eq!(out, vec![p(1), p(2), p(3), p(5), p(4)]); // BFS order

        // Excluding province 2 splits the line
        g.connected_region(p(1), |n| n != p(2), &mut scratch, &mut out);
        assert_eq!(out, vec![p(1)]);

        // Start failing the predicate yields an empty region
        g.connected_region(p(1), |_| false, &mut scratch, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_connected_region_deterministic() {
        let g = line_graph();
        let mut scratch = FloodScratch::default();
        let mut a = Vec::new();
        let mut b = Vec::new();
        g.connected_region(p(1), |_| true, &mut scratch, &mut a);
        g.connected_region(p(1), |_| true, &mut scratch, &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_shared_border_provinces() {
        let g = line_graph();
        let mut scratch = FloodScratch::default();
        let mut out = Vec::new();

        // A owns {1, 2}, B owns {3, 4}: only 2 borders B's land
        g.shared_border_provinces(&[p(1), p(2)], &[p(3), p(4)], &mut scratch, &mut out);
        assert_eq!(out, vec![p(2)]);
    }

    #[test]
    fn test_is_bridge() {
        let g = line_graph();
        let mut scratch = FloodScratch::default();

        // 2 and 3 are cut vertices of the line
        assert!(g.is_bridge(p(2), |_| true, &mut scratch));
        assert!(g.is_bridge(p(3), |_| true, &mut scratch));
        // Leaves are not
        assert!(!g.is_bridge(p(1), |_| true, &mut scratch));
        assert!(!g.is_bridge(p(4), |_| true, &mut scratch));
        assert!(!g.is_bridge(p(5), |_| true, &mut scratch));
    }

    #[test]
    fn test_is_bridge_with_cycle() {
        // Triangle 1-2-3 plus tail 3-4: only 3 is a bridge
        let g = AdjacencyGraph::from_edges(&[(p(1), p(2)), (p(2), p(3)), (p(1), p(3)), (p(3), p(4))]);
        let mut scratch = FloodScratch::default();
        assert!(!g.is_bridge(p(1), |_| true, &mut scratch));
        assert!(!g.is_bridge(p(2), |_| true, &mut scratch));
        assert!(g.is_bridge(p(3), |_| true, &mut scratch));
    }
}
