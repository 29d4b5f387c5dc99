//! Generic A* pathfinding over abstract graphs.
//!
//! Designed for deterministic lockstep simulation: ties in the priority
//! queue break on the lower node id, so identical queries on identical
//! graphs always reconstruct identical paths, on every platform.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::hash::Hash;

/// Cost of traversing a single edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeCost {
    /// Edge can be traversed at the given cost (must fit u64).
    Passable(u64),
    /// Edge cannot be traversed in this context (impassable terrain,
    /// closed borders, forbidden province).
    Blocked,
}

/// Outcome of a bounded search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchResult<Node> {
    /// Path found. Includes the start node; `cost` is the summed edge cost.
    Found { path: Vec<Node>, cost: u64 },
    /// Start and goal are not connected under this context.
    NoPath,
    /// The expansion budget ran out before the goal was reached.
    BudgetExhausted,
}

/// A trait for graphs that can be searched.
///
/// `Node`: The type of node identifiers (e.g., ProvinceId).
/// `Ctx`: A context object passed to cost calculations (e.g., the querying
/// country and its request flags).
pub trait Graph<Node, Ctx> {
    /// Return the neighbors of a node. Iteration order must be stable
    /// between calls; sorted neighbor lists keep searches deterministic.
    fn neighbors(&self, node: Node, context: &Ctx) -> Vec<Node>;

    /// Calculate the cost to move from `from` to `to`, or report the edge
    /// as blocked for this context.
    fn cost(&self, from: Node, to: Node, context: &Ctx) -> EdgeCost;

    /// Estimated cost (heuristic) from `from` to `target`.
    /// For A*, this must be admissible (never overestimate).
    fn heuristic(&self, from: Node, target: Node, context: &Ctx) -> u64;
}

/// A generic A* pathfinder.
pub struct AStar;

impl AStar {
    /// Find the shortest path from `start` to `goal` with no expansion bound.
    pub fn find_path<Node, Ctx, G>(
        graph: &G,
        start: Node,
        goal: Node,
        context: &Ctx,
    ) -> SearchResult<Node>
    where
        Node: Copy + Eq + Ord + Hash + std::fmt::Debug,
        G: Graph<Node, Ctx>,
    {
        Self::find_path_bounded(graph, start, goal, context, usize::MAX)
    }

    /// Find the shortest path from `start` to `goal`, expanding at most
    /// `max_expansions` nodes.
    ///
    /// Bounding by expansion count rather than wall-clock time keeps the
    /// result a pure function of its inputs.
    pub fn find_path_bounded<Node, Ctx, G>(
        graph: &G,
        start: Node,
        goal: Node,
        context: &Ctx,
        max_expansions: usize,
    ) -> SearchResult<Node>
    where
        Node: Copy + Eq + Ord + Hash + std::fmt::Debug,
        G: Graph<Node, Ctx>,
    {
        let mut open_set = BinaryHeap::new();
        let mut came_from: HashMap<Node, Node> = HashMap::new();
        let mut g_score: HashMap<Node, u64> = HashMap::new();
        let mut closed_set: HashSet<Node> = HashSet::new();
        let mut expansions: usize = 0;

        g_score.insert(start, 0);
        open_set.push(State {
            node: start,
            cost: 0,
            priority: graph.heuristic(start, goal, context),
        });

        while let Some(State { node: current, .. }) = open_set.pop() {
            // Skip if already processed with a better path
            if !closed_set.insert(current) {
                continue;
            }

            if current == goal {
                // Reconstruct path
                let mut path = vec![current];
                let mut curr = current;
                while let Some(&prev) = came_from.get(&curr) {
                    path.push(prev);
                    curr = prev;
                }
                path.reverse();
                return SearchResult::Found {
                    path,
                    cost: g_score[&goal],
                };
            }

            expansions += 1;
            if expansions > max_expansions {
                return SearchResult::BudgetExhausted;
            }

            let current_g = g_score[&current];

            for neighbor in graph.neighbors(current, context) {
                // Skip already-processed nodes
                if closed_set.contains(&neighbor) {
                    continue;
                }

                let step = match graph.cost(current, neighbor, context) {
                    EdgeCost::Passable(c) => c,
                    EdgeCost::Blocked => continue,
                };

                let tentative_g = current_g.saturating_add(step);

                if tentative_g < *g_score.get(&neighbor).unwrap_or(&u64::MAX) {
                    came_from.insert(neighbor, current);
                    g_score.insert(neighbor, tentative_g);
                    open_set.push(State {
                        node: neighbor,
                        cost: tentative_g,
                        priority: tentative_g
                            .saturating_add(graph.heuristic(neighbor, goal, context)),
                    });
                }
            }
        }

        SearchResult::NoPath
    }
}

/// Helper struct for the priority queue.
#[derive(Copy, Clone, Eq, PartialEq)]
struct State<Node> {
    node: Node,
    cost: u64,     // Actual cost from start (g_score)
    priority: u64, // Estimated total cost (f_score = g + h)
}

// The priority queue depends on `Ord`.
// Explicitly implement the trait so the queue becomes a min-heap.
// The final comparison on `node` makes pop order (and therefore the
// reconstructed path) independent of heap insertion history: lower ids win.
impl<Node: Eq + Ord> Ord for State<Node> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.cost.cmp(&self.cost))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl<Node: Eq + Ord> PartialOrd for State<Node> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Simple grid graph for testing
    // 0 1 2
    // 3 4 5
    // 6 7 8
    struct GridGraph;

    impl Graph<u32, ()> for GridGraph {
        fn neighbors(&self, node: u32, _context: &()) -> Vec<u32> {
            let mut n = Vec::new();
            let x = node % 3;
            let y = node / 3;

            if x > 0 {
                n.push(node - 1);
            } // Left
            if x < 2 {
                n.push(node + 1);
            } // Right
            if y > 0 {
                n.push(node - 3);
            } // Up
            if y < 2 {
                n.push(node + 3);
            } // Down
            n.sort_unstable();
            n
        }

        fn cost(&self, _from: u32, _to: u32, _context: &()) -> EdgeCost {
            EdgeCost::Passable(1)
        }

        fn heuristic(&self, from: u32, target: u32, _context: &()) -> u64 {
            // Manhattan distance
            let x1 = (from % 3) as i64;
            let y1 = (from / 3) as i64;
            let x2 = (target % 3) as i64;
            let y2 = (target / 3) as i64;
            ((x1 - x2).abs() + (y1 - y2).abs()) as u64
        }
    }

    #[test]
    fn test_grid_pathfinding() {
        let graph = GridGraph;
        let start = 0; // Top-left
        let goal = 8; // Bottom-right

        match AStar::find_path(&graph, start, goal, &()) {
            SearchResult::Found { path, cost } => {
                // Shortest path is 4 steps (e.g. 0->1->2->5->8 or 0->3->6->7->8)
                assert_eq!(cost, 4);
                assert_eq!(path.first(), Some(&0));
                assert_eq!(path.last(), Some(&8));
                assert_eq!(path.len(), 5); // Includes start node
            }
            other => panic!("expected path, got {:?}", other),
        }
    }

    struct WeightedGraph; // 0 -> 1 (cost 10), 0 -> 2 (cost 1), 2 -> 1 (cost 1)

    impl Graph<u32, ()> for WeightedGraph {
        fn neighbors(&self, node: u32, _context: &()) -> Vec<u32> {
            match node {
                0 => vec![1, 2],
                2 => vec![1],
                _ => vec![],
            }
        }

        fn cost(&self, from: u32, to: u32, _context: &()) -> EdgeCost {
            EdgeCost::Passable(match (from, to) {
                (0, 1) => 10,
                (0, 2) => 1,
                (2, 1) => 1,
                _ => 1,
            })
        }

        fn heuristic(&self, _from: u32, _target: u32, _context: &()) -> u64 {
            0
        } // Dijkstra
    }

    #[test]
    fn test_weighted_pathfinding() {
        let graph = WeightedGraph;
        // Should go 0 -> 2 -> 1 (cost 2) instead of 0 -> 1 (cost 10)
        match AStar::find_path(&graph, 0, 1, &()) {
            SearchResult::Found { path, cost } => {
                assert_eq!(cost, 2);
                assert_eq!(path, vec![0, 2, 1]);
            }
            other => panic!("expected path, got {:?}", other),
        }
    }

    // Diamond shape: 0 -> {1, 2} -> 3. Both branches cost the same, so the
    // tie-break must deterministically route through the lower node.
    struct DiamondGraph;

    impl Graph<u32, ()> for DiamondGraph {
        fn neighbors(&self, node: u32, _context: &()) -> Vec<u32> {
            match node {
                0 => vec![1, 2],
                1 => vec![3],
                2 => vec![3],
                _ => vec![],
            }
        }

        fn cost(&self, _from: u32, _to: u32, _context: &()) -> EdgeCost {
            EdgeCost::Passable(1)
        }

        fn heuristic(&self, _from: u32, _target: u32, _context: &()) -> u64 {
            0
        }
    }

    #[test]
    fn test_tie_breaks_on_lower_node() {
        let graph = DiamondGraph;
        match AStar::find_path(&graph, 0, 3, &()) {
            SearchResult::Found { path, cost } => {
                assert_eq!(cost, 2);
                // Node 1 expands before node 2 at equal f-score, so the
                // winning parent of 3 is the lower branch.
                assert_eq!(path, vec![0, 1, 3]);
            }
            other => panic!("expected path, got {:?}", other),
        }
    }

    struct BlockedGraph; // 0 -> 1 blocked, 0 -> 2 -> 1 open

    impl Graph<u32, ()> for BlockedGraph {
        fn neighbors(&self, node: u32, _context: &()) -> Vec<u32> {
            match node {
                0 => vec![1, 2],
                2 => vec![1],
                _ => vec![],
            }
        }

        fn cost(&self, from: u32, to: u32, _context: &()) -> EdgeCost {
            if (from, to) == (0, 1) {
                EdgeCost::Blocked
            } else {
                EdgeCost::Passable(1)
            }
        }

        fn heuristic(&self, _from: u32, _target: u32, _context: &()) -> u64 {
            0
        }
    }

    #[test]
    fn test_blocked_edge_routes_around() {
        let graph = BlockedGraph;
        match AStar::find_path(&graph, 0, 1, &()) {
            SearchResult::Found { path, cost } => {
                assert_eq!(path, vec![0, 2, 1]);
                assert_eq!(cost, 2);
            }
            other => panic!("expected path, got {:?}", other),
        }
    }

    #[test]
    fn test_fully_blocked_is_no_path() {
        struct Walled;
        impl Graph<u32, ()> for Walled {
            fn neighbors(&self, node: u32, _c: &()) -> Vec<u32> {
                match node {
                    0 => vec![1],
                    _ => vec![],
                }
            }
            fn cost(&self, _f: u32, _t: u32, _c: &()) -> EdgeCost {
                EdgeCost::Blocked
            }
            fn heuristic(&self, _f: u32, _t: u32, _c: &()) -> u64 {
                0
            }
        }

        assert_eq!(AStar::find_path(&Walled, 0, 1, &()), SearchResult::NoPath);
    }

    #[test]
    fn test_expansion_budget() {
        let graph = GridGraph;
        // One expansion is never enough to cross the grid corner to corner.
        let result = AStar::find_path_bounded(&graph, 0, 8, &(), 1);
        assert_eq!(result, SearchResult::BudgetExhausted);

        // A generous budget finds the same path as the unbounded search.
        let bounded = AStar::find_path_bounded(&graph, 0, 8, &(), 64);
        let unbounded = AStar::find_path(&graph, 0, 8, &());
        assert_eq!(bounded, unbounded);
    }

    #[test]
    fn test_identical_queries_identical_results() {
        let graph = GridGraph;
        let a = AStar::find_path(&graph, 0, 8, &());
        let b = AStar::find_path(&graph, 0, 8, &());
        assert_eq!(a, b);
    }
}
