//! Layered layout
//!
//! Arranges the table graph left-to-right in ranks so that every foreign key
//! points from a table to one in a later rank:
//!
//! 1. **Ranks**: cycles are broken by reversing DFS back edges (nodes visited
//!    in id order), then each node gets the longest-path rank from the
//!    sources.
//! 2. **Ordering**: long edges are split with virtual nodes and each rank is
//!    reordered by the barycenter of its neighbours, sweeping down and up.
//!    The ordering with the fewest crossings wins.
//! 3. **Coordinates**: fixed-size boxes; ranks become columns, the order
//!    within a rank becomes rows. Each rank is centred against the tallest
//!    rank of its component.
//!
//! Disconnected components are laid out separately and stacked vertically.
//! Nothing here is randomized: the same graph always yields the same
//! coordinates.

use crate::graph::{Graph, Position};
use petgraph::unionfind::UnionFind;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Layout configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    /// Logical width of a table box
    pub node_width: f64,
    /// Logical height of a table box
    pub node_height: f64,
    /// Horizontal gap between ranks
    pub rank_sep: f64,
    /// Vertical gap between boxes in the same rank (and between components)
    pub node_sep: f64,
    /// Barycenter sweeps; alternate passes go down and up
    pub ordering_passes: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: 260.0,
            node_height: 160.0,
            rank_sep: 120.0,
            node_sep: 80.0,
            ordering_passes: 8,
        }
    }
}

/// Result of a layout calculation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayoutResult {
    /// Node id -> top-left corner
    pub positions: BTreeMap<String, Position>,
    /// Bounding box of the whole drawing
    pub width: f64,
    pub height: f64,
}

impl LayoutResult {
    pub fn position(&self, id: &str) -> Option<Position> {
        self.positions.get(id).copied()
    }
}

pub struct LayoutEngine;

impl LayoutEngine {
    /// Assign a position to every node of `graph`.
    ///
    /// Edges naming unknown nodes and self-references are ignored.
    pub fn layout(graph: &Graph, config: &LayoutConfig) -> LayoutResult {
        let ids: Vec<&str> = graph
            .nodes
            .iter()
            .map(|n| n.id.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if ids.is_empty() {
            return LayoutResult::default();
        }

        let index: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let edges: BTreeSet<(usize, usize)> = graph
            .edges
            .iter()
            .filter_map(|e| {
                let source = *index.get(e.source.as_str())?;
                let target = *index.get(e.target.as_str())?;
                (source != target).then_some((source, target))
            })
            .collect();

        let mut components = UnionFind::new(ids.len());
        for &(source, target) in &edges {
            components.union(source, target);
        }
        let mut by_root: HashMap<usize, Vec<usize>> = HashMap::new();
        for node in 0..ids.len() {
            by_root.entry(components.find(node)).or_default().push(node);
        }
        let mut groups: Vec<Vec<usize>> = by_root.into_values().collect();
        groups.sort_by_key(|members| members[0]);

        let mut result = LayoutResult::default();
        let mut offset_y = 0.0;
        for members in &groups {
            let component = ComponentLayout::compute(members, &edges, config);
            for (node, x, y) in component.placed {
                result
                    .positions
                    .insert(ids[node].to_string(), Position { x, y: y + offset_y });
            }
            result.width = result.width.max(component.width);
            offset_y += component.height + config.node_sep;
        }
        result.height = offset_y - config.node_sep;

        tracing::debug!(
            nodes = ids.len(),
            edges = edges.len(),
            components = groups.len(),
            "Computed layered layout"
        );

        result
    }
}

/// Layout of one connected component, relative to its own origin
struct ComponentLayout {
    /// (global node index, x, y)
    placed: Vec<(usize, f64, f64)>,
    width: f64,
    height: f64,
}

impl ComponentLayout {
    fn compute(members: &[usize], edges: &BTreeSet<(usize, usize)>, config: &LayoutConfig) -> Self {
        let local: HashMap<usize, usize> = members.iter().enumerate().map(|(i, &g)| (g, i)).collect();
        let local_edges: Vec<(usize, usize)> = edges
            .iter()
            .filter_map(|(s, t)| Some((*local.get(s)?, *local.get(t)?)))
            .collect();

        let n = members.len();
        let dag = break_cycles(n, &local_edges);
        let rank = assign_ranks(n, &dag);

        let mut layered = Layering::new(n, &rank, &dag);
        layered.reduce_crossings(config.ordering_passes);

        let step_x = config.node_width + config.rank_sep;
        let step_y = config.node_height + config.node_sep;

        let rows: Vec<Vec<usize>> = layered
            .layers
            .iter()
            .map(|layer| layer.iter().copied().filter(|&v| v < n).collect())
            .collect();
        let tallest = rows.iter().map(Vec::len).max().unwrap_or(0);

        let mut placed = Vec::with_capacity(n);
        for (r, row) in rows.iter().enumerate() {
            let shift = (tallest - row.len()) as f64 * step_y / 2.0;
            for (i, &v) in row.iter().enumerate() {
                placed.push((members[v], r as f64 * step_x, shift + i as f64 * step_y));
            }
        }

        Self {
            placed,
            width: rows.len() as f64 * step_x - config.rank_sep,
            height: tallest as f64 * step_y - config.node_sep,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Done,
}

/// Reverse every DFS back edge so the edge set becomes acyclic.
fn break_cycles(n: usize, edges: &[(usize, usize)]) -> BTreeSet<(usize, usize)> {
    let mut succ: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(s, t) in edges {
        succ[s].push(t);
    }
    for list in &mut succ {
        list.sort_unstable();
    }

    let mut mark = vec![Mark::New; n];
    let mut back: HashSet<(usize, usize)> = HashSet::new();

    for root in 0..n {
        if mark[root] != Mark::New {
            continue;
        }
        mark[root] = Mark::Active;
        let mut stack = vec![(root, 0usize)];

        while let Some(frame) = stack.last_mut() {
            let (node, cursor) = *frame;
            match succ[node].get(cursor) {
                Some(&child) => {
                    frame.1 += 1;
                    match mark[child] {
                        Mark::New => {
                            mark[child] = Mark::Active;
                            stack.push((child, 0));
                        }
                        Mark::Active => {
                            back.insert((node, child));
                        }
                        Mark::Done => {}
                    }
                }
                None => {
                    mark[node] = Mark::Done;
                    stack.pop();
                }
            }
        }
    }

    edges
        .iter()
        .map(|&(s, t)| if back.contains(&(s, t)) { (t, s) } else { (s, t) })
        .collect()
}

/// Longest-path ranking over an acyclic edge set.
fn assign_ranks(n: usize, dag: &BTreeSet<(usize, usize)>) -> Vec<usize> {
    let mut succ: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];
    for &(s, t) in dag {
        succ[s].push(t);
        indegree[t] += 1;
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&v| indegree[v] == 0).collect();
    let mut rank = vec![0usize; n];

    while let Some(v) = ready.pop_first() {
        for &w in &succ[v] {
            rank[w] = rank[w].max(rank[v] + 1);
            indegree[w] -= 1;
            if indegree[w] == 0 {
                ready.insert(w);
            }
        }
    }

    rank
}

/// Ranks with virtual nodes inserted along edges spanning several ranks.
///
/// Indices `>= real` are virtual.
struct Layering {
    real: usize,
    layers: Vec<Vec<usize>>,
    up: Vec<Vec<usize>>,
    down: Vec<Vec<usize>>,
}

impl Layering {
    fn new(real: usize, rank: &[usize], dag: &BTreeSet<(usize, usize)>) -> Self {
        let depth = rank.iter().copied().max().map_or(0, |r| r + 1);
        let mut layers: Vec<Vec<usize>> = vec![Vec::new(); depth];
        for (v, &r) in rank.iter().enumerate() {
            layers[r].push(v);
        }

        let mut segments = Vec::new();
        let mut total = real;
        for &(s, t) in dag {
            let mut upper = s;
            for r in (rank[s] + 1)..rank[t] {
                let virtual_node = total;
                total += 1;
                layers[r].push(virtual_node);
                segments.push((upper, virtual_node));
                upper = virtual_node;
            }
            segments.push((upper, t));
        }

        let mut up = vec![Vec::new(); total];
        let mut down = vec![Vec::new(); total];
        for (upper, lower) in segments {
            up[lower].push(upper);
            down[upper].push(lower);
        }

        Self { real, layers, up, down }
    }

    fn positions(&self) -> Vec<usize> {
        let mut pos = vec![0; self.up.len()];
        for layer in &self.layers {
            for (i, &v) in layer.iter().enumerate() {
                pos[v] = i;
            }
        }
        pos
    }

    fn reduce_crossings(&mut self, passes: usize) {
        let mut pos = self.positions();
        let mut best = self.layers.clone();
        let mut best_crossings = self.crossings(&pos);

        for pass in 0..passes {
            if best_crossings == 0 {
                break;
            }

            if pass % 2 == 0 {
                for r in 1..self.layers.len() {
                    reorder(&mut self.layers[r], &self.up, &mut pos);
                }
            } else {
                for r in (0..self.layers.len().saturating_sub(1)).rev() {
                    reorder(&mut self.layers[r], &self.down, &mut pos);
                }
            }

            let crossings = self.crossings(&pos);
            if crossings < best_crossings {
                best_crossings = crossings;
                best = self.layers.clone();
            }
        }

        self.layers = best;
        tracing::trace!(real = self.real, crossings = best_crossings, "Ordering settled");
    }

    /// Count pairwise crossings between every pair of adjacent ranks.
    fn crossings(&self, pos: &[usize]) -> usize {
        let mut total = 0;
        for layer in &self.layers {
            let segments: Vec<(usize, usize)> = layer
                .iter()
                .flat_map(|&u| self.down[u].iter().map(move |&w| (pos[u], pos[w])))
                .collect();

            for (i, &(a1, b1)) in segments.iter().enumerate() {
                for &(a2, b2) in &segments[i + 1..] {
                    if (a1 < a2 && b1 > b2) || (a1 > a2 && b1 < b2) {
                        total += 1;
                    }
                }
            }
        }
        total
    }
}

/// Sort one rank by the mean position of its neighbours in the fixed rank.
/// Nodes without neighbours keep their slot; ties keep the current order.
fn reorder(layer: &mut [usize], neighbors: &[Vec<usize>], pos: &mut [usize]) {
    let mut keyed: Vec<(f64, usize)> = layer
        .iter()
        .map(|&v| {
            let adjacent = &neighbors[v];
            let barycenter = if adjacent.is_empty() {
                pos[v] as f64
            } else {
                adjacent.iter().map(|&u| pos[u] as f64).sum::<f64>() / adjacent.len() as f64
            };
            (barycenter, v)
        })
        .collect();

    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));

    for (i, (_, v)) in keyed.into_iter().enumerate() {
        layer[i] = v;
        pos[v] = i;
    }
}
