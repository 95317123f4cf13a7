//! HNSW graph structure.
//!
//! Hierarchical navigable small world graph after Malkov & Yashunin.
//! Nodes live in a flat arena indexed by contiguous integers; each layer
//! holds per-node adjacency lists behind their own locks. Deletion is a
//! tombstone: the node is unlinked from every neighbor list and filtered
//! from results, and its arena slot is reclaimed by a rebuild.
//!
//! Lock order: `nodes` → `layers` → per-node neighbor locks. Vector data
//! is always fetched before the layers lock is taken.

use crate::distance::DistanceMetric;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use std::cmp::Ordering as CmpOrdering;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::params::HnswParams;

/// Position of a node in the arena.
pub(super) type NodeId = usize;

/// Hard cap on layer height.
pub(super) const MAX_LAYERS: usize = 16;

/// Wrapper for f32 with IEEE 754 total ordering, for use in `BinaryHeap`.
#[derive(Debug, Clone, Copy)]
pub(super) struct OrderedFloat(pub f32);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for OrderedFloat {}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.0.total_cmp(&other.0)
    }
}

/// A node in the arena.
#[derive(Debug, Clone)]
pub(super) struct Node {
    /// External string id.
    pub id: String,
    /// Vector data.
    pub vector: Vec<f32>,
    /// Highest layer this node participates in.
    pub layer: usize,
    /// Tombstone flag; set by delete, cleared only by rebuild.
    pub deleted: bool,
}

/// A single layer: adjacency lists indexed by node id.
pub(super) struct Layer {
    neighbors: Vec<RwLock<Vec<NodeId>>>,
}

impl Layer {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            neighbors: (0..capacity).map(|_| RwLock::new(Vec::new())).collect(),
        }
    }

    pub(super) fn ensure_capacity(&mut self, node_id: NodeId) {
        while self.neighbors.len() <= node_id {
            self.neighbors.push(RwLock::new(Vec::new()));
        }
    }

    pub(super) fn get_neighbors(&self, node_id: NodeId) -> Vec<NodeId> {
        if node_id < self.neighbors.len() {
            self.neighbors[node_id].read().clone()
        } else {
            Vec::new()
        }
    }

    pub(super) fn set_neighbors(&self, node_id: NodeId, neighbors: Vec<NodeId>) {
        if node_id < self.neighbors.len() {
            *self.neighbors[node_id].write() = neighbors;
        }
    }
}

/// The layered proximity graph.
pub(super) struct HnswGraph {
    pub(super) metric: DistanceMetric,
    pub(super) params: HnswParams,
    level_mult: f64,
    pub(super) nodes: RwLock<Vec<Node>>,
    pub(super) layers: RwLock<Vec<Layer>>,
    pub(super) entry_point: RwLock<Option<NodeId>>,
    pub(super) max_layer: AtomicUsize,
    pub(super) live_count: AtomicUsize,
    pub(super) deleted_count: AtomicUsize,
    pub(super) rng_state: AtomicU64,
}

impl HnswGraph {
    pub(super) fn new(metric: DistanceMetric, params: HnswParams) -> Self {
        let level_mult = params.level_mult();
        let seed = params.seed;
        Self {
            metric,
            params,
            level_mult,
            nodes: RwLock::new(Vec::new()),
            layers: RwLock::new(vec![Layer::new(0)]),
            entry_point: RwLock::new(None),
            max_layer: AtomicUsize::new(0),
            live_count: AtomicUsize::new(0),
            deleted_count: AtomicUsize::new(0),
            rng_state: AtomicU64::new(seed),
        }
    }

    pub(super) fn live_len(&self) -> usize {
        self.live_count.load(Ordering::Relaxed)
    }

    pub(super) fn deleted_len(&self) -> usize {
        self.deleted_count.load(Ordering::Relaxed)
    }

    /// Inserts a vector and links it into every layer up to its sampled
    /// height. Returns the arena slot.
    pub(super) fn insert(&self, id: String, vector: Vec<f32>) -> NodeId {
        let query = vector.clone();
        let node_layer = self.random_layer();

        let node_id = {
            let mut nodes = self.nodes.write();
            let slot = nodes.len();
            nodes.push(Node {
                id,
                vector,
                layer: node_layer,
                deleted: false,
            });
            slot
        };

        {
            let mut layers = self.layers.write();
            while layers.len() <= node_layer {
                layers.push(Layer::new(node_id + 1));
            }
            for layer in layers.iter_mut() {
                layer.ensure_capacity(node_id);
            }
        }

        let entry_point = *self.entry_point.read();

        if let Some(ep) = entry_point {
            let max_layer = self.max_layer.load(Ordering::Relaxed);

            // Greedy descent through layers above the node's height.
            let mut current_ep = ep;
            for layer_idx in (node_layer + 1..=max_layer).rev() {
                current_ep = self.search_layer_single(&query, current_ep, layer_idx);
            }

            // Connect on each layer from the node's height down to 0.
            for layer_idx in (0..=node_layer).rev() {
                let candidates = self.search_layer(
                    &query,
                    vec![current_ep],
                    self.params.ef_construction,
                    layer_idx,
                );

                let max_conn = self.max_connections(layer_idx);
                let selected = {
                    let nodes = self.nodes.read();
                    self.select_neighbors(&candidates, max_conn, &nodes)
                };

                self.layers.read()[layer_idx].set_neighbors(node_id, selected.clone());

                for &neighbor in &selected {
                    self.add_bidirectional_connection(node_id, neighbor, layer_idx, max_conn);
                }

                if let Some(&(best, _)) = candidates.first() {
                    current_ep = best;
                }
            }
        } else {
            *self.entry_point.write() = Some(node_id);
        }

        if node_layer > self.max_layer.load(Ordering::Relaxed) {
            self.max_layer.store(node_layer, Ordering::Relaxed);
            *self.entry_point.write() = Some(node_id);
        }

        self.live_count.fetch_add(1, Ordering::Relaxed);
        node_id
    }

    /// Searches for the `k` nearest live nodes.
    ///
    /// `ef` is expanded to compensate for tombstones so soft-deleted nodes
    /// do not shrink the effective candidate pool.
    pub(super) fn search(&self, query: &[f32], k: usize, ef: usize) -> Vec<(NodeId, f32)> {
        let entry_point = *self.entry_point.read();
        let Some(ep) = entry_point else {
            return Vec::new();
        };

        let max_layer = self.max_layer.load(Ordering::Relaxed);

        let mut current_ep = ep;
        for layer_idx in (1..=max_layer).rev() {
            current_ep = self.search_layer_single(query, current_ep, layer_idx);
        }

        let mut ef_eff = ef.max(k);
        let deleted = self.deleted_len();
        if deleted > 0 {
            ef_eff += deleted.min(ef_eff);
        }

        let candidates = self.search_layer(query, vec![current_ep], ef_eff, 0);

        let nodes = self.nodes.read();
        candidates
            .into_iter()
            .filter(|&(node_id, _)| !nodes[node_id].deleted)
            .take(k)
            .collect()
    }

    /// Tombstones a node and unlinks it from every neighbor list.
    pub(super) fn mark_deleted(&self, node_id: NodeId) {
        let node_layer = {
            let mut nodes = self.nodes.write();
            let node = &mut nodes[node_id];
            if node.deleted {
                return;
            }
            node.deleted = true;
            node.layer
        };

        {
            let layers = self.layers.read();
            for layer in layers.iter().take(node_layer + 1) {
                let linked = layer.get_neighbors(node_id);
                for neighbor in linked {
                    let mut list = layer.get_neighbors(neighbor);
                    list.retain(|&n| n != node_id);
                    layer.set_neighbors(neighbor, list);
                }
                layer.set_neighbors(node_id, Vec::new());
            }
        }

        self.live_count.fetch_sub(1, Ordering::Relaxed);
        self.deleted_count.fetch_add(1, Ordering::Relaxed);

        // Reseat the entry point if it just died.
        let needs_new_entry = *self.entry_point.read() == Some(node_id);
        if needs_new_entry {
            let nodes = self.nodes.read();
            let replacement = nodes
                .iter()
                .enumerate()
                .filter(|(_, n)| !n.deleted)
                .max_by_key(|(_, n)| n.layer);

            match replacement {
                Some((slot, node)) => {
                    self.max_layer.store(node.layer, Ordering::Relaxed);
                    *self.entry_point.write() = Some(slot);
                }
                None => {
                    self.max_layer.store(0, Ordering::Relaxed);
                    *self.entry_point.write() = None;
                }
            }
        }
    }

    /// Replaces this graph's contents with another's. Used by rebuild.
    pub(super) fn replace_with(&self, other: Self) {
        let mut nodes = self.nodes.write();
        let mut layers = self.layers.write();
        let mut entry = self.entry_point.write();

        *nodes = other.nodes.into_inner();
        *layers = other.layers.into_inner();
        *entry = other.entry_point.into_inner();
        self.max_layer
            .store(other.max_layer.load(Ordering::Relaxed), Ordering::Relaxed);
        self.live_count
            .store(other.live_count.load(Ordering::Relaxed), Ordering::Relaxed);
        self.deleted_count.store(0, Ordering::Relaxed);
        self.rng_state
            .store(other.rng_state.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    fn max_connections(&self, layer: usize) -> usize {
        if layer == 0 {
            self.params.m0
        } else {
            self.params.m
        }
    }

    /// Samples a layer from the geometric distribution
    /// `floor(-ln(U) * level_mult)`, capped at [`MAX_LAYERS`].
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn random_layer(&self) -> usize {
        // xorshift64; seeded at construction for reproducible graphs.
        let mut state = self.rng_state.load(Ordering::Relaxed);
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        self.rng_state.store(state, Ordering::Relaxed);

        let uniform = (state as f64) / (u64::MAX as f64);
        let level = (-uniform.max(f64::MIN_POSITIVE).ln() * self.level_mult).floor() as usize;
        level.min(MAX_LAYERS - 1)
    }

    /// Greedy single-nearest descent within one layer.
    fn search_layer_single(&self, query: &[f32], entry: NodeId, layer: usize) -> NodeId {
        let nodes = self.nodes.read();
        let mut best = entry;
        let mut best_dist = self.metric.score(query, &nodes[entry].vector);

        loop {
            let neighbors = self.layers.read()[layer].get_neighbors(best);
            let mut improved = false;

            for neighbor in neighbors {
                let dist = self.metric.score(query, &nodes[neighbor].vector);
                if dist < best_dist {
                    best = neighbor;
                    best_dist = dist;
                    improved = true;
                }
            }

            if !improved {
                break;
            }
        }

        best
    }

    /// Best-first search within one layer, bounded by `ef` candidates.
    ///
    /// Returns (node, distance) pairs sorted ascending. Tombstoned nodes
    /// may appear; callers filter them at result assembly.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: Vec<NodeId>,
        ef: usize,
        layer: usize,
    ) -> Vec<(NodeId, f32)> {
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        let mut candidates: BinaryHeap<Reverse<(OrderedFloat, NodeId)>> = BinaryHeap::new();
        let mut results: BinaryHeap<(OrderedFloat, NodeId)> = BinaryHeap::new();

        let nodes = self.nodes.read();

        for ep in entry_points {
            if ep >= nodes.len() {
                continue;
            }
            let dist = self.metric.score(query, &nodes[ep].vector);
            candidates.push(Reverse((OrderedFloat(dist), ep)));
            results.push((OrderedFloat(dist), ep));
            visited.insert(ep);
        }

        while let Some(Reverse((OrderedFloat(c_dist), c_node))) = candidates.pop() {
            let furthest = results.peek().map_or(f32::MAX, |r| r.0 .0);
            if c_dist > furthest && results.len() >= ef {
                break;
            }

            let neighbors = self.layers.read()[layer].get_neighbors(c_node);

            for neighbor in neighbors {
                if visited.insert(neighbor) {
                    let dist = self.metric.score(query, &nodes[neighbor].vector);
                    let furthest = results.peek().map_or(f32::MAX, |r| r.0 .0);

                    if dist < furthest || results.len() < ef {
                        candidates.push(Reverse((OrderedFloat(dist), neighbor)));
                        results.push((OrderedFloat(dist), neighbor));

                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        let mut result_vec: Vec<(NodeId, f32)> =
            results.into_iter().map(|(d, n)| (n, d.0)).collect();
        result_vec.sort_by(|a, b| a.1.total_cmp(&b.1));
        result_vec
    }

    /// Diversity-favoring neighbor selection.
    ///
    /// A candidate is kept when no already-selected neighbor dominates it:
    /// `d(query, candidate) <= d(candidate, selected)` for all selected.
    /// Remaining quota is filled with the closest leftovers.
    fn select_neighbors(
        &self,
        candidates: &[(NodeId, f32)],
        max_neighbors: usize,
        nodes: &[Node],
    ) -> Vec<NodeId> {
        if candidates.is_empty() {
            return Vec::new();
        }
        if candidates.len() <= max_neighbors {
            return candidates.iter().map(|&(id, _)| id).collect();
        }

        let mut selected: Vec<NodeId> = Vec::with_capacity(max_neighbors);

        for &(candidate, candidate_dist) in candidates {
            if selected.len() >= max_neighbors {
                break;
            }

            let candidate_vec = &nodes[candidate].vector;
            let is_diverse = selected.iter().all(|&s| {
                let dist_to_selected = self.metric.score(candidate_vec, &nodes[s].vector);
                candidate_dist <= dist_to_selected
            });

            if is_diverse || selected.is_empty() {
                selected.push(candidate);
            }
        }

        if selected.len() < max_neighbors {
            for &(candidate, _) in candidates {
                if selected.len() >= max_neighbors {
                    break;
                }
                if !selected.contains(&candidate) {
                    selected.push(candidate);
                }
            }
        }

        selected
    }

    /// Links `new_node` into `neighbor`'s adjacency, pruning with the
    /// diversity heuristic when the neighbor exceeds its cap.
    fn add_bidirectional_connection(
        &self,
        new_node: NodeId,
        neighbor: NodeId,
        layer: usize,
        max_conn: usize,
    ) {
        let current_neighbors = self.layers.read()[layer].get_neighbors(neighbor);

        if current_neighbors.len() < max_conn {
            let layers = self.layers.read();
            let mut list = layers[layer].get_neighbors(neighbor);
            if !list.contains(&new_node) {
                list.push(new_node);
            }
            layers[layer].set_neighbors(neighbor, list);
            return;
        }

        // Over cap: rank everything by distance to the neighbor and reapply
        // the selection heuristic. All vector fetches happen before the
        // layers lock is taken.
        let mut all: Vec<NodeId> = current_neighbors;
        if !all.contains(&new_node) {
            all.push(new_node);
        }

        let pruned = {
            let nodes = self.nodes.read();
            let anchor = &nodes[neighbor].vector;
            let mut with_dist: Vec<(NodeId, f32)> = all
                .iter()
                .map(|&n| (n, self.metric.score(anchor, &nodes[n].vector)))
                .collect();
            with_dist.sort_by(|a, b| a.1.total_cmp(&b.1));
            self.select_neighbors(&with_dist, max_conn, &nodes)
        };

        self.layers.read()[layer].set_neighbors(neighbor, pruned);
    }
}
