//! HNSW snapshot save/load.
//!
//! Snapshot layout:
//!
//! ```text
//! [Magic: "QVRH" 4 bytes]
//! [Version: u16 LE]
//! [bincode body: HnswSnapshot]
//! [CRC32 of body: u32 LE]
//! ```
//!
//! Load validates magic, version, and CRC, then checks structural
//! invariants (adjacency bounds, entry point liveness); any failure
//! surfaces as `IndexCorrupted` and the collection refuses to open.

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::util::crc32;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::Ordering;

use super::graph::{HnswGraph, Layer, Node};
use super::params::HnswParams;

/// Snapshot file name inside a collection directory.
pub(crate) const SNAPSHOT_FILE: &str = "hnsw.idx";

const SNAPSHOT_MAGIC: &[u8; 4] = b"QVRH";
const SNAPSHOT_VERSION: u16 = 1;

#[derive(Serialize, Deserialize)]
struct NodeSnapshot {
    id: String,
    vector: Vec<f32>,
    layer: usize,
    deleted: bool,
}

#[derive(Serialize, Deserialize)]
struct HnswSnapshot {
    dimension: usize,
    metric: DistanceMetric,
    params: HnswParams,
    nodes: Vec<NodeSnapshot>,
    /// `adjacency[layer][node]` = neighbor slots.
    adjacency: Vec<Vec<Vec<u32>>>,
    entry_point: Option<u64>,
    max_layer: usize,
    rng_state: u64,
}

/// Writes the graph to `<path>/hnsw.idx` via a temp file + rename.
pub(super) fn save_graph(path: &Path, dimension: usize, graph: &HnswGraph) -> Result<()> {
    std::fs::create_dir_all(path)?;

    let nodes = graph.nodes.read();
    let layers = graph.layers.read();

    let node_snapshots: Vec<NodeSnapshot> = nodes
        .iter()
        .map(|n| NodeSnapshot {
            id: n.id.clone(),
            vector: n.vector.clone(),
            layer: n.layer,
            deleted: n.deleted,
        })
        .collect();

    #[allow(clippy::cast_possible_truncation)]
    let adjacency: Vec<Vec<Vec<u32>>> = layers
        .iter()
        .map(|layer| {
            (0..nodes.len())
                .map(|slot| {
                    layer
                        .get_neighbors(slot)
                        .into_iter()
                        .map(|n| n as u32)
                        .collect()
                })
                .collect()
        })
        .collect();

    let snapshot = HnswSnapshot {
        dimension,
        metric: graph.metric,
        params: graph.params.clone(),
        nodes: node_snapshots,
        adjacency,
        entry_point: graph.entry_point.read().map(|ep| ep as u64),
        max_layer: graph.max_layer.load(Ordering::Relaxed),
        rng_state: graph.rng_state.load(Ordering::Relaxed),
    };

    let body = bincode::serialize(&snapshot)?;

    let tmp = path.join(format!("{SNAPSHOT_FILE}.tmp"));
    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(SNAPSHOT_MAGIC)?;
    file.write_all(&SNAPSHOT_VERSION.to_le_bytes())?;
    file.write_all(&body)?;
    file.write_all(&crc32(&body).to_le_bytes())?;
    file.sync_all()?;
    std::fs::rename(&tmp, path.join(SNAPSHOT_FILE))?;
    Ok(())
}

/// Reads a snapshot file back into a graph.
///
/// Returns `(dimension, graph, live_ids)` where `live_ids` maps external
/// ids to arena slots for non-deleted nodes.
pub(super) fn load_graph(path: &Path) -> Result<(usize, HnswGraph, Vec<(String, usize)>)> {
    let mut file = std::fs::File::open(path)?;
    let mut header = [0u8; 6];
    file.read_exact(&mut header)
        .map_err(|_| Error::IndexCorrupted("hnsw snapshot too short".to_string()))?;

    if &header[0..4] != SNAPSHOT_MAGIC {
        return Err(Error::IndexCorrupted(
            "hnsw snapshot has wrong magic".to_string(),
        ));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != SNAPSHOT_VERSION {
        return Err(Error::IndexCorrupted(format!(
            "unsupported hnsw snapshot version {version}"
        )));
    }

    let mut rest = Vec::new();
    file.read_to_end(&mut rest)?;
    if rest.len() < 4 {
        return Err(Error::IndexCorrupted("hnsw snapshot truncated".to_string()));
    }
    let body = &rest[..rest.len() - 4];
    let stored_crc = u32::from_le_bytes(rest[rest.len() - 4..].try_into().unwrap_or([0; 4]));
    if crc32(body) != stored_crc {
        return Err(Error::IndexCorrupted(
            "hnsw snapshot CRC mismatch".to_string(),
        ));
    }

    let snapshot: HnswSnapshot = bincode::deserialize(body)?;
    validate_snapshot(&snapshot)?;

    let node_count = snapshot.nodes.len();
    let graph = HnswGraph::new(snapshot.metric, snapshot.params.clone());

    let mut live = 0usize;
    let mut deleted = 0usize;
    let mut live_ids = Vec::new();

    {
        let mut nodes = graph.nodes.write();
        for (slot, n) in snapshot.nodes.into_iter().enumerate() {
            if n.deleted {
                deleted += 1;
            } else {
                live += 1;
                live_ids.push((n.id.clone(), slot));
            }
            nodes.push(Node {
                id: n.id,
                vector: n.vector,
                layer: n.layer,
                deleted: n.deleted,
            });
        }
    }

    {
        let mut layers = graph.layers.write();
        layers.clear();
        for layer_adjacency in snapshot.adjacency {
            let mut layer = Layer::new(node_count);
            for (slot, neighbors) in layer_adjacency.into_iter().enumerate() {
                layer.ensure_capacity(slot);
                layer.set_neighbors(slot, neighbors.into_iter().map(|n| n as usize).collect());
            }
            layers.push(layer);
        }
        if layers.is_empty() {
            layers.push(Layer::new(node_count));
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    {
        *graph.entry_point.write() = snapshot.entry_point.map(|ep| ep as usize);
    }
    graph.max_layer.store(snapshot.max_layer, Ordering::Relaxed);
    graph.live_count.store(live, Ordering::Relaxed);
    graph.deleted_count.store(deleted, Ordering::Relaxed);
    graph.rng_state.store(snapshot.rng_state, Ordering::Relaxed);

    Ok((snapshot.dimension, graph, live_ids))
}

fn validate_snapshot(snapshot: &HnswSnapshot) -> Result<()> {
    let node_count = snapshot.nodes.len();

    if let Some(ep) = snapshot.entry_point {
        let ep = usize::try_from(ep)
            .map_err(|_| Error::IndexCorrupted("entry point out of range".to_string()))?;
        if ep >= node_count {
            return Err(Error::IndexCorrupted(format!(
                "entry point {ep} exceeds node count {node_count}"
            )));
        }
        if snapshot.nodes[ep].deleted {
            return Err(Error::IndexCorrupted(
                "entry point refers to a deleted node".to_string(),
            ));
        }
    } else if snapshot.nodes.iter().any(|n| !n.deleted) {
        return Err(Error::IndexCorrupted(
            "live nodes present but no entry point".to_string(),
        ));
    }

    for n in &snapshot.nodes {
        if n.vector.len() != snapshot.dimension {
            return Err(Error::IndexCorrupted(format!(
                "node '{}' has dimension {} (expected {})",
                n.id,
                n.vector.len(),
                snapshot.dimension
            )));
        }
    }

    for (layer_idx, layer) in snapshot.adjacency.iter().enumerate() {
        if layer.len() > node_count {
            return Err(Error::IndexCorrupted(format!(
                "layer {layer_idx} adjacency exceeds node count"
            )));
        }
        for neighbors in layer {
            for &n in neighbors {
                if n as usize >= node_count {
                    return Err(Error::IndexCorrupted(format!(
                        "layer {layer_idx} references missing node {n}"
                    )));
                }
            }
        }
    }

    Ok(())
}
