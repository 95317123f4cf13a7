//! Tests for the HNSW index over its graph

use super::super::VectorIndex;
use super::{HnswIndex, HnswParams};
use crate::distance::DistanceMetric;
use crate::error::ErrorKind;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn unit_vector(rng: &mut StdRng, dim: usize) -> Vec<f32> {
    let mut v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

fn small_index() -> HnswIndex {
    HnswIndex::new(4, DistanceMetric::Cosine, HnswParams::default())
}

#[test]
fn test_empty_search_returns_nothing() {
    let idx = small_index();
    let results = idx.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap();
    assert!(results.is_empty());
}

#[test]
fn test_single_insert_and_exact_match() {
    let idx = small_index();
    idx.add("a", &[1.0, 0.0, 0.0, 0.0]).unwrap();

    let results = idx.search(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "a");
    assert!(results[0].1 < 1e-5);
}

#[test]
fn test_duplicate_id_rejected() {
    let idx = small_index();
    idx.add("a", &[1.0, 0.0, 0.0, 0.0]).unwrap();
    let err = idx.add("a", &[0.0, 1.0, 0.0, 0.0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateId);
}

#[test]
fn test_dimension_mismatch_rejected() {
    let idx = small_index();
    let err = idx.add("a", &[1.0, 0.0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);

    idx.add("b", &[1.0, 0.0, 0.0, 0.0]).unwrap();
    let err = idx.search(&[1.0, 0.0], 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
}

#[test]
fn test_zero_k_rejected() {
    let idx = small_index();
    idx.add("a", &[1.0, 0.0, 0.0, 0.0]).unwrap();
    let err = idx.search(&[1.0, 0.0, 0.0, 0.0], 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_planted_vector_is_found_among_random() {
    let dim = 16;
    let idx = HnswIndex::new(dim, DistanceMetric::Cosine, HnswParams::default());
    let mut rng = StdRng::seed_from_u64(7);

    for i in 0..1000 {
        idx.add(&format!("r{i}"), &unit_vector(&mut rng, dim))
            .unwrap();
    }

    let planted = unit_vector(&mut rng, dim);
    idx.add("planted", &planted).unwrap();

    let results = idx.search(&planted, 10).unwrap();
    assert_eq!(results[0].0, "planted");
    assert!(results[0].1 <= 1e-5, "score was {}", results[0].1);
}

#[test]
fn test_results_sorted_ascending() {
    let dim = 8;
    let idx = HnswIndex::new(dim, DistanceMetric::Euclidean, HnswParams::default());
    let mut rng = StdRng::seed_from_u64(11);

    for i in 0..200 {
        idx.add(&format!("r{i}"), &unit_vector(&mut rng, dim))
            .unwrap();
    }

    let query = unit_vector(&mut rng, dim);
    let results = idx.search(&query, 20).unwrap();
    for window in results.windows(2) {
        assert!(window[0].1 <= window[1].1);
    }
}

#[test]
fn test_delete_hides_node_from_results() {
    let idx = small_index();
    idx.add("a", &[1.0, 0.0, 0.0, 0.0]).unwrap();
    idx.add("b", &[0.9, 0.1, 0.0, 0.0]).unwrap();
    idx.add("c", &[0.0, 1.0, 0.0, 0.0]).unwrap();

    idx.remove("a").unwrap();
    assert_eq!(idx.len(), 2);

    let results = idx.search(&[1.0, 0.0, 0.0, 0.0], 3).unwrap();
    assert!(results.iter().all(|(id, _)| id != "a"));
    assert_eq!(results[0].0, "b");
}

#[test]
fn test_delete_missing_id_is_not_found() {
    let idx = small_index();
    let err = idx.remove("ghost").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_delete_entry_point_keeps_graph_searchable() {
    let dim = 8;
    let idx = HnswIndex::new(dim, DistanceMetric::Cosine, HnswParams::default());
    let mut rng = StdRng::seed_from_u64(3);

    let mut vectors = Vec::new();
    for i in 0..100 {
        let v = unit_vector(&mut rng, dim);
        idx.add(&format!("r{i}"), &v).unwrap();
        vectors.push(v);
    }

    // Deleting many nodes will eventually take out the entry point.
    for i in 0..50 {
        idx.remove(&format!("r{i}")).unwrap();
    }
    assert_eq!(idx.len(), 50);

    let results = idx.search(&vectors[75], 5).unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].0, "r75");
}

#[test]
fn test_optimize_reclaims_tombstones() {
    let dim = 8;
    let idx = HnswIndex::new(dim, DistanceMetric::Cosine, HnswParams::default());
    let mut rng = StdRng::seed_from_u64(5);

    let mut vectors = Vec::new();
    for i in 0..120 {
        let v = unit_vector(&mut rng, dim);
        idx.add(&format!("r{i}"), &v).unwrap();
        vectors.push(v);
    }
    for i in 0..60 {
        idx.remove(&format!("r{i}")).unwrap();
    }
    assert_eq!(idx.stats().deleted, 60);

    idx.optimize().unwrap();
    assert_eq!(idx.stats().deleted, 0);
    assert_eq!(idx.len(), 60);

    // Survivors are still found; tombstoned ids stay gone.
    let results = idx.search(&vectors[90], 5).unwrap();
    assert_eq!(results[0].0, "r90");
    assert!(results.iter().all(|(id, _)| {
        let n: usize = id[1..].parse().unwrap();
        n >= 60
    }));
}

#[test]
fn test_maybe_optimize_threshold() {
    let idx = small_index();
    for i in 0..10 {
        idx.add(&format!("r{i}"), &[i as f32, 1.0, 0.0, 0.0])
            .unwrap();
    }
    // 2/10 deleted: below the 30% threshold.
    idx.remove("r0").unwrap();
    idx.remove("r1").unwrap();
    assert!(!idx.maybe_optimize().unwrap());

    idx.remove("r2").unwrap();
    idx.remove("r3").unwrap();
    assert!(idx.maybe_optimize().unwrap());
    assert_eq!(idx.stats().deleted, 0);
}

#[test]
fn test_reinsert_after_delete() {
    let idx = small_index();
    idx.add("a", &[1.0, 0.0, 0.0, 0.0]).unwrap();
    idx.remove("a").unwrap();
    idx.add("a", &[0.0, 1.0, 0.0, 0.0]).unwrap();

    let results = idx.search(&[0.0, 1.0, 0.0, 0.0], 1).unwrap();
    assert_eq!(results[0].0, "a");
    assert!(results[0].1 < 1e-5);
}

#[test]
fn test_seeded_graphs_are_reproducible() {
    let build = || {
        let idx = HnswIndex::new(8, DistanceMetric::Cosine, HnswParams::default().with_seed(99));
        let mut rng = StdRng::seed_from_u64(13);
        for i in 0..300 {
            idx.add(&format!("r{i}"), &unit_vector(&mut rng, 8)).unwrap();
        }
        idx
    };

    let a = build();
    let b = build();
    let mut rng = StdRng::seed_from_u64(77);
    let query = unit_vector(&mut rng, 8);
    assert_eq!(a.search(&query, 10).unwrap(), b.search(&query, 10).unwrap());
}
