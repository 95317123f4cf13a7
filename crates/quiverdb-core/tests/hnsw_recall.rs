//! HNSW approximate search quality on a planted-vector workload.

use quiverdb_core::{
    CancelToken, CollectionConfig, Database, DistanceMetric, IndexKind, SearchRequest,
    VectorRecord,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

fn unit_vector(rng: &mut StdRng, dim: usize) -> Vec<f32> {
    let mut v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    for x in &mut v {
        *x /= norm.max(1e-12);
    }
    v
}

#[test]
fn planted_vector_is_first_result() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path()).unwrap();
    let docs = db
        .create_collection(CollectionConfig::new(
            "vectors",
            32,
            DistanceMetric::Cosine,
            IndexKind::Hnsw,
        ))
        .unwrap();
    let cancel = CancelToken::never();
    let mut rng = StdRng::seed_from_u64(42);

    for i in 0..1000 {
        docs.insert(
            VectorRecord::without_metadata(format!("r{i}"), unit_vector(&mut rng, 32)),
            &cancel,
        )
        .unwrap();
    }

    let planted = unit_vector(&mut rng, 32);
    docs.insert(VectorRecord::without_metadata("planted", planted.clone()), &cancel)
        .unwrap();

    let hits = docs
        .search(&SearchRequest::new(planted, 10), &cancel)
        .unwrap();
    assert_eq!(hits[0].id, "planted");
    assert!(hits[0].score <= 1e-5, "distance was {}", hits[0].score);
}

#[test]
fn hnsw_results_survive_reopen_within_tolerance() {
    let dir = tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let queries: Vec<Vec<f32>> = (0..5).map(|_| unit_vector(&mut rng, 16)).collect();

    let before: Vec<Vec<String>> = {
        let db = Database::open(dir.path()).unwrap();
        let docs = db
            .create_collection(CollectionConfig::new(
                "vectors",
                16,
                DistanceMetric::Cosine,
                IndexKind::Hnsw,
            ))
            .unwrap();
        let cancel = CancelToken::never();
        for i in 0..500 {
            docs.insert(
                VectorRecord::without_metadata(format!("r{i}"), unit_vector(&mut rng, 16)),
                &cancel,
            )
            .unwrap();
        }
        let results = queries
            .iter()
            .map(|q| {
                docs.search(&SearchRequest::new(q.clone(), 10), &cancel)
                    .unwrap()
                    .into_iter()
                    .map(|h| h.id)
                    .collect()
            })
            .collect();
        db.close().unwrap();
        results
    };

    // The graph snapshot persists layers and adjacency, so the reopened
    // index returns identical rankings for identical queries.
    let db = Database::open(dir.path()).unwrap();
    let docs = db.get_collection("vectors").unwrap();
    let cancel = CancelToken::never();
    for (query, expected) in queries.iter().zip(&before) {
        let after: Vec<String> = docs
            .search(&SearchRequest::new(query.clone(), 10), &cancel)
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(&after, expected);
    }
}

#[test]
fn deleted_vectors_never_surface() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path()).unwrap();
    let docs = db
        .create_collection(CollectionConfig::new(
            "vectors",
            16,
            DistanceMetric::Euclidean,
            IndexKind::Hnsw,
        ))
        .unwrap();
    let cancel = CancelToken::never();
    let mut rng = StdRng::seed_from_u64(3);

    let mut vectors = Vec::new();
    for i in 0..300 {
        let v = unit_vector(&mut rng, 16);
        docs.insert(VectorRecord::without_metadata(format!("r{i}"), v.clone()), &cancel)
            .unwrap();
        vectors.push(v);
    }

    for i in (0..300).step_by(3) {
        docs.delete(&format!("r{i}"), &cancel).unwrap();
    }
    assert_eq!(docs.count(), 200);

    for query in vectors.iter().step_by(50) {
        let hits = docs
            .search(&SearchRequest::new(query.clone(), 20), &cancel)
            .unwrap();
        for hit in hits {
            let n: usize = hit.id[1..].parse().unwrap();
            assert_ne!(n % 3, 0, "{} was deleted but surfaced", hit.id);
        }
    }
}
