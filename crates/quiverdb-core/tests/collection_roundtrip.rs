//! End-to-end collection behavior: basis-vector search, persistence
//! round trips, and content storage.

use quiverdb_core::{
    CancelToken, CollectionConfig, ContentPolicy, Database, DistanceMetric, IndexKind,
    SearchRequest, VectorRecord,
};
use quiverdb_core::embedding::VectorizerConfig;
use serde_json::json;
use tempfile::tempdir;

#[test]
fn basis_vectors_rank_by_cosine_distance() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path()).unwrap();
    let docs = db
        .create_collection(CollectionConfig::new(
            "docs",
            3,
            DistanceMetric::Cosine,
            IndexKind::Flat,
        ))
        .unwrap();
    let cancel = CancelToken::never();

    docs.insert(VectorRecord::without_metadata("a", vec![1.0, 0.0, 0.0]), &cancel)
        .unwrap();
    docs.insert(VectorRecord::without_metadata("b", vec![0.0, 1.0, 0.0]), &cancel)
        .unwrap();
    docs.insert(VectorRecord::without_metadata("c", vec![0.0, 0.0, 1.0]), &cancel)
        .unwrap();

    let hits = docs
        .search(&SearchRequest::new(vec![1.0, 0.0, 0.0], 2), &cancel)
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "a");
    assert!(hits[0].score.abs() < 1e-5);
    assert!(["b", "c"].contains(&hits[1].id.as_str()));
    assert!((hits[1].score - 1.0).abs() < 1e-5);
}

#[test]
fn inserted_records_survive_close_and_reopen() {
    let dir = tempdir().unwrap();
    let queries: Vec<Vec<f32>> = (0..5).map(|i| vec![i as f32, 1.0, 2.0, 3.0]).collect();

    let before: Vec<Vec<String>> = {
        let db = Database::open(dir.path()).unwrap();
        let docs = db
            .create_collection(CollectionConfig::new(
                "docs",
                4,
                DistanceMetric::Euclidean,
                IndexKind::Flat,
            ))
            .unwrap();
        let cancel = CancelToken::never();

        for i in 0..50 {
            docs.insert(
                VectorRecord::new(
                    format!("v{i}"),
                    vec![i as f32, (i % 3) as f32, 2.0, 3.0],
                    Some(json!({ "i": i })),
                ),
                &cancel,
            )
            .unwrap();
        }

        let results = queries
            .iter()
            .map(|q| {
                docs.search(&SearchRequest::new(q.clone(), 5), &cancel)
                    .unwrap()
                    .into_iter()
                    .map(|h| h.id)
                    .collect()
            })
            .collect();
        db.close().unwrap();
        results
    };

    let db = Database::open(dir.path()).unwrap();
    let docs = db.get_collection("docs").unwrap();
    assert_eq!(docs.count(), 50);

    // Same ids, same vectors, same metadata.
    let record = docs.get("v17", true).unwrap();
    assert_eq!(record.vector, vec![17.0, 2.0, 2.0, 3.0]);
    assert_eq!(record.metadata.unwrap()["i"], 17);

    // Flat index: identical top-k after reopen.
    let cancel = CancelToken::never();
    for (query, expected) in queries.iter().zip(&before) {
        let after: Vec<String> = docs
            .search(&SearchRequest::new(query.clone(), 5), &cancel)
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(&after, expected);
    }
}

#[test]
fn content_storage_round_trip() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path()).unwrap();
    let docs = db
        .create_collection(
            CollectionConfig::new("texts", 64, DistanceMetric::Cosine, IndexKind::Flat)
                .with_vectorizer(VectorizerConfig::local(64))
                .with_content_policy(ContentPolicy {
                    enabled: true,
                    field: "_content".to_string(),
                    max_bytes: 1024,
                }),
        )
        .unwrap();
    let cancel = CancelToken::never();

    docs.insert_text("x", "hello world", None, &cancel).unwrap();
    docs.insert_text("y", "entirely different words", None, &cancel)
        .unwrap();

    let hits = docs.search_text("hello world", 1, None, &cancel).unwrap();
    assert_eq!(hits[0].id, "x");
    assert!(hits[0].score < 1e-3);
    assert_eq!(hits[0].content.as_deref(), Some("hello world"));
}

#[test]
fn get_returns_same_vector_and_metadata() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path()).unwrap();
    let docs = db
        .create_collection(CollectionConfig::new(
            "docs",
            8,
            DistanceMetric::Cosine,
            IndexKind::Flat,
        ))
        .unwrap();
    let cancel = CancelToken::never();

    let vector: Vec<f32> = (0..8).map(|i| i as f32 * 0.5).collect();
    let metadata = json!({ "title": "a doc", "tags": ["x", "y"] });
    docs.insert(
        VectorRecord::new("doc-1", vector.clone(), Some(metadata.clone())),
        &cancel,
    )
    .unwrap();

    let record = docs.get("doc-1", true).unwrap();
    assert_eq!(record.vector, vector);
    assert_eq!(record.metadata.unwrap(), metadata);

    // A search for the exact vector finds it with ~zero distance.
    let hits = docs
        .search(&SearchRequest::new(vector, 1), &cancel)
        .unwrap();
    assert_eq!(hits[0].id, "doc-1");
    assert!(hits[0].score < 1e-5);
}
