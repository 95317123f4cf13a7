//! Tests for collection search

use super::types::{Collection, CollectionConfig, ContentPolicy};
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::distance::DistanceMetric;
use crate::embedding::VectorizerConfig;
use crate::error::ErrorKind;
use crate::filter::{Condition, Filter};
use crate::index::{HnswParams, IndexKind};
use crate::record::{SearchRequest, VectorRecord};
use serde_json::json;
use tempfile::tempdir;

fn engine() -> EngineConfig {
    let mut engine = EngineConfig::default();
    engine.io.async_workers = 2;
    engine.search.max_workers = 2;
    engine
}

fn basis_collection(dir: &std::path::Path) -> Collection {
    let config = CollectionConfig {
        name: "docs".to_string(),
        dimension: 3,
        metric: DistanceMetric::Cosine,
        index_kind: IndexKind::Flat,
        vectorizer: None,
        hnsw_params: HnswParams::default(),
        content: ContentPolicy::default(),
        count: 0,
        schema_version: 1,
    };
    let collection = Collection::create(dir.join("docs"), config, &engine()).unwrap();
    let cancel = CancelToken::never();
    collection
        .insert(VectorRecord::new("a", vec![1.0, 0.0, 0.0], Some(json!({"n": 1}))), &cancel)
        .unwrap();
    collection
        .insert(VectorRecord::new("b", vec![0.0, 1.0, 0.0], Some(json!({"n": 2}))), &cancel)
        .unwrap();
    collection
        .insert(VectorRecord::new("c", vec![0.0, 0.0, 1.0], Some(json!({"n": 3}))), &cancel)
        .unwrap();
    collection
}

#[test]
fn test_basis_vector_search() {
    let dir = tempdir().unwrap();
    let collection = basis_collection(dir.path());

    let hits = collection
        .search(&SearchRequest::new(vec![1.0, 0.0, 0.0], 2), &CancelToken::never())
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "a");
    assert!(hits[0].score.abs() < 1e-5);
    // Orthogonal vectors score 1 under cosine distance.
    assert!((hits[1].score - 1.0).abs() < 1e-5);
}

#[test]
fn test_search_includes_requested_fields() {
    let dir = tempdir().unwrap();
    let collection = basis_collection(dir.path());

    let request = SearchRequest::new(vec![1.0, 0.0, 0.0], 1).with_vectors();
    let hits = collection.search(&request, &CancelToken::never()).unwrap();
    assert_eq!(hits[0].vector.as_ref().unwrap(), &vec![1.0, 0.0, 0.0]);
    assert_eq!(hits[0].metadata.as_ref().unwrap()["n"], 1);

    // Metadata can be omitted.
    let mut request = SearchRequest::new(vec![1.0, 0.0, 0.0], 1);
    request.include_metadata = false;
    let hits = collection.search(&request, &CancelToken::never()).unwrap();
    assert!(hits[0].metadata.is_none());
    assert!(hits[0].vector.is_none());
}

#[test]
fn test_hits_are_defensive_copies() {
    let dir = tempdir().unwrap();
    let collection = basis_collection(dir.path());

    let request = SearchRequest::new(vec![1.0, 0.0, 0.0], 1).with_vectors();
    let mut hits = collection.search(&request, &CancelToken::never()).unwrap();
    hits[0].vector.as_mut().unwrap()[0] = 99.0;
    hits[0].metadata = Some(json!({"mutated": true}));

    let stored = collection.get("a", true).unwrap();
    assert_eq!(stored.vector, vec![1.0, 0.0, 0.0]);
    assert_eq!(stored.metadata.unwrap()["n"], 1);
}

#[test]
fn test_search_dimension_mismatch() {
    let dir = tempdir().unwrap();
    let collection = basis_collection(dir.path());
    let err = collection
        .search(&SearchRequest::new(vec![1.0, 0.0], 1), &CancelToken::never())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
}

#[test]
fn test_search_with_filter() {
    let dir = tempdir().unwrap();
    let collection = basis_collection(dir.path());

    let request = SearchRequest::new(vec![1.0, 0.0, 0.0], 3)
        .with_filter(Filter::new(Condition::gt("n", 1)));
    let hits = collection.search(&request, &CancelToken::never()).unwrap();

    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.id != "a"));
}

#[test]
fn test_repeated_search_served_from_cache() {
    let dir = tempdir().unwrap();
    let collection = basis_collection(dir.path());
    let cancel = CancelToken::never();

    let request = SearchRequest::new(vec![1.0, 0.0, 0.0], 2);
    let first = collection.search(&request, &cancel).unwrap();
    let second = collection.search(&request, &cancel).unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.score, b.score);
    }

    let stats = collection.info().cache;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[test]
fn test_insert_invalidates_cache() {
    let dir = tempdir().unwrap();
    let collection = basis_collection(dir.path());
    let cancel = CancelToken::never();

    let request = SearchRequest::new(vec![0.9, 0.1, 0.0], 1);
    collection.search(&request, &cancel).unwrap();

    // A closer vector arrives; the cached response must not survive.
    collection
        .insert(VectorRecord::without_metadata("d", vec![0.9, 0.1, 0.0]), &cancel)
        .unwrap();

    let hits = collection.search(&request, &cancel).unwrap();
    assert_eq!(hits[0].id, "d");
}

#[test]
fn test_delete_invalidates_cache() {
    let dir = tempdir().unwrap();
    let collection = basis_collection(dir.path());
    let cancel = CancelToken::never();

    let request = SearchRequest::new(vec![1.0, 0.0, 0.0], 1);
    let hits = collection.search(&request, &cancel).unwrap();
    assert_eq!(hits[0].id, "a");

    collection.delete("a", &cancel).unwrap();
    let hits = collection.search(&request, &cancel).unwrap();
    assert_ne!(hits[0].id, "a");
}

#[test]
fn test_search_text_round_trip_with_content() {
    let dir = tempdir().unwrap();
    let config = CollectionConfig {
        name: "texts".to_string(),
        dimension: 64,
        metric: DistanceMetric::Cosine,
        index_kind: IndexKind::Flat,
        vectorizer: Some(VectorizerConfig::local(64)),
        hnsw_params: HnswParams::default(),
        content: ContentPolicy {
            enabled: true,
            field: "_content".to_string(),
            max_bytes: 1024,
        },
        count: 0,
        schema_version: 1,
    };
    let collection = Collection::create(dir.path().join("texts"), config, &engine()).unwrap();
    let cancel = CancelToken::never();

    collection.insert_text("x", "hello world", None, &cancel).unwrap();
    collection
        .insert_text("y", "completely unrelated topic", None, &cancel)
        .unwrap();

    let hits = collection
        .search_text("hello world", 2, None, &cancel)
        .unwrap();
    assert_eq!(hits[0].id, "x");
    assert!(hits[0].score < 1e-3);
    assert_eq!(hits[0].content.as_deref(), Some("hello world"));
    // The reserved field does not leak into the metadata copy.
    if let Some(metadata) = &hits[0].metadata {
        assert!(metadata.get("_content").is_none());
    }
}

#[test]
fn test_offset_pagination() {
    let dir = tempdir().unwrap();
    let config = CollectionConfig {
        name: "nums".to_string(),
        dimension: 1,
        metric: DistanceMetric::Euclidean,
        index_kind: IndexKind::Flat,
        vectorizer: None,
        hnsw_params: HnswParams::default(),
        content: ContentPolicy::default(),
        count: 0,
        schema_version: 1,
    };
    let collection = Collection::create(dir.path().join("nums"), config, &engine()).unwrap();
    let cancel = CancelToken::never();
    for i in 0..10 {
        collection
            .insert(VectorRecord::without_metadata(format!("v{i}"), vec![i as f32]), &cancel)
            .unwrap();
    }

    let request = SearchRequest::new(vec![0.0], 3).with_offset(2);
    let hits = collection.search(&request, &cancel).unwrap();
    assert_eq!(
        hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(),
        vec!["v2", "v3", "v4"]
    );
}

#[test]
fn test_hnsw_search_with_filter() {
    let dir = tempdir().unwrap();
    let config = CollectionConfig {
        name: "graph".to_string(),
        dimension: 4,
        metric: DistanceMetric::Euclidean,
        index_kind: IndexKind::Hnsw,
        vectorizer: None,
        hnsw_params: HnswParams::default(),
        content: ContentPolicy::default(),
        count: 0,
        schema_version: 1,
    };
    let collection = Collection::create(dir.path().join("graph"), config, &engine()).unwrap();
    let cancel = CancelToken::never();

    for i in 0..200 {
        collection
            .insert(
                VectorRecord::new(
                    format!("v{i}"),
                    vec![i as f32, 0.0, 0.0, 0.0],
                    Some(json!({ "even": i % 2 == 0 })),
                ),
                &cancel,
            )
            .unwrap();
    }

    let request = SearchRequest::new(vec![10.0, 0.0, 0.0, 0.0], 5)
        .with_filter(Filter::new(Condition::eq("even", true)));
    let hits = collection.search(&request, &cancel).unwrap();

    assert!(!hits.is_empty());
    for hit in &hits {
        let n: usize = hit.id[1..].parse().unwrap();
        assert_eq!(n % 2, 0, "{} violates the filter", hit.id);
    }
    assert_eq!(hits[0].id, "v10");
}

#[test]
fn test_cancelled_search() {
    let dir = tempdir().unwrap();
    let collection = basis_collection(dir.path());
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = collection
        .search(&SearchRequest::new(vec![1.0, 0.0, 0.0], 1), &cancel)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}
