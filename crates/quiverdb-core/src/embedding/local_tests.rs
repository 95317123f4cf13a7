//! Tests for the local embedder

use super::local::LocalHashVectorizer;
use super::Vectorizer;
use crate::simd;

#[test]
fn test_deterministic() {
    let v = LocalHashVectorizer::new(64);
    let a = v.embed("hello world").unwrap();
    let b = v.embed("hello world").unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_dimension_and_unit_norm() {
    let v = LocalHashVectorizer::new(128);
    let e = v.embed("the quick brown fox").unwrap();
    assert_eq!(e.len(), 128);
    assert!((simd::norm(&e) - 1.0).abs() < 1e-5);
}

#[test]
fn test_case_and_punctuation_insensitive() {
    let v = LocalHashVectorizer::new(64);
    let a = v.embed("Hello, World!").unwrap();
    let b = v.embed("hello world").unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_different_texts_differ() {
    let v = LocalHashVectorizer::new(256);
    let a = v.embed("vector databases").unwrap();
    let b = v.embed("pancake recipes").unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_empty_text_is_zero_vector() {
    let v = LocalHashVectorizer::new(32);
    let e = v.embed("").unwrap();
    assert_eq!(e, vec![0.0; 32]);
}

#[test]
fn test_same_text_closest_under_cosine() {
    let v = LocalHashVectorizer::new(256);
    let query = v.embed("rust vector database").unwrap();
    let same = v.embed("rust vector database").unwrap();
    let other = v.embed("garden watering schedule").unwrap();

    let d_same = crate::distance::DistanceMetric::Cosine.score(&query, &same);
    let d_other = crate::distance::DistanceMetric::Cosine.score(&query, &other);
    assert!(d_same < 1e-3);
    assert!(d_same < d_other);
}

#[test]
fn test_batch_matches_single() {
    let v = LocalHashVectorizer::new(64);
    let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
    let batch = v.embed_batch(&texts).unwrap();
    assert_eq!(batch.len(), 3);
    for (text, embedding) in texts.iter().zip(&batch) {
        assert_eq!(embedding, &v.embed(text).unwrap());
    }
}
