//! Tests for HNSW parameters

use super::params::HnswParams;

#[test]
fn test_defaults() {
    let params = HnswParams::default();
    assert_eq!(params.m, 16);
    assert_eq!(params.m0, 32);
    assert_eq!(params.ef_construction, 200);
    assert_eq!(params.ef_search, 50);
}

#[test]
fn test_custom_derives_m0() {
    let params = HnswParams::custom(24, 300);
    assert_eq!(params.m, 24);
    assert_eq!(params.m0, 48);
    assert_eq!(params.ef_construction, 300);
}

#[test]
fn test_custom_clamps_tiny_m() {
    let params = HnswParams::custom(1, 100);
    assert_eq!(params.m, 2);
    assert_eq!(params.m0, 4);
}

#[test]
fn test_level_mult() {
    let params = HnswParams::default();
    let expected = 1.0 / (16.0f64).ln();
    assert!((params.level_mult() - expected).abs() < 1e-12);
}

#[test]
fn test_presets() {
    let fast = HnswParams::fast();
    let recall = HnswParams::high_recall();
    assert!(fast.m < recall.m);
    assert!(fast.ef_construction < recall.ef_construction);
    assert!(recall.ef_search > HnswParams::default().ef_search);
}

#[test]
fn test_with_seed() {
    let params = HnswParams::default().with_seed(42);
    assert_eq!(params.seed, 42);
}

#[test]
fn test_serde_round_trip() {
    let params = HnswParams::custom(20, 250).with_seed(7);
    let json = serde_json::to_string(&params).unwrap();
    let back: HnswParams = serde_json::from_str(&json).unwrap();
    assert_eq!(back, params);
}
