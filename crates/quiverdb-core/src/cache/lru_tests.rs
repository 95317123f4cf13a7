//! Tests for the LRU cache

use super::lru::LruCache;

#[test]
fn test_insert_and_get() {
    let cache: LruCache<String, i32> = LruCache::new(10);
    cache.insert("a".into(), 1);
    assert_eq!(cache.get(&"a".to_string()), Some(1));
    assert_eq!(cache.get(&"b".to_string()), None);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_eviction_order_is_lru() {
    let cache: LruCache<i32, i32> = LruCache::new(2);
    cache.insert(1, 10);
    cache.insert(2, 20);
    // Touch 1 so 2 becomes the LRU entry.
    let _ = cache.get(&1);
    cache.insert(3, 30);

    assert_eq!(cache.get(&2), None);
    assert_eq!(cache.get(&1), Some(10));
    assert_eq!(cache.get(&3), Some(30));
    assert_eq!(cache.evictions(), 1);
}

#[test]
fn test_reinsert_updates_value_without_eviction() {
    let cache: LruCache<i32, i32> = LruCache::new(2);
    cache.insert(1, 10);
    cache.insert(2, 20);
    cache.insert(1, 11);

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.evictions(), 0);
    assert_eq!(cache.get(&1), Some(11));
}

#[test]
fn test_peek_does_not_update_recency() {
    let cache: LruCache<i32, i32> = LruCache::new(2);
    cache.insert(1, 10);
    cache.insert(2, 20);
    // Peek must not rescue entry 1 from eviction.
    let _ = cache.peek(&1);
    cache.insert(3, 30);

    assert_eq!(cache.peek(&1), None);
    assert_eq!(cache.peek(&2), Some(20));
}

#[test]
fn test_retain() {
    let cache: LruCache<i32, i32> = LruCache::new(10);
    for i in 0..6 {
        cache.insert(i, i * 10);
    }
    cache.retain(|k, _| k % 2 == 0);
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.peek(&2), Some(20));
    assert_eq!(cache.peek(&3), None);
}

#[test]
fn test_clear() {
    let cache: LruCache<i32, i32> = LruCache::new(10);
    cache.insert(1, 1);
    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn test_zero_capacity_clamped() {
    let cache: LruCache<i32, i32> = LruCache::new(0);
    cache.insert(1, 1);
    assert_eq!(cache.capacity(), 1);
    assert_eq!(cache.len(), 1);
}
