//! Fixed-bucket string dictionary.
//!
//! A hash-bucket array with a small prime bucket count and a side list that
//! preserves first-insertion key order for enumeration. There is no
//! resizing: pathological key sets degrade to a linear bucket scan.
//!
//! `set` replaces the value of an existing key, so a key maps to exactly
//! one entry and lookup never depends on bucket-scan order.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use spin::Mutex;

use crate::environment::DICT_BUCKETS;

/// Polynomial rolling hash: `h = c + 31 * h` over the key bytes.
fn bucket_index(key: &str) -> usize {
    let mut h: u32 = 0;
    for &c in key.as_bytes() {
        h = (c as u32).wrapping_add(h.wrapping_mul(31));
    }
    h as usize % DICT_BUCKETS
}

struct DictInner<V> {
    buckets: Vec<Vec<(String, V)>>,
    /// Keys in first-insertion order, for enumeration.
    order: Vec<String>,
}

pub struct Dict<V> {
    inner: Mutex<DictInner<V>>,
}

impl<V> Dict<V> {
    pub fn new() -> Self {
        let mut buckets = Vec::with_capacity(DICT_BUCKETS);
        for _ in 0..DICT_BUCKETS {
            buckets.push(Vec::new());
        }
        Self {
            inner: Mutex::new(DictInner {
                buckets,
                order: Vec::new(),
            }),
        }
    }

    /// Insert or replace the value for `key`.
    pub fn set(&self, key: &str, value: V) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let bucket = &mut inner.buckets[bucket_index(key)];
        if let Some(slot) = bucket.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
            return;
        }
        bucket.push((key.to_string(), value));
        inner.order.push(key.to_string());
    }

    /// Remove `key`, returning its value if present.
    pub fn remove(&self, key: &str) -> Option<V> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let bucket = &mut inner.buckets[bucket_index(key)];
        let pos = bucket.iter().position(|(k, _)| k == key)?;
        let (_, value) = bucket.remove(pos);
        inner.order.retain(|k| k != key);
        Some(value)
    }

    /// Keys in first-set order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().order.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().order.is_empty()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for bucket in inner.buckets.iter_mut() {
            bucket.clear();
        }
        inner.order.clear();
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let inner = self.inner.lock();
        inner.buckets[bucket_index(key)].iter().any(|(k, _)| k == key)
    }
}

impl<V: Clone> Dict<V> {
    /// Look up `key`. Values are cheap handles (`Arc` and friends), so the
    /// lookup clones rather than leaking a guard.
    pub fn get(&self, key: &str) -> Option<V> {
        let inner = self.inner.lock();
        inner.buckets[bucket_index(key)]
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }
}

impl<V> Default for Dict<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let d: Dict<u32> = Dict::new();
        d.set("alpha", 1);
        d.set("beta", 2);
        assert_eq!(d.get("alpha"), Some(1));
        assert_eq!(d.get("beta"), Some(2));
        assert_eq!(d.get("gamma"), None);
    }

    #[test]
    fn set_replaces_existing_key() {
        let d: Dict<u32> = Dict::new();
        d.set("key", 1);
        d.set("key", 2);
        assert_eq!(d.get("key"), Some(2));
        assert_eq!(d.len(), 1);
        assert_eq!(d.keys(), ["key"]);
    }

    #[test]
    fn keys_enumerate_in_first_set_order() {
        let d: Dict<u32> = Dict::new();
        // More keys than buckets so several collide.
        for i in 0..100 {
            d.set(&alloc::format!("key{}", i), i);
        }
        let keys = d.keys();
        assert_eq!(keys.len(), 100);
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(k, &alloc::format!("key{}", i));
        }
        // Every key still resolves despite bucket collisions.
        for i in 0..100 {
            assert_eq!(d.get(&alloc::format!("key{}", i)), Some(i));
        }
    }

    #[test]
    fn remove_and_clear() {
        let d: Dict<&'static str> = Dict::new();
        d.set("a", "1");
        d.set("b", "2");
        assert_eq!(d.remove("a"), Some("1"));
        assert_eq!(d.remove("a"), None);
        assert_eq!(d.keys(), ["b"]);
        d.clear();
        assert!(d.is_empty());
        assert_eq!(d.get("b"), None);
    }
}
