//! Bounded LRU cache fronting expensive provider calls.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;

struct LruInner<K, V> {
    map: HashMap<K, V>,
    /// Recency order, least recently used at the front.
    order: VecDeque<K>,
}

/// Strict least-recently-used cache. `get` promotes the entry to most
/// recently used; inserting beyond capacity evicts the LRU entry.
///
/// Internally synchronized; safe to share across jobs. No TTL, entries
/// leave only by eviction.
pub struct LruCache<K, V> {
    inner: Mutex<LruInner<K, V>>,
    capacity: usize,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
        }
    }

    /// Look up a key, promoting it to most recently used on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().expect("lru cache poisoned");
        let value = inner.map.get(key).cloned()?;
        promote(&mut inner.order, key);
        Some(value)
    }

    /// Insert or overwrite an entry, evicting the least recently used
    /// entry if the cache is full.
    pub fn insert(&self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().expect("lru cache poisoned");

        if inner.map.insert(key.clone(), value).is_some() {
            promote(&mut inner.order, &key);
            return;
        }

        if inner.map.len() > self.capacity
            && let Some(evicted) = inner.order.pop_front()
        {
            inner.map.remove(&evicted);
        }
        inner.order.push_back(key);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lru cache poisoned").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Move `key` to the most-recently-used position.
fn promote<K: Eq + Clone>(order: &mut VecDeque<K>, key: &K) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        order.remove(pos);
        order.push_back(key.clone());
    }
}
