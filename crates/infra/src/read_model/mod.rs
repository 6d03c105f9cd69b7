//! Disposable read-model storage.
//!
//! Read models are derived views; events stay the source of truth, so any
//! store here can be cleared and rebuilt from the stream at will.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

/// Key/value store abstraction for disposable read models.
pub trait ReadModelStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn upsert(&self, key: K, value: V);
    fn list(&self) -> Vec<V>;
    /// Clear all records (rebuild support).
    fn clear(&self);
}

impl<K, V, S> ReadModelStore<K, V> for Arc<S>
where
    S: ReadModelStore<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Option<V> {
        (**self).get(key)
    }

    fn upsert(&self, key: K, value: V) {
        (**self).upsert(key, value)
    }

    fn list(&self) -> Vec<V> {
        (**self).list()
    }

    fn clear(&self) {
        (**self).clear()
    }
}

/// In-memory read-model store for tests/dev.
#[derive(Debug)]
pub struct InMemoryReadModelStore<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> InMemoryReadModelStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryReadModelStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ReadModelStore<K, V> for InMemoryReadModelStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(key).cloned()
    }

    fn upsert(&self, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(key, value);
        }
    }

    fn list(&self) -> Vec<V> {
        match self.inner.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => vec![],
        }
    }

    fn clear(&self) {
        if let Ok(mut map) = self.inner.write() {
            map.clear();
        }
    }
}
