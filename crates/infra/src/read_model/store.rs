use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use std::sync::Arc;

/// Key/value store for disposable read models.
///
/// Values can always be rebuilt from the event store, so a poisoned lock
/// degrades to "no data" rather than an error.
pub trait ReadStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn upsert(&self, key: K, value: V);
    fn remove(&self, key: &K) -> Option<V>;
    fn list(&self) -> Vec<V>;
    fn len(&self) -> usize;
    /// Drop every record (rebuild support).
    fn clear(&self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V, S> ReadStore<K, V> for Arc<S>
where
    S: ReadStore<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Option<V> {
        (**self).get(key)
    }

    fn upsert(&self, key: K, value: V) {
        (**self).upsert(key, value)
    }

    fn remove(&self, key: &K) -> Option<V> {
        (**self).remove(key)
    }

    fn list(&self) -> Vec<V> {
        (**self).list()
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn clear(&self) {
        (**self).clear()
    }
}

/// In-memory read model store.
#[derive(Debug)]
pub struct InMemoryReadStore<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> InMemoryReadStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryReadStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ReadStore<K, V> for InMemoryReadStore<K, V>
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

    fn remove(&self, key: &K) -> Option<V> {
        let mut map = self.inner.write().ok()?;
        map.remove(key)
    }

    fn list(&self) -> Vec<V> {
        match self.inner.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => vec![],
        }
    }

    fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    fn clear(&self) {
        if let Ok(mut map) = self.inner.write() {
            map.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_get_remove() {
        let store: InMemoryReadStore<u32, String> = InMemoryReadStore::new();
        store.upsert(1, "a".to_string());
        store.upsert(1, "b".to_string());

        assert_eq!(store.get(&1).as_deref(), Some("b"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.remove(&1).as_deref(), Some("b"));
        assert!(store.is_empty());
    }

    #[test]
    fn clear_drops_everything_through_arc() {
        let store = Arc::new(InMemoryReadStore::<u32, u32>::new());
        for i in 0..5 {
            store.upsert(i, i * 10);
        }
        store.clear();
        assert!(store.list().is_empty());
    }
}
