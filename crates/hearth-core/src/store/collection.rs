// ── Generic keyed collection ──
//
// Lock-free concurrent storage with O(1) lookups. Change notification
// is the subscription registry's job, so mutations here cost nothing
// beyond the map write.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;

/// A lock-free collection of shared values keyed by `K`.
pub(crate) struct Collection<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    by_key: DashMap<K, Arc<T>>,
}

impl<K, T> Collection<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            by_key: DashMap::new(),
        }
    }

    /// Insert or replace a value, returning the stored handle.
    pub(crate) fn upsert(&self, key: K, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.by_key.insert(key, Arc::clone(&value));
        value
    }

    /// Remove a value by key. Returns the removed value if it existed.
    pub(crate) fn remove<Q>(&self, key: &Q) -> Option<Arc<T>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.by_key.remove(key).map(|(_, v)| v)
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<Arc<T>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn keys(&self) -> Vec<K> {
        self.by_key.iter().map(|r| r.key().clone()).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_value_for_existing_key() {
        let col: Collection<String, &str> = Collection::new();
        col.upsert("a".into(), "one");
        col.upsert("a".into(), "two");
        assert_eq!(col.len(), 1);
        assert_eq!(*col.get("a").unwrap(), "two");
    }

    #[test]
    fn remove_returns_value_only_when_present() {
        let col: Collection<String, u32> = Collection::new();
        col.upsert("a".into(), 1);
        assert!(col.remove("missing").is_none());
        assert_eq!(*col.remove("a").unwrap(), 1);
        assert!(col.get("a").is_none());
        assert!(col.keys().is_empty());
    }
}
