//! Cache registry.

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::{CacheConfig, TypedCache};

/// Shared map of named caches.
///
/// Asking for a name twice with the same key/value types returns the same
/// cache. Asking with different types returns a fresh unregistered cache and
/// logs a warning, so a naming clash degrades to a cache miss.
#[derive(Clone, Default)]
pub struct CacheRegistry {
    caches: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

struct CacheEntry {
    cache: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl CacheEntry {
    fn downcast<K, V>(&self) -> Option<TypedCache<K, V>>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.cache.downcast_ref::<TypedCache<K, V>>().cloned()
    }
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an existing cache or register a new one.
    pub fn get_or_create<K, V>(&self, name: &str, config: CacheConfig) -> TypedCache<K, V>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let mut caches = self.caches.write();

        if let Some(entry) = caches.get(name) {
            if let Some(cache) = entry.downcast::<K, V>() {
                return cache;
            }
            warn!(
                "Cache '{}' already registered as {}, handing out a private {}",
                name,
                entry.type_name,
                std::any::type_name::<TypedCache<K, V>>()
            );
            return TypedCache::new(name, config);
        }

        debug!("Creating cache: {}", name);
        let cache = TypedCache::<K, V>::new(name, config);
        caches.insert(
            name.to_string(),
            CacheEntry {
                cache: Box::new(cache.clone()),
                type_name: std::any::type_name::<TypedCache<K, V>>(),
            },
        );
        cache
    }

    pub fn len(&self) -> usize {
        self.caches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.read().is_empty()
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let caches = self.caches.read();
        f.debug_struct("CacheRegistry")
            .field("cache_count", &caches.len())
            .field("cache_names", &caches.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_name_shares_entries() {
        let registry = CacheRegistry::new();
        let a = registry.get_or_create::<u64, String>("profiles", CacheConfig::default());
        let b = registry.get_or_create::<u64, String>("profiles", CacheConfig::default());

        a.insert(1, "one".to_string());
        assert_eq!(b.get(&1).as_deref(), Some("one"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_type_clash_gets_private_cache() {
        let registry = CacheRegistry::new();
        let a = registry.get_or_create::<u64, String>("clash", CacheConfig::default());
        let b = registry.get_or_create::<u64, u32>("clash", CacheConfig::default());

        a.insert(1, "one".to_string());
        b.insert(1, 7);
        assert_eq!(a.get(&1).as_deref(), Some("one"));
        assert_eq!(b.get(&1), Some(7));
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
    }
}
