//! Per-tenant isolation scopes.
//!
//! Several logical apps can share one router process. Each scope shadows
//! the bindings a tenant may patch (its fetch and its incremental cache)
//! while everything else resolves through the shared [`RuntimeEnv`].
//!
//! [`RuntimeEnv`]: crate::runtime::RuntimeEnv

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::runtime::cache::SuspenseCacheStore;
use crate::runtime::fetch::EdgeFetch;

/// Bindings private to one isolation key.
pub struct IsolatedScope {
    key: String,
    fetch: OnceLock<Arc<EdgeFetch>>,
    incremental_cache: OnceLock<Arc<dyn SuspenseCacheStore>>,
}

impl IsolatedScope {
    fn new(key: String) -> Self {
        Self {
            key,
            fetch: OnceLock::new(),
            incremental_cache: OnceLock::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Install the scope's fetch. Only the first call takes effect; returns
    /// whether this call installed it.
    pub fn patch_fetch(&self, fetch: Arc<EdgeFetch>) -> bool {
        self.fetch.set(fetch).is_ok()
    }

    pub fn is_fetch_patched(&self) -> bool {
        self.fetch.get().is_some()
    }

    pub fn fetch(&self) -> Option<&Arc<EdgeFetch>> {
        self.fetch.get()
    }

    pub fn set_incremental_cache(&self, cache: Arc<dyn SuspenseCacheStore>) -> bool {
        self.incremental_cache.set(cache).is_ok()
    }

    pub fn incremental_cache(&self) -> Option<&Arc<dyn SuspenseCacheStore>> {
        self.incremental_cache.get()
    }
}

impl std::fmt::Debug for IsolatedScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedScope")
            .field("key", &self.key)
            .field("fetch_patched", &self.is_fetch_patched())
            .field("incremental_cache", &self.incremental_cache.get().is_some())
            .finish()
    }
}

/// Lazily created scopes, keyed by string and kept for the process lifetime.
#[derive(Debug, Default)]
pub struct IsolationRegistry {
    scopes: DashMap<String, Arc<IsolatedScope>>,
}

impl IsolationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The scope for `key`, created on first use.
    pub fn scope(&self, key: &str) -> Arc<IsolatedScope> {
        if let Some(scope) = self.scopes.get(key) {
            return scope.clone();
        }
        self.scopes
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(IsolatedScope::new(key.to_string())))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_reused_per_key() {
        let registry = IsolationRegistry::new();
        let a = registry.scope("shop");
        let b = registry.scope("shop");
        let c = registry.scope("blog");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_fetch_patched_once() {
        let registry = IsolationRegistry::new();
        let scope = registry.scope("shop");
        let first = Arc::new(EdgeFetch::new(reqwest::Client::new()));
        let second = Arc::new(EdgeFetch::new(reqwest::Client::new()));

        assert!(!scope.is_fetch_patched());
        assert!(scope.patch_fetch(first.clone()));
        assert!(!scope.patch_fetch(second));
        assert!(Arc::ptr_eq(scope.fetch().unwrap(), &first));
        assert!(registry.scope("other").fetch().is_none());
    }
}
