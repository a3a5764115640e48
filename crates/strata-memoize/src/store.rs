use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use strata_scheduler::CancellationToken;

use crate::error::PromiseError;
use crate::promise::Promise;

const MIN_PRUNE_AT: usize = 64;

/// Deduplicates promises by key.
///
/// Only weak references are kept: once no holder retains a key's promise the
/// entry is eligible for eviction, and a later request starts afresh.
pub struct Store<K, V> {
    entries: Mutex<Entries<K, V>>,
}

struct Entries<K, V> {
    map: HashMap<K, Weak<Promise<V>>>,
    prune_at: usize,
}

impl<K, V> Default for Store<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                prune_at: MIN_PRUNE_AT,
            }),
        }
    }
}

impl<K, V> Store<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live promise for `key`, or registers a new one computed by
    /// `compute`.
    pub fn promise<F, Fut>(&self, key: K, compute: F) -> Arc<Promise<V>>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, PromiseError>> + Send + 'static,
    {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.map.get(&key).and_then(Weak::upgrade) {
            return existing;
        }
        let promise = Promise::new(format!("{key:?}"), compute);
        entries.map.insert(key, Arc::downgrade(&promise));
        if entries.map.len() >= entries.prune_at {
            entries.map.retain(|_, weak| weak.strong_count() > 0);
            entries.prune_at = (entries.map.len() * 2).max(MIN_PRUNE_AT);
        }
        promise
    }

    /// Waits for the value of `key`, computing it if necessary.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: K,
        token: &CancellationToken,
        compute: F,
    ) -> Result<V, PromiseError>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, PromiseError>> + Send + 'static,
    {
        let promise = self.promise(key, compute);
        promise.get(token).await
    }

    /// Number of entries whose promise is still held somewhere.
    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock();
        entries.map.retain(|_, weak| weak.strong_count() > 0);
        entries.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
