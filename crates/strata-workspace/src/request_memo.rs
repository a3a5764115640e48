use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

/// Sub-results shared by the computations of one request, keyed by tag.
///
/// Each tag is computed at most once and the memo is dropped with the
/// request. Requests that share several kinds of sub-result use an enum for
/// `V`, one variant per kind.
pub struct RequestMemo<T, V> {
    entries: HashMap<T, Arc<V>>,
}

impl<T, V> Default for RequestMemo<T, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: Eq + Hash, V> RequestMemo<T, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, tag: &T) -> bool {
        self.entries.contains_key(tag)
    }

    pub fn get(&self, tag: &T) -> Option<Arc<V>> {
        self.entries.get(tag).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_or_insert_with<F>(&mut self, tag: T, compute: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        Arc::clone(
            self.entries
                .entry(tag)
                .or_insert_with(|| Arc::new(compute())),
        )
    }

    /// Returns the value for `tag`, running `compute` on first use. Errors
    /// are returned, not memoized.
    pub async fn get_or_try_compute<E, F, Fut>(&mut self, tag: T, compute: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.entries.get(&tag) {
            return Ok(Arc::clone(value));
        }
        let value = Arc::new(compute().await?);
        self.entries.insert(tag, Arc::clone(&value));
        Ok(value)
    }
}

impl<T: fmt::Debug, V> fmt::Debug for RequestMemo<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}
