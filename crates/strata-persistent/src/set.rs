use std::fmt;

use crate::map::Map;

/// A persistent ordered set backed by [`Map`].
pub struct Set<T> {
    inner: Map<T, ()>,
}

impl<T> Clone for Set<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Set<T> {
    fn default() -> Self {
        Self {
            inner: Map::default(),
        }
    }
}

impl<T> Set<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.inner.keys()
    }

    pub fn destroy(&mut self) {
        self.inner.destroy();
    }
}

impl<T: Ord> Set<T> {
    pub fn contains(&self, value: &T) -> bool {
        self.inner.contains_key(value)
    }
}

impl<T: Ord + Clone> Set<T> {
    /// Adds `value`. Returns whether it was newly inserted.
    pub fn add(&mut self, value: T) -> bool {
        self.inner.set(value, ()).is_none()
    }

    /// Removes `value`. Returns whether it was present.
    pub fn remove(&mut self, value: &T) -> bool {
        self.inner.delete(value)
    }
}

impl<T: Ord + Clone> FromIterator<T> for Set<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().map(|v| (v, ())).collect(),
        }
    }
}

impl<T: Ord + Clone> Extend<T> for Set<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.inner.extend(iter.into_iter().map(|v| (v, ())));
    }
}

impl<T: PartialEq> PartialEq for Set<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T: Eq> Eq for Set<T> {}

impl<T: fmt::Debug> fmt::Debug for Set<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
