use std::cmp::Ordering;
use std::fmt;
use std::mem;
use std::sync::Arc;

type Link<K, V> = Option<Arc<Node<K, V>>>;

#[derive(Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    height: u32,
    left: Link<K, V>,
    right: Link<K, V>,
}

impl<K, V> Node<K, V> {
    fn leaf(key: K, value: V) -> Self {
        Self {
            key,
            value,
            height: 1,
            left: None,
            right: None,
        }
    }

    fn update_height(&mut self) {
        self.height = 1 + height(&self.left).max(height(&self.right));
    }

    fn balance(&self) -> i64 {
        i64::from(height(&self.left)) - i64::from(height(&self.right))
    }
}

fn height<K, V>(link: &Link<K, V>) -> u32 {
    link.as_ref().map_or(0, |n| n.height)
}

/// A persistent ordered map.
///
/// `clone` copies the root pointer only. Writes copy the nodes on the path
/// from the root to the modified entry when those nodes are shared with
/// another map value, so every previously cloned value keeps observing its
/// own contents.
pub struct Map<K, V> {
    root: Link<K, V>,
    len: usize,
}

impl<K, V> Clone for Map<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
        }
    }
}

impl<K, V> Default for Map<K, V> {
    fn default() -> Self {
        Self { root: None, len: 0 }
    }
}

impl<K, V> Map<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reports whether both maps share the same root.
    ///
    /// `true` implies equal contents; `false` does not imply a difference.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Iterates entries in ascending key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut iter = Iter {
            stack: Vec::with_capacity(height(&self.root) as usize),
            remaining: self.len,
        };
        iter.push_left(&self.root);
        iter
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    pub fn clear(&mut self) {
        self.root = None;
        self.len = 0;
    }

    /// Releases this value's reference to the shared tree.
    ///
    /// Nodes still referenced by other map values stay alive.
    pub fn destroy(&mut self) {
        self.clear();
    }
}

impl<K: Ord, V> Map<K, V> {
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut link = &self.root;
        while let Some(node) = link {
            match key.cmp(&node.key) {
                Ordering::Less => link = &node.left,
                Ordering::Greater => link = &node.right,
                Ordering::Equal => return Some(&node.value),
            }
        }
        None
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }
}

impl<K: Ord + Clone, V: Clone> Map<K, V> {
    /// Inserts or replaces `key`, returning the previous value.
    pub fn set(&mut self, key: K, value: V) -> Option<V> {
        let previous = insert(&mut self.root, key, value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Removes `key`. Returns whether an entry was removed.
    pub fn delete(&mut self, key: &K) -> bool {
        self.remove(key).is_some()
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        // Avoid copying a shared path when there is nothing to remove.
        if !self.contains_key(key) {
            return None;
        }
        let removed = remove(&mut self.root, key);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Returns a new map with `key` set, leaving `self` untouched.
    #[must_use]
    pub fn with(&self, key: K, value: V) -> Self {
        let mut next = self.clone();
        next.set(key, value);
        next
    }

    /// Returns a new map without `key`, leaving `self` untouched.
    #[must_use]
    pub fn without(&self, key: &K) -> Self {
        let mut next = self.clone();
        next.delete(key);
        next
    }

    /// Keeps only the entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) {
        let doomed: Vec<K> = self
            .iter()
            .filter(|(k, v)| !keep(k, v))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            self.delete(key);
        }
    }
}

fn insert<K: Ord + Clone, V: Clone>(link: &mut Link<K, V>, key: K, value: V) -> Option<V> {
    let Some(node) = link else {
        *link = Some(Arc::new(Node::leaf(key, value)));
        return None;
    };
    let node = Arc::make_mut(node);
    let previous = match key.cmp(&node.key) {
        Ordering::Less => insert(&mut node.left, key, value),
        Ordering::Greater => insert(&mut node.right, key, value),
        Ordering::Equal => return Some(mem::replace(&mut node.value, value)),
    };
    if previous.is_none() {
        rebalance(link);
    }
    previous
}

fn remove<K: Ord + Clone, V: Clone>(link: &mut Link<K, V>, key: &K) -> Option<V> {
    let node = Arc::make_mut(link.as_mut()?);
    let removed = match key.cmp(&node.key) {
        Ordering::Less => remove(&mut node.left, key),
        Ordering::Greater => remove(&mut node.right, key),
        Ordering::Equal => {
            if node.right.is_none() {
                let left = node.left.take();
                let old = link.take()?;
                *link = left;
                return Some(into_node(old).value);
            }
            let (min_key, min_value) = remove_min(&mut node.right)?;
            node.key = min_key;
            Some(mem::replace(&mut node.value, min_value))
        }
    };
    if removed.is_some() {
        rebalance(link);
    }
    removed
}

fn remove_min<K: Clone, V: Clone>(link: &mut Link<K, V>) -> Option<(K, V)> {
    let node = Arc::make_mut(link.as_mut()?);
    if node.left.is_some() {
        let min = remove_min(&mut node.left);
        rebalance(link);
        return min;
    }
    let right = node.right.take();
    let old = link.take()?;
    *link = right;
    let old = into_node(old);
    Some((old.key, old.value))
}

fn into_node<K: Clone, V: Clone>(node: Arc<Node<K, V>>) -> Node<K, V> {
    Arc::try_unwrap(node).unwrap_or_else(|shared| (*shared).clone())
}

fn rebalance<K: Clone, V: Clone>(link: &mut Link<K, V>) {
    let Some(node) = link.as_mut() else {
        return;
    };
    let node = Arc::make_mut(node);
    node.update_height();
    let balance = node.balance();
    if balance > 1 {
        if node.left.as_ref().is_some_and(|l| l.balance() < 0) {
            rotate_left(&mut node.left);
        }
        rotate_right(link);
    } else if balance < -1 {
        if node.right.as_ref().is_some_and(|r| r.balance() > 0) {
            rotate_right(&mut node.right);
        }
        rotate_left(link);
    }
}

fn rotate_right<K: Clone, V: Clone>(link: &mut Link<K, V>) {
    let Some(mut node) = link.take() else {
        return;
    };
    let Some(mut left) = Arc::make_mut(&mut node).left.take() else {
        *link = Some(node);
        return;
    };
    {
        let n = Arc::make_mut(&mut node);
        n.left = Arc::make_mut(&mut left).right.take();
        n.update_height();
    }
    let l = Arc::make_mut(&mut left);
    l.right = Some(node);
    l.update_height();
    *link = Some(left);
}

fn rotate_left<K: Clone, V: Clone>(link: &mut Link<K, V>) {
    let Some(mut node) = link.take() else {
        return;
    };
    let Some(mut right) = Arc::make_mut(&mut node).right.take() else {
        *link = Some(node);
        return;
    };
    {
        let n = Arc::make_mut(&mut node);
        n.right = Arc::make_mut(&mut right).left.take();
        n.update_height();
    }
    let r = Arc::make_mut(&mut right);
    r.left = Some(node);
    r.update_height();
    *link = Some(right);
}

/// In-order iterator over a [`Map`].
pub struct Iter<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn push_left(&mut self, mut link: &'a Link<K, V>) {
        while let Some(node) = link {
            self.stack.push(node);
            link = &node.left;
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left(&node.right);
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<'a, K, V> IntoIterator for &'a Map<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Ord + Clone, V: Clone> FromIterator<(K, V)> for Map<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Map::new();
        map.extend(iter);
        map
    }
}

impl<K: Ord + Clone, V: Clone> Extend<(K, V)> for Map<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.set(k, v);
        }
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for Map<K, V> {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }
        if let (Some(a), Some(b)) = (&self.root, &other.root) {
            if Arc::ptr_eq(a, b) {
                return true;
            }
        }
        self.iter().eq(other.iter())
    }
}

impl<K: Eq, V: Eq> Eq for Map<K, V> {}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Map<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
impl<K: Ord, V> Map<K, V> {
    /// Checks ordering, AVL balance, and cached heights.
    pub(crate) fn assert_invariants(&self) {
        fn walk<K: Ord, V>(link: &Link<K, V>, lo: Option<&K>, hi: Option<&K>) -> (u32, usize) {
            let Some(node) = link else {
                return (0, 0);
            };
            assert!(lo.map_or(true, |lo| *lo < node.key), "ordering violated");
            assert!(hi.map_or(true, |hi| node.key < *hi), "ordering violated");
            let (lh, lc) = walk(&node.left, lo, Some(&node.key));
            let (rh, rc) = walk(&node.right, Some(&node.key), hi);
            assert!(lh.abs_diff(rh) <= 1, "unbalanced node");
            assert_eq!(node.height, 1 + lh.max(rh), "stale height");
            (node.height, lc + rc + 1)
        }
        let (_, count) = walk(&self.root, None, None);
        assert_eq!(count, self.len);
    }
}
