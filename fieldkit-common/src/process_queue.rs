//! Process queue
//!
//! Ordered key → value structure used to schedule validation work across the
//! records of one page.
//!
//! - O(1) lookup, removal, head/tail insertion and insertion after a key
//!   (entries are linked through their keys)
//! - FIFO by default, iteration in queue order
//! - Enqueue is idempotent on key: an existing entry keeps its value and
//!   position
//! - Optional numeric level per entry for level-scoped "am I first" queries
//!
//! Queue length equals the number of records on a page, so the linear scans
//! in [`ProcessQueue::is_first`] are not a concern.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use tracing::warn;

/// Where a new entry is inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement<K> {
    /// Front of the queue
    Head,
    /// Back of the queue
    Tail,
    /// Immediately after an existing key (falls back to tail if missing)
    After(K),
}

impl<K> Default for Placement<K> {
    fn default() -> Self {
        Placement::Tail
    }
}

#[derive(Debug)]
struct Node<K, V> {
    value: V,
    prev: Option<K>,
    next: Option<K>,
    level: Option<u32>,
}

/// Ordered map with positional insert
#[derive(Debug)]
pub struct ProcessQueue<K, V> {
    nodes: HashMap<K, Node<K, V>>,
    head: Option<K>,
    tail: Option<K>,
}

impl<K, V> ProcessQueue<K, V>
where
    K: Clone + Eq + Hash + Debug,
{
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the queue holds no entries
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert `value` under `key` at `placement`
    ///
    /// Re-enqueuing an existing key returns the stored value and changes
    /// nothing. Placing after a missing key logs a warning and appends.
    pub fn enqueue(&mut self, key: K, value: V, placement: Placement<K>) -> &V {
        if self.nodes.contains_key(&key) {
            return &self.nodes[&key].value;
        }

        let placement = match placement {
            Placement::After(anchor) if !self.nodes.contains_key(&anchor) => {
                warn!(
                    key = ?key,
                    anchor = ?anchor,
                    "Process queue anchor not found, appending at tail"
                );
                Placement::Tail
            }
            other => other,
        };

        let (prev, next) = match placement {
            Placement::Head => (None, self.head.clone()),
            Placement::Tail => (self.tail.clone(), None),
            Placement::After(anchor) => {
                let next = self.nodes[&anchor].next.clone();
                (Some(anchor), next)
            }
        };

        match &prev {
            Some(p) => {
                if let Some(node) = self.nodes.get_mut(p) {
                    node.next = Some(key.clone());
                }
            }
            None => self.head = Some(key.clone()),
        }
        match &next {
            Some(n) => {
                if let Some(node) = self.nodes.get_mut(n) {
                    node.prev = Some(key.clone());
                }
            }
            None => self.tail = Some(key.clone()),
        }

        self.nodes.insert(
            key.clone(),
            Node {
                value,
                prev,
                next,
                level: None,
            },
        );
        &self.nodes[&key].value
    }

    /// Value stored under `key`
    pub fn get(&self, key: &K) -> Option<&V> {
        self.nodes.get(key).map(|node| &node.value)
    }

    /// Mutable value stored under `key`
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.nodes.get_mut(key).map(|node| &mut node.value)
    }

    /// True if `key` is queued
    pub fn has(&self, key: &K) -> bool {
        self.nodes.contains_key(key)
    }

    /// Remove `key`, returning its value
    pub fn delete(&mut self, key: &K) -> Option<V> {
        let node = self.nodes.remove(key)?;

        match &node.prev {
            Some(p) => {
                if let Some(prev) = self.nodes.get_mut(p) {
                    prev.next = node.next.clone();
                }
            }
            None => self.head = node.next.clone(),
        }
        match &node.next {
            Some(n) => {
                if let Some(next) = self.nodes.get_mut(n) {
                    next.prev = node.prev.clone();
                }
            }
            None => self.tail = node.prev.clone(),
        }

        Some(node.value)
    }

    /// Remove and return the head entry
    pub fn dequeue(&mut self) -> Option<(K, V)> {
        let key = self.head.clone()?;
        let value = self.delete(&key)?;
        Some((key, value))
    }

    /// Head entry without removing it
    pub fn peek(&self) -> Option<(&K, &V)> {
        let key = self.head.as_ref()?;
        self.nodes.get_key_value(key).map(|(k, node)| (k, &node.value))
    }

    /// Assign the processing level of a queued key
    ///
    /// Returns false if the key is not queued.
    pub fn set_level_to_process(&mut self, key: &K, level: u32) -> bool {
        match self.nodes.get_mut(key) {
            Some(node) => {
                node.level = Some(level);
                true
            }
            None => false,
        }
    }

    /// Processing level of a queued key
    pub fn level(&self, key: &K) -> Option<u32> {
        self.nodes.get(key).and_then(|node| node.level)
    }

    /// Is `key` at the head of the queue?
    ///
    /// With a `level`, answers whether `key` is the first queued key carrying
    /// that level, ignoring keys of other levels queued before it.
    pub fn is_first(&self, key: &K, level: Option<u32>) -> bool {
        match level {
            None => self.head.as_ref() == Some(key),
            Some(level) => self
                .iter()
                .find(|(k, _)| self.nodes[*k].level == Some(level))
                .map(|(k, _)| k == key)
                .unwrap_or(false),
        }
    }

    /// Iterate entries in queue order
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            queue: self,
            cursor: self.head.as_ref(),
        }
    }

    /// Keys in queue order
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }
}

impl<K, V> Default for ProcessQueue<K, V>
where
    K: Clone + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

/// In-order iterator over a [`ProcessQueue`]
pub struct Iter<'a, K, V> {
    queue: &'a ProcessQueue<K, V>,
    cursor: Option<&'a K>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: Clone + Eq + Hash + Debug,
{
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.cursor?;
        let (key, node) = self.queue.nodes.get_key_value(key)?;
        self.cursor = node.next.as_ref();
        Some((key, &node.value))
    }
}

impl<'a, K, V> IntoIterator for &'a ProcessQueue<K, V>
where
    K: Clone + Eq + Hash + Debug,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
