//! Recency list
//!
//! Doubly linked list of entries stored in an arena, plus an ordered key index.
//! Nodes are addressed by generational handles so a handle that outlives its
//! node can never resolve to a reused slot.

use std::collections::BTreeMap;

/// Address of a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle {
    index: usize,
    generation: u32,
}

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Slot<K, V> {
    generation: u32,
    node: Option<Node<K, V>>,
}

/// Entries ordered from most recently touched (front) to least (back)
pub struct RecencyList<K, V> {
    slots: Vec<Slot<K, V>>,
    free: Vec<usize>,
    index: BTreeMap<K, Handle>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K: Ord + Clone, V> RecencyList<K, V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: BTreeMap::new(),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn handle(&self, key: &K) -> Option<Handle> {
        self.index.get(key).copied()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let handle = self.index.get(key)?;
        self.node(*handle).map(|node| &node.value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let handle = *self.index.get(key)?;
        self.node_mut(handle).map(|node| &mut node.value)
    }

    /// Insert or replace `key` and move it to the front. Returns the replaced
    /// value, if any.
    pub fn push_front(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&handle) = self.index.get(&key) {
            self.unlink(handle.index);
            self.link_front(handle.index);
            return self
                .node_mut(handle)
                .map(|node| std::mem::replace(&mut node.value, value));
        }

        let node = Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };
        let handle = self.allocate(node);
        self.link_front(handle.index);
        self.index.insert(key, handle);
        None
    }

    /// Remove and return the least recently touched entry
    pub fn pop_back(&mut self) -> Option<(K, V)> {
        let tail = self.tail?;
        let node = self.release(tail)?;
        self.index.remove(&node.key);
        Some((node.key, node.value))
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let handle = self.index.remove(key)?;
        if self.node(handle).is_none() {
            return None;
        }
        self.release(handle.index).map(|node| node.value)
    }

    /// Entries from front to back
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.index.keys()
    }

    /// Remove every entry, front to back
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut entries = Vec::with_capacity(self.len());
        while let Some(head) = self.head {
            match self.release(head) {
                Some(node) => entries.push((node.key, node.value)),
                None => break,
            }
        }
        self.index.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        entries
    }

    // =========================================================================
    // Arena
    // =========================================================================

    fn node(&self, handle: Handle) -> Option<&Node<K, V>> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, handle: Handle) -> Option<&mut Node<K, V>> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn allocate(&mut self, node: Node<K, V>) -> Handle {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.node = Some(node);
                Handle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                Handle {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    /// Unlink a slot, bump its generation and return the node
    fn release(&mut self, index: usize) -> Option<Node<K, V>> {
        self.unlink(index);
        let slot = self.slots.get_mut(index)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        Some(node)
    }

    // =========================================================================
    // Links
    // =========================================================================

    fn unlink(&mut self, index: usize) {
        let (prev, next) = match self.slots.get(index).and_then(|s| s.node.as_ref()) {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(p) => self.set_next(p, next),
            None if self.head == Some(index) => self.head = next,
            None => {}
        }
        match next {
            Some(n) => self.set_prev(n, prev),
            None if self.tail == Some(index) => self.tail = prev,
            None => {}
        }

        if let Some(node) = self.slots[index].node.as_mut() {
            node.prev = None;
            node.next = None;
        }
    }

    fn link_front(&mut self, index: usize) {
        let old_head = self.head;
        if let Some(node) = self.slots[index].node.as_mut() {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            self.set_prev(h, Some(index));
        }
        self.head = Some(index);
        if self.tail.is_none() {
            self.tail = Some(index);
        }
    }

    fn set_next(&mut self, index: usize, next: Option<usize>) {
        if let Some(node) = self.slots[index].node.as_mut() {
            node.next = next;
        }
    }

    fn set_prev(&mut self, index: usize, prev: Option<usize>) {
        if let Some(node) = self.slots[index].node.as_mut() {
            node.prev = prev;
        }
    }
}

impl<K: Ord + Clone, V> Default for RecencyList<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a [`RecencyList`], front to back
pub struct Iter<'a, K, V> {
    list: &'a RecencyList<K, V>,
    cursor: Option<usize>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.slots.get(self.cursor?)?.node.as_ref()?;
        self.cursor = node.next;
        Some((&node.key, &node.value))
    }
}
