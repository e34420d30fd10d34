//! Concurrent skip list
//!
//! Ordered index backing the memtable. One inserting thread at a time,
//! any number of lock-free readers.
//!
//! ## Memory Model
//! Nodes are owned by an arena that lives as long as the list and is freed in
//! one step on drop. Nodes are never unlinked or mutated after publication, so
//! readers only need two rules:
//! - a forward pointer used for traversal is read with `Acquire`
//! - a forward pointer is published with `Release`
//!
//! A reader that observes a new node therefore also observes the node's own
//! forward pointers, which were initialized before it was published.
//!
//! ```text
//! level 3: head ───────────────────────────► [k7] ─────────────► nil
//! level 2: head ──────────► [k3] ──────────► [k7] ─────────────► nil
//! level 1: head ─► [k1] ──► [k3] ─► [k5] ──► [k7] ─► [k9] ─────► nil
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{EmberError, Result};

/// Tallest tower a node may have
pub const MAX_HEIGHT: usize = 12;

/// A node grows another level with probability 1/BRANCHING
pub const BRANCHING: u32 = 4;

struct Node<K> {
    key: K,
    next: Box<[AtomicPtr<Node<K>>]>,
}

impl<K> Node<K> {
    fn new(key: K, height: usize) -> Self {
        let next = (0..height)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { key, next }
    }

    fn footprint(height: usize) -> usize {
        mem::size_of::<Self>() + height * mem::size_of::<AtomicPtr<Self>>()
    }
}

/// Owns every node of one list. Guarded by a mutex that only inserters take.
struct Arena<K> {
    nodes: Vec<NonNull<Node<K>>>,
    rng: StdRng,
}

impl<K> Arena<K> {
    fn random_height(&mut self) -> usize {
        let mut height = 1;
        while height < MAX_HEIGHT && self.rng.gen_range(0..BRANCHING) == 0 {
            height += 1;
        }
        height
    }
}

/// Probabilistically balanced ordered set over `K`'s total order.
///
/// Positions inside the list are raw node pointers where null stands for the
/// head sentinel when used as a *position*, and for the end of a level when
/// returned as a *successor*.
pub struct SkipList<K> {
    head: Box<[AtomicPtr<Node<K>>]>,
    max_height: AtomicUsize,
    arena: Mutex<Arena<K>>,
    len: AtomicUsize,
    memory_usage: AtomicUsize,
}

// SAFETY: nodes are reachable only through the list, are immutable after
// publication, and are freed only when the list itself is dropped.
unsafe impl<K: Send + Sync> Send for SkipList<K> {}
unsafe impl<K: Send + Sync> Sync for SkipList<K> {}

impl<K: Ord> SkipList<K> {
    /// Create an empty list
    pub fn new() -> Self {
        Self::with_seed(0xdead_beef)
    }

    /// Create an empty list whose height draws come from `seed`
    pub fn with_seed(seed: u64) -> Self {
        let head = (0..MAX_HEIGHT)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            head,
            max_height: AtomicUsize::new(1),
            arena: Mutex::new(Arena {
                nodes: Vec::new(),
                rng: StdRng::seed_from_u64(seed),
            }),
            len: AtomicUsize::new(0),
            memory_usage: AtomicUsize::new(0),
        }
    }

    /// Insert `key`.
    ///
    /// Fails with [`EmberError::DuplicateKey`] if an equal key is present.
    /// Inserters are serialized on the arena; readers never wait.
    pub fn insert(&self, key: K) -> Result<()> {
        let mut arena = self.arena.lock();

        let mut prev: [*const Node<K>; MAX_HEIGHT] = [ptr::null(); MAX_HEIGHT];
        let found = self.find_greater_or_equal(&key, Some(&mut prev));
        if self.node_equals(found, &key) {
            return Err(EmberError::DuplicateKey);
        }

        let height = arena.random_height();
        let max_height = self.max_height();
        if height > max_height {
            // prev[max_height..height] already point at the head sentinel.
            // Readers that see the new height before the node is linked find
            // null at those head levels and simply drop down.
            self.max_height.store(height, Ordering::Relaxed);
        }

        let node = NonNull::from(Box::leak(Box::new(Node::new(key, height))));
        arena.nodes.push(node);

        for (level, &pred) in prev.iter().enumerate().take(height) {
            let pred_tower = self.tower(pred);
            // SAFETY: `node` is owned by the arena. Readers cannot reach it at
            // `level` until the release store below publishes it there.
            unsafe {
                node.as_ref().next[level]
                    .store(pred_tower[level].load(Ordering::Relaxed), Ordering::Relaxed);
            }
            pred_tower[level].store(node.as_ptr(), Ordering::Release);
        }

        self.len.fetch_add(1, Ordering::Relaxed);
        self.memory_usage
            .fetch_add(Node::<K>::footprint(height), Ordering::Relaxed);
        Ok(())
    }

    /// True iff an entry equal to `key` is in the list
    pub fn contains(&self, key: &K) -> bool {
        let found = self.find_greater_or_equal(key, None);
        self.node_equals(found, key)
    }

    /// A cursor over the list, initially not positioned
    pub fn cursor(&self) -> Cursor<'_, K> {
        Cursor {
            list: self,
            node: ptr::null(),
        }
    }

    /// Ascending iterator over all entries
    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            list: self,
            next: self.head[0].load(Ordering::Acquire),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes held by nodes and towers, excluding heap data owned by keys
    pub fn approximate_memory_usage(&self) -> usize {
        self.memory_usage.load(Ordering::Relaxed)
    }

    /// Current tallest tower in use
    pub fn max_height(&self) -> usize {
        self.max_height.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Forward pointers of a position (null position is the head sentinel)
    fn tower(&self, position: *const Node<K>) -> &[AtomicPtr<Node<K>>] {
        if position.is_null() {
            &self.head
        } else {
            // SAFETY: non-null positions always come from published nodes,
            // which live until the list is dropped.
            unsafe { &(*position).next }
        }
    }

    fn node_equals(&self, node: *const Node<K>, key: &K) -> bool {
        // SAFETY: see `tower`.
        !node.is_null() && unsafe { (*node).key.cmp(key) } == CmpOrdering::Equal
    }

    fn key_is_after_node(&self, key: &K, node: *const Node<K>) -> bool {
        // SAFETY: see `tower`.
        !node.is_null() && unsafe { (*node).key.cmp(key) } == CmpOrdering::Less
    }

    /// First node whose key is >= `key`, or null. When `prev` is given it
    /// receives the predecessor position at every level walked.
    fn find_greater_or_equal(
        &self,
        key: &K,
        mut prev: Option<&mut [*const Node<K>; MAX_HEIGHT]>,
    ) -> *const Node<K> {
        let mut position: *const Node<K> = ptr::null();
        let mut level = self.max_height() - 1;
        loop {
            let next = self.tower(position)[level].load(Ordering::Acquire);
            if self.key_is_after_node(key, next) {
                position = next;
            } else {
                if let Some(prev) = prev.as_deref_mut() {
                    prev[level] = position;
                }
                if level == 0 {
                    return next;
                }
                level -= 1;
            }
        }
    }

    /// Last position whose key is < `key` (null is the head)
    fn find_less_than(&self, key: &K) -> *const Node<K> {
        let mut position: *const Node<K> = ptr::null();
        let mut level = self.max_height() - 1;
        loop {
            let next = self.tower(position)[level].load(Ordering::Acquire);
            if self.key_is_after_node(key, next) {
                position = next;
            } else if level == 0 {
                return position;
            } else {
                level -= 1;
            }
        }
    }

    /// Last position in the list (null when empty)
    fn find_last(&self) -> *const Node<K> {
        let mut position: *const Node<K> = ptr::null();
        let mut level = self.max_height() - 1;
        loop {
            let next = self.tower(position)[level].load(Ordering::Acquire);
            if !next.is_null() {
                position = next;
            } else if level == 0 {
                return position;
            } else {
                level -= 1;
            }
        }
    }
}

impl<K: Ord> Default for SkipList<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for SkipList<K> {
    fn drop(&mut self) {
        for node in self.arena.get_mut().nodes.drain(..) {
            // SAFETY: every node was leaked from a Box in `insert` and is
            // dropped exactly once, here, with no readers left.
            unsafe { drop(Box::from_raw(node.as_ptr())) };
        }
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// Seekable position in a [`SkipList`].
///
/// Valid while it rests on an entry. `key`, `next` and `prev` require a valid
/// cursor and panic otherwise.
pub struct Cursor<'a, K> {
    list: &'a SkipList<K>,
    node: *const Node<K>,
}

impl<'a, K: Ord> Cursor<'a, K> {
    pub fn valid(&self) -> bool {
        !self.node.is_null()
    }

    /// Key at the current position
    pub fn key(&self) -> &'a K {
        assert!(self.valid(), "cursor is not positioned on an entry");
        // SAFETY: valid cursors point at published nodes owned by `list`.
        unsafe { &(*self.node).key }
    }

    pub fn next(&mut self) {
        assert!(self.valid(), "cursor is not positioned on an entry");
        self.node = self.list.tower(self.node)[0].load(Ordering::Acquire);
    }

    /// Step back one entry; becomes invalid before the first entry
    pub fn prev(&mut self) {
        let key = self.key();
        self.node = self.list.find_less_than(key);
    }

    /// Position at the first entry >= `target`
    pub fn seek(&mut self, target: &K) {
        self.node = self.list.find_greater_or_equal(target, None);
    }

    pub fn seek_to_first(&mut self) {
        self.node = self.list.head[0].load(Ordering::Acquire);
    }

    pub fn seek_to_last(&mut self) {
        self.node = self.list.find_last();
    }
}

/// Ascending iterator over a [`SkipList`]
pub struct Iter<'a, K> {
    list: &'a SkipList<K>,
    next: *const Node<K>,
}

impl<'a, K: Ord> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next.is_null() {
            return None;
        }
        let current = self.next;
        self.next = self.list.tower(current)[0].load(Ordering::Acquire);
        // SAFETY: published node owned by `list`.
        Some(unsafe { &(*current).key })
    }
}
