// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::key::Key;
use rustc_hash::FxBuildHasher;
use std::collections::HashMap;

/// Index into the engine's global, append-only block arena.
///
/// Aliases a `Block` that is also reachable from the tree itself. Using an
/// id rather than a shared pointer keeps the tree's ownership strictly
/// top-down (the arena owns the blocks; slots just name them).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct BlockId(pub(crate) usize);

/// A single cell of the partition tree: either empty, a terminal block, or
/// a nested dispatch table for the next blocking level.
pub(crate) enum Slot<O> {
    Empty,
    Block(BlockId),
    Store(Box<KeyStore<O>>),
}

impl<O> Default for Slot<O> {
    fn default() -> Self {
        Self::Empty
    }
}

/// A non-terminal node: a dispatch table from a level's key to a child
/// slot.
pub(crate) struct KeyStore<O> {
    map: HashMap<Key, Slot<O>, FxBuildHasher>,
}

impl<O> KeyStore<O> {
    pub(crate) fn new() -> Self {
        Self {
            map: HashMap::default(),
        }
    }

    /// Overwrite the slot at `key`.
    pub(crate) fn set(&mut self, key: Key, slot: Slot<O>) {
        self.map.insert(key, slot);
    }

    /// Mutable reference to the slot at `key`, creating an empty one if
    /// absent.
    pub(crate) fn get_mut(&mut self, key: Key) -> &mut Slot<O> {
        self.map.entry(key).or_insert(Slot::Empty)
    }

    /// All present child slots, in arbitrary (hash) order.
    pub(crate) fn slots(&self) -> impl Iterator<Item = &Slot<O>> {
        self.map.values()
    }

    /// Number of distinct keys dispatched at this level.
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }
}
