// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::key::Key;

/// A terminal node of the partition tree: the set of objects that are
/// indistinguishable under the key prefix `keys`.
///
/// Invariant: a block with `keys.len()` less than the number of configured
/// blocking functions always holds exactly one object — it simply has not
/// needed a further digest yet.
#[derive(Debug, Clone)]
pub struct Block<O> {
    keys: Vec<Key>,
    objects: Vec<O>,
}

impl<O> Block<O> {
    /// Construct a block at the given key prefix, holding a single object.
    pub(crate) fn new(keys: Vec<Key>, object: O) -> Self {
        Self {
            keys,
            objects: vec![object],
        }
    }

    /// Append a key, pushing this block one level deeper in the tree.
    ///
    /// Callers must only invoke this when actually relocating the block to
    /// a deeper slot (see `Engine::add`'s split case) — it unconditionally
    /// grows `keys`.
    pub(crate) fn push_key(&mut self, key: Key) {
        self.keys.push(key);
    }

    /// Append an object to this block (it was found to be indistinguishable
    /// from the objects already here under `keys`).
    pub(crate) fn push_object(&mut self, object: O) {
        self.objects.push(object);
    }

    /// The key prefix computed for this block so far, one entry per
    /// blocking level descended.
    #[must_use]
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// The `i`-th key, if present.
    #[must_use]
    pub fn key(&self, i: usize) -> Option<&Key> {
        self.keys.get(i)
    }

    /// Number of keys computed for this block.
    #[must_use]
    pub fn num_keys(&self) -> usize {
        self.keys.len()
    }

    /// All objects indistinguishable under `keys`.
    #[must_use]
    pub fn objects(&self) -> &[O] {
        &self.objects
    }

    /// Mutable access to the objects, used only by
    /// [`crate::FileDeduplicator::duplicates`] to rewrite hardlink paths in
    /// place.
    pub(crate) fn objects_mut(&mut self) -> &mut Vec<O> {
        &mut self.objects
    }

    /// The `i`-th object, if present.
    #[must_use]
    pub fn object(&self, i: usize) -> Option<&O> {
        self.objects.get(i)
    }

    /// Number of objects grouped into this block.
    #[must_use]
    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }
}
