// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The hierarchical blocking engine (§4.4 of the specification): drives
//! the lazy add/query/collision-count operations over the partition tree.

use crate::{
    block::Block,
    blocking::{self, BlockingFn, BlockingItem},
    key::Key,
    keystore::{BlockId, KeyStore, Slot},
    Result,
};
use std::cell::{Ref, RefCell};

/// Construction-time configuration for an [`Engine`].
pub struct EngineConfig<O> {
    /// Ordered blocking functions and factories, expanded once at
    /// construction. Defaults to empty (all objects collapse into one
    /// block).
    pub blocking: Vec<BlockingItem<O>>,
}

impl<O> Default for EngineConfig<O> {
    fn default() -> Self {
        Self { blocking: Vec::new() }
    }
}

/// A read-only view of a [`Block`], borrowed from the engine's internal
/// arena. Dereferences to `&Block<O>`.
pub struct BlockView<'a, O> {
    inner: Ref<'a, Block<O>>,
}

impl<O> std::ops::Deref for BlockView<'_, O> {
    type Target = Block<O>;

    fn deref(&self) -> &Block<O> {
        &self.inner
    }
}

/// The hierarchical blocking engine.
///
/// Owns the partition tree (a root [`Slot`], descending through nested
/// [`KeyStore`]s to terminal [`Block`]s) and a global, append-only list of
/// every block ever created.
pub struct Engine<O> {
    blocking_fns: Vec<Box<dyn BlockingFn<O>>>,
    root: Slot<O>,
    blocks: Vec<RefCell<Block<O>>>,
}

impl<O: Clone> Engine<O> {
    /// Construct an engine from a blocking configuration, expanding any
    /// factories in place. Fails with [`crate::Error::Config`] if a
    /// factory cannot produce its functions.
    pub fn new(config: EngineConfig<O>) -> Result<Self> {
        let blocking_fns = blocking::expand(config.blocking)?;
        Ok(Self {
            blocking_fns,
            root: Slot::Empty,
            blocks: Vec::new(),
        })
    }

    /// The resolved, flat chain of blocking functions, in descent order.
    #[must_use]
    pub fn blocking(&self) -> &[Box<dyn BlockingFn<O>>] {
        &self.blocking_fns
    }

    /// Insert `object` into the tree, computing only the digests needed
    /// to place it (§4.4.1).
    pub fn add(&mut self, object: O) -> Result<()> {
        let n = self.blocking_fns.len();
        let mut accumulated: Vec<Key> = Vec::new();
        Self::descend(
            &mut self.root,
            &self.blocking_fns,
            &mut self.blocks,
            0,
            n,
            &mut accumulated,
            object,
        )
    }

    /// The central recursion of `add`: `slot` is the node reached after
    /// consuming `level` keys (so any `Block` found here must have
    /// exactly `level` keys, by invariant 1).
    #[allow(clippy::too_many_arguments)]
    fn descend(
        slot: &mut Slot<O>,
        blocking_fns: &[Box<dyn BlockingFn<O>>],
        blocks: &mut Vec<RefCell<Block<O>>>,
        level: usize,
        n: usize,
        accumulated: &mut Vec<Key>,
        object: O,
    ) -> Result<()> {
        if level == n {
            match slot {
                Slot::Empty => {
                    let id = BlockId(blocks.len());
                    blocks.push(RefCell::new(Block::new(accumulated.clone(), object)));
                    *slot = Slot::Block(id);
                }
                Slot::Block(id) => {
                    blocks[id.0].borrow_mut().push_object(object);
                }
                Slot::Store(_) => {
                    unreachable!("a KeyStore cannot exist past the last blocking level")
                }
            }
            return Ok(());
        }

        match slot {
            Slot::Empty => {
                // Laziness: the level-L digest is never computed for a
                // lone object.
                let id = BlockId(blocks.len());
                blocks.push(RefCell::new(Block::new(accumulated.clone(), object)));
                *slot = Slot::Block(id);
                Ok(())
            }
            Slot::Block(id) => {
                // Exactly one object here (invariant 3): split.
                let split_key = {
                    let mut existing = blocks[id.0].borrow_mut();
                    let existing_object = existing
                        .object(0)
                        .expect("a non-terminal block holds exactly one object")
                        .clone();
                    let key = blocking_fns[level].compute(&existing_object)?;
                    existing.push_key(key.clone());
                    key
                };
                let mut store = KeyStore::new();
                store.set(split_key, Slot::Block(*id));
                *slot = Slot::Store(Box::new(store));

                // Fall through to the KeyStore case for the new object.
                Self::descend(slot, blocking_fns, blocks, level, n, accumulated, object)
            }
            Slot::Store(store) => {
                let key = blocking_fns[level].compute(&object)?;
                accumulated.push(key.clone());
                let child = store.get_mut(key);
                let result = Self::descend(child, blocking_fns, blocks, level + 1, n, accumulated, object);
                accumulated.pop();
                result
            }
        }
    }

    /// All blocks ever created, in creation order. Blocks with one object
    /// are "unique"; blocks with two or more are "duplicate sets".
    pub fn blocks(&self) -> impl Iterator<Item = BlockView<'_, O>> {
        self.blocks.iter().map(|cell| BlockView { inner: cell.borrow() })
    }

    /// Number of blocks created so far.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Raw access to the block arena, for the one sanctioned post-ingestion
    /// mutation: [`crate::FileDeduplicator::duplicates`]'s hardlink path
    /// rewrite.
    pub(crate) fn raw_blocks(&self) -> &[RefCell<Block<O>>] {
        &self.blocks
    }

    /// Per-level invocation counts for each configured blocking function
    /// (§4.4.4). The result has length at most `self.blocking().len()`;
    /// trailing levels that were never reached are omitted.
    #[must_use]
    pub fn count_keys_computed(&self) -> Vec<u64> {
        let max_depth = self
            .blocks
            .iter()
            .map(|b| b.borrow().num_keys())
            .max()
            .unwrap_or(0);

        (0..max_depth)
            .map(|level| {
                self.blocks
                    .iter()
                    .map(|b| b.borrow())
                    .filter(|b| b.num_keys() > level)
                    .map(|b| b.num_objects() as u64)
                    .sum()
            })
            .collect()
    }

    /// Per-level count of distinguishing collisions (§4.4.5): for each
    /// level, how many more terminal blocks were reachable through a
    /// single key than there were distinct keys at that level, summed
    /// over every `KeyStore` at that depth.
    #[must_use]
    pub fn count_collisions(&self) -> Vec<u64> {
        Self::collisions_at(&self.root, 0).0
    }

    /// Returns `(per_level_collisions, reachable_terminal_block_count)`
    /// for the subtree rooted at `slot`, which sits at depth `depth`.
    fn collisions_at(slot: &Slot<O>, depth: usize) -> (Vec<u64>, usize) {
        match slot {
            Slot::Empty => (Vec::new(), 0),
            Slot::Block(_) => (Vec::new(), 1),
            Slot::Store(store) => {
                let mut levels = Vec::new();
                let mut reachable = 0usize;

                for child in store.slots() {
                    let (child_levels, child_reachable) = Self::collisions_at(child, depth + 1);
                    reachable += child_reachable;
                    if child_levels.len() > levels.len() {
                        levels.resize(child_levels.len(), 0);
                    }
                    for (i, v) in child_levels.into_iter().enumerate() {
                        levels[i] += v;
                    }
                }

                let contribution = (reachable.saturating_sub(store.len())) as u64;
                if levels.len() <= depth {
                    levels.resize(depth + 1, 0);
                }
                levels[depth] += contribution;

                (levels, reachable)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_a_trivial_blocking() {
        let mut engine: Engine<(char, i64)> = Engine::new(EngineConfig {
            blocking: vec![BlockingItem::single(|o: &(char, i64)| {
                Ok(Key::from_bytes(vec![o.0 as u8]))
            })],
        })
        .unwrap();

        for obj in [('A', 1), ('B', 2), ('A', 4), ('C', 3)] {
            engine.add(obj).unwrap();
        }

        let mut groups: Vec<Vec<(char, i64)>> =
            engine.blocks().map(|b| b.objects().to_vec()).collect();
        groups.sort_by_key(|g| g[0].0);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], vec![('A', 1), ('A', 4)]);
        assert_eq!(groups[1], vec![('B', 2)]);
        assert_eq!(groups[2], vec![('C', 3)]);
    }

    #[test]
    fn scenario_b_two_level_blocking() {
        let mut engine: Engine<(char, i64)> = Engine::new(EngineConfig {
            blocking: vec![
                BlockingItem::single(|o: &(char, i64)| Ok(Key::from_bytes(vec![o.0 as u8]))),
                BlockingItem::single(|o: &(char, i64)| Ok(Key::from_u64((o.1 % 2) as u64))),
            ],
        })
        .unwrap();

        for obj in [('A', 1), ('B', 2), ('C', 3), ('A', 4)] {
            engine.add(obj).unwrap();
        }

        let mut groups: Vec<Vec<(char, i64)>> =
            engine.blocks().map(|b| b.objects().to_vec()).collect();
        groups.sort_by_key(|g| (g[0].0, g[0].1));

        assert_eq!(
            groups,
            vec![
                vec![('A', 1)],
                vec![('A', 4)],
                vec![('B', 2)],
                vec![('C', 3)],
            ]
        );
    }

    #[test]
    fn scenario_c_collision_counts() {
        let mut engine: Engine<(char, i64)> = Engine::new(EngineConfig {
            blocking: vec![
                BlockingItem::single(|o: &(char, i64)| Ok(Key::from_bytes(vec![o.0 as u8]))),
                BlockingItem::single(|o: &(char, i64)| Ok(Key::from_u64((o.1 % 2) as u64))),
                BlockingItem::single(|o: &(char, i64)| Ok(Key::from_u64((o.1 % 3) as u64))),
                BlockingItem::single(|o: &(char, i64)| Ok(Key::from_u64((o.1 % 5) as u64))),
            ],
        })
        .unwrap();

        let a = (1..=7).step_by(3).map(|n| ('A', n));
        let b = (2..=8).step_by(3).map(|n| ('B', n));
        let c = (3..=9).step_by(3).map(|n| ('C', n));
        for obj in a.chain(b).chain(c) {
            engine.add(obj).unwrap();
        }

        assert_eq!(engine.count_collisions(), vec![6, 3, 3, 0]);
    }

    #[test]
    fn empty_blocking_list_collapses_to_one_block() {
        let mut engine: Engine<i32> = Engine::new(EngineConfig::default()).unwrap();
        for i in 0..5 {
            engine.add(i).unwrap();
        }
        assert_eq!(engine.num_blocks(), 1);
        let only = engine.blocks().next().unwrap();
        assert_eq!(only.num_objects(), 5);
        assert_eq!(only.num_keys(), 0);
    }

    #[test]
    fn no_objects_added_has_no_blocks() {
        let engine: Engine<i32> = Engine::new(EngineConfig::default()).unwrap();
        assert_eq!(engine.num_blocks(), 0);
        assert!(engine.blocks().next().is_none());
    }

    #[test]
    fn single_object_is_one_block_with_no_keys() {
        let mut engine: Engine<i32> = Engine::new(EngineConfig {
            blocking: vec![BlockingItem::single(|o: &i32| Ok(Key::from_u64(*o as u64)))],
        })
        .unwrap();
        engine.add(42).unwrap();
        let block = engine.blocks().next().unwrap();
        assert_eq!(block.num_keys(), 0);
        assert_eq!(block.objects(), &[42]);
    }

    #[test]
    fn each_function_invoked_at_most_once_per_object() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        struct CountingFn(Arc<AtomicUsize>);
        impl BlockingFn<i32> for CountingFn {
            fn compute(&self, object: &i32) -> Result<Key> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(Key::from_u64(*object as u64 % 3))
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let mut engine: Engine<i32> = Engine::new(EngineConfig {
            blocking: vec![BlockingItem::Fn(Box::new(CountingFn(calls.clone())))],
        })
        .unwrap();

        for i in 0..30 {
            engine.add(i).unwrap();
        }

        // Each of the 30 objects may trigger at most one call to the sole
        // blocking function (when it is added to an already-occupied
        // bucket triggering a split, or when dispatched through a store).
        assert!(calls.load(Ordering::SeqCst) <= 30);
    }

    #[test]
    fn count_keys_computed_is_non_increasing() {
        let mut engine: Engine<(char, i64)> = Engine::new(EngineConfig {
            blocking: vec![
                BlockingItem::single(|o: &(char, i64)| Ok(Key::from_bytes(vec![o.0 as u8]))),
                BlockingItem::single(|o: &(char, i64)| Ok(Key::from_u64((o.1 % 2) as u64))),
                BlockingItem::single(|o: &(char, i64)| Ok(Key::from_u64((o.1 % 3) as u64))),
            ],
        })
        .unwrap();

        for obj in [('A', 1), ('A', 2), ('A', 3), ('A', 4), ('B', 1)] {
            engine.add(obj).unwrap();
        }

        let counts = engine.count_keys_computed();
        for pair in counts.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn every_ingested_object_is_returned_exactly_once() {
        let mut engine: Engine<i32> = Engine::new(EngineConfig {
            blocking: vec![BlockingItem::single(|o: &i32| Ok(Key::from_u64((*o % 4) as u64)))],
        })
        .unwrap();

        let total = 50;
        for i in 0..total {
            engine.add(i).unwrap();
        }

        let mut seen: Vec<i32> = engine.blocks().flat_map(|b| b.objects().to_vec()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..total).collect::<Vec<_>>());
    }
}
