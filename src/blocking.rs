// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Blocking functions and factories: the pluggable digests the engine
//! consults to partition objects (§4.1 of the specification).

use crate::{key::Key, Result};

/// A single digest: maps an object to an opaque key.
///
/// Implementations may fail (e.g. an I/O error reading a file); such
/// errors propagate to the caller of [`crate::Engine::add`] and that
/// object's insertion is not committed (no `Block` mutation happens
/// before the key is obtained).
pub trait BlockingFn<O>: Send + Sync {
    /// Compute the digest of `object`.
    fn compute(&self, object: &O) -> Result<Key>;

    /// Stable short identifier, used to select this function by `--alg`.
    /// Purely descriptive; has no effect on partitioning.
    fn id(&self) -> &str {
        ""
    }

    /// Human-readable name.
    fn name(&self) -> &str {
        ""
    }

    /// Provenance class, e.g. `"size"`, `"sample"`, `"hash"`.
    fn class(&self) -> &str {
        ""
    }
}

impl<O, F> BlockingFn<O> for F
where
    F: Fn(&O) -> Result<Key> + Send + Sync,
{
    fn compute(&self, object: &O) -> Result<Key> {
        self(object)
    }
}

/// A capability producing an ordered list of [`BlockingFn`]s, expanded in
/// place at engine construction.
pub trait BlockingFactory<O>: Send + Sync {
    /// Produce this factory's functions, in preference order.
    fn all_functions(&self) -> Result<Vec<Box<dyn BlockingFn<O>>>>;
}

/// One item in a blocking configuration: either a single function, or a
/// factory that expands into several.
pub enum BlockingItem<O> {
    /// A single blocking function.
    Fn(Box<dyn BlockingFn<O>>),
    /// A factory expanded in place, in list order.
    Factory(Box<dyn BlockingFactory<O>>),
}

impl<O> BlockingItem<O> {
    /// Wrap a single blocking function.
    pub fn single(f: impl BlockingFn<O> + 'static) -> Self {
        Self::Fn(Box::new(f))
    }

    /// Wrap a factory.
    pub fn factory(f: impl BlockingFactory<O> + 'static) -> Self {
        Self::Factory(Box::new(f))
    }
}

/// Expand a list of [`BlockingItem`]s into the engine's flat, immutable
/// chain of blocking functions, preserving configuration order.
///
/// Returns [`Error::Config`] if any factory fails to produce its
/// functions.
pub(crate) fn expand<O>(items: Vec<BlockingItem<O>>) -> Result<Vec<Box<dyn BlockingFn<O>>>> {
    let mut flat = Vec::with_capacity(items.len());

    for item in items {
        match item {
            BlockingItem::Fn(f) => flat.push(f),
            BlockingItem::Factory(factory) => {
                flat.extend(factory.all_functions()?);
            }
        }
    }

    Ok(flat)
}
