// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The file-tree deduplicator application (§4.6 of the specification):
//! scans directories into the [`crate::Engine`], handling hardlinks,
//! symlinks, empty files, and unreadable files along the way.

use crate::{
    blocking::BlockingItem,
    digest::DigestFactory,
    engine::{BlockView, Engine, EngineConfig},
    Result,
};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[cfg(unix)]
type InodeId = (u64, u64);
#[cfg(not(unix))]
type InodeId = PathBuf;

#[cfg(unix)]
fn inode_id(metadata: &std::fs::Metadata) -> InodeId {
    use std::os::unix::fs::MetadataExt;
    (metadata.dev(), metadata.ino())
}

#[cfg(not(unix))]
fn inode_id(path: &Path, _metadata: &std::fs::Metadata) -> InodeId {
    path.to_path_buf()
}

/// Construction-time configuration for a [`FileDeduplicator`].
pub struct FileDeduplicatorConfig {
    /// Drop zero-length files during `scan` rather than feeding them to
    /// the engine.
    pub ignore_empty: bool,
    /// Override the default digest chain (`filesize` -> `initial_xxhash`
    /// -> `final_xxhash` -> `sha`). `None` uses [`DigestFactory::default`].
    pub blocking: Option<Vec<BlockingItem<PathBuf>>>,
}

impl Default for FileDeduplicatorConfig {
    fn default() -> Self {
        Self {
            ignore_empty: false,
            blocking: None,
        }
    }
}

/// Per-file progress notification passed to `scan`'s callback:
/// `(file_size, ignored_unreadable)`.
pub type Progress<'a> = dyn FnMut(u64, bool) + 'a;

/// Scans directory trees for duplicate files, on top of an [`Engine`]
/// configured with the standard file digest chain (§4.5).
pub struct FileDeduplicator {
    engine: Engine<PathBuf>,
    ignore_empty: bool,
    hardlinks: Vec<Vec<PathBuf>>,
    hardlink_index: rustc_hash::FxHashMap<InodeId, usize>,
    /// The representative (first-seen) path of each hardlink bucket, the
    /// only paths ever fed to `engine`, mapped to their bucket index — so
    /// `duplicates` can look up a block object's bucket in O(1) instead of
    /// scanning `hardlinks`.
    bucket_of_path: rustc_hash::FxHashMap<PathBuf, usize>,
}

impl FileDeduplicator {
    /// Construct a deduplicator, expanding the configured (or default)
    /// digest chain.
    pub fn new(config: FileDeduplicatorConfig) -> Result<Self> {
        let blocking = config.blocking.unwrap_or_else(|| {
            vec![BlockingItem::factory(DigestFactory::default())]
        });
        let engine = Engine::new(EngineConfig { blocking })?;
        Ok(Self {
            engine,
            ignore_empty: config.ignore_empty,
            hardlinks: Vec::new(),
            hardlink_index: rustc_hash::FxHashMap::default(),
            bucket_of_path: rustc_hash::FxHashMap::default(),
        })
    }

    /// The resolved blocking chain in use.
    #[must_use]
    pub fn blocking(&self) -> &[Box<dyn crate::blocking::BlockingFn<PathBuf>>] {
        self.engine.blocking()
    }

    /// Recursively scan `dir`, feeding each qualifying regular file to the
    /// engine. May be called multiple times, across multiple directories;
    /// hardlink dedup accumulates across all calls on this deduplicator.
    pub fn scan(&mut self, dir: impl AsRef<Path>, mut progress: Option<&mut Progress<'_>>) -> Result<()> {
        for entry in WalkDir::new(dir.as_ref()).follow_links(false) {
            let entry = entry.map_err(|e| {
                crate::error::Error::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "directory walk failed")
                }))
            })?;

            if entry.file_type().is_symlink() || !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path().to_path_buf();
            self.scan_one(path, &mut progress)?;
        }
        Ok(())
    }

    fn scan_one(&mut self, path: PathBuf, progress: &mut Option<&mut Progress<'_>>) -> Result<()> {
        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(_) => {
                tracing::warn!(path = %path.display(), "skipping unreadable file");
                if let Some(cb) = progress {
                    cb(0, true);
                }
                return Ok(());
            }
        };

        let size = metadata.len();
        if size == 0 && self.ignore_empty {
            return Ok(());
        }

        #[cfg(unix)]
        let id = inode_id(&metadata);
        #[cfg(not(unix))]
        let id = inode_id(&path, &metadata);

        match self.hardlink_index.get(&id).copied() {
            Some(bucket) => {
                self.hardlinks[bucket].push(path);
                return Ok(());
            }
            None => {
                self.hardlink_index.insert(id, self.hardlinks.len());
                self.bucket_of_path.insert(path.clone(), self.hardlinks.len());
                self.hardlinks.push(vec![path.clone()]);
            }
        }

        if std::fs::File::open(&path).is_err() {
            tracing::warn!(path = %path.display(), "skipping unreadable file");
            if let Some(cb) = progress {
                cb(size, true);
            }
            return Ok(());
        }

        self.engine.add(path)?;
        if let Some(cb) = progress {
            cb(size, false);
        }
        Ok(())
    }

    /// All hardlink buckets discovered so far (each holding every path
    /// seen for a given inode, including the first).
    #[must_use]
    pub fn hardlinks(&self) -> &[Vec<PathBuf>] {
        &self.hardlinks
    }

    /// Duplicate groups: one per engine block with more than zero objects,
    /// replacing any path belonging to a hardlink bucket of size >= 2 with
    /// `resolve_hardlinks(bucket)`. The rewrite is persisted into the
    /// engine's blocks (§4.6), so a later call without `resolve_hardlinks`
    /// still observes it.
    pub fn duplicates(
        &mut self,
        mut resolve_hardlinks: Option<&mut dyn FnMut(&[PathBuf]) -> PathBuf>,
    ) -> Vec<Vec<PathBuf>> {
        if let Some(resolve) = resolve_hardlinks.as_deref_mut() {
            for block in self.engine.raw_blocks() {
                let mut block = block.borrow_mut();
                let rewritten: Vec<PathBuf> = block
                    .objects()
                    .iter()
                    .map(|path| match self.bucket_of_path.get(path) {
                        Some(&idx) if self.hardlinks[idx].len() >= 2 => resolve(&self.hardlinks[idx]),
                        _ => path.clone(),
                    })
                    .collect();
                *block.objects_mut() = rewritten;
            }
        }

        self.engine
            .blocks()
            .map(|b: BlockView<'_, PathBuf>| b.objects().to_vec())
            .collect()
    }

    /// Per-level digest invocation counts; delegates to the engine.
    #[must_use]
    pub fn count_digests(&self) -> Vec<u64> {
        self.engine.count_keys_computed()
    }

    /// Per-level collision counts; delegates to the engine.
    #[must_use]
    pub fn count_collisions(&self) -> Vec<u64> {
        self.engine.count_collisions()
    }
}
