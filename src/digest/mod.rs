// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The standard digest chain for files (§4.5): size, sampled segments,
//! `xxh3`, SHA-1.

mod cluster;

use crate::{blocking::BlockingFn, key::Key, Result};
use sha1::{Digest, Sha1};
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

const SAMPLE_WIDTH: u64 = 128;
const HEAD_TAIL_WIDTH: u64 = 1024;

fn read_range(path: &Path, offset: u64, len: u64) -> std::io::Result<Vec<u8>> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len as usize];
    let mut read = 0;
    while read < buf.len() {
        match file.read(&mut buf[read..])? {
            0 => break,
            n => read += n,
        }
    }
    buf.truncate(read);
    Ok(buf)
}

fn file_len_and_cluster(path: &Path) -> std::io::Result<(u64, u64)> {
    let metadata = std::fs::metadata(path)?;
    let size = metadata.len();
    let cluster = cluster::cluster_size(size, cluster::blksize(&metadata));
    Ok((size, cluster))
}

/// Which of the standard file digests a [`FileDigest`] computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestKind {
    /// File size in bytes.
    FileSize,
    /// 128 bytes centred in the first cluster.
    Sample,
    /// 128 bytes centred in the middle cluster.
    MidSample,
    /// 128 bytes centred in the last cluster.
    EndSample,
    /// First 1024 bytes of the file.
    FileHead,
    /// Last 1024 bytes of the file.
    FileTail,
    /// `xxh3_64` of the first `cluster/2` bytes.
    FastInitialXxhash,
    /// `xxh3_64` of the first full cluster.
    InitialXxhash,
    /// `xxh3_64` of the last full cluster.
    FinalXxhash,
    /// SHA-1 of the first `cluster/2` bytes.
    FastInitialSha,
    /// SHA-1 of the first full cluster.
    InitialSha,
    /// SHA-1 of the last full cluster.
    FinalSha,
    /// SHA-1 of the whole file.
    Sha,
}

impl DigestKind {
    /// All digest kinds, in the order `DigestFactory::all_functions`
    /// produces them when no default chain applies.
    pub const ALL: [Self; 13] = [
        Self::FileSize,
        Self::Sample,
        Self::MidSample,
        Self::EndSample,
        Self::FileHead,
        Self::FileTail,
        Self::FastInitialXxhash,
        Self::InitialXxhash,
        Self::FinalXxhash,
        Self::FastInitialSha,
        Self::InitialSha,
        Self::FinalSha,
        Self::Sha,
    ];

    /// The standard file deduplicator chain (§4.5): size, then two
    /// cheap-to-expensive `xxh3` passes, then a full cryptographic hash.
    pub const DEFAULT_CHAIN: [Self; 4] = [
        Self::FileSize,
        Self::InitialXxhash,
        Self::FinalXxhash,
        Self::Sha,
    ];

    /// Stable short identifier, used to select a digest by `--alg`.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::FileSize => "filesize",
            Self::Sample => "sample",
            Self::MidSample => "mid_sample",
            Self::EndSample => "end_sample",
            Self::FileHead => "file_head",
            Self::FileTail => "file_tail",
            Self::FastInitialXxhash => "fast_initial_xxhash",
            Self::InitialXxhash => "initial_xxhash",
            Self::FinalXxhash => "final_xxhash",
            Self::FastInitialSha => "fast_initial_sha",
            Self::InitialSha => "initial_sha",
            Self::FinalSha => "final_sha",
            Self::Sha => "sha",
        }
    }

    /// Human-readable name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::FileSize => "file size",
            Self::Sample => "initial sample",
            Self::MidSample => "middle sample",
            Self::EndSample => "final sample",
            Self::FileHead => "file head",
            Self::FileTail => "file tail",
            Self::FastInitialXxhash => "fast initial xxHash",
            Self::InitialXxhash => "initial xxHash",
            Self::FinalXxhash => "final xxHash",
            Self::FastInitialSha => "fast initial SHA-1",
            Self::InitialSha => "initial SHA-1",
            Self::FinalSha => "final SHA-1",
            Self::Sha => "full SHA-1",
        }
    }

    /// Provenance class.
    #[must_use]
    pub fn class(self) -> &'static str {
        match self {
            Self::FileSize => "size",
            Self::Sample | Self::MidSample | Self::EndSample | Self::FileHead | Self::FileTail => {
                "sample"
            }
            Self::FastInitialXxhash | Self::InitialXxhash | Self::FinalXxhash => "xxhash",
            Self::FastInitialSha | Self::InitialSha | Self::FinalSha | Self::Sha => "sha1",
        }
    }

    /// Resolve a digest by its `id()`, as used by `--alg`.
    #[must_use]
    pub fn by_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    fn compute(self, path: &Path) -> std::io::Result<Key> {
        match self {
            Self::FileSize => {
                let size = std::fs::metadata(path)?.len();
                Ok(Key::from_u64(size))
            }
            Self::Sample => {
                let (size, cluster) = file_len_and_cluster(path)?;
                let (start, len) = cluster::centered_window(0, cluster, SAMPLE_WIDTH);
                let _ = size;
                Ok(Key::from_bytes(read_range(path, start, len)?))
            }
            Self::MidSample => {
                let (size, cluster) = file_len_and_cluster(path)?;
                if size == 0 {
                    return Ok(Key::from_bytes(Vec::new()));
                }
                let mid = size / 2;
                let region_start = (mid / cluster.max(1)) * cluster.max(1);
                let region_len = cluster.min(size - region_start);
                let (start, len) = cluster::centered_window(region_start, region_len, SAMPLE_WIDTH);
                Ok(Key::from_bytes(read_range(path, start, len)?))
            }
            Self::EndSample => {
                let (size, cluster) = file_len_and_cluster(path)?;
                if size == 0 {
                    return Ok(Key::from_bytes(Vec::new()));
                }
                let (region_start, region_len) = cluster::last_segment(size, cluster, SAMPLE_WIDTH);
                let (start, len) = cluster::centered_window(region_start, region_len, SAMPLE_WIDTH);
                Ok(Key::from_bytes(read_range(path, start, len)?))
            }
            Self::FileHead => {
                let size = std::fs::metadata(path)?.len();
                let len = size.min(HEAD_TAIL_WIDTH);
                Ok(Key::from_bytes(read_range(path, 0, len)?))
            }
            Self::FileTail => {
                let size = std::fs::metadata(path)?.len();
                let len = size.min(HEAD_TAIL_WIDTH);
                let offset = size - len;
                Ok(Key::from_bytes(read_range(path, offset, len)?))
            }
            Self::FastInitialXxhash => {
                let (size, cluster) = file_len_and_cluster(path)?;
                let len = (cluster / 2).min(size);
                let bytes = read_range(path, 0, len)?;
                Ok(Key::from_u64(xxhash_rust::xxh3::xxh3_64(&bytes)))
            }
            Self::InitialXxhash => {
                let (_, cluster) = file_len_and_cluster(path)?;
                let bytes = read_range(path, 0, cluster)?;
                Ok(Key::from_u64(xxhash_rust::xxh3::xxh3_64(&bytes)))
            }
            Self::FinalXxhash => {
                let (size, cluster) = file_len_and_cluster(path)?;
                if size == 0 {
                    return Ok(Key::from_u64(xxhash_rust::xxh3::xxh3_64(&[])));
                }
                let (off, len) = cluster::last_segment(size, cluster, cluster / 2);
                let bytes = read_range(path, off, len)?;
                Ok(Key::from_u64(xxhash_rust::xxh3::xxh3_64(&bytes)))
            }
            Self::FastInitialSha => {
                let (size, cluster) = file_len_and_cluster(path)?;
                let len = (cluster / 2).min(size);
                let bytes = read_range(path, 0, len)?;
                Ok(Key::from_bytes(Sha1::digest(&bytes).to_vec()))
            }
            Self::InitialSha => {
                let (_, cluster) = file_len_and_cluster(path)?;
                let bytes = read_range(path, 0, cluster)?;
                Ok(Key::from_bytes(Sha1::digest(&bytes).to_vec()))
            }
            Self::FinalSha => {
                let (size, cluster) = file_len_and_cluster(path)?;
                if size == 0 {
                    return Ok(Key::from_bytes(Sha1::digest(b"").to_vec()));
                }
                let (off, len) = cluster::last_segment(size, cluster, cluster / 2);
                let bytes = read_range(path, off, len)?;
                Ok(Key::from_bytes(Sha1::digest(&bytes).to_vec()))
            }
            Self::Sha => {
                let mut file = File::open(path)?;
                let mut hasher = Sha1::new();
                let mut buf = [0u8; 64 * 1024];
                loop {
                    let n = file.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(Key::from_bytes(hasher.finalize().to_vec()))
            }
        }
    }
}

/// A single file digest, wrapping one [`DigestKind`].
pub struct FileDigest(DigestKind);

impl FileDigest {
    /// Construct the blocking function for a given digest kind.
    #[must_use]
    pub fn new(kind: DigestKind) -> Self {
        Self(kind)
    }

    /// Which digest this is.
    #[must_use]
    pub fn kind(&self) -> DigestKind {
        self.0
    }
}

impl BlockingFn<PathBuf> for FileDigest {
    fn compute(&self, path: &PathBuf) -> Result<Key> {
        Ok(self.0.compute(path)?)
    }

    fn id(&self) -> &str {
        self.0.id()
    }

    fn name(&self) -> &str {
        self.0.name()
    }

    fn class(&self) -> &str {
        self.0.class()
    }
}

/// The canonical ordered list of [`BlockingFn`]s for files (§4.5).
///
/// `DigestFactory::default()` expands to the standard chain
/// (`filesize` → `initial_xxhash` → `final_xxhash` → `sha`); construct
/// with [`DigestFactory::with_chain`] to select a different subset (any
/// order) by [`DigestKind`].
pub struct DigestFactory {
    chain: Vec<DigestKind>,
}

impl Default for DigestFactory {
    fn default() -> Self {
        Self {
            chain: DigestKind::DEFAULT_CHAIN.to_vec(),
        }
    }
}

impl DigestFactory {
    /// Use a specific, user-chosen digest chain instead of the default.
    #[must_use]
    pub fn with_chain(chain: Vec<DigestKind>) -> Self {
        Self { chain }
    }
}

impl crate::blocking::BlockingFactory<PathBuf> for DigestFactory {
    fn all_functions(&self) -> Result<Vec<Box<dyn BlockingFn<PathBuf>>>> {
        Ok(self
            .chain
            .iter()
            .map(|kind| Box::new(FileDigest::new(*kind)) as Box<dyn BlockingFn<PathBuf>>)
            .collect())
    }
}
