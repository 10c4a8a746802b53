// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Cluster-size arithmetic shared by the sampled and hashed file digests
//! (§4.5 of the specification).

/// Default cluster size used when the filesystem doesn't report one.
pub(crate) const DEFAULT_CLUSTER: u64 = 4096;

/// `blksize` as reported by `stat`, if available on this platform.
#[cfg(unix)]
pub(crate) fn blksize(metadata: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    let size = metadata.blksize();
    if size > 0 {
        Some(size)
    } else {
        None
    }
}

#[cfg(not(unix))]
pub(crate) fn blksize(_metadata: &std::fs::Metadata) -> Option<u64> {
    None
}

/// Cluster size for a file: `min(file_size, blksize or 4096)`.
pub(crate) fn cluster_size(file_len: u64, blksize: Option<u64>) -> u64 {
    file_len.min(blksize.unwrap_or(DEFAULT_CLUSTER))
}

/// The `(offset, length)` of a centred window of `want` bytes inside
/// `[region_start, region_start + region_len)`.
pub(crate) fn centered_window(region_start: u64, region_len: u64, want: u64) -> (u64, u64) {
    if region_len == 0 {
        return (region_start, 0);
    }
    let width = want.min(region_len);
    let margin = (region_len - width) / 2;
    (region_start + margin, width)
}

/// The "last cluster" segment per §4.5's Open Question resolution:
/// `off = floor((size-1)/cluster) * cluster`, `len = size - off`; if `len`
/// is shorter than `threshold`, back off one full cluster instead.
///
/// Callers must only invoke this for `size > 0` and `cluster > 0`; the
/// size-0 canonical-empty case is handled by each digest directly.
pub(crate) fn last_segment(size: u64, cluster: u64, threshold: u64) -> (u64, u64) {
    debug_assert!(size > 0 && cluster > 0);

    let off = ((size - 1) / cluster) * cluster;
    let len = size - off;

    if len < threshold && off >= cluster {
        let off = off - cluster;
        (off, cluster.min(size - off))
    } else {
        (off, len)
    }
}
