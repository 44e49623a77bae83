//! Per-format entry readers.
//!
//! Each reader walks its archive in stream order and hands every entry to a
//! callback as a [`RawEntry`], with contents fully read. Interpreting paths
//! and building the tree is left to the importer.

pub(crate) mod tar;
#[cfg(feature = "zip")]
pub(crate) mod zip;

#[derive(Debug)]
pub(crate) struct RawEntry {
    pub path: Vec<u8>,
    pub kind: RawKind,
    /// Seconds since the Unix epoch, when the format records a zoned time.
    pub mtime: Option<u64>,
}

#[derive(Debug)]
pub(crate) enum RawKind {
    File { contents: Vec<u8>, executable: bool },
    Directory,
    Symlink { target: Vec<u8> },
    HardLink { target: Vec<u8> },
    /// Skipped entries carrying only archive metadata.
    Metadata,
}

/// Buffer for an entry whose header declares `declared` bytes. Headers are
/// untrusted, so the reservation is capped and the buffer grows as data
/// actually arrives.
pub(crate) fn entry_buffer(declared: u64) -> Vec<u8> {
    const MAX_RESERVE: u64 = 64 * 1024;
    Vec::with_capacity(declared.min(MAX_RESERVE) as usize)
}

pub(crate) fn is_executable(mode: u32) -> bool {
    mode & 0o111 != 0
}
