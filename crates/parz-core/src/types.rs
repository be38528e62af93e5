use std::path::PathBuf;

use crate::error::ParzError;

pub type Result<T> = std::result::Result<T, ParzError>;

/// A regular file scheduled for archiving.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Path used to open the file, as discovered.
    pub abs_path: PathBuf,
    /// Path recorded in the archive, relative to the input root.
    pub rel_path: PathBuf,
    /// Size at discovery time, used for shard balancing.
    pub size: u64,
}

/// One worker pipeline's slice of the input tree.
///
/// Each shard is written to its own archive, named after `index`.
#[derive(Debug, Clone)]
pub struct Shard {
    pub index: usize,
    pub entries: Vec<FileEntry>,
    /// Total bytes across `entries` at discovery time.
    pub bytes: u64,
}
