use std::fs;
use std::path::{Path, PathBuf};

use jwalk::WalkDir;

use crate::types::{FileEntry, Result, Shard};

/// Discovers the regular files under `in_path`.
///
/// Directories and special files are skipped; entry paths are recorded
/// relative to `in_path` (or to its parent when `in_path` is itself a file,
/// so the archive keeps the file name). The result is sorted by relative
/// path for a deterministic shard plan.
pub fn discover_entries(in_path: &Path) -> Result<Vec<FileEntry>> {
    let metadata = fs::metadata(in_path)?;
    if metadata.is_file() {
        let rel_path = in_path
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| anyhow::anyhow!("input path has no file name"))?;
        return Ok(vec![FileEntry {
            abs_path: in_path.to_path_buf(),
            rel_path,
            size: metadata.len(),
        }]);
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(in_path) {
        let entry = entry.map_err(anyhow::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let abs_path = entry.path();
        let rel_path = abs_path
            .strip_prefix(in_path)
            .map_err(anyhow::Error::from)?
            .to_path_buf();
        let size = fs::metadata(&abs_path)?.len();
        entries.push(FileEntry {
            abs_path,
            rel_path,
            size,
        });
    }

    entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(entries)
}

/// Splits `entries` into at most `max_shards` size-balanced shards.
///
/// Greedy longest-first assignment: entries are placed largest first onto the
/// currently lightest shard, which keeps shard byte totals close even when a
/// few files dominate the tree. Never produces an empty shard.
pub fn partition_shards(mut entries: Vec<FileEntry>, max_shards: usize) -> Vec<Shard> {
    let shard_count = max_shards.max(1).min(entries.len());
    if shard_count == 0 {
        return Vec::new();
    }

    entries.sort_by(|a, b| {
        b.size
            .cmp(&a.size)
            .then_with(|| a.rel_path.cmp(&b.rel_path))
    });

    let mut shards: Vec<Shard> = (0..shard_count)
        .map(|index| Shard {
            index,
            entries: Vec::new(),
            bytes: 0,
        })
        .collect();

    for entry in entries {
        let target = shards
            .iter_mut()
            .min_by_key(|shard| shard.bytes)
            .expect("shard_count is at least one");
        target.bytes += entry.size;
        target.entries.push(entry);
    }

    for shard in &mut shards {
        shard.entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    }

    shards
}

/// Enumerates the archives in `in_dir`, sorted by file name.
///
/// Accepts both the `.tar.zst` suffix this tool writes and the older
/// `.tar.zstd` spelling.
pub fn discover_archives(in_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archives = Vec::new();
    for entry in fs::read_dir(in_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(".tar.zst") || name.ends_with(".tar.zstd") {
            archives.push(entry.path());
        }
    }

    archives.sort();
    Ok(archives)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(rel: &str, size: u64) -> FileEntry {
        FileEntry {
            abs_path: PathBuf::from("/input").join(rel),
            rel_path: PathBuf::from(rel),
            size,
        }
    }

    #[test]
    fn partition_balances_by_size() {
        let entries = vec![
            entry("a", 10),
            entry("b", 9),
            entry("c", 1),
            entry("d", 1),
            entry("e", 1),
        ];
        let shards = partition_shards(entries, 2);
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].bytes, 11);
        assert_eq!(shards[1].bytes, 11);
        let total: usize = shards.iter().map(|shard| shard.entries.len()).sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn partition_never_creates_empty_shards() {
        let shards = partition_shards(vec![entry("only", 4)], 8);
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].entries.len(), 1);

        assert!(partition_shards(Vec::new(), 4).is_empty());
    }

    #[test]
    fn partition_indexes_are_stable() {
        let entries = (0..6).map(|i| entry(&format!("f{i}"), 1)).collect();
        let shards = partition_shards(entries, 3);
        let indexes: Vec<usize> = shards.iter().map(|shard| shard.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }
}
