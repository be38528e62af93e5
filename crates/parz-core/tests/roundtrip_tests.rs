use std::fs;
use std::path::Path;
use std::time::Duration;

use parz_core::{ArchivePipeline, PipelineOptions, discover_archives, discover_entries};

fn test_options() -> PipelineOptions {
    PipelineOptions {
        threads: 2,
        block_size: 1024,
        pool_blocks: 2,
        level: 0,
        poll_interval: Duration::from_millis(50),
    }
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn write_tree(root: &Path, files: &[(&str, Vec<u8>)]) -> std::io::Result<()> {
    for (rel, data) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
    }
    Ok(())
}

fn assert_tree_restored(root: &Path, files: &[(&str, Vec<u8>)]) {
    for (rel, data) in files {
        let restored = fs::read(root.join(rel))
            .unwrap_or_else(|error| panic!("missing restored file {rel}: {error}"));
        assert_eq!(&restored, data, "contents differ for {rel}");
    }
}

#[test]
fn three_file_roundtrip_with_tight_pool() -> Result<(), Box<dyn std::error::Error>> {
    // 0 bytes, exactly one block, and 2.5 blocks, over 2 workers and a
    // 2-block pool.
    let files = vec![
        ("empty.bin", Vec::new()),
        ("one-block.bin", patterned(1024)),
        ("two-and-a-half.bin", patterned(2560)),
    ];

    let input = tempfile::tempdir()?;
    let archives = tempfile::tempdir()?;
    let restored = tempfile::tempdir()?;
    write_tree(input.path(), &files)?;

    let pipeline = ArchivePipeline::new(test_options());
    let compressed = pipeline.compress_tree(input.path(), archives.path())?;
    assert_eq!(compressed.errors, 0);
    assert_eq!(compressed.files, 3);
    assert_eq!(compressed.shards, 2);
    assert_eq!(discover_archives(archives.path())?.len(), 2);

    let extracted = pipeline.extract_tree(archives.path(), restored.path())?;
    assert_eq!(extracted.errors, 0);
    assert_eq!(extracted.files, 3);

    assert_tree_restored(restored.path(), &files);
    Ok(())
}

#[test]
fn nested_tree_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
    let files = vec![
        ("a.txt", b"alpha\n".to_vec()),
        ("docs/readme.md", patterned(10_000)),
        ("docs/deep/nested/blob.bin", patterned(123_457)),
        ("media/clip.raw", patterned(40_000)),
        ("media/still.raw", Vec::new()),
    ];

    let input = tempfile::tempdir()?;
    let archives = tempfile::tempdir()?;
    let restored = tempfile::tempdir()?;
    write_tree(input.path(), &files)?;

    let pipeline = ArchivePipeline::new(test_options());
    let compressed = pipeline.compress_tree(input.path(), archives.path())?;
    assert_eq!(compressed.errors, 0);
    assert_eq!(compressed.files, files.len() as u64);

    let extracted = pipeline.extract_tree(archives.path(), restored.path())?;
    assert_eq!(extracted.errors, 0);
    assert_eq!(extracted.files, files.len() as u64);

    assert_tree_restored(restored.path(), &files);
    Ok(())
}

#[test]
fn single_file_input_keeps_its_name() -> Result<(), Box<dyn std::error::Error>> {
    let input = tempfile::tempdir()?;
    let archives = tempfile::tempdir()?;
    let restored = tempfile::tempdir()?;

    let payload = patterned(50_000);
    let file_path = input.path().join("solo.dat");
    fs::write(&file_path, &payload)?;

    let pipeline = ArchivePipeline::new(test_options());
    let compressed = pipeline.compress_tree(&file_path, archives.path())?;
    assert_eq!(compressed.errors, 0);
    assert_eq!(compressed.files, 1);

    let extracted = pipeline.extract_tree(archives.path(), restored.path())?;
    assert_eq!(extracted.errors, 0);
    assert_eq!(fs::read(restored.path().join("solo.dat"))?, payload);
    Ok(())
}

#[test]
fn vanished_file_is_counted_but_does_not_stop_the_run()
-> Result<(), Box<dyn std::error::Error>> {
    let files = vec![
        ("keep-a.bin", patterned(3000)),
        ("keep-b.bin", patterned(1500)),
        ("doomed.bin", patterned(2000)),
    ];

    let input = tempfile::tempdir()?;
    let archives = tempfile::tempdir()?;
    let restored = tempfile::tempdir()?;
    write_tree(input.path(), &files)?;

    // Discover everything, then yank one file before the workers start: its
    // open fails mid-run exactly like a file deleted underneath the tool.
    let entries = discover_entries(input.path())?;
    assert_eq!(entries.len(), 3);
    fs::remove_file(input.path().join("doomed.bin"))?;

    let pipeline = ArchivePipeline::new(test_options());
    let compressed = pipeline.compress_entries(entries, archives.path())?;
    assert!(compressed.errors >= 1);
    assert_eq!(compressed.files, 2);

    let extracted = pipeline.extract_tree(archives.path(), restored.path())?;
    assert_eq!(extracted.errors, 0);

    assert_tree_restored(
        restored.path(),
        &files
            .iter()
            .filter(|(rel, _)| *rel != "doomed.bin")
            .cloned()
            .collect::<Vec<_>>(),
    );
    assert!(!restored.path().join("doomed.bin").exists());
    Ok(())
}

#[test]
fn empty_input_produces_an_empty_run() -> Result<(), Box<dyn std::error::Error>> {
    let input = tempfile::tempdir()?;
    let archives = tempfile::tempdir()?;
    let restored = tempfile::tempdir()?;

    let pipeline = ArchivePipeline::new(test_options());
    let compressed = pipeline.compress_tree(input.path(), archives.path())?;
    assert_eq!(compressed.errors, 0);
    assert_eq!(compressed.shards, 0);
    assert!(discover_archives(archives.path())?.is_empty());

    let extracted = pipeline.extract_tree(archives.path(), restored.path())?;
    assert_eq!(extracted.errors, 0);
    assert_eq!(extracted.files, 0);
    Ok(())
}
