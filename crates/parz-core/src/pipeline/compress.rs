use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::buffer::BlockPool;
use crate::error::ParzError;
use crate::pipeline::offload::OffloadReader;
use crate::pipeline::types::RunContext;
use crate::types::{FileEntry, Result, Shard};

const ARCHIVE_WRITE_BUFFER: usize = 128 * 1024;

enum EntryOutcome {
    Appended(u64),
    Skipped,
    /// The offload thread died on a read error mid-entry. The tar stream is
    /// truncated at this point, so the shard stops; the failure was already
    /// reported from the thread.
    SourceFailed,
}

/// Packs one shard of the input tree into its own `.tar.zst` archive.
pub(crate) fn compress_shard(ctx: &RunContext, shard: &Shard) -> Result<()> {
    let pool = Arc::new(BlockPool::new(
        ctx.options.block_size,
        ctx.options.pool_blocks,
    ));
    let result = write_shard_archive(ctx, &pool, shard);
    ctx.totals.absorb_pool(pool.metrics());
    result
}

fn write_shard_archive(ctx: &RunContext, pool: &Arc<BlockPool>, shard: &Shard) -> Result<()> {
    let out_path = ctx.out_dir.join(format!("{:08}.tar.zst", shard.index));
    let archive_error =
        |source: io::Error| ParzError::Archive { path: out_path.clone(), source };

    let file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&out_path)
        .map_err(archive_error)?;
    let writer = BufWriter::with_capacity(ARCHIVE_WRITE_BUFFER, file);
    let mut encoder =
        zstd::stream::write::Encoder::new(writer, ctx.options.level).map_err(archive_error)?;
    // Compression runs on the codec's own thread, overlapping tar framing.
    encoder.multithread(1).map_err(archive_error)?;
    let mut builder = tar::Builder::new(encoder);

    let mut appended = 0u64;
    for entry in &shard.entries {
        if ctx.supervisor.should_abort() {
            return Err(ParzError::Cancelled);
        }

        match append_entry(ctx, pool, &mut builder, entry)? {
            EntryOutcome::Appended(bytes) => {
                appended += 1;
                ctx.totals.files.fetch_add(1, Ordering::Relaxed);
                ctx.totals.bytes_read.fetch_add(bytes, Ordering::Relaxed);
            }
            EntryOutcome::Skipped => {}
            EntryOutcome::SourceFailed => break,
        }
    }

    let encoder = builder.into_inner().map_err(archive_error)?;
    let writer = encoder.finish().map_err(archive_error)?;
    let file = writer
        .into_inner()
        .map_err(|error| archive_error(error.into_error()))?;
    file.sync_all().map_err(archive_error)?;

    let written = file.metadata().map(|meta| meta.len()).unwrap_or(0);
    ctx.totals
        .bytes_written
        .fetch_add(written, Ordering::Relaxed);
    tracing::debug!(
        shard = shard.index,
        files = appended,
        out_path = %out_path.display(),
        "shard archive written"
    );

    Ok(())
}

/// Streams one file into the tar builder through an offload reader.
///
/// An entry whose file cannot be opened or stat'ed is reported and skipped so
/// the rest of the shard survives. Failures once the header has been written
/// poison the stream and end the shard.
fn append_entry<W: Write>(
    ctx: &RunContext,
    pool: &Arc<BlockPool>,
    builder: &mut tar::Builder<W>,
    entry: &FileEntry,
) -> Result<EntryOutcome> {
    let file = match File::open(&entry.abs_path) {
        Ok(file) => file,
        Err(source) => {
            ctx.supervisor.report(ParzError::Entry {
                path: entry.abs_path.clone(),
                source,
            });
            return Ok(EntryOutcome::Skipped);
        }
    };
    let metadata = match file.metadata() {
        Ok(metadata) => metadata,
        Err(source) => {
            ctx.supervisor.report(ParzError::Entry {
                path: entry.abs_path.clone(),
                source,
            });
            return Ok(EntryOutcome::Skipped);
        }
    };

    let mut header = tar::Header::new_gnu();
    header.set_metadata(&metadata);

    let mut reader = OffloadReader::new(
        file,
        entry.abs_path.clone(),
        Arc::clone(pool),
        ctx.supervisor.clone(),
        ctx.options.poll_interval,
    )?;

    match builder.append_data(&mut header, &entry.rel_path, &mut reader) {
        Ok(()) => Ok(EntryOutcome::Appended(metadata.len())),
        Err(source) => {
            if reader.source_failed() {
                tracing::warn!(
                    path = %entry.abs_path.display(),
                    "stopping shard after source read failure"
                );
                Ok(EntryOutcome::SourceFailed)
            } else if source.kind() == io::ErrorKind::Interrupted {
                // Cancellation surfaced through the read path.
                Err(ParzError::Cancelled)
            } else {
                Err(ParzError::Entry {
                    path: entry.abs_path.clone(),
                    source,
                })
            }
        }
    }
}
