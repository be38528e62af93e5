use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::buffer::BlockPool;
use crate::error::ParzError;
use crate::pipeline::offload::OffloadReader;
use crate::pipeline::types::RunContext;
use crate::types::Result;

/// Decompresses and unpacks one archive into the output directory.
pub(crate) fn extract_shard(ctx: &RunContext, archive_path: &Path) -> Result<()> {
    let pool = Arc::new(BlockPool::new(
        ctx.options.block_size,
        ctx.options.pool_blocks,
    ));
    let result = unpack_archive(ctx, &pool, archive_path);
    ctx.totals.absorb_pool(pool.metrics());
    result
}

fn unpack_archive(ctx: &RunContext, pool: &Arc<BlockPool>, archive_path: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|source| ParzError::Entry {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let compressed = file.metadata().map(|meta| meta.len()).unwrap_or(0);

    let mut reader = OffloadReader::new(
        file,
        archive_path.to_path_buf(),
        Arc::clone(pool),
        ctx.supervisor.clone(),
        ctx.options.poll_interval,
    )?;

    match unpack_entries(&mut reader, ctx) {
        Ok((files, bytes)) => {
            ctx.totals.files.fetch_add(files, Ordering::Relaxed);
            ctx.totals
                .bytes_read
                .fetch_add(compressed, Ordering::Relaxed);
            ctx.totals
                .bytes_written
                .fetch_add(bytes, Ordering::Relaxed);
            tracing::debug!(
                archive = %archive_path.display(),
                files,
                "archive extracted"
            );
            Ok(())
        }
        Err(source) => {
            if reader.source_failed() {
                // The offload thread already reported the underlying read
                // failure; the partially restored shard stands as-is.
                tracing::warn!(
                    archive = %archive_path.display(),
                    "archive abandoned after source read failure"
                );
                Ok(())
            } else if source.kind() == io::ErrorKind::Interrupted {
                Err(ParzError::Cancelled)
            } else {
                Err(ParzError::Codec {
                    path: archive_path.to_path_buf(),
                    source,
                })
            }
        }
    }
}

/// Runs the zstd decoder and tar reader over the offloaded byte stream.
///
/// Restored entries land under the run's output directory; entries whose
/// paths would escape it are refused by `unpack_in` and not counted.
fn unpack_entries(reader: &mut OffloadReader, ctx: &RunContext) -> io::Result<(u64, u64)> {
    let decoder = zstd::stream::read::Decoder::new(reader)?;
    let buffered = BufReader::with_capacity(
        zstd::stream::read::Decoder::<'_, std::io::Empty>::recommended_output_size(),
        decoder,
    );
    let mut archive = tar::Archive::new(buffered);

    let mut files = 0u64;
    let mut bytes = 0u64;
    for entry in archive.entries()? {
        if ctx.supervisor.should_abort() {
            return Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "extract cancelled",
            ));
        }

        let mut entry = entry?;
        let size = entry.size();
        if entry.unpack_in(&ctx.out_dir)? {
            files += 1;
            bytes += size;
        }
    }

    Ok((files, bytes))
}
