mod compress;
mod extract;
mod offload;
mod types;

pub use offload::OffloadReader;
pub use types::{PipelineOptions, RunSummary};

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::core::{Supervisor, WorkerPool};
use crate::io::walk::{discover_archives, discover_entries, partition_shards};
use crate::types::{FileEntry, Result};

use types::{RunContext, RunTotals};

/// Drives a full compress or extract run: discovery, sharding, supervision,
/// and one worker pipeline per shard.
///
/// Shards complete independently and in no defined order; a failed shard is
/// reflected in [`RunSummary::errors`] without stopping the others unless the
/// failure was fatal.
pub struct ArchivePipeline {
    options: PipelineOptions,
}

impl ArchivePipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Archives the tree under `in_path` into per-shard archives in
    /// `out_dir`.
    pub fn compress_tree(&self, in_path: &Path, out_dir: &Path) -> Result<RunSummary> {
        let entries = discover_entries(in_path)?;
        self.compress_entries(entries, out_dir)
    }

    /// Archives an already-discovered set of entries.
    pub fn compress_entries(&self, entries: Vec<FileEntry>, out_dir: &Path) -> Result<RunSummary> {
        let started_at = Instant::now();
        fs::create_dir_all(out_dir)?;

        let threads = self.options.resolved_threads();
        let shards = partition_shards(entries, threads);
        let shard_count = shards.len();
        tracing::info!(
            shards = shard_count,
            threads,
            out_dir = %out_dir.display(),
            "compressing"
        );

        let supervisor = Supervisor::new();
        let ctx = Arc::new(RunContext {
            out_dir: out_dir.to_path_buf(),
            options: self.options.clone(),
            supervisor: supervisor.handle(),
            totals: RunTotals::default(),
        });

        let run_result = {
            let job_ctx = Arc::clone(&ctx);
            WorkerPool::new(threads).run(&supervisor.handle(), shards, move |_worker_id, shard| {
                compress::compress_shard(&job_ctx, &shard)
            })
        };
        if let Err(error) = run_result {
            supervisor.handle().report(error);
        }

        let errors = supervisor.finalize();
        Ok(ctx
            .totals
            .summarize(shard_count, errors, started_at.elapsed()))
    }

    /// Extracts every archive found in `in_dir` into `out_dir`.
    pub fn extract_tree(&self, in_dir: &Path, out_dir: &Path) -> Result<RunSummary> {
        let started_at = Instant::now();
        fs::create_dir_all(out_dir)?;

        let archives = discover_archives(in_dir)?;
        let shard_count = archives.len();
        let threads = self.options.resolved_threads();
        tracing::info!(
            archives = shard_count,
            threads,
            out_dir = %out_dir.display(),
            "extracting"
        );

        let supervisor = Supervisor::new();
        let ctx = Arc::new(RunContext {
            out_dir: out_dir.to_path_buf(),
            options: self.options.clone(),
            supervisor: supervisor.handle(),
            totals: RunTotals::default(),
        });

        let run_result = {
            let job_ctx = Arc::clone(&ctx);
            WorkerPool::new(threads).run(
                &supervisor.handle(),
                archives,
                move |_worker_id, archive| extract::extract_shard(&job_ctx, &archive),
            )
        };
        if let Err(error) = run_result {
            supervisor.handle().report(error);
        }

        let errors = supervisor.finalize();
        Ok(ctx
            .totals
            .summarize(shard_count, errors, started_at.elapsed()))
    }
}
