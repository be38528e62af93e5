use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::buffer::PoolMetricsSnapshot;
use crate::core::SupervisorHandle;

/// Tuning knobs for compress and extract runs.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Worker thread count; 0 selects one worker per available core.
    pub threads: usize,
    /// Capacity of each pooled block in bytes.
    pub block_size: usize,
    /// Blocks retained by each pipeline's pool; also the read-ahead queue
    /// depth.
    pub pool_blocks: usize,
    /// zstd compression level; 0 uses the library default.
    pub level: i32,
    /// Upper bound on every blocking wait, so cancellation is observed within
    /// one interval.
    pub poll_interval: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            threads: 0,
            block_size: 128 * 1024,
            pool_blocks: 10,
            level: 0,
            poll_interval: Duration::from_millis(200),
        }
    }
}

impl PipelineOptions {
    pub fn resolved_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}

/// Totals reported after a compress or extract run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Shards (archives) the run was split into.
    pub shards: usize,
    /// Files archived or restored.
    pub files: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub elapsed: Duration,
    /// Final supervisor error count; non-zero means the run failed.
    pub errors: usize,
    /// Block pool counters aggregated across all pipelines.
    pub pool: PoolMetricsSnapshot,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.errors == 0
    }
}

/// Shared state handed to every shard job of one run.
pub(crate) struct RunContext {
    pub(crate) out_dir: PathBuf,
    pub(crate) options: PipelineOptions,
    pub(crate) supervisor: SupervisorHandle,
    pub(crate) totals: RunTotals,
}

#[derive(Debug, Default)]
pub(crate) struct RunTotals {
    pub(crate) files: AtomicU64,
    pub(crate) bytes_read: AtomicU64,
    pub(crate) bytes_written: AtomicU64,
    pool_created: AtomicU64,
    pool_recycled: AtomicU64,
    pool_dropped: AtomicU64,
}

impl RunTotals {
    /// Folds one pipeline pool's counters into the run totals.
    pub(crate) fn absorb_pool(&self, metrics: PoolMetricsSnapshot) {
        self.pool_created
            .fetch_add(metrics.created as u64, Ordering::Relaxed);
        self.pool_recycled
            .fetch_add(metrics.recycled as u64, Ordering::Relaxed);
        self.pool_dropped
            .fetch_add(metrics.dropped as u64, Ordering::Relaxed);
    }

    pub(crate) fn summarize(&self, shards: usize, errors: usize, elapsed: Duration) -> RunSummary {
        RunSummary {
            shards,
            files: self.files.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            elapsed,
            errors,
            pool: PoolMetricsSnapshot {
                created: self.pool_created.load(Ordering::Relaxed) as usize,
                recycled: self.pool_recycled.load(Ordering::Relaxed) as usize,
                dropped: self.pool_dropped.load(Ordering::Relaxed) as usize,
            },
        }
    }
}
