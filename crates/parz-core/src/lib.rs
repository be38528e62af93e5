pub mod buffer;
pub mod core;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod types;

pub use buffer::{BlockPool, PoolMetricsSnapshot, PooledBlock};
pub use crate::core::{Supervisor, SupervisorHandle, WorkerPool};
pub use error::{ParzError, Severity};
pub use io::walk::{discover_archives, discover_entries, partition_shards};
pub use pipeline::{ArchivePipeline, OffloadReader, PipelineOptions, RunSummary};
pub use types::{FileEntry, Result, Shard};
