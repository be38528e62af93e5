use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, unbounded};

use crate::core::supervisor::SupervisorHandle;
use crate::error::ParzError;
use crate::types::Result;

/// Fixed pool of worker threads draining a queue of shards.
///
/// All shards are loaded into a channel up front and the channel is closed,
/// so each worker pulls its next shard only when its slot frees up — at most
/// `num_workers` shards are ever active. One failing shard does not stop the
/// others: job errors are converted into supervisor reports and the worker
/// moves on. Panics are contained per shard and reported as fatal.
pub struct WorkerPool {
    num_workers: usize,
}

impl WorkerPool {
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Runs `job` over every shard and joins all workers before returning.
    ///
    /// A job returning [`ParzError::Cancelled`] is treated as cooperative
    /// unwinding and never reported. Once the cancellation flag is up,
    /// workers drain the remaining shards without running them.
    pub fn run<T, F>(&self, supervisor: &SupervisorHandle, shards: Vec<T>, job: F) -> Result<()>
    where
        T: Send + 'static,
        F: Fn(usize, T) -> Result<()> + Send + Sync + 'static,
    {
        if shards.is_empty() {
            return Ok(());
        }

        let worker_count = self.num_workers.min(shards.len());
        let (shard_tx, shard_rx) = unbounded();
        for shard in shards {
            // The receiver is still alive, so the send cannot fail.
            let _ = shard_tx.send(shard);
        }
        drop(shard_tx);

        let job = Arc::new(job);
        let mut handles = Vec::with_capacity(worker_count);
        let mut spawn_error = None;

        for worker_id in 0..worker_count {
            let worker_rx = shard_rx.clone();
            let worker_supervisor = supervisor.clone();
            let worker_job = Arc::clone(&job);

            let spawned = thread::Builder::new()
                .name(format!("parz-worker-{worker_id}"))
                .spawn(move || {
                    run_worker_loop(worker_id, worker_rx, worker_supervisor, worker_job)
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    spawn_error = Some(error);
                    break;
                }
            }
        }
        drop(shard_rx);

        for handle in handles {
            if let Err(payload) = handle.join() {
                supervisor.report(ParzError::WorkerPanic(panic_message(payload)));
            }
        }

        match spawn_error {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

fn run_worker_loop<T, F>(
    worker_id: usize,
    shards: Receiver<T>,
    supervisor: SupervisorHandle,
    job: Arc<F>,
) where
    F: Fn(usize, T) -> Result<()>,
{
    let mut processed = 0usize;
    let mut skipped = 0usize;

    while let Ok(shard) = shards.recv() {
        if supervisor.should_abort() {
            skipped += 1;
            continue;
        }

        match catch_unwind(AssertUnwindSafe(|| job(worker_id, shard))) {
            Ok(Ok(())) => processed += 1,
            Ok(Err(ParzError::Cancelled)) => skipped += 1,
            Ok(Err(error)) => {
                processed += 1;
                supervisor.report(error);
            }
            Err(payload) => {
                processed += 1;
                supervisor.report(ParzError::WorkerPanic(panic_message(payload)));
            }
        }
    }

    tracing::debug!(worker_id, processed, skipped, "worker finished");
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
