use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};

/// A pool of reusable fixed-size byte blocks.
///
/// Blocks circulate between a pipeline's reader thread and its consumer:
/// `acquire` hands out a recycled block when one is parked, and dropping a
/// [`PooledBlock`] parks it again. The recycle channel is bounded at
/// `max_blocks`, so a block returned to a full pool is simply freed and
/// steady-state memory stays capped at `max_blocks * block_size`.
///
/// `acquire` never blocks. When the pool is empty it allocates a fresh block
/// instead, which keeps the pool out of any wait cycle; allocation beyond the
/// configured capacity shows up in [`PoolMetricsSnapshot::created`].
#[derive(Debug)]
pub struct BlockPool {
    recycler: Sender<Vec<u8>>,
    receiver: Receiver<Vec<u8>>,
    block_size: usize,
    max_blocks: usize,
    metrics: Arc<PoolMetricsInner>,
}

impl BlockPool {
    /// Creates a pool of up to `max_blocks` blocks of `block_size` bytes.
    pub fn new(block_size: usize, max_blocks: usize) -> Self {
        let max_blocks = max_blocks.max(1);
        let (recycler, receiver) = bounded(max_blocks);
        Self {
            recycler,
            receiver,
            block_size: block_size.max(1),
            max_blocks,
            metrics: Arc::new(PoolMetricsInner::default()),
        }
    }

    /// Acquires an empty block, recycling a parked one when available.
    pub fn acquire(&self) -> PooledBlock {
        let data = match self.receiver.try_recv() {
            Ok(mut data) => {
                data.clear();
                self.metrics.recycled.fetch_add(1, Ordering::Relaxed);
                data
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                let created = self.metrics.created.fetch_add(1, Ordering::Relaxed) + 1;
                if created > self.max_blocks {
                    tracing::debug!(
                        created,
                        max_blocks = self.max_blocks,
                        "allocating past pool capacity"
                    );
                }
                Vec::with_capacity(self.block_size)
            }
        };

        PooledBlock {
            data,
            sequence: 0,
            recycler: self.recycler.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Block capacity in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks the pool retains.
    pub fn max_blocks(&self) -> usize {
        self.max_blocks
    }

    /// Blocks currently parked in the pool.
    pub fn parked(&self) -> usize {
        self.receiver.len()
    }

    /// Returns a snapshot of the pool counters.
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            created: self.metrics.created.load(Ordering::Relaxed),
            recycled: self.metrics.recycled.load(Ordering::Relaxed),
            dropped: self.metrics.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Pool counters at a point in time.
///
/// Every block ever created is either parked in the pool, held by an owner,
/// or accounted for in `dropped`, so after a pipeline winds down
/// `created == parked + dropped` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolMetricsSnapshot {
    /// Blocks allocated because the pool was empty.
    pub created: usize,
    /// Acquisitions served from a parked block.
    pub recycled: usize,
    /// Blocks freed because the pool was already full.
    pub dropped: usize,
}

#[derive(Debug, Default)]
struct PoolMetricsInner {
    created: AtomicUsize,
    recycled: AtomicUsize,
    dropped: AtomicUsize,
}

/// A block checked out of a [`BlockPool`].
///
/// Dereferences to the underlying `Vec<u8>`; dropping the block returns it to
/// the pool. The `sequence` stamp records the fill order within the owning
/// pipeline.
#[derive(Debug)]
pub struct PooledBlock {
    data: Vec<u8>,
    sequence: u64,
    recycler: Sender<Vec<u8>>,
    metrics: Arc<PoolMetricsInner>,
}

impl PooledBlock {
    /// Fill-order stamp assigned by the reader thread.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Deref for PooledBlock {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl DerefMut for PooledBlock {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl Drop for PooledBlock {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        if self.recycler.try_send(data).is_err() {
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}
