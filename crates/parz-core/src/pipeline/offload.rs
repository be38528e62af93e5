use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};

use crate::buffer::{BlockPool, PooledBlock};
use crate::core::SupervisorHandle;
use crate::error::ParzError;

/// Bound on how long `drop` waits for the offload thread to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

enum ReadEvent {
    Block(PooledBlock),
    End,
}

/// Read-ahead wrapper that moves a blocking source onto its own thread.
///
/// The offload thread continuously fills blocks from the pool and queues them
/// on a bounded channel (capacity = pool capacity), so the consumer's CPU
/// work overlaps with I/O wait instead of serializing behind it. The channel
/// bound is the backpressure: once the consumer falls behind by a full queue,
/// the thread parks in `send` until a slot frees — and a blocked sender
/// implies the queue is non-empty, so the consumer's next receive succeeds
/// immediately. Neither side holds any other resource across a channel
/// operation, which rules out a reader/consumer wait cycle.
///
/// End of stream is a terminal `End` event. A failed read has no caller to
/// return to, so the thread reports it to the supervisor and exits; the
/// consumer then sees a closed channel and exposes that via
/// [`source_failed`](OffloadReader::source_failed) so the owning pipeline
/// does not report the same failure twice.
///
/// Every receive is bounded by the poll interval and re-checks the
/// cancellation flag, so a stalled source cannot keep a pipeline alive past
/// an abort.
pub struct OffloadReader {
    thread: Option<thread::JoinHandle<()>>,
    ready_rx: Option<Receiver<ReadEvent>>,
    current: Option<(PooledBlock, usize)>,
    supervisor: SupervisorHandle,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
    source: PathBuf,
    next_sequence: u64,
    eof: bool,
    source_failed: bool,
}

struct OffloadThread {
    inner: Box<dyn Read + Send>,
    ready_tx: Sender<ReadEvent>,
    pool: Arc<BlockPool>,
    stop: Arc<AtomicBool>,
    supervisor: SupervisorHandle,
    source: PathBuf,
    poll_interval: Duration,
}

impl OffloadReader {
    /// Spawns the offload thread over `inner`.
    ///
    /// `source` names the underlying file in error reports and logs.
    pub fn new<R>(
        inner: R,
        source: PathBuf,
        pool: Arc<BlockPool>,
        supervisor: SupervisorHandle,
        poll_interval: Duration,
    ) -> io::Result<OffloadReader>
    where
        R: Read + Send + 'static,
    {
        let (ready_tx, ready_rx) = bounded(pool.max_blocks());
        let stop = Arc::new(AtomicBool::new(false));

        let thread_state = OffloadThread {
            inner: Box::new(inner),
            ready_tx,
            pool,
            stop: Arc::clone(&stop),
            supervisor: supervisor.clone(),
            source: source.clone(),
            poll_interval,
        };
        let thread = thread::Builder::new()
            .name("parz-offload".to_string())
            .spawn(move || thread_state.run())?;

        Ok(OffloadReader {
            thread: Some(thread),
            ready_rx: Some(ready_rx),
            current: None,
            supervisor,
            stop,
            poll_interval,
            source,
            next_sequence: 0,
            eof: false,
            source_failed: false,
        })
    }

    /// True when the offload thread died on a read error.
    ///
    /// The failure was already reported to the supervisor from the thread, so
    /// callers seeing this should stop without reporting again.
    pub fn source_failed(&self) -> bool {
        self.source_failed
    }

    fn next_event(&mut self) -> io::Result<ReadEvent> {
        let Some(ready_rx) = self.ready_rx.as_ref() else {
            return Ok(ReadEvent::End);
        };

        loop {
            match ready_rx.recv_timeout(self.poll_interval) {
                Ok(event) => return Ok(event),
                Err(RecvTimeoutError::Timeout) => {
                    if self.supervisor.should_abort() {
                        return Err(io::Error::new(
                            io::ErrorKind::Interrupted,
                            "read cancelled while waiting for the offload thread",
                        ));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.source_failed = true;
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        format!("source read failed: {}", self.source.display()),
                    ));
                }
            }
        }
    }
}

impl Read for OffloadReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if let Some((block, offset)) = self.current.take() {
                debug_assert!(offset < block.len());
                let count = (block.len() - offset).min(buf.len());
                buf[..count].copy_from_slice(&block[offset..offset + count]);
                if offset + count < block.len() {
                    self.current = Some((block, offset + count));
                }
                // A fully drained block falls out of scope here and recycles
                // back to the pool.
                return Ok(count);
            }

            if self.eof {
                return Ok(0);
            }

            match self.next_event()? {
                ReadEvent::Block(block) => {
                    debug_assert_eq!(
                        block.sequence(),
                        self.next_sequence,
                        "blocks must arrive in fill order"
                    );
                    self.next_sequence += 1;
                    if !block.is_empty() {
                        self.current = Some((block, 0));
                    }
                }
                ReadEvent::End => {
                    self.eof = true;
                    return Ok(0);
                }
            }
        }
    }
}

impl Drop for OffloadReader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.current = None;

        if let Some(ready_rx) = self.ready_rx.take() {
            // Recycle whatever is still queued, then close the channel so a
            // sender parked on a full queue wakes up.
            while ready_rx.try_recv().is_ok() {}
        }

        let Some(thread) = self.thread.take() else {
            return;
        };
        let started_at = Instant::now();
        while started_at.elapsed() < SHUTDOWN_TIMEOUT {
            if thread.is_finished() {
                if thread.join().is_err() {
                    tracing::error!(source = %self.source.display(), "offload thread panicked");
                }
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }

        tracing::error!(
            source = %self.source.display(),
            "timed out waiting for the offload thread to exit"
        );
    }
}

impl OffloadThread {
    fn run(mut self) {
        let mut sequence = 0u64;

        loop {
            if self.should_stop() {
                return;
            }

            let capacity = self.pool.block_size();
            let mut block = self.pool.acquire();
            block.resize(capacity, 0);

            let mut filled = 0usize;
            while filled < capacity && !self.should_stop() {
                match self.inner.read(&mut block[filled..]) {
                    Ok(0) => break,
                    Ok(count) => filled += count,
                    Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                    Err(error) => {
                        self.supervisor.report(ParzError::Entry {
                            path: self.source.clone(),
                            source: error,
                        });
                        return;
                    }
                }
            }

            if self.should_stop() {
                return;
            }
            if filled == 0 {
                self.send(ReadEvent::End);
                return;
            }

            block.truncate(filled);
            block.set_sequence(sequence);
            sequence += 1;
            if !self.send(ReadEvent::Block(block)) {
                return;
            }
        }
    }

    /// Sends with a bounded wait so a full queue never outlives cancellation.
    /// Returns false when the consumer is gone or the run is unwinding.
    fn send(&self, event: ReadEvent) -> bool {
        let mut event = event;
        loop {
            match self.ready_tx.send_timeout(event, self.poll_interval) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(returned)) => {
                    if self.should_stop() {
                        return false;
                    }
                    event = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst) || self.supervisor.should_abort()
    }
}
