use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::error::{ParzError, Severity};

enum Event {
    Report(ParzError),
    Abort,
}

/// Process-wide error collection and cooperative cancellation for one run.
///
/// Worker and reader threads have no caller to return a `Result` to, so every
/// failure is posted to the supervisor's mailbox instead. A dedicated manager
/// thread consumes the mailbox and is the single writer of the cancellation
/// flag and the error counter: a fatal report raises the flag, every report
/// bumps the counter. Workers poll [`SupervisorHandle::should_abort`] at each
/// bounded wait and unwind once the flag is up.
///
/// The run moves through three states: running, then aborting once a fatal
/// report (or an explicit abort request) arrives, then stopped after
/// [`Supervisor::finalize`] joins the manager thread and yields the count.
pub struct Supervisor {
    events: Sender<Event>,
    cancel: Arc<AtomicBool>,
    errors: Arc<AtomicUsize>,
    manager: thread::JoinHandle<()>,
}

/// Cheap cloneable handle passed to every worker and reader thread.
#[derive(Clone)]
pub struct SupervisorHandle {
    events: Sender<Event>,
    cancel: Arc<AtomicBool>,
}

impl Supervisor {
    pub fn new() -> Self {
        let (events_tx, events_rx) = unbounded();
        let cancel = Arc::new(AtomicBool::new(false));
        let errors = Arc::new(AtomicUsize::new(0));

        let manager_cancel = Arc::clone(&cancel);
        let manager_errors = Arc::clone(&errors);
        let manager =
            thread::spawn(move || run_manager_loop(events_rx, manager_cancel, manager_errors));

        Self {
            events: events_tx,
            cancel,
            errors,
            manager,
        }
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            events: self.events.clone(),
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Errors counted so far. The mailbox is asynchronous, so this may lag
    /// behind reports that are still in flight; `finalize` gives the exact
    /// total.
    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }

    /// Closes the mailbox, joins the manager thread, and returns the final
    /// error count. Call after all workers have been joined.
    pub fn finalize(self) -> usize {
        let Supervisor {
            events,
            cancel: _,
            errors,
            manager,
        } = self;
        drop(events);
        if manager.join().is_err() {
            tracing::error!("supervisor manager thread panicked");
        }
        errors.load(Ordering::SeqCst)
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorHandle {
    /// Posts an error to the manager thread.
    ///
    /// Never report [`ParzError::Cancelled`]: a pipeline unwinding because it
    /// observed the flag is not a new failure.
    pub fn report(&self, error: ParzError) {
        debug_assert!(!matches!(error, ParzError::Cancelled));
        if self.events.send(Event::Report(error)).is_err() {
            tracing::debug!("error reported after supervisor shutdown");
        }
    }

    /// Asks the manager to raise the cancellation flag without counting an
    /// error.
    pub fn request_abort(&self) {
        if self.events.send(Event::Abort).is_err() {
            tracing::debug!("abort requested after supervisor shutdown");
        }
    }

    /// True once a fatal report or abort request has been processed.
    pub fn should_abort(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

fn run_manager_loop(
    events: Receiver<Event>,
    cancel: Arc<AtomicBool>,
    errors: Arc<AtomicUsize>,
) {
    while let Ok(event) = events.recv() {
        match event {
            Event::Report(error) => {
                errors.fetch_add(1, Ordering::SeqCst);
                match error.severity() {
                    Severity::Fatal => {
                        tracing::error!(error = %error, "fatal error reported");
                        if !cancel.swap(true, Ordering::SeqCst) {
                            tracing::error!("cancelling remaining work");
                        }
                    }
                    Severity::Recoverable => {
                        tracing::warn!(error = %error, "error reported");
                    }
                }
            }
            Event::Abort => {
                if !cancel.swap(true, Ordering::SeqCst) {
                    tracing::info!("abort requested; cancelling remaining work");
                }
            }
        }
    }
}
