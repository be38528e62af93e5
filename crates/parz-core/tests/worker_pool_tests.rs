use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parz_core::{ParzError, Supervisor, WorkerPool};

#[test]
fn runs_every_shard() -> Result<(), Box<dyn std::error::Error>> {
    let supervisor = Supervisor::new();
    let processed = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&processed);
    WorkerPool::new(4).run(&supervisor.handle(), (0..64usize).collect(), move |_id, _shard| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })?;

    assert_eq!(processed.load(Ordering::SeqCst), 64);
    assert_eq!(supervisor.finalize(), 0);
    Ok(())
}

#[test]
fn never_exceeds_the_configured_worker_count() -> Result<(), Box<dyn std::error::Error>> {
    let supervisor = Supervisor::new();
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let job_active = Arc::clone(&active);
    let job_peak = Arc::clone(&peak);
    WorkerPool::new(3).run(&supervisor.handle(), (0..12usize).collect(), move |_id, _shard| {
        let now = job_active.fetch_add(1, Ordering::SeqCst) + 1;
        job_peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        job_active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    })?;

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(supervisor.finalize(), 0);
    Ok(())
}

#[test]
fn one_failing_shard_does_not_stop_the_others() -> Result<(), Box<dyn std::error::Error>> {
    let supervisor = Supervisor::new();
    let handle = supervisor.handle();
    let completed = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&completed);
    WorkerPool::new(2).run(&handle, (0..10usize).collect(), move |_id, shard| {
        if shard == 3 {
            return Err(ParzError::Entry {
                path: PathBuf::from("shard-3.bin"),
                source: io::Error::new(io::ErrorKind::NotFound, "vanished"),
            });
        }
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })?;

    assert_eq!(completed.load(Ordering::SeqCst), 9);
    assert_eq!(supervisor.finalize(), 1);
    assert!(!handle.should_abort());
    Ok(())
}

#[test]
fn fatal_error_skips_the_pending_shards() -> Result<(), Box<dyn std::error::Error>> {
    let supervisor = Supervisor::new();
    let handle = supervisor.handle();
    let ran_after_failure = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&ran_after_failure);
    let job_handle = handle.clone();
    WorkerPool::new(1).run(&handle, (0..4usize).collect(), move |_id, shard| {
        if shard == 0 {
            return Err(ParzError::Codec {
                path: PathBuf::from("00000000.tar.zst"),
                source: io::Error::other("corrupt stream"),
            });
        }

        // Later shards must see the flag within one poll interval; give the
        // manager a bounded window and record any shard that still ran.
        let deadline = Instant::now() + Duration::from_secs(2);
        while !job_handle.should_abort() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        if job_handle.should_abort() {
            return Err(ParzError::Cancelled);
        }
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })?;

    assert_eq!(ran_after_failure.load(Ordering::SeqCst), 0);
    assert_eq!(supervisor.finalize(), 1);
    assert!(handle.should_abort());
    Ok(())
}

#[test]
fn panicking_shard_is_contained_and_reported() -> Result<(), Box<dyn std::error::Error>> {
    let supervisor = Supervisor::new();
    let completed = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&completed);
    WorkerPool::new(2).run(&supervisor.handle(), (0..6usize).collect(), move |_id, shard| {
        if shard == 2 {
            panic!("worker blew up");
        }
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })?;

    // The panic is reported as a fatal error; shards already running finish,
    // later ones may be skipped, but the pool itself survives to join.
    assert!(completed.load(Ordering::SeqCst) >= 1);
    assert!(supervisor.finalize() >= 1);
    Ok(())
}
