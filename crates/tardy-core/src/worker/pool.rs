use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info};

use crate::error::{WorkerError, WorkerResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of named threads fed from a bounded channel.
///
/// [`ExecutionPool::submit`] blocks while the channel is full, which holds
/// the poll loop back instead of letting deliveries pile up unprocessed.
/// A panicking job is logged and does not take its thread down.
pub struct ExecutionPool {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl ExecutionPool {
    pub fn new(name: &str, size: usize, queue_capacity: usize) -> WorkerResult<Self> {
        let size = size.max(1);
        let (tx, rx) = crossbeam_channel::bounded::<Job>(queue_capacity);

        let mut threads = Vec::with_capacity(size);
        for index in 0..size {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || run_jobs(rx))
                .map_err(|e| WorkerError::Spawn(e.to_string()))?;
            threads.push(handle);
        }

        info!(pool = name, size, queue_capacity, "execution pool started");
        Ok(Self {
            name: name.to_string(),
            sender: Mutex::new(Some(tx)),
            threads: Mutex::new(threads),
        })
    }

    /// Queue `job` for execution, blocking while the pool is saturated.
    pub fn submit<F>(&self, job: F) -> WorkerResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        // Clone the sender so a blocked submit does not hold the lock that
        // shutdown needs.
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(WorkerError::PoolClosed)?;
        sender
            .send(Box::new(job))
            .map_err(|_| WorkerError::PoolClosed)
    }

    /// Stop accepting jobs, let queued jobs finish, and join every thread.
    /// Calling it again is a no-op.
    pub fn shutdown(&self) -> WorkerResult<()> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return Ok(());
        }
        drop(sender);

        let threads: Vec<_> = self
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let mut panicked = false;
        for handle in threads {
            panicked |= handle.join().is_err();
        }
        info!(pool = %self.name, "execution pool stopped");
        if panicked {
            Err(WorkerError::ThreadPanicked)
        } else {
            Ok(())
        }
    }
}

impl Drop for ExecutionPool {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn run_jobs(rx: Receiver<Job>) {
    for job in rx.iter() {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
            error!(panic = panic_message(&*panic), "job panicked");
        }
    }
    debug!("execution thread exiting");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
