use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::config::{RedeliveryConfig, WorkerConfig};
use crate::error::{WorkerError, WorkerResult};
use crate::message::Message;
use crate::worker::{PollOutcome, Worker};

/// Owns the threads that drive a [`Worker`]: a poll ticker and a
/// redelivery ticker. Both stop when the runtime is shut down or dropped.
pub struct WorkerRuntime {
    shutdown_tx: Option<Sender<()>>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl WorkerRuntime {
    /// Spawn the tickers. The worker's activation state is left alone, so a
    /// worker built with `start_active = false` idles until activated.
    #[tracing::instrument(skip_all, fields(queue = %worker.queue().name()))]
    pub fn start<M: Message>(
        worker: Arc<Worker<M>>,
        worker_config: &WorkerConfig,
        redelivery: &RedeliveryConfig,
    ) -> WorkerResult<Self> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let name = worker.queue().name().to_string();
        let mut runtime = Self {
            shutdown_tx: Some(shutdown_tx),
            threads: Vec::with_capacity(2),
        };

        let poll_interval = Duration::from_millis(worker_config.poll_interval_ms);
        let poll_worker = Arc::clone(&worker);
        let poll_rx = shutdown_rx.clone();
        runtime.spawn(format!("tardy-poll-{name}"), move || {
            poll_loop(&poll_worker, &poll_rx, poll_interval)
        })?;

        let redelivery_interval = Duration::from_millis(redelivery.interval_ms);
        runtime.spawn(format!("tardy-redelivery-{name}"), move || {
            redelivery_loop(&worker, &shutdown_rx, redelivery_interval)
        })?;

        info!(
            poll_interval_ms = worker_config.poll_interval_ms,
            redelivery_interval_ms = redelivery.interval_ms,
            "worker runtime started"
        );
        Ok(runtime)
    }

    fn spawn<F>(&mut self, name: String, body: F) -> WorkerResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        // On failure `self` is dropped by the caller, which stops any ticker
        // already running.
        let handle = thread::Builder::new()
            .name(name)
            .spawn(body)
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;
        self.threads.push(handle);
        Ok(())
    }

    /// Stop both tickers and wait for them to exit. Handlers already
    /// submitted keep running; use [`Worker::shutdown`] to wait for them.
    #[tracing::instrument(skip_all)]
    pub fn shutdown(mut self) -> WorkerResult<()> {
        info!("stopping worker runtime");
        self.stop()
    }

    fn stop(&mut self) -> WorkerResult<()> {
        // Dropping the only sender disconnects every ticker's receiver.
        self.shutdown_tx.take();
        let mut panicked = false;
        for handle in self.threads.drain(..) {
            panicked |= handle.join().is_err();
        }
        if panicked {
            Err(WorkerError::ThreadPanicked)
        } else {
            Ok(())
        }
    }
}

impl Drop for WorkerRuntime {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            let _ = self.stop();
        }
    }
}

/// Wait one tick. Returns `false` once shutdown has been signalled.
fn tick(shutdown_rx: &Receiver<()>, interval: Duration) -> bool {
    matches!(
        shutdown_rx.recv_timeout(interval),
        Err(RecvTimeoutError::Timeout)
    )
}

fn poll_loop<M: Message>(worker: &Worker<M>, shutdown_rx: &Receiver<()>, interval: Duration) {
    debug!("poll ticker running");
    while tick(shutdown_rx, interval) {
        // Failures are logged and counted by the worker; the next tick retries.
        if let Ok(PollOutcome::Dispatched { kind }) = worker.poll_once() {
            debug!(kind, "tick dispatched a message");
        }
    }
    debug!("poll ticker stopped");
}

fn redelivery_loop<M: Message>(
    worker: &Worker<M>,
    shutdown_rx: &Receiver<()>,
    interval: Duration,
) {
    debug!("redelivery ticker running");
    while tick(shutdown_rx, interval) {
        if let Err(e) = worker.queue().redelivery_check() {
            warn!(error = %e, "redelivery check failed");
        }
    }
    debug!("redelivery ticker stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::QueueSettings;
    use crate::queue::{Ack, Queue};
    use crate::storage::MemoryStorage;
    use crate::worker::{HandlerRegistry, MessageHandler};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tick(u32);

    impl Message for Tick {
        fn kind(&self) -> &'static str {
            "tick"
        }
    }

    struct Forward {
        ack: bool,
        tx: Sender<(u32, u32)>,
    }

    impl MessageHandler<Tick> for Forward {
        fn message_kind(&self) -> &'static str {
            "tick"
        }

        fn handle(&self, message: Tick, ack: Ack) {
            let count = ack.delivery_count();
            if self.ack {
                ack.ack().unwrap();
            }
            let _ = self.tx.send((message.0, count));
        }
    }

    fn start(
        ack: bool,
        ack_timeout_ms: u64,
    ) -> (
        Arc<Worker<Tick>>,
        Arc<ManualClock>,
        Receiver<(u32, u32)>,
        WorkerRuntime,
    ) {
        let clock = Arc::new(ManualClock::new(0));
        let settings = QueueSettings {
            name: "ticks".to_string(),
            ack_timeout_ms,
        };
        let queue = Queue::open(Arc::new(MemoryStorage::new()), clock.clone(), &settings).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let registry = HandlerRegistry::new().with(Forward { ack, tx });
        let config = WorkerConfig {
            poll_interval_ms: 1,
            start_active: true,
            ..WorkerConfig::default()
        };
        let worker = Arc::new(Worker::new(queue, registry, &config).unwrap());
        let runtime = WorkerRuntime::start(
            Arc::clone(&worker),
            &config,
            &RedeliveryConfig { interval_ms: 1 },
        )
        .unwrap();
        (worker, clock, rx, runtime)
    }

    #[test]
    fn runtime_polls_and_dispatches() {
        let (worker, _clock, rx, runtime) = start(true, 1_000);
        for i in 0..3 {
            worker.queue().push(&Tick(i)).unwrap();
        }

        let mut seen: Vec<u32> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap().0)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);

        runtime.shutdown().unwrap();
        worker.shutdown().unwrap();
    }

    #[test]
    fn runtime_redelivers_expired_messages() {
        let (worker, clock, rx, runtime) = start(false, 50);
        worker.queue().push(&Tick(7)).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), (7, 1));

        clock.advance(Duration::from_millis(50));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), (7, 2));

        runtime.shutdown().unwrap();
        worker.shutdown().unwrap();
    }

    #[test]
    fn drop_stops_tickers_promptly() {
        let (worker, _clock, _rx, runtime) = start(true, 1_000);
        let started = Instant::now();
        drop(runtime);
        assert!(started.elapsed() < Duration::from_secs(5));
        worker.shutdown().unwrap();
    }
}
