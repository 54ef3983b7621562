mod pool;
mod registry;

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::message::Message;
use crate::metrics::WorkerMetrics;
use crate::queue::Queue;

pub use pool::ExecutionPool;
pub use registry::{HandlerRegistry, MessageHandler};

/// What a single [`Worker::poll_once`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The worker is deactivated; the queue was not touched.
    Inactive,
    /// Nothing was due.
    Empty,
    /// A message was handed to the execution pool.
    Dispatched { kind: &'static str },
}

/// Polls a queue and routes each delivered message to the handler
/// registered for its kind.
///
/// The worker holds no message state. Handlers run on the execution pool
/// and own the ack; a message nobody acks comes back after the queue's ack
/// timeout. Polling is driven from outside, see
/// [`WorkerRuntime`](crate::runtime::WorkerRuntime).
pub struct Worker<M: Message> {
    queue: Queue<M>,
    registry: HandlerRegistry<M>,
    pool: ExecutionPool,
    active: AtomicBool,
    metrics: WorkerMetrics,
}

impl<M: Message> Worker<M> {
    pub fn new(
        queue: Queue<M>,
        registry: HandlerRegistry<M>,
        config: &WorkerConfig,
    ) -> WorkerResult<Self> {
        Self::with_metrics(queue, registry, config, WorkerMetrics::new())
    }

    pub fn with_metrics(
        queue: Queue<M>,
        registry: HandlerRegistry<M>,
        config: &WorkerConfig,
        metrics: WorkerMetrics,
    ) -> WorkerResult<Self> {
        let pool = ExecutionPool::new(
            &format!("tardy-{}", queue.name()),
            config.pool_size,
            config.pool_queue_capacity,
        )?;
        info!(
            queue = %queue.name(),
            handlers = ?registry.kinds(),
            active = config.start_active,
            "worker created"
        );
        Ok(Self {
            queue,
            registry,
            pool,
            active: AtomicBool::new(config.start_active),
            metrics,
        })
    }

    pub fn queue(&self) -> &Queue<M> {
        &self.queue
    }

    pub fn activate(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            info!(queue = %self.queue.name(), "worker activated");
        }
    }

    pub fn deactivate(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            info!(queue = %self.queue.name(), "worker deactivated");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Run one poll cycle: claim at most one due message and submit it to
    /// its handler without waiting for the handler to finish.
    ///
    /// Errors are per cycle. A message whose kind has no handler is left
    /// unacked, so it keeps coming back after every ack timeout.
    pub fn poll_once(&self) -> WorkerResult<PollOutcome> {
        if !self.is_active() {
            return Ok(PollOutcome::Inactive);
        }
        let queue = self.queue.name();
        self.metrics.record_poll(queue);

        let delivery = match self.queue.poll() {
            Ok(Some(delivery)) => delivery,
            Ok(None) => {
                self.metrics.record_empty_poll(queue);
                return Ok(PollOutcome::Empty);
            }
            Err(e) => {
                self.metrics.record_poll_error(queue);
                error!(%queue, error = %e, "poll failed");
                return Err(e.into());
            }
        };

        let kind = delivery.message.kind();
        let Some(handler) = self.registry.get(kind) else {
            self.metrics.record_poll_error(queue);
            error!(
                %queue,
                kind,
                id = %delivery.ack.id(),
                "no handler registered for message kind"
            );
            return Err(WorkerError::UnsupportedMessageType(kind.to_string()));
        };

        let (message, ack) = delivery.into_parts();
        let id = ack.id();
        let delivery_count = ack.delivery_count();
        if let Err(e) = self.pool.submit(move || handler.handle(message, ack)) {
            self.metrics.record_poll_error(queue);
            error!(%queue, kind, %id, error = %e, "failed to submit message to handler");
            return Err(e);
        }

        self.metrics.record_dispatch(queue, kind);
        debug!(%queue, kind, %id, delivery_count, "dispatched");
        Ok(PollOutcome::Dispatched { kind })
    }

    /// Stop polling and wait for running handlers to finish.
    pub fn shutdown(&self) -> WorkerResult<()> {
        self.deactivate();
        self.pool.shutdown()
    }
}
