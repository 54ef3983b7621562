use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::KeyValue;

const METER_NAME: &str = "tardy";

/// OTel instruments for queue state transitions. Every data point carries a
/// `queue` attribute with the queue's configured name.
pub struct QueueMetrics {
    pub pushed: Counter<u64>,
    pub delivered: Counter<u64>,
    pub acked: Counter<u64>,
    pub redelivered: Counter<u64>,
    pub ready: Gauge<u64>,
    pub in_flight: Gauge<u64>,
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueMetrics {
    /// Create metrics from the global meter provider. If no meter provider
    /// is configured the instruments are no-op.
    pub fn new() -> Self {
        Self::from_meter(&opentelemetry::global::meter(METER_NAME))
    }

    /// Create metrics from a specific meter (used in tests with in-memory exporter).
    pub fn from_meter(meter: &Meter) -> Self {
        Self {
            pushed: meter
                .u64_counter("tardy.queue.pushed")
                .with_description("Messages pushed")
                .build(),
            delivered: meter
                .u64_counter("tardy.queue.delivered")
                .with_description("Deliveries handed to pollers, redeliveries included")
                .build(),
            acked: meter
                .u64_counter("tardy.queue.acked")
                .with_description("Messages acknowledged and removed")
                .build(),
            redelivered: meter
                .u64_counter("tardy.queue.redelivered")
                .with_description("In-flight messages returned to the ready set after their ack deadline")
                .build(),
            ready: meter
                .u64_gauge("tardy.queue.ready")
                .with_description("Messages waiting for delivery, delayed ones included")
                .build(),
            in_flight: meter
                .u64_gauge("tardy.queue.in_flight")
                .with_description("Messages delivered and awaiting ack")
                .build(),
        }
    }

    pub fn record_push(&self, queue: &str) {
        self.pushed.add(1, &[queue_attr(queue)]);
    }

    pub fn record_delivery(&self, queue: &str) {
        self.delivered.add(1, &[queue_attr(queue)]);
    }

    pub fn record_ack(&self, queue: &str) {
        self.acked.add(1, &[queue_attr(queue)]);
    }

    pub fn record_redelivery(&self, queue: &str, count: u64) {
        self.redelivered.add(count, &[queue_attr(queue)]);
    }

    pub fn set_depth(&self, queue: &str, ready: u64, in_flight: u64) {
        self.ready.record(ready, &[queue_attr(queue)]);
        self.in_flight.record(in_flight, &[queue_attr(queue)]);
    }
}

/// OTel instruments for the worker poll loop.
pub struct WorkerMetrics {
    pub polls: Counter<u64>,
    pub empty_polls: Counter<u64>,
    pub poll_errors: Counter<u64>,
    pub dispatched: Counter<u64>,
}

impl Default for WorkerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::from_meter(&opentelemetry::global::meter(METER_NAME))
    }

    pub fn from_meter(meter: &Meter) -> Self {
        Self {
            polls: meter
                .u64_counter("tardy.worker.polls")
                .with_description("Poll attempts while active")
                .build(),
            empty_polls: meter
                .u64_counter("tardy.worker.empty_polls")
                .with_description("Polls that found no due message")
                .build(),
            poll_errors: meter
                .u64_counter("tardy.worker.poll_errors")
                .with_description("Polls that failed or returned an unsupported message type")
                .build(),
            dispatched: meter
                .u64_counter("tardy.worker.dispatched")
                .with_description("Messages submitted to a handler, by kind")
                .build(),
        }
    }

    pub fn record_poll(&self, queue: &str) {
        self.polls.add(1, &[queue_attr(queue)]);
    }

    pub fn record_empty_poll(&self, queue: &str) {
        self.empty_polls.add(1, &[queue_attr(queue)]);
    }

    pub fn record_poll_error(&self, queue: &str) {
        self.poll_errors.add(1, &[queue_attr(queue)]);
    }

    pub fn record_dispatch(&self, queue: &str, kind: &'static str) {
        self.dispatched
            .add(1, &[queue_attr(queue), KeyValue::new("kind", kind)]);
    }
}

fn queue_attr(queue: &str) -> KeyValue {
    KeyValue::new("queue", queue.to_string())
}
