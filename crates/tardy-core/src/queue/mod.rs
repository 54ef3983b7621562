mod recovery;
mod state;

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::{duration_ns, Clock};
use crate::config::QueueSettings;
use crate::envelope::{AckToken, Envelope, EnvelopeKey};
use crate::error::{QueueError, QueueResult, StorageError};
use crate::message::Message;
use crate::metrics::QueueMetrics;
use crate::storage::keys::{seq_value, NEXT_SEQ_KEY};
use crate::storage::{Storage, WriteBatchOp};

use self::recovery::claim_storage;
use self::state::{Lease, QueueState};

/// Shared engine behind every [`Queue`] handle and [`Ack`].
///
/// All state transitions take `state`, write to storage, and only then
/// update the in-memory index, so a failed write leaves both unchanged.
struct QueueCore {
    name: String,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    ack_timeout: Duration,
    state: Mutex<QueueState>,
    metrics: QueueMetrics,
}

impl QueueCore {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // The index is only mutated after storage succeeds, so a panic while
        // holding the lock cannot leave it half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ack(&self, token: &AckToken) -> QueueResult<bool> {
        let mut state = self.lock();
        match state.lease_for(&token.key) {
            Some(lease) if lease.delivery == token.delivery => {}
            _ => {
                debug!(
                    queue = %self.name,
                    seq = token.key.seq,
                    delivery = token.delivery,
                    "ignoring stale ack"
                );
                return Ok(false);
            }
        }

        self.storage.delete_envelope(&token.key.encode())?;
        state.release(&token.key);
        drop(state);

        self.metrics.record_ack(&self.name);
        debug!(queue = %self.name, seq = token.key.seq, "acked");
        Ok(true)
    }

    /// Load the envelope behind a due key together with the delivery count
    /// its next poll would assign. `None` means the entry can never be
    /// delivered and should leave the ready index.
    fn deliverable(&self, key: EnvelopeKey) -> QueueResult<Option<(Envelope, u32)>> {
        let envelope = match self.storage.get_envelope(&key.encode()) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                warn!(
                    queue = %self.name,
                    seq = key.seq,
                    "ready envelope missing from storage, dropping index entry"
                );
                return Ok(None);
            }
            Err(StorageError::Serialization(reason) | StorageError::CorruptData(reason)) => {
                error!(
                    queue = %self.name,
                    seq = key.seq,
                    %reason,
                    "corrupt envelope, dropping index entry"
                );
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match envelope.delivery_count.checked_add(1) {
            Some(delivery) => Ok(Some((envelope, delivery))),
            None => {
                error!(
                    queue = %self.name,
                    id = %envelope.id,
                    delivery_count = envelope.delivery_count,
                    "delivery count exhausted, dropping index entry"
                );
                Ok(None)
            }
        }
    }

    fn report_depth(&self, state: &QueueState) {
        let (due, delayed, in_flight) = state.counts(self.clock.now_ns());
        self.metrics.set_depth(&self.name, due + delayed, in_flight);
    }
}

/// Point-in-time counts of a queue's envelopes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Due now and waiting for a poll.
    pub ready: u64,
    /// Waiting for their delivery time.
    pub delayed: u64,
    /// Delivered and not yet acknowledged.
    pub in_flight: u64,
}

/// A message handed out by [`Queue::poll`], together with the capability to
/// acknowledge it.
pub struct Delivery<M> {
    pub message: M,
    pub ack: Ack,
}

impl<M> Delivery<M> {
    pub fn into_parts(self) -> (M, Ack) {
        (self.message, self.ack)
    }
}

impl<M: fmt::Debug> fmt::Debug for Delivery<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .field("ack", &self.ack)
            .finish()
    }
}

/// Acknowledges one specific delivery.
///
/// Acking removes the message for good. Acking after the message was
/// redelivered, or after it was already acked, does nothing.
pub struct Ack {
    core: Arc<QueueCore>,
    token: AckToken,
    id: Uuid,
}

impl Ack {
    /// Envelope id of the delivered message.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// How many times this message has been delivered, this delivery
    /// included. Anything above 1 means a previous delivery went unacked.
    pub fn delivery_count(&self) -> u32 {
        self.token.delivery
    }

    pub fn token(&self) -> AckToken {
        self.token
    }

    pub fn ack(self) -> QueueResult<()> {
        self.core.ack(&self.token).map(|_| ())
    }
}

impl fmt::Debug for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ack")
            .field("queue", &self.core.name)
            .field("id", &self.id)
            .field("token", &self.token)
            .finish()
    }
}

/// Durable delayed queue with at-least-once delivery.
///
/// Messages become visible at their delivery time. A poll hands out the
/// earliest due message and hides it until it is acked or its ack deadline
/// passes; [`Queue::redelivery_check`] makes expired deliveries visible
/// again at their original position. Handles are cheap to clone and share
/// one engine.
pub struct Queue<M> {
    core: Arc<QueueCore>,
    _message: PhantomData<fn() -> M>,
}

impl<M> Clone for Queue<M> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            _message: PhantomData,
        }
    }
}

impl<M> fmt::Debug for Queue<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.core.name)
            .field("ack_timeout", &self.core.ack_timeout)
            .finish()
    }
}

impl<M: Message> Queue<M> {
    /// Open a queue over `storage`, rebuilding its state from whatever the
    /// storage already holds. Metrics go to the global meter provider.
    pub fn open(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        settings: &QueueSettings,
    ) -> QueueResult<Self> {
        Self::open_with_metrics(storage, clock, settings, QueueMetrics::new())
    }

    pub fn open_with_metrics(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        settings: &QueueSettings,
        metrics: QueueMetrics,
    ) -> QueueResult<Self> {
        claim_storage(storage.as_ref(), &settings.name)?;
        let state = QueueState::recover(storage.as_ref(), &settings.name)?;
        let core = QueueCore {
            name: settings.name.clone(),
            storage,
            clock,
            ack_timeout: Duration::from_millis(settings.ack_timeout_ms),
            state: Mutex::new(state),
            metrics,
        };
        core.report_depth(&core.lock());
        info!(
            queue = %core.name,
            ack_timeout_ms = settings.ack_timeout_ms,
            "queue opened"
        );
        Ok(Self {
            core: Arc::new(core),
            _message: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Visibility timeout applied to every delivery.
    pub fn ack_timeout(&self) -> Duration {
        self.core.ack_timeout
    }

    /// Enqueue `message` for immediate delivery.
    pub fn push(&self, message: &M) -> QueueResult<Uuid> {
        self.push_delayed(message, Duration::ZERO)
    }

    /// Enqueue `message` to become deliverable `delay` from now.
    pub fn push_delayed(&self, message: &M, delay: Duration) -> QueueResult<Uuid> {
        let payload =
            serde_json::to_value(message).map_err(|e| QueueError::Encode(e.to_string()))?;
        let kind = message.kind();

        let mut state = self.core.lock();
        // Read the clock under the lock so enqueue time never goes backwards
        // relative to seq.
        let now = self.core.clock.now_ns();
        let seq = state.next_seq;
        let envelope = Envelope {
            id: Envelope::new_id(),
            kind: kind.to_string(),
            payload,
            deliver_at: now.saturating_add(duration_ns(delay)),
            enqueued_at: now,
            seq,
            delivery_count: 0,
            ack_deadline: None,
        };
        let key = envelope.key();
        let value = serde_json::to_vec(&envelope).map_err(StorageError::from)?;

        self.core.storage.write_batch(vec![
            WriteBatchOp::PutEnvelope {
                key: key.encode(),
                value,
            },
            WriteBatchOp::PutState {
                key: NEXT_SEQ_KEY.to_string(),
                value: seq_value(seq + 1),
            },
        ])?;
        state.next_seq = seq + 1;
        state.insert_ready(key);
        self.core.report_depth(&state);
        drop(state);

        self.core.metrics.record_push(&self.core.name);
        debug!(
            queue = %self.core.name,
            id = %envelope.id,
            kind,
            seq,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "pushed"
        );
        Ok(envelope.id)
    }

    /// Deliver the earliest due message, or `None` when nothing is due.
    ///
    /// The returned message is hidden from other polls until it is acked or
    /// a redelivery check finds its ack deadline passed. If the stored
    /// payload fails to decode the delivery still counts and the error is
    /// returned; the message will come back after its deadline. Entries whose
    /// envelope is missing or unreadable are dropped from the index and the
    /// next due message is tried instead.
    pub fn poll(&self) -> QueueResult<Option<Delivery<M>>> {
        let mut state = self.core.lock();
        let now = self.core.clock.now_ns();
        let (key, mut envelope, delivery) = loop {
            let Some(key) = state.next_due(now) else {
                self.core.report_depth(&state);
                return Ok(None);
            };
            if let Some((envelope, delivery)) = self.core.deliverable(key)? {
                break (key, envelope, delivery);
            }
            // Unreadable heads leave the index so the messages behind them
            // stay reachable. Their stored bytes are kept for inspection.
            state.remove_ready(&key);
        };

        let ack_deadline = now.saturating_add(duration_ns(self.core.ack_timeout));
        envelope.delivery_count = delivery;
        envelope.ack_deadline = Some(ack_deadline);
        self.core.storage.put_envelope(&key.encode(), &envelope)?;
        state.lease(
            key,
            Lease {
                delivery,
                ack_deadline,
            },
        );
        self.core.report_depth(&state);
        drop(state);

        self.core.metrics.record_delivery(&self.core.name);
        debug!(
            queue = %self.core.name,
            id = %envelope.id,
            kind = %envelope.kind,
            delivery_count = envelope.delivery_count,
            "delivered"
        );

        let id = envelope.id;
        let message = serde_json::from_value::<M>(envelope.payload).map_err(|e| {
            warn!(queue = %self.core.name, %id, error = %e, "failed to decode payload");
            QueueError::Decode {
                id,
                reason: e.to_string(),
            }
        })?;
        let ack = Ack {
            core: Arc::clone(&self.core),
            token: AckToken { key, delivery },
            id,
        };
        Ok(Some(Delivery { message, ack }))
    }

    /// Poll and, if a message was due, hand it to `f` along with its ack.
    /// Returns whether `f` ran. `f` runs on the caller's thread with no
    /// queue lock held.
    pub fn poll_with<F>(&self, f: F) -> QueueResult<bool>
    where
        F: FnOnce(M, Ack),
    {
        match self.poll()? {
            Some(Delivery { message, ack }) => {
                f(message, ack);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Acknowledge the delivery identified by `token`. Returns `false` when
    /// the token is stale (already acked or superseded by a redelivery).
    pub fn ack(&self, token: &AckToken) -> QueueResult<bool> {
        self.core.ack(token)
    }

    /// Return every in-flight message whose ack deadline has passed to the
    /// ready set. Returns how many were returned.
    pub fn redelivery_check(&self) -> QueueResult<u64> {
        self.core.redeliver_expired()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.core.lock();
        let (ready, delayed, in_flight) = state.counts(self.core.clock.now_ns());
        QueueStats {
            ready,
            delayed,
            in_flight,
        }
    }

    /// Flush storage. Other handles to the same queue stay usable.
    pub fn close(self) -> QueueResult<()> {
        self.core.storage.flush()?;
        info!(queue = %self.core.name, "queue closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
