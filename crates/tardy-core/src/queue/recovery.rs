use super::*;

use crate::envelope::EnvelopeKey;
use crate::storage::keys::{parse_seq_value, OWNER_KEY};

/// Record `queue` as the owner of `storage`, or fail if a queue with another
/// name already owns it.
pub(super) fn claim_storage(storage: &dyn Storage, queue: &str) -> QueueResult<()> {
    match storage.get_state(OWNER_KEY)? {
        Some(owner) if owner == queue.as_bytes() => Ok(()),
        Some(owner) => Err(QueueError::StorageOwned {
            owner: String::from_utf8_lossy(&owner).into_owned(),
        }),
        None => {
            storage.put_state(OWNER_KEY, queue.as_bytes())?;
            Ok(())
        }
    }
}

impl QueueState {
    /// Rebuild the index from persisted envelopes.
    ///
    /// Envelopes with an ack deadline were in flight when the queue last
    /// stopped and stay in flight; the next redelivery check returns them
    /// if the deadline has passed. Nothing is redelivered here.
    pub(super) fn recover(storage: &dyn Storage, queue: &str) -> QueueResult<Self> {
        let mut state = QueueState::default();
        let mut max_seq: Option<u64> = None;

        for (raw_key, envelope) in storage.list_envelopes()? {
            let Some(key) = EnvelopeKey::decode(&raw_key) else {
                warn!(%queue, "corrupt envelope key, skipping");
                continue;
            };
            // A corrupt entry still reserves its seq.
            max_seq = Some(max_seq.map_or(key.seq, |m| m.max(key.seq)));
            let envelope = match envelope {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(%queue, seq = key.seq, error = %e, "corrupt envelope, skipping");
                    continue;
                }
            };
            if key != envelope.key() {
                warn!(
                    %queue,
                    id = %envelope.id,
                    "envelope key does not match its contents, skipping"
                );
                continue;
            }

            match envelope.ack_deadline {
                Some(ack_deadline) => state.lease(
                    key,
                    Lease {
                        delivery: envelope.delivery_count,
                        ack_deadline,
                    },
                ),
                None => state.insert_ready(key),
            }
        }

        let stored_seq = storage
            .get_state(NEXT_SEQ_KEY)?
            .and_then(|raw| parse_seq_value(&raw))
            .unwrap_or(0);
        state.next_seq = stored_seq.max(max_seq.map_or(0, |m| m + 1));

        let (due, _, in_flight) = state.counts(u64::MAX);
        if due + in_flight > 0 {
            info!(
                %queue,
                ready = due,
                in_flight,
                next_seq = state.next_seq,
                "recovered queue state"
            );
        }
        Ok(state)
    }
}

impl QueueCore {
    /// Move every expired in-flight envelope back to the ready set.
    ///
    /// Each envelope is rewritten without its ack deadline before the index
    /// changes. A storage failure stops the scan; envelopes already returned
    /// stay returned and the rest are picked up by the next check.
    pub(super) fn redeliver_expired(&self) -> QueueResult<u64> {
        let mut state = self.lock();
        let now = self.clock.now_ns();
        let expired = state.expired(now);
        if expired.is_empty() {
            return Ok(0);
        }

        let mut reclaimed = 0u64;
        let mut failure = None;
        for key in expired {
            match self.return_to_ready(&mut state, key) {
                Ok(true) => reclaimed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(queue = %self.name, seq = key.seq, error = %e, "failed to redeliver expired message");
                    failure = Some(e);
                    break;
                }
            }
        }
        self.report_depth(&state);
        drop(state);

        if reclaimed > 0 {
            self.metrics.record_redelivery(&self.name, reclaimed);
            info!(queue = %self.name, reclaimed, "redelivered expired messages");
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(reclaimed),
        }
    }

    fn return_to_ready(&self, state: &mut QueueState, key: EnvelopeKey) -> QueueResult<bool> {
        let encoded = key.encode();
        let mut envelope = match self.storage.get_envelope(&encoded) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                warn!(
                    queue = %self.name,
                    seq = key.seq,
                    "orphaned in-flight entry, envelope missing"
                );
                state.release(&key);
                return Ok(false);
            }
            Err(StorageError::Serialization(reason) | StorageError::CorruptData(reason)) => {
                error!(
                    queue = %self.name,
                    seq = key.seq,
                    %reason,
                    "corrupt in-flight envelope, dropping index entry"
                );
                state.release(&key);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        envelope.ack_deadline = None;
        self.storage.put_envelope(&encoded, &envelope)?;
        state.release(&key);
        state.insert_ready(key);

        debug!(
            queue = %self.name,
            id = %envelope.id,
            delivery_count = envelope.delivery_count,
            "returned expired message to ready set"
        );
        Ok(true)
    }
}
