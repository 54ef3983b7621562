use std::collections::{BTreeSet, HashMap};

use crate::envelope::EnvelopeKey;

/// In-flight bookkeeping for one delivered envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Lease {
    /// `delivery_count` assigned by the poll that created this lease.
    pub(super) delivery: u32,
    pub(super) ack_deadline: u64,
}

/// In-memory index over the persisted envelopes.
///
/// Every envelope key lives in exactly one of `ready` or `in_flight`.
/// `expiries` mirrors `in_flight` ordered by deadline so redelivery scans
/// only touch envelopes that are actually due.
#[derive(Debug, Default)]
pub(super) struct QueueState {
    ready: BTreeSet<EnvelopeKey>,
    in_flight: HashMap<EnvelopeKey, Lease>,
    expiries: BTreeSet<(u64, EnvelopeKey)>,
    pub(super) next_seq: u64,
}

impl QueueState {
    /// The earliest ready envelope, if it is due at `now`. Because keys
    /// order by `deliver_at` first, a not-yet-due head means nothing is due.
    pub(super) fn next_due(&self, now: u64) -> Option<EnvelopeKey> {
        self.ready
            .first()
            .filter(|key| key.deliver_at <= now)
            .copied()
    }

    pub(super) fn insert_ready(&mut self, key: EnvelopeKey) {
        debug_assert!(
            !self.in_flight.contains_key(&key),
            "envelope cannot be ready while in flight"
        );
        self.ready.insert(key);
    }

    pub(super) fn remove_ready(&mut self, key: &EnvelopeKey) -> bool {
        self.ready.remove(key)
    }

    /// Move `key` into the in-flight set.
    pub(super) fn lease(&mut self, key: EnvelopeKey, lease: Lease) {
        self.ready.remove(&key);
        if let Some(previous) = self.in_flight.insert(key, lease) {
            self.expiries.remove(&(previous.ack_deadline, key));
        }
        self.expiries.insert((lease.ack_deadline, key));
    }

    /// Drop `key` from the in-flight set, returning its lease.
    pub(super) fn release(&mut self, key: &EnvelopeKey) -> Option<Lease> {
        let lease = self.in_flight.remove(key)?;
        self.expiries.remove(&(lease.ack_deadline, *key));
        Some(lease)
    }

    pub(super) fn lease_for(&self, key: &EnvelopeKey) -> Option<&Lease> {
        self.in_flight.get(key)
    }

    /// In-flight keys whose ack deadline is at or before `now`, earliest first.
    pub(super) fn expired(&self, now: u64) -> Vec<EnvelopeKey> {
        self.expiries
            .iter()
            .take_while(|(deadline, _)| *deadline <= now)
            .map(|(_, key)| *key)
            .collect()
    }

    /// `(due, delayed, in_flight)` counts at `now`.
    pub(super) fn counts(&self, now: u64) -> (u64, u64, u64) {
        let due = self
            .ready
            .iter()
            .take_while(|key| key.deliver_at <= now)
            .count() as u64;
        let delayed = self.ready.len() as u64 - due;
        (due, delayed, self.in_flight.len() as u64)
    }
}
