use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::keys;

/// Internal record pairing a serialized message with its scheduling and
/// delivery-tracking metadata. This is what the storage layer persists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub id: Uuid,
    /// Discriminant of the wrapped message, kept for logs and stats.
    pub kind: String,
    pub payload: serde_json::Value,
    /// Nanosecond timestamp at or after which the envelope may be delivered.
    pub deliver_at: u64,
    /// Nanosecond timestamp of the push.
    pub enqueued_at: u64,
    /// Push sequence number, unique per queue.
    pub seq: u64,
    /// Number of polls that have returned this envelope.
    pub delivery_count: u32,
    /// Set while the envelope is in flight.
    pub ack_deadline: Option<u64>,
}

impl Envelope {
    /// Generate a new UUIDv7 envelope ID.
    pub fn new_id() -> Uuid {
        Uuid::now_v7()
    }

    pub fn key(&self) -> EnvelopeKey {
        EnvelopeKey {
            deliver_at: self.deliver_at,
            enqueued_at: self.enqueued_at,
            seq: self.seq,
        }
    }
}

/// Delivery-order position of an envelope. Field order matters: the derived
/// `Ord` compares `deliver_at`, then `enqueued_at`, then `seq`, matching the
/// byte order of the encoded storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnvelopeKey {
    pub deliver_at: u64,
    pub enqueued_at: u64,
    pub seq: u64,
}

impl EnvelopeKey {
    pub fn encode(&self) -> Vec<u8> {
        keys::envelope_key(self.deliver_at, self.enqueued_at, self.seq)
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let (deliver_at, enqueued_at, seq) = keys::parse_envelope_key(bytes)?;
        Some(Self {
            deliver_at,
            enqueued_at,
            seq,
        })
    }
}

/// Identifies one specific delivery of an envelope.
///
/// `delivery` is the envelope's `delivery_count` as set by the poll that
/// produced this token. A later redelivery bumps the count, so a token from
/// an earlier delivery no longer matches and acking it does nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckToken {
    pub key: EnvelopeKey,
    pub delivery: u32,
}
