//! Key encoding for the envelopes and state column families.
//!
//! All numeric values use big-endian encoding so that byte-wise
//! lexicographic order equals numeric order. Composite keys use `:` (0x3A)
//! as separator.

const SEPARATOR: u8 = b':';

/// Length of an encoded envelope key: three u64 fields and two separators.
pub const ENVELOPE_KEY_LEN: usize = 8 * 3 + 2;

/// State key holding the next push sequence number.
pub const NEXT_SEQ_KEY: &str = "next_seq";

/// State key holding the name of the queue that owns the storage.
pub const OWNER_KEY: &str = "owner";

/// Encode a u64 as 8 big-endian bytes.
fn encode_u64(val: u64) -> [u8; 8] {
    val.to_be_bytes()
}

fn decode_u64(bytes: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Build an envelope key: `{deliver_at_ns}:{enqueued_at_ns}:{seq}`
///
/// Keys sort in delivery order, so iterating the envelopes column family
/// front to back visits envelopes in the order they become due, ties broken
/// by push time and then push sequence.
pub fn envelope_key(deliver_at_ns: u64, enqueued_at_ns: u64, seq: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(ENVELOPE_KEY_LEN);
    key.extend_from_slice(&encode_u64(deliver_at_ns));
    key.push(SEPARATOR);
    key.extend_from_slice(&encode_u64(enqueued_at_ns));
    key.push(SEPARATOR);
    key.extend_from_slice(&encode_u64(seq));
    key
}

/// Split an envelope key back into `(deliver_at_ns, enqueued_at_ns, seq)`.
pub fn parse_envelope_key(key: &[u8]) -> Option<(u64, u64, u64)> {
    if key.len() != ENVELOPE_KEY_LEN || key[8] != SEPARATOR || key[17] != SEPARATOR {
        return None;
    }
    Some((
        decode_u64(&key[0..8])?,
        decode_u64(&key[9..17])?,
        decode_u64(&key[18..26])?,
    ))
}

/// Encode the next-sequence state value.
pub fn seq_value(seq: u64) -> Vec<u8> {
    encode_u64(seq).to_vec()
}

/// Decode the next-sequence state value.
pub fn parse_seq_value(value: &[u8]) -> Option<u64> {
    decode_u64(value)
}
