//! Tagged, length-prefixed wire encoding with stable field numbers.
//!
//! Hand-rolled rather than routed through a MessagePack derive: the wire
//! shape here is a field-numbered, unknown-field-tolerant format (closer to
//! a protobuf wire format) rather than a positional array, so the framing is
//! built directly on varints and length-delimited byte ranges, the same way
//! this codebase hand-frames its on-disk index records elsewhere.

use crate::bloom::BloomFilter;
use crate::error::{ManagerError, Result};
use crate::ids::{ChannelId, MessageId};

const WIRE_VARINT: u8 = 0;
const WIRE_LEN: u8 = 2;

const FIELD_MESSAGE_ID: u64 = 1;
const FIELD_LAMPORT_TS: u64 = 2;
const FIELD_CAUSAL_HISTORY: u64 = 3;
const FIELD_CHANNEL_ID: u64 = 4;
const FIELD_CONTENT: u64 = 5;
const FIELD_BLOOM: u64 = 6;

const FIELD_ENTRY_MESSAGE_ID: u64 = 1;
const FIELD_ENTRY_RETRIEVAL_HINT: u64 = 2;

const FIELD_BLOOM_BITS: u64 = 1;
const FIELD_BLOOM_CAPACITY: u64 = 2;
const FIELD_BLOOM_ERROR_RATE: u64 = 3;
const FIELD_BLOOM_K_HASHES: u64 = 4;
const FIELD_BLOOM_M_BITS: u64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub message_id: MessageId,
    pub retrieval_hint: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    pub message_id: MessageId,
    pub lamport_timestamp: i64,
    pub causal_history: Vec<HistoryEntry>,
    pub channel_id: ChannelId,
    pub content: Vec<u8>,
    /// Serialized bloom filter bytes; empty means "no filter attached".
    pub bloom_filter: Vec<u8>,
}

// ---- varint primitives --------------------------------------------------

fn write_varint(buf: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

fn read_varint(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *buf
            .get(*pos)
            .ok_or_else(|| ManagerError::DeserializationError("truncated varint".into()))?;
        *pos += 1;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 64 {
            return Err(ManagerError::DeserializationError("varint too long".into()));
        }
    }
}

fn write_tag(buf: &mut Vec<u8>, field: u64, wire_type: u8) {
    write_varint(buf, (field << 3) | wire_type as u64);
}

fn read_tag(buf: &[u8], pos: &mut usize) -> Result<(u64, u8)> {
    let tag = read_varint(buf, pos)?;
    Ok((tag >> 3, (tag & 0x7) as u8))
}

fn write_bytes_field(buf: &mut Vec<u8>, field: u64, bytes: &[u8]) {
    write_tag(buf, field, WIRE_LEN);
    write_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn write_varint_field(buf: &mut Vec<u8>, field: u64, v: u64) {
    write_tag(buf, field, WIRE_VARINT);
    write_varint(buf, v);
}

fn read_len_delimited<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8]> {
    let len = read_varint(buf, pos)? as usize;
    let end = pos
        .checked_add(len)
        .ok_or_else(|| ManagerError::DeserializationError("length overflow".into()))?;
    let slice = buf
        .get(*pos..end)
        .ok_or_else(|| ManagerError::DeserializationError("truncated length-delimited field".into()))?;
    *pos = end;
    Ok(slice)
}

/// Skips one field's value given its wire type, for forward-compat with
/// unknown field numbers.
fn skip_value(buf: &[u8], pos: &mut usize, wire_type: u8) -> Result<()> {
    match wire_type {
        WIRE_VARINT => {
            read_varint(buf, pos)?;
        }
        WIRE_LEN => {
            read_len_delimited(buf, pos)?;
        }
        other => {
            return Err(ManagerError::DeserializationError(format!(
                "unknown wire type {other}"
            )));
        }
    }
    Ok(())
}

// ---- HistoryEntry --------------------------------------------------------

fn encode_history_entry(buf: &mut Vec<u8>, entry: &HistoryEntry) {
    write_bytes_field(buf, FIELD_ENTRY_MESSAGE_ID, entry.message_id.as_bytes());
    if !entry.retrieval_hint.is_empty() {
        write_bytes_field(buf, FIELD_ENTRY_RETRIEVAL_HINT, &entry.retrieval_hint);
    }
}

/// Strict submessage decode; returns `Err` (rather than panicking) on
/// anything that doesn't look like a well-formed `HistoryEntry` so the
/// caller can fall back to the legacy raw-bytes shape.
fn decode_history_entry_strict(bytes: &[u8]) -> Result<HistoryEntry> {
    let mut pos = 0;
    let mut message_id = None;
    let mut retrieval_hint = Vec::new();
    while pos < bytes.len() {
        let (field, wire_type) = read_tag(bytes, &mut pos)?;
        match field {
            FIELD_ENTRY_MESSAGE_ID if wire_type == WIRE_LEN => {
                message_id = Some(MessageId::from(read_len_delimited(bytes, &mut pos)?));
            }
            FIELD_ENTRY_RETRIEVAL_HINT if wire_type == WIRE_LEN => {
                retrieval_hint = read_len_delimited(bytes, &mut pos)?.to_vec();
            }
            _ => skip_value(bytes, &mut pos, wire_type)?,
        }
    }
    let message_id = message_id.ok_or_else(|| {
        ManagerError::DeserializationError("history entry missing messageId".into())
    })?;
    Ok(HistoryEntry {
        message_id,
        retrieval_hint,
    })
}

/// Decodes one causal-history element, accepting both the current
/// repeated-sub-message shape and the legacy repeated-bytes shape (raw
/// message ID, empty retrieval hint).
fn decode_history_entry_compat(bytes: &[u8]) -> HistoryEntry {
    decode_history_entry_strict(bytes).unwrap_or_else(|_| HistoryEntry {
        message_id: MessageId::from(bytes),
        retrieval_hint: Vec::new(),
    })
}

// ---- BloomFilter ----------------------------------------------------------

pub fn encode_bloom(filter: &BloomFilter) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut bits_le = Vec::with_capacity(filter.words.len() * 8);
    for word in &filter.words {
        bits_le.extend_from_slice(&word.to_le_bytes());
    }
    write_bytes_field(&mut buf, FIELD_BLOOM_BITS, &bits_le);
    write_varint_field(&mut buf, FIELD_BLOOM_CAPACITY, filter.capacity);
    let error_ppm = (filter.error_rate * 1_000_000.0).round() as u64;
    write_varint_field(&mut buf, FIELD_BLOOM_ERROR_RATE, error_ppm);
    write_varint_field(&mut buf, FIELD_BLOOM_K_HASHES, filter.k_hashes as u64);
    write_varint_field(&mut buf, FIELD_BLOOM_M_BITS, filter.m_bits);
    buf
}

pub fn decode_bloom(bytes: &[u8]) -> Result<BloomFilter> {
    let mut pos = 0;
    let mut bits: Option<Vec<u8>> = None;
    let mut capacity = None;
    let mut error_ppm = None;
    let mut k_hashes = None;
    let mut m_bits = None;

    while pos < bytes.len() {
        let (field, wire_type) = read_tag(bytes, &mut pos)?;
        match (field, wire_type) {
            (FIELD_BLOOM_BITS, WIRE_LEN) => {
                bits = Some(read_len_delimited(bytes, &mut pos)?.to_vec());
            }
            (FIELD_BLOOM_CAPACITY, WIRE_VARINT) => {
                capacity = Some(read_varint(bytes, &mut pos)?);
            }
            (FIELD_BLOOM_ERROR_RATE, WIRE_VARINT) => {
                error_ppm = Some(read_varint(bytes, &mut pos)?);
            }
            (FIELD_BLOOM_K_HASHES, WIRE_VARINT) => {
                k_hashes = Some(read_varint(bytes, &mut pos)?);
            }
            (FIELD_BLOOM_M_BITS, WIRE_VARINT) => {
                m_bits = Some(read_varint(bytes, &mut pos)?);
            }
            (_, wt) => skip_value(bytes, &mut pos, wt)?,
        }
    }

    let bits = bits.ok_or_else(|| ManagerError::DeserializationError("bloom missing bits".into()))?;
    let capacity =
        capacity.ok_or_else(|| ManagerError::DeserializationError("bloom missing capacity".into()))?;
    let error_ppm = error_ppm
        .ok_or_else(|| ManagerError::DeserializationError("bloom missing errorRate".into()))?;
    let k_hashes =
        k_hashes.ok_or_else(|| ManagerError::DeserializationError("bloom missing kHashes".into()))?;
    let m_bits =
        m_bits.ok_or_else(|| ManagerError::DeserializationError("bloom missing mBits".into()))?;

    if bits.len() % 8 != 0 {
        return Err(ManagerError::DeserializationError(
            "bloom bits length not word-aligned".into(),
        ));
    }
    let words = bits
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect();

    Ok(BloomFilter {
        capacity,
        error_rate: error_ppm as f64 / 1_000_000.0,
        k_hashes: k_hashes as u32,
        m_bits,
        words,
    })
}

// ---- WireMessage ----------------------------------------------------------

pub fn encode_message(msg: &WireMessage) -> Vec<u8> {
    let mut buf = Vec::new();
    write_bytes_field(&mut buf, FIELD_MESSAGE_ID, msg.message_id.as_bytes());
    write_varint_field(&mut buf, FIELD_LAMPORT_TS, msg.lamport_timestamp as u64);
    for entry in &msg.causal_history {
        let mut entry_buf = Vec::new();
        encode_history_entry(&mut entry_buf, entry);
        write_bytes_field(&mut buf, FIELD_CAUSAL_HISTORY, &entry_buf);
    }
    write_bytes_field(&mut buf, FIELD_CHANNEL_ID, msg.channel_id.as_bytes());
    write_bytes_field(&mut buf, FIELD_CONTENT, &msg.content);
    if !msg.bloom_filter.is_empty() {
        write_bytes_field(&mut buf, FIELD_BLOOM, &msg.bloom_filter);
    }
    buf
}

pub fn decode_message(bytes: &[u8]) -> Result<WireMessage> {
    let mut pos = 0;
    let mut message_id = None;
    let mut lamport_timestamp = None;
    let mut causal_history = Vec::new();
    let mut channel_id = None;
    let mut content = None;
    let mut bloom_filter = Vec::new();

    while pos < bytes.len() {
        let (field, wire_type) = read_tag(bytes, &mut pos)?;
        match (field, wire_type) {
            (FIELD_MESSAGE_ID, WIRE_LEN) => {
                message_id = Some(MessageId::from(read_len_delimited(bytes, &mut pos)?));
            }
            (FIELD_LAMPORT_TS, WIRE_VARINT) => {
                lamport_timestamp = Some(read_varint(bytes, &mut pos)? as i64);
            }
            (FIELD_CAUSAL_HISTORY, WIRE_LEN) => {
                let entry_bytes = read_len_delimited(bytes, &mut pos)?;
                causal_history.push(decode_history_entry_compat(entry_bytes));
            }
            (FIELD_CHANNEL_ID, WIRE_LEN) => {
                channel_id = Some(ChannelId::from(read_len_delimited(bytes, &mut pos)?));
            }
            (FIELD_CONTENT, WIRE_LEN) => {
                content = Some(read_len_delimited(bytes, &mut pos)?.to_vec());
            }
            (FIELD_BLOOM, WIRE_LEN) => {
                bloom_filter = read_len_delimited(bytes, &mut pos)?.to_vec();
            }
            (_, wt) => skip_value(bytes, &mut pos, wt)?,
        }
    }

    Ok(WireMessage {
        message_id: message_id
            .ok_or_else(|| ManagerError::DeserializationError("message missing messageId".into()))?,
        lamport_timestamp: lamport_timestamp.ok_or_else(|| {
            ManagerError::DeserializationError("message missing lamportTimestamp".into())
        })?,
        causal_history,
        channel_id: channel_id
            .ok_or_else(|| ManagerError::DeserializationError("message missing channelId".into()))?,
        content: content
            .ok_or_else(|| ManagerError::DeserializationError("message missing content".into()))?,
        bloom_filter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WireMessage {
        WireMessage {
            message_id: MessageId::from(b"m1".as_slice()),
            lamport_timestamp: 42,
            causal_history: vec![HistoryEntry {
                message_id: MessageId::from(b"m0".as_slice()),
                retrieval_hint: vec![],
            }],
            channel_id: ChannelId::from(b"c".as_slice()),
            content: b"hello".to_vec(),
            bloom_filter: vec![],
        }
    }

    #[test]
    fn round_trips() {
        let msg = sample();
        let bytes = encode_message(&msg);
        let decoded = decode_message(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn tolerates_unknown_trailing_field() {
        let msg = sample();
        let mut bytes = encode_message(&msg);
        write_bytes_field(&mut bytes, 99, b"from-the-future");
        let decoded = decode_message(&bytes).unwrap();
        assert_eq!(decoded.message_id, msg.message_id);
        assert_eq!(decoded.content, msg.content);
    }

    #[test]
    fn decodes_legacy_repeated_bytes_history() {
        let mut buf = Vec::new();
        write_bytes_field(&mut buf, FIELD_MESSAGE_ID, b"m1");
        write_varint_field(&mut buf, FIELD_LAMPORT_TS, 1);
        // Legacy shape: field 3 is the raw message id bytes, not a submessage.
        write_bytes_field(&mut buf, FIELD_CAUSAL_HISTORY, b"m0");
        write_bytes_field(&mut buf, FIELD_CHANNEL_ID, b"c");
        write_bytes_field(&mut buf, FIELD_CONTENT, b"hi");

        let decoded = decode_message(&buf).unwrap();
        assert_eq!(decoded.causal_history.len(), 1);
        assert_eq!(decoded.causal_history[0].message_id.as_bytes(), b"m0");
        assert!(decoded.causal_history[0].retrieval_hint.is_empty());
    }

    #[test]
    fn bloom_round_trips() {
        let mut f = BloomFilter::new(50, 0.01).unwrap();
        f.insert(b"a");
        f.insert(b"b");
        let bytes = encode_bloom(&f);
        let decoded = decode_bloom(&bytes).unwrap();
        assert_eq!(f, decoded);
    }

    #[test]
    fn missing_required_field_fails_cleanly() {
        let mut buf = Vec::new();
        write_bytes_field(&mut buf, FIELD_MESSAGE_ID, b"m1");
        // No lamportTimestamp, channelId, or content.
        assert!(decode_message(&buf).is_err());
    }

    #[test]
    fn truncated_input_does_not_panic() {
        let msg = sample();
        let bytes = encode_message(&msg);
        for cut in 0..bytes.len() {
            let _ = decode_message(&bytes[..cut]);
        }
    }
}
