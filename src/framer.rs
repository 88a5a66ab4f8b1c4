//! The binary packet protocol: length-prefixed, padded, MAC'd records over a plain buffer.
//!
//! Both directions are pure functions of `(buffer, Keys) -> (state, output)`; nothing here
//! touches a socket, and the framer commits a direction's chaining state exactly once per
//! record, after the full record (plus MAC) has actually arrived.

use crate::{
    error::{Error, Result},
    keys::{self, Keys},
    provider::Random,
};

/// Guards against a peer claiming an absurd `packet_length` from four attacker-controlled bytes.
const MAX_PACKET_LENGTH: usize = 1 << 20;

/// One successfully parsed inbound record.
pub struct Decoded {
    pub payload: Vec<u8>,
    /// Bytes of `buf` this record consumed; the caller should drop them from its buffer.
    pub consumed: usize,
}

/// Attempts to parse one packet from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` doesn't yet hold a full record — not an error, a "need more"
/// signal. Advances `keys`' sequence number and chaining state only when a full record, MAC
/// included, is available and verifies.
pub fn try_parse(buf: &[u8], keys: &mut Keys) -> Result<Option<Decoded>> {
    let block = keys.block_size();
    let mac_size = keys.mac_size();

    if buf.len() < block {
        return Ok(None);
    }

    let peeked = keys::peek_block(keys, &buf[..block])?;
    let packet_length = u32::from_be_bytes(peeked[0..4].try_into().expect("4-byte slice")) as usize;

    if packet_length == 0 || packet_length > MAX_PACKET_LENGTH {
        return Err(Error::Malformed("packet_length out of range".into()));
    }

    let total = 4 + packet_length + mac_size;
    if buf.len() < total {
        return Ok(None);
    }

    let mut record = buf[..4 + packet_length].to_vec();
    keys::transform(keys, &mut record, false)?;

    let tag = &buf[4 + packet_length..total];
    if !keys.mac.verify(&keys.mac_key, keys.seq, &record, tag) {
        return Err(Error::MacFailure);
    }

    let padding_length = record[4] as usize;
    if padding_length + 1 > packet_length {
        return Err(Error::Malformed("padding_length exceeds packet_length".into()));
    }

    let payload = record[5..record.len() - padding_length].to_vec();
    keys.advance_seq();

    Ok(Some(Decoded { payload, consumed: total }))
}

/// Serializes `payload` into one framed, MAC'd, (optionally) encrypted record.
pub fn build_packet(payload: &[u8], keys: &mut Keys, rng: &mut dyn Random) -> Result<Vec<u8>> {
    let block = keys.block_size();

    let unpadded = 1 + payload.len();
    let mut padding = block - ((4 + unpadded) % block);
    if padding < 4 {
        padding += block;
    }

    let packet_length = unpadded + padding;

    let mut record = Vec::with_capacity(4 + packet_length);
    record.extend_from_slice(&(packet_length as u32).to_be_bytes());
    record.push(padding as u8);
    record.extend_from_slice(payload);
    record.extend_from_slice(&rng.random(padding));

    let mac = keys.mac.sign(&keys.mac_key, keys.seq, &record);

    keys::transform(keys, &mut record, true)?;
    record.extend_from_slice(&mac);

    keys.advance_seq();

    Ok(record)
}
