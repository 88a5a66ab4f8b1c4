//! Byte-oriented encoders/decoders for the SSH binary data types.
//!
//! Decoding never holds a cursor across calls: a [`Reader`] borrows the buffer for the
//! duration of a single message decode, and encoding only ever appends to a `Vec<u8>`.

use num_bigint::BigUint;

use crate::error::{Error, Result};

/// The largest `packet_length` or string length we're willing to believe, guarding against
/// a hostile peer claiming a multi-gigabyte field from a 4-byte length prefix.
pub const MAX_FIELD_LEN: u32 = 1 << 20;

/// A cursor over a borrowed byte slice, used to decode the fields of a single message.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(Error::Malformed("field runs past end of message".into()));
        }

        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;

        Ok(slice)
    }

    pub fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn boolean(&mut self) -> Result<bool> {
        Ok(self.byte()? != 0)
    }

    pub fn uint32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;

        Ok(u32::from_be_bytes(bytes.try_into().expect("slice of len 4")))
    }

    /// Reads a `string` field, returning the raw bytes.
    pub fn string(&mut self) -> Result<&'a [u8]> {
        let len = self.uint32()?;
        if len > MAX_FIELD_LEN {
            return Err(Error::Malformed("string field too large".into()));
        }

        self.take(len as usize)
    }

    /// Reads a `string` field and interprets it as UTF-8.
    pub fn utf8(&mut self) -> Result<String> {
        String::from_utf8(self.string()?.to_vec())
            .map_err(|_| Error::Malformed("expected utf8 string".into()))
    }

    pub fn mpint(&mut self) -> Result<BigUint> {
        Ok(BigUint::from_bytes_be(self.string()?))
    }

    /// Reads a `name-list`: a comma-separated ASCII list inside a `string`.
    pub fn name_list(&mut self) -> Result<Vec<String>> {
        let raw = self.utf8()?;

        if raw.is_empty() {
            return Ok(Vec::new());
        }

        Ok(raw.split(',').map(String::from).collect())
    }

    /// Remaining, not-yet-consumed bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Reads the rest of the buffer as raw bytes.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = self.remaining();
        self.pos = self.buf.len();

        rest
    }
}

/// Appends a `boolean` field.
pub fn put_boolean(out: &mut Vec<u8>, value: bool) {
    out.push(value as u8);
}

/// Appends a `uint32` field.
pub fn put_uint32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Appends a `string` field.
pub fn put_string(out: &mut Vec<u8>, data: &[u8]) {
    put_uint32(out, data.len() as u32);
    out.extend_from_slice(data);
}

/// Appends an `mpint` field: length-prefixed two's-complement big-endian, minimally padded.
pub fn put_mpint(out: &mut Vec<u8>, value: &BigUint) {
    let mut bytes = value.to_bytes_be();

    if bytes.first().is_some_and(|&b| b & 0x80 != 0) {
        bytes.insert(0, 0);
    }

    if value == &BigUint::from(0u8) {
        bytes.clear();
    }

    put_string(out, &bytes);
}

/// Appends a `name-list` field.
pub fn put_name_list<S: AsRef<str>>(out: &mut Vec<u8>, names: &[S]) {
    let joined = names
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",");

    put_string(out, joined.as_bytes());
}

/// Picks, for a single name-list, the first client-proposed name the server also supports.
pub fn preferred<'a>(client: &'a [String], server: &[String]) -> Option<&'a str> {
    client
        .iter()
        .find(|name| server.iter().any(|s| s == *name))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_uint32() {
        let mut buf = Vec::new();
        put_uint32(&mut buf, 0xdead_beef);

        let mut reader = Reader::new(&buf);
        assert_eq!(reader.uint32().unwrap(), 0xdead_beef);
    }

    #[test]
    fn roundtrip_string() {
        let mut buf = Vec::new();
        put_string(&mut buf, b"hello");

        let mut reader = Reader::new(&buf);
        assert_eq!(reader.string().unwrap(), b"hello");
    }

    #[test]
    fn mpint_zero_is_empty() {
        let mut buf = Vec::new();
        put_mpint(&mut buf, &BigUint::from(0u8));

        assert_eq!(buf, [0, 0, 0, 0]);
    }

    #[test]
    fn mpint_high_bit_gets_padding() {
        let mut buf = Vec::new();
        put_mpint(&mut buf, &BigUint::from(0x80u8));

        assert_eq!(buf, [0, 0, 0, 2, 0, 0x80]);
    }

    #[test]
    fn mpint_roundtrip() {
        let value = BigUint::from(0x1234_5678_9abc_u64);
        let mut buf = Vec::new();
        put_mpint(&mut buf, &value);

        let mut reader = Reader::new(&buf);
        assert_eq!(reader.mpint().unwrap(), value);
    }

    #[test]
    fn name_list_roundtrip() {
        let mut buf = Vec::new();
        put_name_list(&mut buf, &["foo", "bar", "baz"]);

        let mut reader = Reader::new(&buf);
        assert_eq!(reader.name_list().unwrap(), vec!["foo", "bar", "baz"]);
    }

    #[test]
    fn string_overflow_is_malformed() {
        let mut buf = Vec::new();
        put_uint32(&mut buf, 0xffff_ffff);

        let mut reader = Reader::new(&buf);
        assert!(matches!(reader.string(), Err(Error::Malformed(_))));
    }

    #[test]
    fn preferred_picks_client_order() {
        let client = vec!["a".to_string(), "b".to_string()];
        let server = vec!["b".to_string(), "a".to_string()];

        assert_eq!(preferred(&client, &server), Some("a"));
    }

    #[test]
    fn preferred_none_common() {
        let client = vec!["a".to_string()];
        let server = vec!["b".to_string()];

        assert_eq!(preferred(&client, &server), None);
    }
}
