//! Version-exchange (banner) parsing, per section 4.2 of RFC 4253.
//!
//! The peer may send preface lines before its actual `SSH-2.0-...` identification line;
//! those are discarded. Only `SSH-2.0-` identifications are accepted, and the software
//! field that follows may not itself contain a `-`.

use crate::error::{Error, Result};

/// Our own identification string, sent as-is (plus a trailing `\r\n`) before anything else.
pub fn ours() -> String {
    format!("SSH-2.0-awa_ssh_{}", env!("CARGO_PKG_VERSION"))
}

/// Attempts to parse one banner out of `buf`.
///
/// Returns `Ok(None)` if no complete, CRLF-terminated `SSH-` line is present yet.
/// Returns `Ok(Some((banner, consumed)))` on success, where `consumed` is the number of
/// bytes (including the CRLF) that made up every line up to and including the banner line.
pub fn try_parse(buf: &[u8]) -> Result<Option<(String, usize)>> {
    let mut offset = 0;

    loop {
        let rest = &buf[offset..];
        let Some(eol) = find_crlf(rest) else {
            return Ok(None);
        };

        let line = &rest[..eol];
        let consumed = offset + eol + 2;

        if line.starts_with(b"SSH-") {
            let line = std::str::from_utf8(line)
                .map_err(|_| Error::Malformed("banner line is not valid utf8".into()))?;

            return parse_identification(line).map(|banner| Some((banner, consumed)));
        }

        offset = consumed;
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_identification(line: &str) -> Result<String> {
    let malformed = || Error::Malformed(format!("not a valid SSH-2.0 identification: {line:?}"));

    let mut parts = line.splitn(3, '-');

    let _ssh = parts.next().filter(|&p| p == "SSH").ok_or_else(malformed)?;
    let version = parts.next().filter(|&p| p == "2.0").ok_or_else(malformed)?;
    let _ = version;

    let rest = parts.next().ok_or_else(malformed)?;
    if rest.is_empty() || rest.contains('-') {
        return Err(malformed());
    }

    Ok(rest.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_good() {
        let (banner, consumed) = try_parse(b"SSH-2.0-OpenSSH_6.9\r\n").unwrap().unwrap();

        assert_eq!(banner, "OpenSSH_6.9");
        assert_eq!(consumed, "SSH-2.0-OpenSSH_6.9\r\n".len());
    }

    #[test]
    fn parse_with_preface() {
        let input = b"Foo bar\r\nSSH-2.0-OpenSSH_6.9\r\n";
        let (banner, consumed) = try_parse(input).unwrap().unwrap();

        assert_eq!(banner, "OpenSSH_6.9");
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn parse_with_trailing() {
        let input = b"Foo bar\r\nSSH-2.0-OpenSSH_6.9\r\nLALA";
        let (banner, consumed) = try_parse(input).unwrap().unwrap();

        assert_eq!(banner, "OpenSSH_6.9");
        assert_eq!(&input[consumed..], b"LALA");
    }

    #[test]
    fn parse_needs_more() {
        assert!(try_parse(b"SSH-2.0-OpenSSH_6.9").unwrap().is_none());
        assert!(try_parse(b"").unwrap().is_none());
    }

    #[test]
    fn parse_malformed_missing_software() {
        assert!(matches!(
            try_parse(b"SSH-2.0\r\n"),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn parse_malformed_wrong_version() {
        assert!(matches!(
            try_parse(b"SSH-1.0-foobar\r\n"),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn parse_malformed_embedded_hyphen() {
        assert!(matches!(
            try_parse(b"SSH-2.0-Open-SSH_6.9\r\n"),
            Err(Error::Malformed(_))
        ));
    }
}
