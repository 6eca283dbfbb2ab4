//! Envelope wire encoding and decoding.

use std::collections::BTreeMap;

use tracing::debug;

use super::{Envelope, END_MARKER, MAGIC};
use crate::error::{EchomailError, Result};

impl Envelope {
    /// Decode an envelope from its wire form and verify it.
    ///
    /// Structural problems are reported as format errors; a decoded
    /// envelope that fails [`Envelope::verify`] is reported wrapped in
    /// [`EchomailError::Decode`].
    pub fn read(source: &[u8]) -> Result<Envelope> {
        let mut pos = 0;
        let mut table: Vec<(String, usize)> = Vec::new();
        let mut first = true;

        loop {
            let line = next_line(source, &mut pos)?;

            if first {
                if line != MAGIC {
                    return Err(EchomailError::format("missing envelope magic"));
                }
                first = false;
                continue;
            }
            if line == END_MARKER {
                break;
            }

            let (length, name) = line
                .split_once(' ')
                .ok_or_else(|| EchomailError::format(format!("invalid file entry: {line}")))?;
            let name = name.trim();
            if table.iter().any(|(seen, _)| seen == name) {
                return Err(EchomailError::format(format!(
                    "duplicate name in envelope: {name}"
                )));
            }
            let length = parse_length(length)
                .ok_or_else(|| EchomailError::format(format!("invalid length in entry: {line}")))?;

            table.push((name.to_string(), length));
        }

        let data = &source[pos..];
        let mut segments = BTreeMap::new();
        let mut offset = 0usize;

        for (name, length) in table {
            let end = offset
                .checked_add(length)
                .filter(|end| *end <= data.len())
                .ok_or_else(|| {
                    EchomailError::format(format!("truncated body: not enough data for {name}"))
                })?;
            segments.insert(name, data[offset..end].to_vec());
            offset = end;
        }

        if offset < data.len() {
            debug!(trailing = data.len() - offset, "Ignoring bytes after last segment");
        }

        let envelope = Envelope { segments };
        envelope
            .verify()
            .map_err(|e| EchomailError::Decode(Box::new(e)))?;

        debug!(segments = envelope.len(), size = source.len(), "Decoded envelope");
        Ok(envelope)
    }

    /// Encode a verified envelope.
    ///
    /// Segments are written in name order, so equal envelopes always
    /// encode to identical bytes.
    pub fn write(&self) -> Result<Vec<u8>> {
        self.verify()?;

        let mut header = String::with_capacity(32 * (self.len() + 2));
        header.push_str(MAGIC);
        header.push('\n');
        for (name, content) in self.iter() {
            header.push_str(&format!("{} {}\n", content.len(), name));
        }
        header.push_str(END_MARKER);
        header.push('\n');

        let body_len: usize = self.iter().map(|(_, content)| content.len()).sum();
        let mut out = Vec::with_capacity(header.len() + body_len);
        out.extend_from_slice(header.as_bytes());
        for (_, content) in self.iter() {
            out.extend_from_slice(content);
        }
        Ok(out)
    }
}

/// Read one `\n`-terminated line starting at `pos`, advancing past it.
fn next_line<'a>(source: &'a [u8], pos: &mut usize) -> Result<&'a str> {
    let rest = &source[*pos..];
    let newline = rest
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| EchomailError::format("truncated envelope header"))?;
    let line = std::str::from_utf8(&rest[..newline])
        .map_err(|_| EchomailError::format("envelope header is not valid UTF-8"))?;
    *pos += newline + 1;
    Ok(line)
}

/// Parse a plain decimal length: ASCII digits only, no sign.
fn parse_length(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::BODY_SEGMENT;

    const SENDER: &str = "MZLQ74C2EB2AIMEE2SWKSQUT54DHKMG55FH7J2JLRWCFSJJ6W54Q";

    fn body() -> String {
        format!("```Echomail\nSender: {SENDER}\nGroup: local.test\n```\nHi\n")
    }

    fn wire(entries: &[(&str, usize)], data: &[u8]) -> Vec<u8> {
        let mut out = format!("{MAGIC}\n");
        for (name, len) in entries {
            out.push_str(&format!("{len} {name}\n"));
        }
        out.push_str("end\n");
        let mut out = out.into_bytes();
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn test_write_layout() {
        let mut envelope = Envelope::with_body(body());
        envelope.insert("z.bin", vec![1, 2, 3]);
        envelope.insert("a.txt", "ab");

        let bytes = envelope.write().unwrap();
        let expected = wire(
            &[(".", body().len()), ("a.txt", 2), ("z.bin", 3)],
            &[body().as_bytes(), b"ab".as_slice(), [1u8, 2, 3].as_slice()].concat(),
        );
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_read_accepts_any_order() {
        let data = [b"xyz".as_slice(), body().as_bytes()].concat();
        let bytes = wire(&[("z.txt", 3), (".", body().len())], &data);
        let envelope = Envelope::read(&bytes).unwrap();
        assert_eq!(envelope.get("z.txt"), Some(&b"xyz"[..]));
        assert_eq!(envelope.body(), Some(body().as_bytes()));
    }

    #[test]
    fn test_read_trims_names_and_allows_spaces() {
        let data = [body().as_bytes(), b"1234".as_slice()].concat();
        let bytes = wire(&[(".", body().len()), ("my notes.txt ", 4)], &data);
        let envelope = Envelope::read(&bytes).unwrap();
        assert_eq!(envelope.get("my notes.txt"), Some(&b"1234"[..]));
    }

    #[test]
    fn test_round_trip_keeps_unicode_space_names() {
        let mut envelope = Envelope::with_body(body());
        envelope.insert("a\u{A0}b.txt", "inner");
        let decoded = Envelope::read(&envelope.write().unwrap()).unwrap();
        assert_eq!(decoded, envelope);

        let mut trailing = Envelope::with_body(body());
        trailing.insert("a\u{A0}", "x");
        assert!(trailing.write().unwrap_err().is_validation());
    }

    #[test]
    fn test_read_zero_length_attachment() {
        let bytes = wire(&[(".", body().len()), ("empty.txt", 0)], body().as_bytes());
        let envelope = Envelope::read(&bytes).unwrap();
        assert_eq!(envelope.get("empty.txt"), Some(&b""[..]));
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = wire(&[(".", body().len())], body().as_bytes());
        bytes[5] = b'2';
        assert!(Envelope::read(&bytes).unwrap_err().is_format());
        assert!(Envelope::read(b"end\n").unwrap_err().is_format());
    }

    #[test]
    fn test_missing_end_marker() {
        let bytes = format!("{MAGIC}\n5 .\nhello").into_bytes();
        let err = Envelope::read(&bytes).unwrap_err();
        assert!(err.is_format());
        assert!(matches!(err, EchomailError::Format(_)));

        assert!(Envelope::read(b"").unwrap_err().is_format());
        assert!(Envelope::read(MAGIC.as_bytes()).unwrap_err().is_format());
    }

    #[test]
    fn test_bad_entry_lines() {
        for line in ["12", "x .", "-1 .", "+1 .", " 1 .", "0x10 ."] {
            let bytes = format!("{MAGIC}\n{line}\nend\n").into_bytes();
            let err = Envelope::read(&bytes).unwrap_err();
            assert!(
                matches!(err, EchomailError::Format(_)),
                "{line:?} should be a format error, got {err}"
            );
        }
    }

    #[test]
    fn test_huge_length_does_not_overflow() {
        let bytes = format!("{MAGIC}\n{} .\n1 x\nend\nabc", usize::MAX).into_bytes();
        assert!(matches!(
            Envelope::read(&bytes).unwrap_err(),
            EchomailError::Format(_)
        ));
    }

    #[test]
    fn test_duplicate_name() {
        let data = [body().as_bytes(), b"ab".as_slice()].concat();
        let bytes = wire(&[(".", body().len()), ("a", 1), ("a ", 1)], &data);
        let err = Envelope::read(&bytes).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_truncated_body() {
        let data = body();
        let bytes = wire(&[(".", data.len()), ("a.txt", 10)], data.as_bytes());
        let err = Envelope::read(&bytes).unwrap_err();
        assert!(matches!(err, EchomailError::Format(_)));
        assert!(err.to_string().contains("truncated body"));
    }

    #[test]
    fn test_decode_wraps_validation() {
        let text = "no header here";
        let bytes = wire(&[(BODY_SEGMENT, text.len())], text.as_bytes());
        let err = Envelope::read(&bytes).unwrap_err();
        assert!(matches!(err, EchomailError::Decode(_)));
        assert!(err.is_validation());
    }

    #[test]
    fn test_write_rejects_invalid() {
        let mut envelope = Envelope::with_body(body());
        envelope.insert("../x", "evil");
        assert!(envelope.write().unwrap_err().is_validation());
    }
}
