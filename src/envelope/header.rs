//! Echomail header block: extraction from the message text and `Key: Value` parsing.
//!
//! A message body opens with a fenced block:
//!
//! ````text
//! ```Echomail
//! Sender: <52-character node id>
//! Group: some.group
//! Date: 2024-01-01 12:00:00
//! ```
//! ````

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{EchomailError, Result};

/// Marker that must open every message body.
pub const HEADER_START: &str = "```Echomail";

/// Marker closing the header block.
pub const HEADER_END: &str = "```";

/// Header lines longer than this (in bytes) are rejected.
pub const MAX_HEADER_LINE: usize = 1024;

/// `strftime` format of the `Date` field. Always UTC.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parsed header fields. Keys are unique; the last occurrence wins.
pub type Header = BTreeMap<String, String>;

/// Return the raw header block of a message body, without markers and
/// with surrounding whitespace trimmed.
pub fn extract_header_block(body: &[u8]) -> Result<&[u8]> {
    let rest = body
        .strip_prefix(HEADER_START.as_bytes())
        .ok_or_else(|| EchomailError::format("message must start with header"))?;

    let end = find(rest, HEADER_END.as_bytes())
        .ok_or_else(|| EchomailError::format("header never ended"))?;

    Ok(rest[..end].trim_ascii())
}

/// Parse a header block into its fields.
pub fn parse_header(block: &[u8]) -> Result<Header> {
    let text = std::str::from_utf8(block)
        .map_err(|_| EchomailError::format("header is not valid UTF-8"))?;
    let text = text.replace("\r\n", "\n");

    let mut fields = Header::new();

    for raw in text.split('\n') {
        if raw.len() > MAX_HEADER_LINE {
            return Err(EchomailError::format("header line too long"));
        }

        let line = raw.trim();
        if line.is_empty() {
            return Err(EchomailError::format("empty line in header"));
        }

        let (key, value) = line
            .split_once(": ")
            .ok_or_else(|| EchomailError::format("missing header field separator"))?;

        let key = key.trim();
        if key.is_empty() {
            return Err(EchomailError::format("empty header field key"));
        }

        fields.insert(key.to_string(), value.trim().to_string());
    }

    Ok(fields)
}

/// Extract and parse the header of a message body in one step.
pub fn message_header(body: &[u8]) -> Result<Header> {
    parse_header(extract_header_block(body)?)
}

/// Parse a `Date` header value as UTC.
///
/// The value must be exactly `YYYY-MM-DD HH:MM:SS`, zero-padded.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if !has_date_shape(value) {
        return None;
    }
    NaiveDateTime::parse_from_str(value, DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn has_date_shape(value: &str) -> bool {
    const SHAPE: &[u8; 19] = b"dddd-dd-dd dd:dd:dd";

    let bytes = value.as_bytes();
    bytes.len() == SHAPE.len()
        && bytes.iter().zip(SHAPE).all(|(&b, &s)| match s {
            b'd' => b.is_ascii_digit(),
            sep => b == sep,
        })
}

/// Format a date the way the `Date` header expects it.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
