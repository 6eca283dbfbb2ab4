//! Envelope validation.

use tracing::debug;

use super::filename::is_clean_filename;
use super::header::{message_header, parse_date};
use super::{Envelope, BODY_SEGMENT};
use crate::error::{EchomailError, Result};

/// Length of a sender node id.
pub const SENDER_LEN: usize = 52;

impl Envelope {
    /// Check every envelope invariant, stopping at the first violation.
    ///
    /// The body must be present, non-empty UTF-8 text opening with a
    /// well-formed header that names a plausible `Sender` and a `Group`,
    /// with a parseable `Date` if one is given. Every other segment must
    /// be a clean file name.
    pub fn verify(&self) -> Result<()> {
        let body = self
            .body()
            .ok_or_else(|| EchomailError::validation("message file missing"))?;
        if body.is_empty() {
            return Err(EchomailError::validation("empty message"));
        }
        if std::str::from_utf8(body).is_err() {
            return Err(EchomailError::validation("message must be valid UTF-8"));
        }

        let fields = message_header(body)
            .map_err(|e| EchomailError::validation(format!("bad message header: {e}")))?;

        let sender = fields
            .get("Sender")
            .ok_or_else(|| EchomailError::validation("sender missing"))?;
        if !is_plausible_sender(sender) {
            return Err(EchomailError::validation(format!(
                "sender ID looks bogus: {sender}"
            )));
        }

        match fields.get("Group") {
            Some(group) if !group.is_empty() => {}
            _ => return Err(EchomailError::validation("group missing")),
        }

        if let Some(date) = fields.get("Date") {
            if parse_date(date).is_none() {
                return Err(EchomailError::validation(format!(
                    "datetime parse error: {date}"
                )));
            }
        }

        if let Some(name) = self
            .names()
            .find(|name| *name != BODY_SEGMENT && !is_clean_filename(name))
        {
            return Err(EchomailError::validation(format!("illegal filename {name:?}")));
        }

        debug!(segments = self.len(), "Envelope verified");
        Ok(())
    }
}

/// A sender id is exactly [`SENDER_LEN`] bytes and already upper case.
pub fn is_plausible_sender(sender: &str) -> bool {
    sender.len() == SENDER_LEN && sender.to_uppercase() == sender
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENDER: &str = "MZLQ74C2EB2AIMEE2SWKSQUT54DHKMG55FH7J2JLRWCFSJJ6W54Q";

    fn body_with(header: &str) -> Vec<u8> {
        format!("```Echomail\n{header}\n```\n# Hello\n\nBody text.\n").into_bytes()
    }

    fn valid_body() -> Vec<u8> {
        body_with(&format!("Sender: {SENDER}\nGroup: local.test\nDate: 2024-01-01 10:00:00"))
    }

    fn reason(envelope: &Envelope) -> String {
        let err = envelope.verify().unwrap_err();
        assert!(err.is_validation(), "expected validation error, got {err}");
        err.to_string()
    }

    #[test]
    fn test_valid_envelope() {
        let mut envelope = Envelope::with_body(valid_body());
        envelope.insert("photo.jpg", vec![0xFF, 0xD8, 0x00]);
        envelope.verify().unwrap();
    }

    #[test]
    fn test_body_missing_or_empty() {
        let mut envelope = Envelope::new();
        envelope.insert("a.txt", "x");
        assert!(reason(&envelope).contains("missing"));

        assert!(reason(&Envelope::with_body("")).contains("empty message"));
    }

    #[test]
    fn test_body_must_be_utf8() {
        let mut body = valid_body();
        body.extend_from_slice(&[0xC3, 0x28]);
        assert!(reason(&Envelope::with_body(body)).contains("UTF-8"));
    }

    #[test]
    fn test_header_problems_are_validation_errors() {
        assert!(reason(&Envelope::with_body("# No header")).contains("header"));
        let unterminated = format!("```Echomail\nSender: {SENDER}\nGroup: g\n");
        assert!(reason(&Envelope::with_body(unterminated)).contains("never ended"));
    }

    #[test]
    fn test_sender_checks() {
        let missing = body_with("Group: local.test");
        assert!(reason(&Envelope::with_body(missing)).contains("sender missing"));

        let short = body_with(&format!("Sender: {}\nGroup: g", &SENDER[..51]));
        assert!(reason(&Envelope::with_body(short)).contains("bogus"));

        let long = body_with(&format!("Sender: {SENDER}A\nGroup: g"));
        assert!(reason(&Envelope::with_body(long)).contains("bogus"));

        let lower = body_with(&format!("Sender: {}\nGroup: g", SENDER.to_lowercase()));
        assert!(reason(&Envelope::with_body(lower)).contains("bogus"));
    }

    #[test]
    fn test_group_required() {
        let body = body_with(&format!("Sender: {SENDER}"));
        assert!(reason(&Envelope::with_body(body)).contains("group missing"));
    }

    #[test]
    fn test_bad_date_is_fatal() {
        let body = body_with(&format!("Sender: {SENDER}\nGroup: g\nDate: tomorrow"));
        assert!(reason(&Envelope::with_body(body)).contains("datetime"));

        for loose in ["2024-1-5 3:4:5", "+2024-01-05 03:04:05", "2024-01-05  03:04:05"] {
            let body = body_with(&format!("Sender: {SENDER}\nGroup: g\nDate: {loose}"));
            assert!(
                reason(&Envelope::with_body(body)).contains("datetime"),
                "{loose:?} should be rejected"
            );
        }

        let no_date = body_with(&format!("Sender: {SENDER}\nGroup: g"));
        Envelope::with_body(no_date).verify().unwrap();
    }

    #[test]
    fn test_attachment_names() {
        for bad in ["../escape.txt", "/etc/passwd", "dir/file", "..", ""] {
            let mut envelope = Envelope::with_body(valid_body());
            envelope.insert(bad, "x");
            assert!(
                reason(&envelope).contains("illegal filename"),
                "{bad:?} should be rejected"
            );
        }
    }
}
