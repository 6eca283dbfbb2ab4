//! The parsed message record and content-derived names.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha512_256};

use crate::envelope::header::{extract_header_block, message_header, parse_date, parse_header, Header};
use crate::envelope::{Envelope, BODY_SEGMENT};
use crate::error::Result;

/// Suffix tag of every group directory name.
pub const GROUP_DIR_SUFFIX: &str = ".group";

/// A received or composed echomail message.
///
/// Built once from a verified [`Envelope`] and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Digest of the exact body bytes, see [`compute_msg_id`].
    pub msg_id: String,

    /// Claimed origin node id (52 upper-case characters on a verified message).
    pub sender: String,

    /// Destination group name.
    pub group: String,

    /// `Date` header, if present and parseable.
    pub date: Option<DateTime<Utc>>,

    /// Every header field.
    pub header: Header,

    /// Full message text, header block included.
    pub body: Vec<u8>,

    /// Attachment file name to content.
    pub attachments: BTreeMap<String, Vec<u8>>,
}

impl Message {
    /// Build a message from an envelope, verifying it first.
    ///
    /// Unlike [`Envelope::verify`], an unparseable `Date` here only leaves
    /// [`Message::date`] unset; since verification runs first this only
    /// matters for headers that never went through it.
    pub fn from_envelope(envelope: Envelope) -> Result<Message> {
        envelope.verify()?;

        let mut segments = envelope.into_segments();
        let body = segments.remove(BODY_SEGMENT).unwrap_or_default();
        let header = parse_header(extract_header_block(&body)?)?;

        Ok(Self::assemble(compute_msg_id(&body), header, body, segments))
    }

    /// Rebuild a message from a stored body, with the id it was saved under.
    ///
    /// Stored messages carry no attachments; only the header is required
    /// to be well-formed.
    pub fn from_stored(msg_id: impl Into<String>, body: Vec<u8>) -> Result<Message> {
        let header = message_header(&body)?;
        Ok(Self::assemble(msg_id.into(), header, body, BTreeMap::new()))
    }

    fn assemble(
        msg_id: String,
        header: Header,
        body: Vec<u8>,
        attachments: BTreeMap<String, Vec<u8>>,
    ) -> Message {
        let date = header.get("Date").and_then(|d| parse_date(d));
        let sender = header.get("Sender").cloned().unwrap_or_default();
        let group = header.get("Group").cloned().unwrap_or_default();

        Message {
            msg_id,
            sender,
            group,
            date,
            header,
            body,
            attachments,
        }
    }

    /// The `MsgId` this message replies to, if any.
    pub fn reply_to(&self) -> Option<&str> {
        self.header
            .get("ReplyTo")
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Display name of the author: `From`, falling back to `Sender`, with
    /// any bracketed address part dropped.
    pub fn from_display(&self) -> String {
        let from = match self.header.get("From") {
            Some(from) if !from.is_empty() => from.as_str(),
            _ => self.sender.as_str(),
        };
        match from.split_once('[') {
            Some((name, _)) => name.trim().to_string(),
            None => from.to_string(),
        }
    }

    /// `Subj` header, empty if absent.
    pub fn subject(&self) -> &str {
        self.header.get("Subj").map(String::as_str).unwrap_or("")
    }

    /// Directory name of this message's group.
    pub fn group_dir(&self) -> String {
        group_dir(&self.group)
    }
}

impl Envelope {
    /// Turn a verified envelope into a [`Message`].
    pub fn parse(self) -> Result<Message> {
        Message::from_envelope(self)
    }
}

/// Content-derived message id: SHA-512/256 of the body, base64url without padding.
pub fn compute_msg_id(body: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha512_256::digest(body))
}

/// Filesystem-safe directory name for a group.
///
/// Names equal after trimming map to the same directory.
pub fn group_dir(name: &str) -> String {
    let digest = Sha512_256::digest(name.trim().as_bytes());
    format!("{}{GROUP_DIR_SUFFIX}", URL_SAFE_NO_PAD.encode(digest))
}
