//! The echomail envelope: a named, length-prefixed bundle of a message body
//! and its attachments.
//!
//! ```text
//! ECHO 1.0\n
//! <len1> <name1>\n
//! <len2> <name2>\n
//! end\n
//! <body1 bytes><body2 bytes>...
//! ```
//!
//! The segment named `.` is the message text; every other segment is an
//! attachment whose name is a clean file name.

pub mod codec;
pub mod filename;
pub mod header;
pub mod verify;

use std::collections::BTreeMap;

/// Magic line identifying the envelope format and version.
pub const MAGIC: &str = "ECHO 1.0";

/// Line terminating the segment table.
pub const END_MARKER: &str = "end";

/// Reserved segment name of the message body.
pub const BODY_SEGMENT: &str = ".";

/// Segment name to content mapping.
///
/// Segments are kept sorted by name, which is also the order they are
/// written in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    segments: BTreeMap<String, Vec<u8>>,
}

impl Envelope {
    /// Create an empty envelope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an envelope holding only a message body.
    pub fn with_body(body: impl Into<Vec<u8>>) -> Self {
        let mut envelope = Self::new();
        envelope.insert(BODY_SEGMENT, body);
        envelope
    }

    /// Insert or replace a segment, returning the previous content.
    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Option<Vec<u8>> {
        self.segments.insert(name.into(), content.into())
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.segments.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.segments.contains_key(name)
    }

    /// The message body segment, if present.
    pub fn body(&self) -> Option<&[u8]> {
        self.get(BODY_SEGMENT)
    }

    /// Segment names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.segments.keys().map(String::as_str)
    }

    /// Attachment segments (everything but the body), sorted by name.
    pub fn attachments(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.iter().filter(|(name, _)| *name != BODY_SEGMENT)
    }

    /// All segments, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.segments
            .iter()
            .map(|(name, content)| (name.as_str(), content.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub(crate) fn into_segments(self) -> BTreeMap<String, Vec<u8>> {
        self.segments
    }
}

impl FromIterator<(String, Vec<u8>)> for Envelope {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}
