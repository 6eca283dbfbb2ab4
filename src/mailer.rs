//! Send and receive operations on top of the codec and the mail root.

use std::path::Path;

use tracing::{debug, info};

use crate::envelope::{Envelope, BODY_SEGMENT};
use crate::error::{EchomailError, Result};
use crate::model::Message;
use crate::store::MailRoot;

/// How the claimed `Sender` is checked against the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Accept any sender.
    Skip,
    /// Require the transport's authenticated origin to equal `Sender`.
    /// `None` means the transport did not supply one.
    Require(Option<String>),
}

/// Compare a message's claimed sender with the transport origin.
pub fn check_origin(msg: &Message, policy: &OriginPolicy) -> Result<()> {
    match policy {
        OriginPolicy::Skip => Ok(()),
        OriginPolicy::Require(None) => Err(EchomailError::MissingOrigin(
            "cannot verify sender without an authenticated origin".to_string(),
        )),
        OriginPolicy::Require(Some(origin)) if *origin == msg.sender => Ok(()),
        OriginPolicy::Require(Some(origin)) => Err(EchomailError::SenderMismatch {
            claimed: msg.sender.clone(),
            origin: origin.clone(),
        }),
    }
}

/// Decode, check and store a received envelope.
pub fn receive(root: &MailRoot, data: &[u8], policy: &OriginPolicy) -> Result<Message> {
    let msg = Envelope::read(data)?.parse()?;
    check_origin(&msg, policy)?;
    root.save(&msg)?;
    info!(msg_id = %msg.msg_id, sender = %msg.sender, "Received message");
    Ok(msg)
}

/// Bundle a message text and attachment files into a verified envelope.
///
/// Each attachment is stored under its base file name.
pub fn build_envelope(body: Vec<u8>, attachments: &[impl AsRef<Path>]) -> Result<Envelope> {
    let mut envelope = Envelope::with_body(body);

    for path in attachments {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| *n != BODY_SEGMENT)
            .ok_or_else(|| {
                EchomailError::validation(format!("illegal attachment name: {}", path.display()))
            })?;
        if envelope.contains(name) {
            return Err(EchomailError::validation(format!(
                "duplicate attachment name: {name}"
            )));
        }
        let content = std::fs::read(path).map_err(|e| EchomailError::io(path, e))?;
        debug!(name = %name, size = content.len(), "Attaching file");
        envelope.insert(name, content);
    }

    envelope.verify()?;
    Ok(envelope)
}

/// Build and encode an outgoing message, keeping a copy in `root` if given.
pub fn send(root: Option<&MailRoot>, body: Vec<u8>, attachments: &[impl AsRef<Path>]) -> Result<Vec<u8>> {
    let envelope = build_envelope(body, attachments)?;
    let data = envelope.write()?;

    if let Some(root) = root {
        let msg = envelope.parse()?;
        root.save(&msg)?;
        info!(msg_id = %msg.msg_id, group = %msg.group, "Saved outgoing message");
    }

    Ok(data)
}
